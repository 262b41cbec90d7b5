//! Selection Rules
//!
//! Declarative rules that decide which catalog items can be selected and which selected
//! items become free gifts.

use serde::{Deserialize, Serialize};

use crate::{items::ItemId, keys::string_key};

pub mod conditions;
pub mod engine;

pub use conditions::Condition;

string_key! {
    /// Selection rule identifier
    pub struct RuleId;
}

/// What a rule controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    /// Toggles whether target items can be selected.
    Availability,

    /// Turns selected target items into gifts.
    GiftTransformation,

    /// A rule kind this build does not understand. Ignored.
    #[serde(other)]
    Unknown,
}

/// What a rule does to its targets once its condition holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    /// Make targets unavailable.
    Disable,

    /// Make targets available again.
    Enable,

    /// Make selected targets free.
    MakeGift,

    /// An action this build does not understand. Ignored.
    #[serde(other)]
    Unknown,
}

/// How a gift is presented.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GiftSettings {
    /// Badge text shown next to the item
    #[serde(default = "default_display_text")]
    pub display_text: String,

    /// Badge colour (CSS colour string)
    #[serde(default = "default_badge_color")]
    pub badge_color: String,

    /// Whether to show the struck-through original price
    #[serde(default = "default_true")]
    pub show_original_price: bool,
}

impl Default for GiftSettings {
    fn default() -> Self {
        Self {
            display_text: default_display_text(),
            badge_color: default_badge_color(),
            show_original_price: true,
        }
    }
}

fn default_display_text() -> String {
    "Gift".to_string()
}

fn default_badge_color() -> String {
    "#16a34a".to_string()
}

fn default_true() -> bool {
    true
}

/// Selection rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionRule {
    /// Rule id
    pub id: RuleId,

    /// Admin-facing name
    pub name: String,

    /// Buyer-facing explanation, used when the rule blocks an item
    #[serde(default)]
    pub description: Option<String>,

    /// Rule kind
    #[serde(rename = "type")]
    pub kind: RuleKind,

    /// Inactive rules are never evaluated
    #[serde(default = "default_true")]
    pub active: bool,

    /// Lower values are evaluated first
    #[serde(default)]
    pub priority: i32,

    /// When the rule fires
    pub condition: Condition,

    /// Items the action applies to
    #[serde(default)]
    pub target_items: Vec<ItemId>,

    /// What happens to the targets
    pub action: RuleAction,

    /// Presentation of gifts created by this rule
    #[serde(default)]
    pub gift_settings: Option<GiftSettings>,
}

impl SelectionRule {
    /// Create an active availability rule.
    pub fn availability(
        id: impl Into<RuleId>,
        priority: i32,
        condition: Condition,
        action: RuleAction,
        target_items: impl IntoIterator<Item = impl Into<ItemId>>,
    ) -> Self {
        let id = id.into();

        Self {
            name: id.to_string(),
            id,
            description: None,
            kind: RuleKind::Availability,
            active: true,
            priority,
            condition,
            target_items: target_items.into_iter().map(Into::into).collect(),
            action,
            gift_settings: None,
        }
    }

    /// Create an active gift transformation rule.
    pub fn gift(
        id: impl Into<RuleId>,
        priority: i32,
        condition: Condition,
        target_items: impl IntoIterator<Item = impl Into<ItemId>>,
    ) -> Self {
        Self {
            kind: RuleKind::GiftTransformation,
            gift_settings: Some(GiftSettings::default()),
            ..Self::availability(id, priority, condition, RuleAction::MakeGift, target_items)
        }
    }

    /// Attach a buyer-facing description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Deactivate the rule.
    #[must_use]
    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }
}
