//! Rule Conditions
//!
//! Predicates over the current selection. Each rule carries exactly one condition.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    cart::Selection,
    items::{ItemCategory, ItemId},
};

/// Condition under which a rule fires.
///
/// Conditions that name items list catalog ids; ids that are not selected simply never match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    /// At least `value` items are selected, optionally counting only some categories.
    MinSelectionCount {
        /// Minimum number of selected items
        value: usize,

        /// Categories to count. Empty means every selected item counts.
        #[serde(default)]
        categories: Vec<ItemCategory>,
    },

    /// At least one of the listed items is selected.
    SpecificItems {
        /// Candidate items
        #[serde(default)]
        specific_items: Vec<ItemId>,
    },

    /// All listed items are selected, or at least `minimum_count` of them.
    RequiredItems {
        /// Required items
        #[serde(default)]
        required_items: Vec<ItemId>,

        /// How many of `required_items` must be selected. Unset means all of them.
        #[serde(default)]
        minimum_count: Option<usize>,
    },

    /// At least `value` selected items fall in the given categories.
    CategoryCount {
        /// Categories to count
        #[serde(default)]
        categories: Vec<ItemCategory>,

        /// Minimum number of matching items
        #[serde(default)]
        value: Option<usize>,
    },

    /// Any of the listed conflicting items is selected.
    ///
    /// The condition holds when the conflict *exists*, so pairing it with a `disable`
    /// action blocks the rule's targets while a conflicting item is in the cart.
    MutuallyExclusive {
        /// Conflicting items
        #[serde(default)]
        mutually_exclusive_with: Vec<ItemId>,
    },

    /// A condition kind this build does not understand. Never satisfied.
    #[serde(other)]
    Unknown,
}

impl Condition {
    /// Evaluate the condition against the current selection.
    pub fn is_satisfied(&self, selection: &Selection) -> bool {
        match self {
            Self::MinSelectionCount { value, categories } => {
                let count = if categories.is_empty() {
                    selection.len()
                } else {
                    selection.count_in(categories)
                };

                count >= *value
            }
            Self::SpecificItems { specific_items } => specific_items
                .iter()
                .any(|id| selection.contains(id.as_str())),
            Self::RequiredItems {
                required_items,
                minimum_count,
            } => {
                if required_items.is_empty() {
                    return false;
                }

                match minimum_count {
                    Some(minimum) if *minimum > 0 => {
                        let selected = required_items
                            .iter()
                            .filter(|id| selection.contains(id.as_str()))
                            .count();

                        selected >= *minimum
                    }
                    _ => required_items
                        .iter()
                        .all(|id| selection.contains(id.as_str())),
                }
            }
            Self::CategoryCount { categories, value } => match value {
                Some(value) if !categories.is_empty() => selection.count_in(categories) >= *value,
                _ => false,
            },
            Self::MutuallyExclusive {
                mutually_exclusive_with,
            } => mutually_exclusive_with
                .iter()
                .any(|id| selection.contains(id.as_str())),
            Self::Unknown => {
                warn!("unknown condition type; treating as not satisfied");

                false
            }
        }
    }

    /// Short name of the condition kind, as written in rule definitions.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MinSelectionCount { .. } => "min_selection_count",
            Self::SpecificItems { .. } => "specific_items",
            Self::RequiredItems { .. } => "required_items",
            Self::CategoryCount { .. } => "category_count",
            Self::MutuallyExclusive { .. } => "mutually_exclusive",
            Self::Unknown => "unknown",
        }
    }

    /// Items the condition names, if any.
    pub fn referenced_items(&self) -> &[ItemId] {
        match self {
            Self::SpecificItems { specific_items } => specific_items,
            Self::RequiredItems { required_items, .. } => required_items,
            Self::MutuallyExclusive {
                mutually_exclusive_with,
            } => mutually_exclusive_with,
            Self::MinSelectionCount { .. } | Self::CategoryCount { .. } | Self::Unknown => &[],
        }
    }
}
