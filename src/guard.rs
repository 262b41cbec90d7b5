//! Cart Availability Guard
//!
//! Watches rule evaluations and evicts cart items that have become unavailable. Evictions
//! are only *scheduled* when an evaluation is observed; they are applied by a later
//! [`AvailabilityGuard::flush`] so that a removal never re-enters the evaluation that caused
//! it.

use tracing::debug;

use crate::{
    cart::{Cart, CartItem},
    items::{Catalog, ItemCategory, ItemId},
    rules::{
        Condition, GiftSettings, SelectionRule,
        engine::{RulesEngine, RulesEvaluation},
    },
};

/// Reason given when no rule explains why an item is blocked.
pub const GENERIC_UNAVAILABLE_REASON: &str = "This item is not available right now";

/// Cart Availability Guard
#[derive(Debug, Clone, Default)]
pub struct AvailabilityGuard {
    evaluation: RulesEvaluation,
    pending_evictions: Vec<ItemId>,
}

impl AvailabilityGuard {
    /// Create a guard that has not seen any evaluation yet; everything is available.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adopt a fresh evaluation and schedule every now-unavailable cart item for eviction.
    ///
    /// The cart is not touched here.
    pub fn observe(&mut self, evaluation: RulesEvaluation, cart: &Cart<'_>) -> &[ItemId] {
        self.pending_evictions = cart
            .iter()
            .filter(|item| !evaluation.is_available(item.id.as_str()))
            .map(|item| item.id.clone())
            .collect();

        if !self.pending_evictions.is_empty() {
            debug!(items = ?self.pending_evictions, "scheduled cart evictions");
        }

        self.evaluation = evaluation;

        &self.pending_evictions
    }

    /// Items scheduled for eviction by the last observed evaluation.
    pub fn pending_evictions(&self) -> &[ItemId] {
        &self.pending_evictions
    }

    /// Check whether any eviction is waiting to be applied.
    pub fn has_pending_evictions(&self) -> bool {
        !self.pending_evictions.is_empty()
    }

    /// Apply scheduled evictions to the cart, returning the removed lines.
    ///
    /// Items that were removed in the meantime are skipped.
    pub fn flush<'a>(&mut self, cart: &mut Cart<'a>) -> Vec<CartItem<'a>> {
        let removed: Vec<CartItem<'a>> = self
            .pending_evictions
            .drain(..)
            .filter_map(|id| cart.remove(id.as_str()))
            .collect();

        for item in &removed {
            debug!(item = %item.id, "evicted unavailable item from cart");
        }

        removed
    }

    /// The last observed evaluation.
    pub fn evaluation(&self) -> &RulesEvaluation {
        &self.evaluation
    }

    /// Whether an item can be selected.
    pub fn is_item_available(&self, id: &str) -> bool {
        self.evaluation.is_available(id)
    }

    /// Whether an item is currently a gift.
    pub fn is_item_gift(&self, id: &str) -> bool {
        self.evaluation.is_gift(id)
    }

    /// Gift presentation for an item, if it is a gift.
    pub fn gift_settings(&self, id: &str) -> Option<&GiftSettings> {
        self.evaluation
            .item_state(id)
            .filter(|state| state.is_gift)
            .and_then(|state| state.gift_settings.as_ref())
    }

    /// Human-readable explanation of why an item is unavailable, or `None` if it is available.
    pub fn unavailable_reason(
        &self,
        id: &str,
        engine: &RulesEngine,
        catalog: &Catalog<'_>,
    ) -> Option<String> {
        if self.is_item_available(id) {
            return None;
        }

        let reason = self
            .evaluation
            .item_state(id)
            .and_then(|state| state.blocked_by.as_ref())
            .and_then(|rule_id| engine.rule(rule_id.as_str()))
            .and_then(|rule| describe_block(rule, catalog))
            .unwrap_or_else(|| GENERIC_UNAVAILABLE_REASON.to_string());

        Some(reason)
    }
}

/// Explain a block from the rule that caused it.
fn describe_block(rule: &SelectionRule, catalog: &Catalog<'_>) -> Option<String> {
    if let Some(description) = rule
        .description
        .as_deref()
        .filter(|description| !description.trim().is_empty())
    {
        return Some(description.to_string());
    }

    match &rule.condition {
        Condition::MutuallyExclusive {
            mutually_exclusive_with: items,
        } if !items.is_empty() => Some(format!(
            "Cannot be combined with {}",
            titles(items, catalog)
        )),
        Condition::SpecificItems {
            specific_items: items,
        } if !items.is_empty() => Some(format!(
            "Not available together with {}",
            titles(items, catalog)
        )),
        Condition::RequiredItems {
            required_items: items,
            ..
        } if !items.is_empty() => Some(format!(
            "Not available while {} is selected",
            titles(items, catalog)
        )),
        Condition::MinSelectionCount { value, categories } if *value > 0 => Some(format!(
            "Not available once {value} or more {}are selected",
            scope(categories)
        )),
        Condition::CategoryCount {
            categories,
            value: Some(value),
        } if !categories.is_empty() => Some(format!(
            "Not available once {value} or more {}are selected",
            scope(categories)
        )),
        _ => None,
    }
}

fn titles(ids: &[ItemId], catalog: &Catalog<'_>) -> String {
    ids.iter()
        .map(|id| catalog.title(id.as_str()).unwrap_or(id.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn scope(categories: &[ItemCategory]) -> String {
    if categories.is_empty() {
        return "items ".to_string();
    }

    let names: Vec<String> = categories
        .iter()
        .map(|category| format!("{category}s"))
        .collect();

    format!("{} ", names.join(" or "))
}
