//! Cartwright prelude.
//!
//! Convenience exports for common library consumers.

pub use crate::{
    cart::{Cart, CartError, CartItem, Selection},
    discounts::{
        AppliedDiscount, Discount, DiscountConfig, DiscountError, DiscountKind, DiscountScope,
        DiscountWindow,
    },
    fixtures::{Fixture, FixtureError},
    guard::AvailabilityGuard,
    items::{Catalog, CatalogError, Item, ItemCategory, ItemId},
    pricing::{LineItem, PricingBreakdown, PricingError, compute_pricing},
    receipt::{Receipt, ReceiptError},
    rules::{
        Condition, GiftSettings, RuleAction, RuleId, RuleKind, SelectionRule,
        engine::{EngineSettings, EvaluationStrategy, ItemState, RulesEngine, RulesEvaluation},
    },
    session::{CatalogSource, SelectionSession, SessionError, SourceError},
};
