//! Selection Session
//!
//! Ties a catalog, its selection rules and its discounts to one buyer's cart. Every cart
//! mutation re-runs the rules engine; items the rules make unavailable are evicted on the
//! following [`SelectionSession::tick`].

use jiff::Timestamp;
use rusty_money::Money;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    cart::{Cart, CartError, CartItem},
    discounts::DiscountConfig,
    fixtures::FixtureError,
    guard::AvailabilityGuard,
    items::{Catalog, CatalogError, ItemId},
    pricing::{PricingBreakdown, PricingError, compute_pricing},
    rules::{
        GiftSettings, SelectionRule,
        engine::{EngineSettings, RulesEngine, RulesEvaluation},
    },
};

/// Errors raised while loading catalog data.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Fixture files could not be read or parsed
    #[error(transparent)]
    Fixture(#[from] FixtureError),

    /// Loaded items do not form a valid catalog
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// Somewhere catalog items, selection rules and discounts can be loaded from.
pub trait CatalogSource<'a> {
    /// Load the active catalog.
    ///
    /// # Errors
    ///
    /// Returns an error if the items cannot be loaded. Sessions cannot start without them.
    fn load_items(&self) -> Result<Catalog<'a>, SourceError>;

    /// Load selection rules.
    ///
    /// # Errors
    ///
    /// Returns an error if the rules cannot be loaded.
    fn load_rules(&self) -> Result<Vec<SelectionRule>, SourceError>;

    /// Load global and per-item discounts.
    ///
    /// # Errors
    ///
    /// Returns an error if the discounts cannot be loaded.
    fn load_discounts(&self) -> Result<DiscountConfig<'a>, SourceError>;
}

/// Errors related to session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The item is not in the catalog
    #[error("Item {0} is not in the catalog")]
    UnknownItem(ItemId),

    /// The item is not in the cart
    #[error("Item {0} is not in the cart")]
    NotInCart(ItemId),

    /// The rules currently block the item
    #[error("Item {item} is not available: {reason}")]
    ItemUnavailable {
        /// Blocked item
        item: ItemId,

        /// Buyer-facing explanation
        reason: String,
    },

    /// Cart rejected the change
    #[error(transparent)]
    Cart(#[from] CartError),

    /// Catalog data could not be loaded
    #[error(transparent)]
    Source(#[from] SourceError),

    /// Pricing failed
    #[error(transparent)]
    Pricing(#[from] PricingError),
}

/// One buyer's selection against a catalog.
#[derive(Debug, Clone)]
pub struct SelectionSession<'a> {
    catalog: Catalog<'a>,
    engine: RulesEngine,
    discounts: DiscountConfig<'a>,
    cart: Cart<'a>,
    guard: AvailabilityGuard,
}

impl<'a> SelectionSession<'a> {
    /// Start a session with an empty cart.
    ///
    /// Fixed discounts in a currency other than the catalog's are dropped with a warning.
    pub fn new(
        catalog: Catalog<'a>,
        rules: impl IntoIterator<Item = SelectionRule>,
        mut discounts: DiscountConfig<'a>,
        settings: EngineSettings,
    ) -> Self {
        discounts.retain_currency(catalog.currency());

        let cart = Cart::new(catalog.currency());

        let mut session = Self {
            catalog,
            engine: RulesEngine::new(rules).with_settings(settings),
            discounts,
            cart,
            guard: AvailabilityGuard::new(),
        };

        session.recompute();

        session
    }

    /// Load a session from a catalog source.
    ///
    /// Rules and discounts fail open: if either cannot be loaded the session starts without
    /// them and a warning is logged.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog items cannot be loaded.
    pub fn load(
        source: &impl CatalogSource<'a>,
        settings: EngineSettings,
    ) -> Result<Self, SessionError> {
        let catalog = source.load_items()?;
        let rules = load_rules_or_empty(source);
        let discounts = load_discounts_or_none(source);

        info!(
            items = catalog.len(),
            rules = rules.len(),
            "loaded selection session"
        );

        Ok(Self::new(catalog, rules, discounts, settings))
    }

    /// Reload catalog data, keeping the cart where possible.
    ///
    /// Cart lines whose item has left the catalog are dropped; the rest are repriced.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog items cannot be loaded. The session is unchanged.
    pub fn reload(&mut self, source: &impl CatalogSource<'a>) -> Result<(), SessionError> {
        let catalog = source.load_items()?;
        let rules = load_rules_or_empty(source);
        let mut discounts = load_discounts_or_none(source);

        discounts.retain_currency(catalog.currency());

        let mut cart = Cart::new(catalog.currency());

        for line in self.cart.iter() {
            let Some(item) = catalog.get(line.id.as_str()) else {
                warn!(item = %line.id, "dropping cart line no longer in catalog");
                continue;
            };

            cart.add(CartItem::from_item(item))?;
        }

        let settings = self.engine.settings();

        self.catalog = catalog;
        self.engine = RulesEngine::new(rules).with_settings(settings);
        self.discounts = discounts;
        self.cart = cart;

        self.recompute();

        Ok(())
    }

    /// Add a catalog item to the cart.
    ///
    /// # Errors
    ///
    /// - [`SessionError::UnknownItem`]: the item is not in the catalog.
    /// - [`SessionError::ItemUnavailable`]: the rules currently block the item.
    /// - [`SessionError::Cart`]: the item is already in the cart.
    pub fn add_item(&mut self, id: &str) -> Result<(), SessionError> {
        let item = self
            .catalog
            .get(id)
            .ok_or_else(|| SessionError::UnknownItem(ItemId::from(id)))?;

        if let Some(reason) = self.unavailable_reason(id) {
            return Err(SessionError::ItemUnavailable {
                item: item.id.clone(),
                reason,
            });
        }

        self.cart.add(CartItem::from_item(item))?;

        debug!(item = id, "added item to cart");

        self.recompute();

        Ok(())
    }

    /// Remove an item from the cart, returning the removed line.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotInCart`] if the item is not in the cart.
    pub fn remove_item(&mut self, id: &str) -> Result<CartItem<'a>, SessionError> {
        let removed = self
            .cart
            .remove(id)
            .ok_or_else(|| SessionError::NotInCart(ItemId::from(id)))?;

        debug!(item = id, "removed item from cart");

        self.recompute();

        Ok(removed)
    }

    /// Re-run the rules against the cart and refresh gift display prices.
    ///
    /// Unavailable cart items are scheduled for eviction, not removed.
    pub fn recompute(&mut self) {
        let evaluation = self.engine.evaluate(&self.catalog, &self.cart.selection());

        self.apply_gift_display(&evaluation);
        self.guard.observe(evaluation, &self.cart);
    }

    /// Apply evictions scheduled by the previous evaluation, then re-evaluate.
    ///
    /// Returns the ids of evicted items. An eviction can make further items unavailable;
    /// those are evicted on the next tick.
    pub fn tick(&mut self) -> Vec<ItemId> {
        if !self.guard.has_pending_evictions() {
            return Vec::new();
        }

        let evicted: Vec<ItemId> = self
            .guard
            .flush(&mut self.cart)
            .into_iter()
            .map(|item| item.id)
            .collect();

        self.recompute();

        evicted
    }

    /// Tick until no evictions remain, returning every evicted id.
    pub fn settle(&mut self) -> Vec<ItemId> {
        let mut evicted = Vec::new();

        // Each productive tick shrinks the cart.
        for _ in 0..=self.catalog.len() {
            let batch = self.tick();

            if batch.is_empty() {
                break;
            }

            evicted.extend(batch);
        }

        evicted
    }

    /// Price the cart at a point in time.
    ///
    /// Items still pending eviction are priced like any other line.
    ///
    /// # Errors
    ///
    /// Returns an error if a discount cannot be applied.
    pub fn pricing(
        &self,
        point_in_time: Timestamp,
    ) -> Result<PricingBreakdown<'a>, SessionError> {
        let gifts = self.guard.evaluation().gift_item_ids();

        Ok(compute_pricing(
            &self.cart,
            &self.discounts,
            &gifts,
            point_in_time,
        )?)
    }

    /// Whether a catalog item can be selected right now.
    pub fn is_item_available(&self, id: &str) -> bool {
        self.guard.is_item_available(id)
    }

    /// Whether a cart item is currently a gift.
    pub fn is_item_gift(&self, id: &str) -> bool {
        self.guard.is_item_gift(id)
    }

    /// Why an item is unavailable, or `None` when it can be selected.
    pub fn unavailable_reason(&self, id: &str) -> Option<String> {
        self.guard.unavailable_reason(id, &self.engine, &self.catalog)
    }

    /// Gift presentation for an item that is currently a gift.
    pub fn gift_settings(&self, id: &str) -> Option<&GiftSettings> {
        self.guard.gift_settings(id)
    }

    /// Items waiting to be evicted on the next tick.
    pub fn pending_evictions(&self) -> &[ItemId] {
        self.guard.pending_evictions()
    }

    /// Latest rules evaluation.
    pub fn evaluation(&self) -> &RulesEvaluation {
        self.guard.evaluation()
    }

    /// The cart.
    pub fn cart(&self) -> &Cart<'a> {
        &self.cart
    }

    /// The catalog.
    pub fn catalog(&self) -> &Catalog<'a> {
        &self.catalog
    }

    /// The rules engine.
    pub fn engine(&self) -> &RulesEngine {
        &self.engine
    }

    /// Active discounts.
    pub fn discounts(&self) -> &DiscountConfig<'a> {
        &self.discounts
    }

    /// Gifts show a zero price with their catalog price kept aside; everything else shows
    /// its catalog price.
    fn apply_gift_display(&mut self, evaluation: &RulesEvaluation) {
        let ids: Vec<ItemId> = self.cart.iter().map(|line| line.id.clone()).collect();

        for id in ids {
            let Some(item) = self.catalog.get(id.as_str()) else {
                continue;
            };

            let catalog_price = item.price;

            let Some(line) = self.cart.get_mut(id.as_str()) else {
                continue;
            };

            if evaluation.is_gift(id.as_str()) {
                line.original_price = Some(catalog_price);
                line.price = Money::from_minor(0, catalog_price.currency());
            } else {
                line.original_price = None;
                line.price = catalog_price;
            }
        }
    }
}

fn load_rules_or_empty<'a>(source: &impl CatalogSource<'a>) -> Vec<SelectionRule> {
    source.load_rules().unwrap_or_else(|error| {
        warn!(%error, "failed to load selection rules; continuing without rules");
        Vec::new()
    })
}

fn load_discounts_or_none<'a>(source: &impl CatalogSource<'a>) -> DiscountConfig<'a> {
    source.load_discounts().unwrap_or_else(|error| {
        warn!(%error, "failed to load discounts; continuing without discounts");
        DiscountConfig::none()
    })
}

#[cfg(test)]
mod tests {
    use std::io;

    use decimal_percentage::Percentage;
    use rusty_money::iso::{BRL, USD};
    use testresult::TestResult;

    use super::*;
    use crate::{
        discounts::Discount,
        items::{Item, ItemCategory},
        rules::{Condition, RuleAction},
    };

    struct StaticSource {
        items: Vec<Item<'static>>,
        rules: Option<Vec<SelectionRule>>,
        discounts: Option<DiscountConfig<'static>>,
    }

    fn broken() -> SourceError {
        SourceError::Fixture(FixtureError::Io(io::Error::other("offline")))
    }

    impl CatalogSource<'static> for StaticSource {
        fn load_items(&self) -> Result<Catalog<'static>, SourceError> {
            Ok(Catalog::new(self.items.clone(), BRL)?)
        }

        fn load_rules(&self) -> Result<Vec<SelectionRule>, SourceError> {
            self.rules.clone().ok_or_else(broken)
        }

        fn load_discounts(&self) -> Result<DiscountConfig<'static>, SourceError> {
            self.discounts.clone().ok_or_else(broken)
        }
    }

    fn items() -> Vec<Item<'static>> {
        vec![
            Item::new("x", "Newborn session", ItemCategory::Service, Money::from_minor(60_000, BRL)),
            Item::new("y", "Studio upgrade", ItemCategory::Service, Money::from_minor(85_000, BRL)),
            Item::new("z", "Canvas print", ItemCategory::Product, Money::from_minor(45_000, BRL)),
        ]
    }

    fn exclusive_rules() -> Vec<SelectionRule> {
        vec![SelectionRule::availability(
            "no-y-with-x",
            1,
            Condition::MutuallyExclusive {
                mutually_exclusive_with: vec![ItemId::from("x")],
            },
            RuleAction::Disable,
            ["y"],
        )]
    }

    fn session(rules: Vec<SelectionRule>) -> TestResult<SelectionSession<'static>> {
        Ok(SelectionSession::new(
            Catalog::new(items(), BRL)?,
            rules,
            DiscountConfig::none(),
            EngineSettings::default(),
        ))
    }

    #[test]
    fn add_item_rejects_unknown_unavailable_and_duplicate() -> TestResult {
        let mut session = session(exclusive_rules())?;

        session.add_item("x")?;

        assert!(matches!(
            session.add_item("nope"),
            Err(SessionError::UnknownItem(id)) if id == "nope"
        ));
        assert!(matches!(
            session.add_item("y"),
            Err(SessionError::ItemUnavailable { item, .. }) if item == "y"
        ));
        assert!(matches!(
            session.add_item("x"),
            Err(SessionError::Cart(CartError::DuplicateItem(_)))
        ));
        assert_eq!(session.cart().len(), 1);

        Ok(())
    }

    #[test]
    fn evictions_wait_for_the_next_tick() -> TestResult {
        // y is enabled only while z is selected.
        let rules = vec![
            SelectionRule::availability(
                "y-off",
                1,
                Condition::MinSelectionCount {
                    value: 0,
                    categories: Vec::new(),
                },
                RuleAction::Disable,
                ["y"],
            ),
            SelectionRule::availability(
                "y-with-z",
                2,
                Condition::SpecificItems {
                    specific_items: vec![ItemId::from("z")],
                },
                RuleAction::Enable,
                ["y"],
            ),
        ];
        let mut session = session(rules)?;

        session.add_item("z")?;
        session.add_item("y")?;
        session.remove_item("z")?;

        assert!(session.cart().contains("y"));
        assert_eq!(session.pending_evictions(), [ItemId::from("y")]);
        assert!(matches!(
            session.remove_item("z"),
            Err(SessionError::NotInCart(id)) if id == "z"
        ));

        assert_eq!(session.tick(), vec![ItemId::from("y")]);
        assert!(!session.cart().contains("y"));
        assert!(session.tick().is_empty());

        Ok(())
    }

    #[test]
    fn gifts_display_zero_with_original_price() -> TestResult {
        let rules = vec![SelectionRule::gift(
            "free-print",
            1,
            Condition::SpecificItems {
                specific_items: vec![ItemId::from("x")],
            },
            ["z"],
        )];
        let mut session = session(rules)?;

        session.add_item("z")?;
        session.add_item("x")?;

        let line = session.cart().get("z").ok_or("missing z")?;

        assert_eq!(line.price, Money::from_minor(0, BRL));
        assert_eq!(line.original_price, Some(Money::from_minor(45_000, BRL)));

        let pricing = session.pricing(Timestamp::UNIX_EPOCH)?;

        assert_eq!(pricing.gift_savings(), Money::from_minor(45_000, BRL));
        assert_eq!(pricing.final_total(), Money::from_minor(60_000, BRL));

        session.remove_item("x")?;

        let line = session.cart().get("z").ok_or("missing z")?;

        assert_eq!(line.price, Money::from_minor(45_000, BRL));
        assert_eq!(line.original_price, None);

        Ok(())
    }

    #[test]
    fn load_fails_open_for_rules_and_discounts() -> TestResult {
        let source = StaticSource {
            items: items(),
            rules: None,
            discounts: None,
        };

        let session = SelectionSession::load(&source, EngineSettings::default())?;

        assert_eq!(session.catalog().len(), 3);
        assert!(session.engine().rules().is_empty());
        assert!(session.discounts().global.is_none());

        Ok(())
    }

    #[test]
    fn foreign_fixed_discounts_do_not_block_pricing() -> TestResult {
        let mut source = StaticSource {
            items: items(),
            rules: Some(Vec::new()),
            discounts: Some(
                DiscountConfig::none()
                    .with_global(Discount::amount_off(Money::from_minor(5_000, USD)))
                    .with_item("z", Discount::percentage_off(Percentage::from(0.1))),
            ),
        };

        let mut session = SelectionSession::load(&source, EngineSettings::default())?;

        session.add_item("x")?;
        session.add_item("z")?;

        assert!(session.discounts().global.is_none());
        assert_eq!(
            session.pricing(Timestamp::UNIX_EPOCH)?.final_total(),
            Money::from_minor(100_500, BRL)
        );

        source.discounts = Some(
            DiscountConfig::none().with_item("x", Discount::amount_off(Money::from_minor(100, USD))),
        );

        session.reload(&source)?;

        assert!(session.discounts().per_item.is_empty());
        assert_eq!(
            session.pricing(Timestamp::UNIX_EPOCH)?.final_total(),
            Money::from_minor(105_000, BRL)
        );

        Ok(())
    }

    #[test]
    fn reload_drops_lines_that_left_the_catalog() -> TestResult {
        let mut source = StaticSource {
            items: items(),
            rules: Some(Vec::new()),
            discounts: Some(DiscountConfig::none()),
        };

        let mut session = SelectionSession::load(&source, EngineSettings::default())?;

        session.add_item("x")?;
        session.add_item("z")?;

        source.items.retain(|item| item.id != "z");
        source.discounts = Some(
            DiscountConfig::none().with_global(Discount::percentage_off(Percentage::from(0.1))),
        );

        session.reload(&source)?;

        assert!(session.cart().contains("x"));
        assert!(!session.cart().contains("z"));
        assert_eq!(
            session.pricing(Timestamp::UNIX_EPOCH)?.final_total(),
            Money::from_minor(54_000, BRL)
        );

        Ok(())
    }

    #[test]
    fn settle_follows_eviction_chains() -> TestResult {
        // z needs y, y needs x.
        let rules = vec![
            SelectionRule::availability(
                "z-off",
                1,
                Condition::MinSelectionCount {
                    value: 0,
                    categories: Vec::new(),
                },
                RuleAction::Disable,
                ["z", "y"],
            ),
            SelectionRule::availability(
                "z-with-y",
                2,
                Condition::SpecificItems {
                    specific_items: vec![ItemId::from("y")],
                },
                RuleAction::Enable,
                ["z"],
            ),
            SelectionRule::availability(
                "y-with-x",
                2,
                Condition::SpecificItems {
                    specific_items: vec![ItemId::from("x")],
                },
                RuleAction::Enable,
                ["y"],
            ),
        ];
        let mut session = session(rules)?;

        session.add_item("x")?;
        session.add_item("y")?;
        session.add_item("z")?;
        session.remove_item("x")?;

        let evicted = session.settle();

        assert_eq!(evicted, vec![ItemId::from("y"), ItemId::from("z")]);
        assert!(session.cart().is_empty());

        Ok(())
    }
}
