//! Item Fixtures

use rusty_money::Money;
use serde::Deserialize;

use crate::{
    fixtures::{FixtureError, parse_price},
    items::{Item, ItemCategory, ItemId},
};

/// Wrapper for items in YAML
#[derive(Debug, Deserialize)]
pub struct ItemsFixture {
    /// Catalog currency code (e.g., "BRL")
    pub currency: String,

    /// Catalog items in declaration order
    #[serde(default)]
    pub items: Vec<ItemFixture>,
}

/// Item Fixture
#[derive(Debug, Deserialize)]
pub struct ItemFixture {
    /// Item id
    pub id: ItemId,

    /// Display title
    pub title: String,

    /// Item category
    pub category: ItemCategory,

    /// Selling price (e.g., "600.00 BRL")
    pub price: String,

    /// Struck-through list price
    #[serde(default)]
    pub original_price: Option<String>,

    /// Whether the item is offered
    #[serde(default = "default_active")]
    pub active: bool,

    /// Position in listings
    #[serde(default)]
    pub sort_order: i32,
}

fn default_active() -> bool {
    true
}

impl TryFrom<ItemFixture> for Item<'_> {
    type Error = FixtureError;

    fn try_from(fixture: ItemFixture) -> Result<Self, Self::Error> {
        let (minor_units, currency) = parse_price(&fixture.price)?;

        let mut item = Item::new(
            fixture.id,
            fixture.title,
            fixture.category,
            Money::from_minor(minor_units, currency),
        )
        .with_sort_order(fixture.sort_order);

        if let Some(original_price) = fixture.original_price {
            let (minor_units, currency) = parse_price(&original_price)?;

            item = item.with_original_price(Money::from_minor(minor_units, currency));
        }

        if !fixture.active {
            item = item.inactive();
        }

        Ok(item)
    }
}
