//! Items
//!
//! Catalog reference data. Items are created and edited by an external catalog manager and
//! are read-only here.

use std::fmt;

use rustc_hash::FxHashMap;
use rusty_money::{Money, iso::Currency};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::keys::string_key;

string_key! {
    /// Catalog item identifier
    pub struct ItemId;
}

/// Item category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemCategory {
    /// A bookable service (e.g. a photo session)
    Service,

    /// A physical or digital product
    Product,
}

impl fmt::Display for ItemCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemCategory::Service => f.write_str("service"),
            ItemCategory::Product => f.write_str("product"),
        }
    }
}

/// Catalog item
#[derive(Debug, Clone, PartialEq)]
pub struct Item<'a> {
    /// Item identifier
    pub id: ItemId,

    /// Display title
    pub title: String,

    /// Item category
    pub category: ItemCategory,

    /// Selling price
    pub price: Money<'a, Currency>,

    /// List price shown struck-through next to `price`. Display only, never priced.
    pub original_price: Option<Money<'a, Currency>>,

    /// Whether the item is offered at all
    pub active: bool,

    /// Position in catalog listings
    pub sort_order: i32,
}

impl<'a> Item<'a> {
    /// Creates a new active item with the given price
    pub fn new(
        id: impl Into<ItemId>,
        title: impl Into<String>,
        category: ItemCategory,
        price: Money<'a, Currency>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            category,
            price,
            original_price: None,
            active: true,
            sort_order: 0,
        }
    }

    /// Set the struck-through list price.
    #[must_use]
    pub fn with_original_price(mut self, original_price: Money<'a, Currency>) -> Self {
        self.original_price = Some(original_price);
        self
    }

    /// Set the listing position.
    #[must_use]
    pub fn with_sort_order(mut self, sort_order: i32) -> Self {
        self.sort_order = sort_order;
        self
    }

    /// Mark the item as withdrawn from the catalog.
    #[must_use]
    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }
}

/// Errors related to catalog construction.
#[derive(Debug, Error, PartialEq)]
pub enum CatalogError {
    /// An item's currency differs from the catalog currency (item, item currency, catalog currency).
    #[error("Item {0} has currency {1}, but catalog has currency {2}")]
    CurrencyMismatch(ItemId, &'static str, &'static str),

    /// The same item id appears twice.
    #[error("Item {0} is defined more than once")]
    DuplicateItem(ItemId),
}

/// Active catalog items, ordered by sort order and indexed by id.
#[derive(Debug, Clone)]
pub struct Catalog<'a> {
    items: Vec<Item<'a>>,
    index: FxHashMap<ItemId, usize>,
    currency: &'static Currency,
}

impl<'a> Catalog<'a> {
    /// Build a catalog from raw items. Inactive items are left out.
    ///
    /// # Errors
    ///
    /// - [`CatalogError::CurrencyMismatch`]: an item is priced in another currency.
    /// - [`CatalogError::DuplicateItem`]: two items share an id.
    pub fn new(
        items: impl IntoIterator<Item = Item<'a>>,
        currency: &'static Currency,
    ) -> Result<Self, CatalogError> {
        let mut active = Vec::new();

        for item in items {
            let item_currency = item.price.currency().iso_alpha_code;

            if item_currency != currency.iso_alpha_code {
                return Err(CatalogError::CurrencyMismatch(
                    item.id,
                    item_currency,
                    currency.iso_alpha_code,
                ));
            }

            if !item.active {
                debug!(item = %item.id, "skipping inactive catalog item");
                continue;
            }

            active.push(item);
        }

        active.sort_by_key(|item| item.sort_order);

        let mut index = FxHashMap::default();

        for (idx, item) in active.iter().enumerate() {
            if index.insert(item.id.clone(), idx).is_some() {
                return Err(CatalogError::DuplicateItem(item.id.clone()));
            }
        }

        Ok(Self {
            items: active,
            index,
            currency,
        })
    }

    /// Create an empty catalog.
    pub fn empty(currency: &'static Currency) -> Self {
        Self {
            items: Vec::new(),
            index: FxHashMap::default(),
            currency,
        }
    }

    /// Look up an item by id.
    pub fn get(&self, id: &str) -> Option<&Item<'a>> {
        self.index.get(id).and_then(|idx| self.items.get(*idx))
    }

    /// Check whether the catalog offers an item.
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Title of an item, if known.
    pub fn title(&self, id: &str) -> Option<&str> {
        self.get(id).map(|item| item.title.as_str())
    }

    /// Iterate items in listing order.
    pub fn iter(&self) -> impl Iterator<Item = &Item<'a>> {
        self.items.iter()
    }

    /// Number of active items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Currency all items are priced in.
    pub fn currency(&self) -> &'static Currency {
        self.currency
    }
}
