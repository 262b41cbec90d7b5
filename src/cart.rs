//! Cart
//!
//! The buyer's current selection. The cart is owned by whichever surface renders it; this
//! crate reads it and asks for removals.

use rustc_hash::FxHashMap;
use rusty_money::{Money, iso::Currency};
use thiserror::Error;

use crate::items::{Item, ItemCategory, ItemId};

/// Errors related to cart construction or mutation.
#[derive(Debug, Error, PartialEq)]
pub enum CartError {
    /// An item's currency differs from the cart currency (item, item currency, cart currency).
    #[error("Item {0} has currency {1}, but cart has currency {2}")]
    CurrencyMismatch(ItemId, &'static str, &'static str),

    /// The item is already in the cart.
    #[error("Item {0} is already in the cart")]
    DuplicateItem(ItemId),
}

/// A selected item
#[derive(Debug, Clone, PartialEq)]
pub struct CartItem<'a> {
    /// Catalog item id
    pub id: ItemId,

    /// Display title
    pub title: String,

    /// Price the surface displays for this line (zero while the item is a gift)
    pub price: Money<'a, Currency>,

    /// Catalog price before gifts and discounts, when it differs from `price`
    pub original_price: Option<Money<'a, Currency>>,

    /// Item category
    pub category: ItemCategory,
}

impl<'a> CartItem<'a> {
    /// Create a cart line for a catalog item at its catalog price.
    pub fn from_item(item: &Item<'a>) -> Self {
        Self {
            id: item.id.clone(),
            title: item.title.clone(),
            price: item.price,
            original_price: None,
            category: item.category,
        }
    }

    /// Price the line is charged from, before any discount or gift.
    pub fn base_price(&self) -> Money<'a, Currency> {
        self.original_price.unwrap_or(self.price)
    }
}

impl<'a> From<&Item<'a>> for CartItem<'a> {
    fn from(item: &Item<'a>) -> Self {
        Self::from_item(item)
    }
}

/// Cart
#[derive(Debug, Clone)]
pub struct Cart<'a> {
    items: Vec<CartItem<'a>>,
    currency: &'static Currency,
}

impl<'a> Cart<'a> {
    /// Create a new empty cart.
    pub fn new(currency: &'static Currency) -> Self {
        Cart {
            items: Vec::new(),
            currency,
        }
    }

    /// Create a new cart with the given items.
    ///
    /// # Errors
    ///
    /// Returns a `CartError` on a currency mismatch or a repeated item.
    pub fn with_items(
        items: impl IntoIterator<Item = CartItem<'a>>,
        currency: &'static Currency,
    ) -> Result<Self, CartError> {
        let mut cart = Cart::new(currency);

        items.into_iter().try_for_each(|item| cart.add(item))?;

        Ok(cart)
    }

    /// Append an item to the cart.
    ///
    /// # Errors
    ///
    /// Returns a `CartError` on a currency mismatch or if the item is already present.
    pub fn add(&mut self, item: CartItem<'a>) -> Result<(), CartError> {
        let item_currency = item.base_price().currency().iso_alpha_code;

        if item_currency != self.currency.iso_alpha_code {
            return Err(CartError::CurrencyMismatch(
                item.id,
                item_currency,
                self.currency.iso_alpha_code,
            ));
        }

        if self.contains(item.id.as_str()) {
            return Err(CartError::DuplicateItem(item.id));
        }

        self.items.push(item);

        Ok(())
    }

    /// Remove an item, returning it if it was present.
    pub fn remove(&mut self, id: &str) -> Option<CartItem<'a>> {
        let idx = self.items.iter().position(|item| item.id.as_str() == id)?;

        Some(self.items.remove(idx))
    }

    /// Check if an item is in the cart.
    pub fn contains(&self, id: &str) -> bool {
        self.items.iter().any(|item| item.id.as_str() == id)
    }

    /// Look up a cart line.
    pub fn get(&self, id: &str) -> Option<&CartItem<'a>> {
        self.items.iter().find(|item| item.id.as_str() == id)
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut CartItem<'a>> {
        self.items.iter_mut().find(|item| item.id.as_str() == id)
    }

    /// Iterate cart lines in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &CartItem<'a>> {
        self.items.iter()
    }

    /// Cart lines in insertion order.
    pub fn items(&self) -> &[CartItem<'a>] {
        &self.items
    }

    /// Get the number of items in the cart.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if the cart is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Get the currency of the cart.
    pub fn currency(&self) -> &'static Currency {
        self.currency
    }

    /// Snapshot the selection for rule evaluation.
    pub fn selection(&self) -> Selection {
        Selection::from_pairs(self.items.iter().map(|item| (item.id.clone(), item.category)))
    }
}

/// Read-only view of what is selected, as seen by rule conditions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    items: FxHashMap<ItemId, ItemCategory>,
}

impl Selection {
    /// Build a selection from `(id, category)` pairs.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (ItemId, ItemCategory)>) -> Self {
        Self {
            items: pairs.into_iter().collect(),
        }
    }

    /// Check whether an item is selected.
    pub fn contains(&self, id: &str) -> bool {
        self.items.contains_key(id)
    }

    /// Number of selected items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if nothing is selected.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of selected items whose category is one of `categories`.
    pub fn count_in(&self, categories: &[ItemCategory]) -> usize {
        self.items
            .values()
            .filter(|category| categories.contains(category))
            .count()
    }

    /// Iterate selected ids (unordered).
    pub fn ids(&self) -> impl Iterator<Item = &ItemId> {
        self.items.keys()
    }

    /// A copy of this selection keeping only items matching `keep`.
    #[must_use]
    pub fn retain(&self, mut keep: impl FnMut(&ItemId) -> bool) -> Self {
        Self {
            items: self
                .items
                .iter()
                .filter(|(id, _)| keep(id))
                .map(|(id, category)| (id.clone(), *category))
                .collect(),
        }
    }
}
