//! Fixtures
//!
//! YAML catalog data laid out as `<base>/<kind>/<set>.yml`, where kind is one of `items`,
//! `rules`, `discounts` or `carts`.

use std::{
    fs,
    path::{Path, PathBuf},
};

use decimal_percentage::Percentage;
use rust_decimal::{Decimal, prelude::ToPrimitive};
use rusty_money::iso::{BRL, Currency, EUR, GBP, USD};
use thiserror::Error;
use tracing::debug;

use crate::{
    discounts::DiscountConfig,
    fixtures::{
        carts::CartFixture, discounts::DiscountsFixture, items::ItemsFixture, rules::parse_rules,
    },
    items::{Catalog, Item, ItemId},
    rules::SelectionRule,
    session::{CatalogSource, SourceError},
};

pub mod carts;
pub mod discounts;
pub mod items;
pub mod rules;

/// Default directory fixture sets are read from.
pub const DEFAULT_FIXTURES_PATH: &str = "./fixtures";

/// Fixture Parsing Errors
#[derive(Debug, Error)]
pub enum FixtureError {
    /// IO error reading fixture files
    #[error("Failed to read fixture file: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_norway::Error),

    /// Invalid price format
    #[error("Invalid price format: {0}")]
    InvalidPrice(String),

    /// Invalid percentage format
    #[error("Invalid percentage format: {0}")]
    InvalidPercentage(String),

    /// Unknown currency code
    #[error("Unknown currency code: {0}")]
    UnknownCurrency(String),

    /// Discount window ends before it starts
    #[error("Discount window for {0} ends before it starts")]
    InvalidWindow(String),
}

/// A named fixture set on disk.
#[derive(Debug, Clone)]
pub struct Fixture {
    base_path: PathBuf,
    set: String,
}

impl Fixture {
    /// Fixture set `name` under [`DEFAULT_FIXTURES_PATH`].
    pub fn from_set(name: impl Into<String>) -> Self {
        Self::with_base_path(DEFAULT_FIXTURES_PATH, name)
    }

    /// Fixture set `name` under a custom base path.
    pub fn with_base_path(base_path: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            base_path: base_path.into(),
            set: name.into(),
        }
    }

    /// Name of the fixture set.
    pub fn set(&self) -> &str {
        &self.set
    }

    /// Base directory of the fixture set.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Path of one kind of file in this set.
    pub fn path(&self, kind: &str) -> PathBuf {
        self.base_path.join(kind).join(format!("{}.yml", self.set))
    }

    /// Load the item ids of the set's sample cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_cart(&self) -> Result<Vec<ItemId>, FixtureError> {
        let fixture: CartFixture = serde_norway::from_str(&self.read("carts")?)?;

        Ok(fixture.items)
    }

    fn read(&self, kind: &str) -> Result<String, FixtureError> {
        let file_path = self.path(kind);

        debug!(path = %file_path.display(), "reading fixture file");

        Ok(fs::read_to_string(file_path)?)
    }
}

impl<'a> CatalogSource<'a> for Fixture {
    fn load_items(&self) -> Result<Catalog<'a>, SourceError> {
        let fixture: ItemsFixture = serde_norway::from_str(&self.read("items")?)
            .map_err(FixtureError::from)?;

        let currency = parse_currency(&fixture.currency)?;
        let items = fixture
            .items
            .into_iter()
            .map(Item::try_from)
            .collect::<Result<Vec<_>, FixtureError>>()?;

        Ok(Catalog::new(items, currency)?)
    }

    fn load_rules(&self) -> Result<Vec<SelectionRule>, SourceError> {
        Ok(parse_rules(&self.read("rules")?)?)
    }

    fn load_discounts(&self) -> Result<DiscountConfig<'a>, SourceError> {
        let fixture: DiscountsFixture = serde_norway::from_str(&self.read("discounts")?)
            .map_err(FixtureError::from)?;

        Ok(DiscountConfig::from(fixture))
    }
}

/// Parse an ISO currency code.
///
/// # Errors
///
/// Returns an error if the code is not one of the supported currencies.
pub fn parse_currency(code: &str) -> Result<&'static Currency, FixtureError> {
    match code.trim() {
        "BRL" => Ok(BRL),
        "GBP" => Ok(GBP),
        "USD" => Ok(USD),
        "EUR" => Ok(EUR),
        other => Err(FixtureError::UnknownCurrency(other.to_string())),
    }
}

/// Parse price string (e.g., "600.00 BRL") into minor units and currency
///
/// # Errors
///
/// Returns an error if the string is not in the format "AMOUNT CURRENCY", if the amount is
/// not a decimal number, or if the currency code is not recognized.
pub fn parse_price(s: &str) -> Result<(i64, &'static Currency), FixtureError> {
    let parts: Vec<&str> = s.split_whitespace().collect();

    let [amount, currency_code] = parts.as_slice() else {
        return Err(FixtureError::InvalidPrice(format!(
            "Expected format 'AMOUNT CURRENCY', got: {s}"
        )));
    };

    let amount = amount
        .parse::<Decimal>()
        .map_err(|_err| FixtureError::InvalidPrice(s.to_string()))?;

    let minor_units = amount
        .checked_mul(Decimal::new(100, 0))
        .and_then(|value| value.round_dp(0).to_i64())
        .ok_or_else(|| FixtureError::InvalidPrice(s.to_string()))?;

    Ok((minor_units, parse_currency(currency_code)?))
}

/// Parse percentage string (e.g., "15%" or "0.15") into a `Percentage`
///
/// # Errors
///
/// Returns an error if the string cannot be parsed as a number.
pub fn parse_percentage(s: &str) -> Result<Percentage, FixtureError> {
    let trimmed = s.trim();

    if let Some(percent_str) = trimmed.strip_suffix('%') {
        let value = percent_str
            .trim()
            .parse::<f64>()
            .map_err(|_err| FixtureError::InvalidPercentage(s.to_string()))?;

        Ok(Percentage::from(value / 100.0))
    } else {
        let value = trimmed
            .parse::<f64>()
            .map_err(|_err| FixtureError::InvalidPercentage(s.to_string()))?;

        Ok(Percentage::from(value))
    }
}
