//! Discount Fixtures

use jiff::Timestamp;
use rustc_hash::FxHashMap;
use rusty_money::Money;
use serde::Deserialize;
use tracing::warn;

use crate::{
    discounts::{Discount, DiscountConfig, DiscountWindow},
    fixtures::{FixtureError, parse_percentage, parse_price},
    items::ItemId,
};

/// Wrapper for discounts in YAML
///
/// Entries are kept as raw values so one malformed discount does not sink the rest.
#[derive(Debug, Default, Deserialize)]
pub struct DiscountsFixture {
    /// Discount applied to every non-gift item
    #[serde(default)]
    pub global: Option<serde_norway::Value>,

    /// Item id -> item-specific discount
    #[serde(default)]
    pub items: FxHashMap<ItemId, serde_norway::Value>,
}

/// How a discount value is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountFixtureKind {
    /// `value` is a percentage ("10%" or "0.1")
    #[serde(alias = "percent")]
    Percentage,

    /// `value` is an amount ("50.00 BRL")
    #[serde(alias = "amount")]
    Fixed,
}

/// Discount Fixture
#[derive(Debug, Deserialize)]
pub struct DiscountFixture {
    /// Discount kind
    #[serde(rename = "type")]
    pub kind: DiscountFixtureKind,

    /// Discount value, read according to `kind`
    pub value: String,

    /// First instant the discount applies
    #[serde(default)]
    pub starts_at: Option<Timestamp>,

    /// First instant the discount no longer applies
    #[serde(default)]
    pub ends_at: Option<Timestamp>,

    /// Whether the discount is switched on
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl DiscountFixture {
    /// Convert into a [`Discount`]; `label` names the discount in errors.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be parsed or the window is inverted.
    pub fn into_discount<'a>(self, label: &str) -> Result<Discount<'a>, FixtureError> {
        let discount = match self.kind {
            DiscountFixtureKind::Percentage => {
                Discount::percentage_off(parse_percentage(&self.value)?)
            }
            DiscountFixtureKind::Fixed => {
                let (minor_units, currency) = parse_price(&self.value)?;

                Discount::amount_off(Money::from_minor(minor_units, currency))
            }
        };

        if let (Some(starts_at), Some(ends_at)) = (self.starts_at, self.ends_at)
            && ends_at < starts_at
        {
            return Err(FixtureError::InvalidWindow(label.to_string()));
        }

        let discount = discount.with_window(DiscountWindow {
            starts_at: self.starts_at,
            ends_at: self.ends_at,
        });

        Ok(if self.active {
            discount
        } else {
            discount.inactive()
        })
    }
}

/// Parse one raw discount entry, warning and returning `None` if it is malformed.
fn parse_entry<'a>(label: &str, value: serde_norway::Value) -> Option<Discount<'a>> {
    let parsed = serde_norway::from_value::<DiscountFixture>(value)
        .map_err(FixtureError::from)
        .and_then(|fixture| fixture.into_discount(label));

    match parsed {
        Ok(discount) => Some(discount),
        Err(error) => {
            warn!(discount = label, %error, "skipping malformed discount");
            None
        }
    }
}

impl<'a> From<DiscountsFixture> for DiscountConfig<'a> {
    fn from(fixture: DiscountsFixture) -> Self {
        let mut config = DiscountConfig::none();

        if let Some(global) = fixture.global.and_then(|value| parse_entry("global", value)) {
            config = config.with_global(global);
        }

        for (item_id, value) in fixture.items {
            if let Some(discount) = parse_entry(item_id.as_str(), value) {
                config = config.with_item(item_id, discount);
            }
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use decimal_percentage::Percentage;
    use rusty_money::iso::BRL;
    use testresult::TestResult;

    use super::*;
    use crate::discounts::DiscountKind;

    #[test]
    fn converts_global_and_item_discounts() -> TestResult {
        let fixture: DiscountsFixture = serde_norway::from_str(
            r"
global:
  type: percentage
  value: 10%
items:
  canvas-print:
    type: fixed
    value: 50.00 BRL
    starts_at: 2026-03-01T00:00:00Z
    ends_at: 2026-04-01T00:00:00Z
  retouch:
    type: percentage
    value: '0.5'
    active: false
",
        )?;

        let config = DiscountConfig::from(fixture);

        assert_eq!(
            config.global.map(|discount| discount.kind),
            Some(DiscountKind::PercentageOff(Percentage::from(0.1)))
        );

        let print = config.per_item.get("canvas-print").ok_or("missing print")?;

        assert_eq!(
            print.kind,
            DiscountKind::AmountOff(Money::from_minor(5_000, BRL))
        );
        assert!(print.is_live("2026-03-15T12:00:00Z".parse()?));
        assert!(!print.is_live("2026-04-01T00:00:00Z".parse()?));

        let retouch = config.per_item.get("retouch").ok_or("missing retouch")?;

        assert!(!retouch.is_active);

        Ok(())
    }

    #[test]
    fn inverted_window_is_rejected() -> TestResult {
        let fixture: DiscountFixture = serde_norway::from_str(
            r"
type: percentage
value: 10%
starts_at: 2026-04-01T00:00:00Z
ends_at: 2026-03-01T00:00:00Z
",
        )?;

        assert!(matches!(
            fixture.into_discount("global"),
            Err(FixtureError::InvalidWindow(label)) if label == "global"
        ));

        Ok(())
    }

    #[test]
    fn percent_is_accepted_as_a_kind() -> TestResult {
        let fixture: DiscountsFixture = serde_norway::from_str(
            r"
global:
  type: percent
  value: 10%
",
        )?;

        let config = DiscountConfig::from(fixture);

        assert_eq!(
            config.global.map(|discount| discount.kind),
            Some(DiscountKind::PercentageOff(Percentage::from(0.1)))
        );

        Ok(())
    }

    #[test]
    fn malformed_entries_are_skipped_individually() -> TestResult {
        let fixture: DiscountsFixture = serde_norway::from_str(
            r"
global:
  type: percentage
  value: 10%
items:
  canvas-print:
    type: fixed
    value: 50.00 BRL
  retouch:
    type: bogus
    value: 5%
  album:
    type: percentage
    value: lots
  frame:
    type: fixed
    value: 20.00 BRL
    starts_at: 2026-04-01T00:00:00Z
    ends_at: 2026-03-01T00:00:00Z
",
        )?;

        let config = DiscountConfig::from(fixture);

        assert!(config.global.is_some());
        assert_eq!(config.per_item.len(), 1);
        assert!(config.per_item.contains_key("canvas-print"));

        let broken_global: DiscountsFixture = serde_norway::from_str(
            r"
global:
  type: fixed
  value: fifty
items:
  album:
    type: percentage
    value: 20%
",
        )?;

        let config = DiscountConfig::from(broken_global);

        assert!(config.global.is_none());
        assert!(config.per_item.contains_key("album"));

        Ok(())
    }

    #[test]
    fn missing_file_sections_mean_no_discounts() -> TestResult {
        let config = DiscountConfig::from(serde_norway::from_str::<DiscountsFixture>("{}\n")?);

        assert!(config.global.is_none());
        assert!(config.per_item.is_empty());

        Ok(())
    }
}
