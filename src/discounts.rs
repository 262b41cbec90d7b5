//! Discounts
//!
//! Item-level overrides and one global discount, applied one after the other. Each step
//! discounts the price left by the previous step, never the original price, and no step
//! takes a price below zero.

use decimal_percentage::Percentage;
use jiff::Timestamp;
use rust_decimal::{
    Decimal, RoundingStrategy,
    prelude::{FromPrimitive, ToPrimitive},
};
use rustc_hash::FxHashMap;
use rusty_money::{Money, MoneyError, iso::Currency};
use serde::Serialize;
use smallvec::SmallVec;
use thiserror::Error;
use tracing::warn;

use crate::items::ItemId;

/// Errors specific to discount calculations.
#[derive(Debug, Error, PartialEq)]
pub enum DiscountError {
    /// Percentage calculation could not be safely converted.
    #[error("percentage conversion overflowed or was not finite")]
    PercentConversion,

    /// Wrapped money arithmetic or currency mismatch error.
    #[error(transparent)]
    Money(#[from] MoneyError),
}

/// How much a discount takes off.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum DiscountKind<'a> {
    /// Take a percentage off the current price (e.g., "10% off")
    PercentageOff(Percentage),

    /// Subtract a fixed amount from the current price (e.g., "R$50 off")
    AmountOff(Money<'a, Currency>),
}

/// Period during which a discount is live.
///
/// The start is inclusive and the end exclusive. A missing bound is open.
///
/// Bounds are instants, not calendar days. A discount meant to run through the whole of
/// March 31st needs `ends_at: 2026-04-01T00:00:00Z` (the first instant of the following day);
/// `2026-03-31T00:00:00Z` would end it at the start of the 31st.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct DiscountWindow {
    /// First instant the discount applies
    pub starts_at: Option<Timestamp>,

    /// First instant the discount no longer applies
    pub ends_at: Option<Timestamp>,
}

impl DiscountWindow {
    /// A window with no bounds.
    pub fn always() -> Self {
        Self::default()
    }

    /// Check whether `point_in_time` falls inside the window.
    pub fn contains(&self, point_in_time: Timestamp) -> bool {
        self.starts_at.is_none_or(|start| point_in_time >= start)
            && self.ends_at.is_none_or(|end| point_in_time < end)
    }
}

/// Discount definition
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Discount<'a> {
    /// Discount amount
    pub kind: DiscountKind<'a>,

    /// Activity window
    pub window: DiscountWindow,

    /// Switched off discounts never apply, regardless of the window
    pub is_active: bool,
}

impl<'a> Discount<'a> {
    /// An active, unbounded percentage discount.
    pub fn percentage_off(percent: Percentage) -> Self {
        Self {
            kind: DiscountKind::PercentageOff(percent),
            window: DiscountWindow::always(),
            is_active: true,
        }
    }

    /// An active, unbounded fixed-amount discount.
    pub fn amount_off(amount: Money<'a, Currency>) -> Self {
        Self {
            kind: DiscountKind::AmountOff(amount),
            window: DiscountWindow::always(),
            is_active: true,
        }
    }

    /// Restrict the discount to a window.
    #[must_use]
    pub fn with_window(mut self, window: DiscountWindow) -> Self {
        self.window = window;
        self
    }

    /// Switch the discount off.
    #[must_use]
    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    /// Whether the discount applies at `point_in_time`.
    ///
    /// A discount applies when it is switched on, has a positive value, and the instant is
    /// inside its window.
    pub fn is_live(&self, point_in_time: Timestamp) -> bool {
        let has_value = match self.kind {
            DiscountKind::PercentageOff(percent) => (percent * Decimal::ONE) > Decimal::ZERO,
            DiscountKind::AmountOff(amount) => amount.to_minor_units() > 0,
        };

        self.is_active && has_value && self.window.contains(point_in_time)
    }

    /// Percentages fit any currency; fixed amounts only their own.
    pub fn matches_currency(&self, currency: &Currency) -> bool {
        match self.kind {
            DiscountKind::PercentageOff(_) => true,
            DiscountKind::AmountOff(amount) => {
                amount.currency().iso_alpha_code == currency.iso_alpha_code
            }
        }
    }

    /// Amount this discount takes off `price`, capped so the price never goes negative.
    ///
    /// # Errors
    ///
    /// - [`DiscountError::PercentConversion`]: the percentage could not be represented.
    /// - [`DiscountError::Money`]: the discount amount is in another currency.
    pub fn savings_on(
        &self,
        price: Money<'a, Currency>,
    ) -> Result<Money<'a, Currency>, DiscountError> {
        let price_minor = price.to_minor_units().max(0);

        let off_minor = match self.kind {
            DiscountKind::PercentageOff(percent) => percent_of_minor(&percent, price_minor)?,
            DiscountKind::AmountOff(amount) => {
                let expected = price.currency().iso_alpha_code;
                let actual = amount.currency().iso_alpha_code;

                if expected != actual {
                    return Err(MoneyError::CurrencyMismatch { expected, actual }.into());
                }

                amount.to_minor_units()
            }
        };

        Ok(Money::from_minor(
            off_minor.clamp(0, price_minor),
            price.currency(),
        ))
    }
}

/// Which configuration slot a discount came from.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountScope {
    /// Per-item override
    Individual,

    /// Global discount
    Global,
}

/// One discount step applied to an item.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct AppliedDiscount<'a> {
    /// Where the discount was configured
    pub scope: DiscountScope,

    /// The discount's amount definition
    pub kind: DiscountKind<'a>,

    /// Amount taken off by this step
    pub savings: Money<'a, Currency>,
}

/// Discount configuration: an optional global discount plus per-item overrides.
#[derive(Debug, Clone, Default)]
pub struct DiscountConfig<'a> {
    /// Applied to every non-gift item, after its own override
    pub global: Option<Discount<'a>>,

    /// Item-specific discounts keyed by item id
    pub per_item: FxHashMap<ItemId, Discount<'a>>,
}

impl<'a> DiscountConfig<'a> {
    /// No discounts at all.
    pub fn none() -> Self {
        Self::default()
    }

    /// Set the global discount.
    #[must_use]
    pub fn with_global(mut self, discount: Discount<'a>) -> Self {
        self.global = Some(discount);
        self
    }

    /// Set an item-specific override.
    #[must_use]
    pub fn with_item(mut self, id: impl Into<ItemId>, discount: Discount<'a>) -> Self {
        self.per_item.insert(id.into(), discount);
        self
    }

    /// Drop fixed-amount discounts that are not in `currency`, warning about each.
    ///
    /// Returns how many discounts were dropped.
    pub fn retain_currency(&mut self, currency: &Currency) -> usize {
        let mut dropped = 0;

        if self
            .global
            .as_ref()
            .is_some_and(|discount| !discount.matches_currency(currency))
        {
            warn!(
                scope = "global",
                expected = currency.iso_alpha_code,
                "dropping fixed discount in another currency"
            );
            self.global = None;
            dropped += 1;
        }

        self.per_item.retain(|id, discount| {
            let keep = discount.matches_currency(currency);

            if !keep {
                warn!(
                    item = %id,
                    expected = currency.iso_alpha_code,
                    "dropping fixed discount in another currency"
                );
                dropped += 1;
            }

            keep
        });

        dropped
    }
}

/// Price of one item after its discounts.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscountedPrice<'a> {
    /// Price after every applied step
    pub final_price: Money<'a, Currency>,

    /// Steps that took something off, in application order
    pub components: SmallVec<[AppliedDiscount<'a>; 2]>,
}

impl<'a> DiscountedPrice<'a> {
    /// Total taken off by steps from `scope`.
    pub fn savings_for(&self, scope: DiscountScope) -> i64 {
        self.components
            .iter()
            .filter(|component| component.scope == scope)
            .map(|component| component.savings.to_minor_units())
            .sum()
    }
}

/// Apply the item's override, then the global discount, to `original_price`.
///
/// # Errors
///
/// - [`DiscountError::PercentConversion`]: a percentage could not be represented.
/// - [`DiscountError::Money`]: a fixed discount is in another currency.
pub fn price_after_discounts<'a>(
    original_price: Money<'a, Currency>,
    item_id: &str,
    config: &DiscountConfig<'a>,
    point_in_time: Timestamp,
) -> Result<DiscountedPrice<'a>, DiscountError> {
    let steps = [
        (DiscountScope::Individual, config.per_item.get(item_id)),
        (DiscountScope::Global, config.global.as_ref()),
    ];

    let mut price = original_price;
    let mut components = SmallVec::new();

    for (scope, discount) in steps {
        let Some(discount) = discount.filter(|discount| discount.is_live(point_in_time)) else {
            continue;
        };

        let savings = discount.savings_on(price)?;

        if savings.to_minor_units() == 0 {
            continue;
        }

        price = price.sub(savings)?;

        components.push(AppliedDiscount {
            scope,
            kind: discount.kind,
            savings,
        });
    }

    Ok(DiscountedPrice {
        final_price: price,
        components,
    })
}

/// Calculate the discount amount in minor units based on a percentage and a minor unit amount.
///
/// # Errors
///
/// Returns an error if:
/// - The percentage calculation overflows or cannot be safely represented (`DiscountError::PercentConversion`).
pub fn percent_of_minor(percent: &Percentage, minor: i64) -> Result<i64, DiscountError> {
    let minor = Decimal::from_i64(minor).ok_or(DiscountError::PercentConversion)?;

    ((*percent) * Decimal::ONE) // decimal_percentage doesn't expose the underlying Decimal
        .checked_mul(minor)
        .ok_or(DiscountError::PercentConversion)?
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or(DiscountError::PercentConversion)
}
