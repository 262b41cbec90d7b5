//! Pricing
//!
//! The single price breakdown every surface renders: chat wizard, lead form, admin view and
//! exported documents all read the same numbers from here.

use decimal_percentage::Percentage;
use jiff::Timestamp;
use rust_decimal::{Decimal, prelude::FromPrimitive};
use rustc_hash::FxHashSet;
use rusty_money::{Money, MoneyError, iso::Currency};
use serde::{Serialize, Serializer, ser::Error as _};
use smallvec::SmallVec;
use thiserror::Error;
use tracing::debug;

use crate::{
    cart::{Cart, CartItem},
    discounts::{
        AppliedDiscount, DiscountConfig, DiscountError, DiscountScope, price_after_discounts,
    },
    items::{ItemCategory, ItemId},
};

/// Errors that can occur while pricing a cart.
#[derive(Debug, Error, PartialEq)]
pub enum PricingError {
    /// A discount could not be calculated.
    #[error(transparent)]
    Discount(#[from] DiscountError),

    /// Wrapped money arithmetic or currency mismatch error.
    #[error(transparent)]
    Money(#[from] MoneyError),
}

/// One priced cart line.
#[derive(Debug, Clone, PartialEq)]
pub struct LineItem<'a> {
    /// Item id
    pub item_id: ItemId,

    /// Display title
    pub title: String,

    /// Item category
    pub category: ItemCategory,

    /// Price before gifts and discounts
    pub original_price: Money<'a, Currency>,

    /// Price charged
    pub final_price: Money<'a, Currency>,

    /// Whether the line is a free gift
    pub is_gift: bool,

    /// Discount steps that took something off, in application order. Always empty for gifts.
    pub discounts: SmallVec<[AppliedDiscount<'a>; 2]>,
}

impl<'a> LineItem<'a> {
    /// Amount saved on this line, whether through discounts or a gift.
    ///
    /// # Errors
    ///
    /// Returns an error if the original price or final price cannot be subtracted.
    pub fn savings(&self) -> Result<Money<'a, Currency>, MoneyError> {
        self.original_price.sub(self.final_price)
    }

    /// Scope of the last discount applied to this line, if any.
    pub fn discount_scope(&self) -> Option<DiscountScope> {
        self.discounts.last().map(|discount| discount.scope)
    }
}

/// Itemised price breakdown for a cart.
#[derive(Debug, Clone, PartialEq)]
pub struct PricingBreakdown<'a> {
    original_subtotal: Money<'a, Currency>,
    subtotal: Money<'a, Currency>,
    individual_discount_savings: Money<'a, Currency>,
    global_discount_savings: Money<'a, Currency>,
    gift_savings: Money<'a, Currency>,
    final_total: Money<'a, Currency>,
    total_savings: Money<'a, Currency>,
    lines: Vec<LineItem<'a>>,
    currency: &'static Currency,
}

impl<'a> PricingBreakdown<'a> {
    /// Sum of every line's original price, gifts included
    pub fn original_subtotal(&self) -> Money<'a, Currency> {
        self.original_subtotal
    }

    /// Sum of the original prices of the lines that are paid for (gifts excluded, discounts
    /// not yet taken off)
    pub fn subtotal(&self) -> Money<'a, Currency> {
        self.subtotal
    }

    /// Total taken off by per-item overrides
    pub fn individual_discount_savings(&self) -> Money<'a, Currency> {
        self.individual_discount_savings
    }

    /// Total taken off by the global discount
    pub fn global_discount_savings(&self) -> Money<'a, Currency> {
        self.global_discount_savings
    }

    /// Total original price of gift lines
    pub fn gift_savings(&self) -> Money<'a, Currency> {
        self.gift_savings
    }

    /// Amount owed
    pub fn final_total(&self) -> Money<'a, Currency> {
        self.final_total
    }

    /// `original_subtotal - final_total`
    pub fn total_savings(&self) -> Money<'a, Currency> {
        self.total_savings
    }

    /// Per-line ledger in cart order
    pub fn lines(&self) -> &[LineItem<'a>] {
        &self.lines
    }

    /// Ledger entry for one item.
    pub fn line(&self, id: &str) -> Option<&LineItem<'a>> {
        self.lines.iter().find(|line| line.item_id.as_str() == id)
    }

    /// Currency used for all monetary values
    pub fn currency(&self) -> &'static Currency {
        self.currency
    }

    /// Calculates total savings as a fraction of the original subtotal.
    pub fn savings_percent(&self) -> Percentage {
        let savings_minor = self.total_savings.to_minor_units();
        let subtotal_minor = self.original_subtotal.to_minor_units();

        if subtotal_minor == 0 {
            return Percentage::from(0.0);
        }

        let savings_dec = Decimal::from_i64(savings_minor).unwrap_or(Decimal::ZERO);
        let subtotal_dec = Decimal::from_i64(subtotal_minor).unwrap_or(Decimal::ZERO);

        Percentage::from(savings_dec / subtotal_dec)
    }
}

/// Money as minor units plus its ISO currency code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
struct AmountRecord {
    minor_units: i64,
    currency: &'static str,
}

impl From<Money<'_, Currency>> for AmountRecord {
    fn from(money: Money<'_, Currency>) -> Self {
        Self {
            minor_units: money.to_minor_units(),
            currency: money.currency().iso_alpha_code,
        }
    }
}

#[derive(Debug, Serialize)]
struct AppliedRecord {
    scope: DiscountScope,
    savings: AmountRecord,
}

#[derive(Debug, Serialize)]
struct LineRecord<'r> {
    item_id: &'r ItemId,
    title: &'r str,
    category: ItemCategory,
    original_price: AmountRecord,
    final_price: AmountRecord,
    savings: AmountRecord,
    is_gift: bool,
    discount_scope: Option<DiscountScope>,
    discounts: Vec<AppliedRecord>,
}

impl Serialize for LineItem<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let savings = self.savings().map_err(S::Error::custom)?;

        LineRecord {
            item_id: &self.item_id,
            title: &self.title,
            category: self.category,
            original_price: self.original_price.into(),
            final_price: self.final_price.into(),
            savings: savings.into(),
            is_gift: self.is_gift,
            discount_scope: self.discount_scope(),
            discounts: self
                .discounts
                .iter()
                .map(|applied| AppliedRecord {
                    scope: applied.scope,
                    savings: applied.savings.into(),
                })
                .collect(),
        }
        .serialize(serializer)
    }
}

#[derive(Debug, Serialize)]
struct BreakdownRecord<'r, 'a> {
    currency: &'static str,
    original_subtotal: AmountRecord,
    subtotal: AmountRecord,
    individual_discount_savings: AmountRecord,
    global_discount_savings: AmountRecord,
    gift_savings: AmountRecord,
    final_total: AmountRecord,
    total_savings: AmountRecord,
    lines: &'r [LineItem<'a>],
}

/// Exported as minor units with the currency code, so other surfaces never re-derive totals.
impl Serialize for PricingBreakdown<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        BreakdownRecord {
            currency: self.currency.iso_alpha_code,
            original_subtotal: self.original_subtotal.into(),
            subtotal: self.subtotal.into(),
            individual_discount_savings: self.individual_discount_savings.into(),
            global_discount_savings: self.global_discount_savings.into(),
            gift_savings: self.gift_savings.into(),
            final_total: self.final_total.into(),
            total_savings: self.total_savings.into(),
            lines: &self.lines,
        }
        .serialize(serializer)
    }
}

/// Running totals while walking the cart.
struct Totals<'a> {
    original_subtotal: Money<'a, Currency>,
    subtotal: Money<'a, Currency>,
    individual: Money<'a, Currency>,
    global: Money<'a, Currency>,
    gifts: Money<'a, Currency>,
    final_total: Money<'a, Currency>,
}

impl<'a> Totals<'a> {
    fn zero(currency: &'static Currency) -> Self {
        let zero = Money::from_minor(0, currency);

        Self {
            original_subtotal: zero,
            subtotal: zero,
            individual: zero,
            global: zero,
            gifts: zero,
            final_total: zero,
        }
    }

    fn add_line(&mut self, line: &LineItem<'a>) -> Result<(), MoneyError> {
        self.original_subtotal = self.original_subtotal.add(line.original_price)?;
        self.final_total = self.final_total.add(line.final_price)?;

        if line.is_gift {
            self.gifts = self.gifts.add(line.original_price)?;
            return Ok(());
        }

        self.subtotal = self.subtotal.add(line.original_price)?;

        for discount in &line.discounts {
            match discount.scope {
                DiscountScope::Individual => {
                    self.individual = self.individual.add(discount.savings)?;
                }
                DiscountScope::Global => self.global = self.global.add(discount.savings)?,
            }
        }

        Ok(())
    }
}

/// Price a single cart line.
///
/// Gift lines cost nothing and never carry a discount; their whole original price counts
/// as gift savings.
///
/// # Errors
///
/// Returns an error if a discount cannot be calculated.
pub fn price_line<'a>(
    item: &CartItem<'a>,
    discounts: &DiscountConfig<'a>,
    is_gift: bool,
    point_in_time: Timestamp,
) -> Result<LineItem<'a>, PricingError> {
    let original_price = item.base_price();

    let (final_price, applied) = if is_gift {
        (Money::from_minor(0, original_price.currency()), SmallVec::new())
    } else {
        let discounted =
            price_after_discounts(original_price, item.id.as_str(), discounts, point_in_time)?;

        (discounted.final_price, discounted.components)
    };

    Ok(LineItem {
        item_id: item.id.clone(),
        title: item.title.clone(),
        category: item.category,
        original_price,
        final_price,
        is_gift,
        discounts: applied,
    })
}

/// Compute the authoritative price breakdown for a cart.
///
/// # Errors
///
/// Returns an error if a discount cannot be calculated or money arithmetic fails.
#[tracing::instrument(
    level = "debug",
    skip_all,
    fields(lines = cart.len(), gifts = gift_item_ids.len())
)]
pub fn compute_pricing<'a>(
    cart: &Cart<'a>,
    discounts: &DiscountConfig<'a>,
    gift_item_ids: &FxHashSet<ItemId>,
    point_in_time: Timestamp,
) -> Result<PricingBreakdown<'a>, PricingError> {
    let mut totals = Totals::zero(cart.currency());
    let mut lines = Vec::with_capacity(cart.len());

    for item in cart.iter() {
        let is_gift = gift_item_ids.contains(item.id.as_str());
        let line = price_line(item, discounts, is_gift, point_in_time)?;

        totals.add_line(&line)?;
        lines.push(line);
    }

    let total_savings = totals.original_subtotal.sub(totals.final_total)?;

    debug!(
        total = %totals.final_total,
        savings = %total_savings,
        "cart priced"
    );

    Ok(PricingBreakdown {
        original_subtotal: totals.original_subtotal,
        subtotal: totals.subtotal,
        individual_discount_savings: totals.individual,
        global_discount_savings: totals.global,
        gift_savings: totals.gifts,
        final_total: totals.final_total,
        total_savings,
        lines,
        currency: cart.currency(),
    })
}
