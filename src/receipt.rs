//! Receipt
//!
//! Terminal rendering of a [`PricingBreakdown`].

use std::{fmt::Write, io};

use decimal_percentage::Percentage;
use rust_decimal::Decimal;
use rusty_money::{Money, MoneyError, iso::Currency};
use smallvec::SmallVec;
use tabled::{
    builder::Builder,
    grid::config::HorizontalLine,
    settings::{
        Alignment, Color, Style, Theme,
        object::{Columns, Rows},
    },
};
use thiserror::Error;

use crate::{
    discounts::{AppliedDiscount, DiscountKind, DiscountScope},
    pricing::{LineItem, PricingBreakdown},
    rules::engine::RulesEvaluation,
};

/// Errors that can occur when writing a receipt.
#[derive(Debug, Error)]
pub enum ReceiptError {
    /// Wrapper for money errors.
    #[error(transparent)]
    Money(#[from] MoneyError),

    /// IO error
    #[error("IO error")]
    IO,
}

/// Printable view of a priced cart.
#[derive(Debug, Clone, Copy)]
pub struct Receipt<'r, 'a> {
    breakdown: &'r PricingBreakdown<'a>,
    evaluation: Option<&'r RulesEvaluation>,
}

impl<'r, 'a> Receipt<'r, 'a> {
    /// Receipt for a breakdown.
    pub fn new(breakdown: &'r PricingBreakdown<'a>) -> Self {
        Self {
            breakdown,
            evaluation: None,
        }
    }

    /// Label gift lines with the badge text of the rule that made them gifts.
    #[must_use]
    pub fn with_evaluation(mut self, evaluation: &'r RulesEvaluation) -> Self {
        self.evaluation = Some(evaluation);
        self
    }

    /// Write the receipt table and summary.
    ///
    /// # Errors
    ///
    /// Returns an error if a line's savings cannot be computed or the output cannot be written.
    pub fn write_to(&self, mut out: impl io::Write) -> Result<(), ReceiptError> {
        let mut builder = Builder::default();
        let mut color_ops: SmallVec<[(usize, usize, Color); 32]> = SmallVec::new();

        builder.push_record([
            "",
            "Item",
            "Category",
            "Base Price",
            "Final Price",
            "Savings",
            "Applied",
        ]);

        for (idx, line) in self.breakdown.lines().iter().enumerate() {
            let row = idx + 1;
            let unchanged = line.final_price == line.original_price;

            let (final_price, savings) = if unchanged {
                (String::new(), String::new())
            } else {
                (
                    format!("{}", line.final_price),
                    format!("-{}", line.savings()?),
                )
            };

            builder.push_record([
                format!("#{:<3}", idx + 1),
                line.title.clone(),
                line.category.to_string(),
                format!("{}", line.original_price),
                final_price,
                savings,
                self.applied_label(line),
            ]);

            color_ops.push((row, 0, color_dark_grey()));

            if !unchanged {
                color_ops.push((row, 4, Color::FG_GREEN));
            }
        }

        write_receipt_table(&mut out, builder, color_ops)?;
        write_receipt_summary(&mut out, self.breakdown)
    }

    fn applied_label(&self, line: &LineItem<'_>) -> String {
        if line.is_gift {
            let text = self
                .evaluation
                .and_then(|evaluation| evaluation.item_state(line.item_id.as_str()))
                .and_then(|state| state.gift_settings.as_ref())
                .map_or("Gift", |settings| settings.display_text.as_str());

            return format!("🎁 {text}");
        }

        line.discounts
            .iter()
            .map(discount_label)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn discount_label(applied: &AppliedDiscount<'_>) -> String {
    let scope = match applied.scope {
        DiscountScope::Individual => "Item",
        DiscountScope::Global => "Global",
    };

    match applied.kind {
        DiscountKind::PercentageOff(percent) => {
            format!("{scope} {}% off", percent_points(percent).normalize())
        }
        DiscountKind::AmountOff(amount) => format!("{scope} {amount} off"),
    }
}

fn write_receipt_table(
    out: &mut impl io::Write,
    builder: Builder,
    color_ops: SmallVec<[(usize, usize, Color); 32]>,
) -> Result<(), ReceiptError> {
    let mut table = builder.build();
    let mut theme = Theme::from(Style::modern_rounded());

    theme.remove_horizontal_lines();
    theme.insert_horizontal_line(
        1,
        HorizontalLine::new(Some('─'), Some('┼'), Some('├'), Some('┤')),
    );

    table.with(theme);
    table.modify(Rows::first(), Color::BOLD);
    table.modify(Columns::new(3..6), Alignment::right());

    for (row, col, color) in color_ops {
        table.modify((row, col), color);
    }

    let table_str = colorize_borders(&table.to_string());

    writeln!(out, "\n{table_str}").map_err(|_err| ReceiptError::IO)
}

fn write_receipt_summary(
    out: &mut impl io::Write,
    breakdown: &PricingBreakdown<'_>,
) -> Result<(), ReceiptError> {
    let savings_points = percent_points(breakdown.savings_percent());

    let mut rows: SmallVec<[(String, String); 8]> = SmallVec::new();

    if breakdown.original_subtotal() != breakdown.subtotal() {
        rows.push((
            " Original subtotal:".to_string(),
            format!("{}  ", breakdown.original_subtotal()),
        ));
    }

    rows.push((
        " Subtotal:".to_string(),
        format!("{}  ", breakdown.subtotal()),
    ));

    for (label, amount) in [
        (" Item discounts:", breakdown.individual_discount_savings()),
        (" Global discount:", breakdown.global_discount_savings()),
        (" Gifts:", breakdown.gift_savings()),
    ] {
        if !is_zero(amount) {
            rows.push((label.to_string(), format!("-{amount}  ")));
        }
    }

    rows.push((
        " \x1b[1mTotal:\x1b[0m".to_string(),
        format!("\x1b[1m{}  \x1b[0m", breakdown.final_total()),
    ));
    rows.push((
        " Savings:".to_string(),
        format!("({savings_points:.2}%) {}  ", breakdown.total_savings()),
    ));

    let label_width = rows
        .iter()
        .map(|(label, _)| visible_width(label))
        .max()
        .unwrap_or_default();

    let value_width = rows
        .iter()
        .map(|(_, value)| visible_width(value))
        .max()
        .unwrap_or_default();

    for (label, value) in &rows {
        write_summary_line(out, label, value, label_width, value_width)?;
    }

    writeln!(out).map_err(|_err| ReceiptError::IO)
}

fn is_zero(amount: Money<'_, Currency>) -> bool {
    amount.to_minor_units() == 0
}

/// Converts a fractional percentage to percent points for display.
fn percent_points(percentage: Percentage) -> Decimal {
    // `Percentage` is a fraction (e.g. 0.25), so multiply by 100 to print percent points.
    ((percentage * Decimal::ONE) * Decimal::ONE_HUNDRED).round_dp(2)
}

/// Wraps runs of UTF-8 box-drawing characters in ANSI dark-grey escape codes.
fn colorize_borders(table: &str) -> String {
    let mut out = String::with_capacity(table.len() + 256);
    let mut in_run = false;

    for ch in table.chars() {
        let box_char = ('\u{2500}'..='\u{257F}').contains(&ch);

        if box_char && !in_run {
            _ = out.write_str("\x1b[90m");
            in_run = true;
        } else if !box_char && in_run {
            _ = out.write_str("\x1b[0m");
            in_run = false;
        }

        out.push(ch);
    }

    if in_run {
        _ = out.write_str("\x1b[0m");
    }

    out
}

/// Returns the visible (non-ANSI) width of a string.
fn visible_width(s: &str) -> usize {
    let mut width = 0usize;
    let mut in_escape = false;

    for ch in s.chars() {
        if in_escape {
            if ch.is_ascii_alphabetic() {
                in_escape = false;
            }
        } else if ch == '\x1b' {
            in_escape = true;
        } else {
            width += 1;
        }
    }

    width
}

/// Writes a summary line with a right-aligned label and a fixed-width value column.
fn write_summary_line(
    out: &mut impl io::Write,
    label: &str,
    value: &str,
    label_col_width: usize,
    value_col_width: usize,
) -> Result<(), ReceiptError> {
    let label_pad = label_col_width.saturating_sub(visible_width(label));
    let value_pad = value_col_width.saturating_sub(visible_width(value));

    writeln!(
        out,
        "{:>label_pad$}{label}  {value_pad}{value}",
        "",
        value_pad = " ".repeat(value_pad)
    )
    .map_err(|_err| ReceiptError::IO)
}

/// ANSI dark grey foreground.
fn color_dark_grey() -> Color {
    Color::new("\x1b[90m", "\x1b[0m")
}

#[cfg(test)]
mod tests {
    use decimal_percentage::Percentage;
    use jiff::Timestamp;
    use rustc_hash::FxHashSet;
    use rusty_money::iso::BRL;
    use testresult::TestResult;

    use super::*;
    use crate::{
        cart::{Cart, CartItem},
        discounts::{Discount, DiscountConfig},
        items::{Item, ItemCategory, ItemId},
        pricing::compute_pricing,
    };

    fn breakdown<'a>(gifts: &[&str]) -> TestResult<PricingBreakdown<'a>> {
        let cart = Cart::with_items(
            [
                Item::new("x", "Newborn session", ItemCategory::Service, Money::from_minor(60_000, BRL)),
                Item::new("z", "Canvas print", ItemCategory::Product, Money::from_minor(45_000, BRL)),
            ]
            .iter()
            .map(CartItem::from_item),
            BRL,
        )?;

        let config = DiscountConfig::none()
            .with_global(Discount::percentage_off(Percentage::from(0.1)));

        let gifts: FxHashSet<ItemId> = gifts.iter().copied().map(ItemId::from).collect();

        Ok(compute_pricing(&cart, &config, &gifts, Timestamp::UNIX_EPOCH)?)
    }

    fn render(receipt: Receipt<'_, '_>) -> TestResult<String> {
        let mut out = Vec::new();

        receipt.write_to(&mut out)?;

        Ok(String::from_utf8(out)?)
    }

    #[test]
    fn renders_lines_and_totals() -> TestResult {
        let breakdown = breakdown(&[])?;
        let output = render(Receipt::new(&breakdown))?;

        assert!(output.contains("Newborn session"));
        assert!(output.contains("Canvas print"));
        assert!(output.contains("Global 10% off"));
        assert!(output.contains(&format!("{}", breakdown.final_total())));
        assert!(output.contains("Total:"));
        assert!(!output.contains("Gifts:"));

        Ok(())
    }

    #[test]
    fn gift_lines_are_labelled() -> TestResult {
        let breakdown = breakdown(&["z"])?;
        let output = render(Receipt::new(&breakdown))?;

        assert!(output.contains("🎁 Gift"));
        assert!(output.contains("Gifts:"));
        assert!(output.contains("Original subtotal:"));

        Ok(())
    }

    #[test]
    fn percent_points_converts_fractions() {
        assert_eq!(percent_points(Percentage::from(0.25)), Decimal::from(25));
        assert_eq!(percent_points(Percentage::from(0.0)), Decimal::ZERO);
    }

    #[test]
    fn visible_width_ignores_ansi_sequences() {
        assert_eq!(visible_width("\x1b[1mTotal:\x1b[0m"), 6);
        assert_eq!(visible_width("plain"), 5);
    }

    #[test]
    fn colorize_borders_wraps_box_runs() {
        assert_eq!(colorize_borders("│a│"), "\x1b[90m│\x1b[0ma\x1b[90m│\x1b[0m");
    }
}
