//! Cartwright CLI
//!
//! Loads a fixture set, fills the cart, and prints item availability and a priced receipt.
//!
//! Use `-s` to pick a fixture set, `-i` (repeatable) to choose the cart items, and `--at` to
//! price at a fixed instant.

use std::{
    io::{self, Write},
    time::Instant,
};

use anyhow::Result;
use clap::Parser;
use humanize_duration::{Truncate, prelude::DurationExt};

use cartwright::{
    config::Args, fixtures::Fixture, observability::init_subscriber, receipt::Receipt,
    session::SelectionSession,
};

fn main() -> Result<()> {
    let args = Args::parse();

    init_subscriber(&args.logging)?;

    let fixture = Fixture::with_base_path(args.fixtures.clone(), args.set.clone());
    let point_in_time = args.point_in_time();

    let start = Instant::now();

    let mut session = SelectionSession::load(&fixture, args.engine_settings())?;

    let items = if args.items.is_empty() {
        fixture.load_cart()?
    } else {
        args.items.clone()
    };

    let stdout = io::stdout();
    let mut handle = stdout.lock();

    for id in &items {
        if let Err(error) = session.add_item(id.as_str()) {
            writeln!(handle, " skipped {id}: {error}")?;
        }
    }

    for id in session.settle() {
        writeln!(handle, " removed {id}: no longer available")?;
    }

    let breakdown = session.pricing(point_in_time)?;

    let elapsed = start.elapsed();

    writeln!(handle, "\n Availability at {point_in_time}")?;

    for item in session.catalog().iter() {
        let id = item.id.as_str();

        match session.unavailable_reason(id) {
            Some(reason) => writeln!(handle, "  \x1b[90m✗ {}: {reason}\x1b[0m", item.title)?,
            None if session.is_item_gift(id) => {
                writeln!(handle, "  \x1b[32m✓ {} (gift)\x1b[0m", item.title)?;
            }
            None if session.cart().contains(id) => writeln!(handle, "  ✓ {} (in cart)", item.title)?,
            None => writeln!(handle, "  ✓ {}", item.title)?,
        }
    }

    Receipt::new(&breakdown)
        .with_evaluation(session.evaluation())
        .write_to(&mut handle)?;

    writeln!(
        handle,
        " {} ({}s)",
        elapsed.human(Truncate::Nano),
        elapsed.as_secs_f32()
    )?;

    Ok(())
}
