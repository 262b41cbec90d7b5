//! Cartwright
//!
//! Cartwright is a selection rules engine and pricing calculator for service and product
//! catalogs. Declarative rules decide which items a buyer can select and which selected items
//! become free gifts; the pricing calculator turns the resulting cart into an itemised
//! breakdown with per-item and global discounts.

mod keys;

pub mod cart;
pub mod config;
pub mod discounts;
pub mod fixtures;
pub mod guard;
pub mod items;
pub mod observability;
pub mod prelude;
pub mod pricing;
pub mod receipt;
pub mod rules;
pub mod session;
