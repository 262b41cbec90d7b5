//! Cart Fixtures

use serde::Deserialize;

use crate::items::ItemId;

/// Wrapper for a sample cart in YAML
#[derive(Debug, Deserialize)]
pub struct CartFixture {
    /// Item ids in the order they are added
    #[serde(default)]
    pub items: Vec<ItemId>,
}
