//! Selection Rule Fixtures

use serde::Deserialize;
use tracing::warn;

use crate::{fixtures::FixtureError, rules::SelectionRule};

/// Wrapper for rules in YAML
///
/// Rules are kept as raw values so one malformed record does not sink the rest.
#[derive(Debug, Deserialize)]
pub struct RulesFixture {
    /// Raw rule records
    #[serde(default)]
    pub rules: Vec<serde_norway::Value>,
}

/// Parse a rules file, skipping records that do not describe a rule.
///
/// # Errors
///
/// Returns an error if the file itself is not valid YAML.
pub fn parse_rules(contents: &str) -> Result<Vec<SelectionRule>, FixtureError> {
    let fixture: RulesFixture = serde_norway::from_str(contents)?;

    let rules = fixture
        .rules
        .into_iter()
        .enumerate()
        .filter_map(
            |(index, value)| match serde_norway::from_value::<SelectionRule>(value) {
                Ok(rule) => Some(rule),
                Err(error) => {
                    warn!(index, %error, "skipping malformed selection rule");
                    None
                }
            },
        )
        .collect();

    Ok(rules)
}
