//! Config
//!
//! Command-line and environment settings for the `cartwright` binary.

use std::path::PathBuf;

use clap::Parser;
use jiff::Timestamp;

use crate::{
    fixtures::DEFAULT_FIXTURES_PATH,
    items::ItemId,
    rules::engine::{DEFAULT_MAX_ITERATIONS, EngineSettings, EvaluationStrategy},
};

/// Log output format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Compact, human-readable logs.
    Compact,

    /// Structured JSON logs.
    Json,
}

/// Logging settings.
#[derive(Debug, clap::Args)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "RUST_LOG", default_value = "warn")]
    pub log_level: String,

    /// Log format (compact, json)
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Compact)]
    pub log_format: LogFormat,
}

/// Evaluate a cart against a fixture set and print availability and a priced receipt.
#[derive(Debug, Parser)]
#[command(name = "cartwright", version, about)]
pub struct Args {
    /// Directory holding the fixture sets
    #[arg(long, env = "CARTWRIGHT_FIXTURES", default_value = DEFAULT_FIXTURES_PATH)]
    pub fixtures: PathBuf,

    /// Fixture set to load
    #[arg(short, long, env = "CARTWRIGHT_SET", default_value = "studio")]
    pub set: String,

    /// Items to add, in order. Defaults to the set's sample cart.
    #[arg(short, long = "item")]
    pub items: Vec<ItemId>,

    /// Price the cart at this instant (RFC 3339) instead of now
    #[arg(long)]
    pub at: Option<Timestamp>,

    /// Re-evaluate until no selected item becomes blocked
    #[arg(long, env = "CARTWRIGHT_FIXED_POINT")]
    pub fixed_point: bool,

    /// Pass cap for fixed-point evaluation
    #[arg(long, default_value_t = DEFAULT_MAX_ITERATIONS)]
    pub max_iterations: usize,

    /// Logging settings
    #[command(flatten)]
    pub logging: LoggingConfig,
}

impl Args {
    /// Engine settings selected on the command line.
    pub fn engine_settings(&self) -> EngineSettings {
        let strategy = if self.fixed_point {
            EvaluationStrategy::FixedPoint {
                max_iterations: self.max_iterations.max(1),
            }
        } else {
            EvaluationStrategy::TwoPass
        };

        EngineSettings { strategy }
    }

    /// Instant discounts are evaluated at.
    pub fn point_in_time(&self) -> Timestamp {
        self.at.unwrap_or_else(Timestamp::now)
    }
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;

    #[test]
    fn defaults_to_two_pass_studio_set() -> TestResult {
        let args = Args::try_parse_from(["cartwright"])?;

        assert_eq!(args.set, "studio");
        assert!(args.items.is_empty());
        assert_eq!(args.engine_settings(), EngineSettings::default());
        assert_eq!(args.logging.log_format, LogFormat::Compact);

        Ok(())
    }

    #[test]
    fn parses_items_time_and_fixed_point() -> TestResult {
        let args = Args::try_parse_from([
            "cartwright",
            "--item",
            "newborn-session",
            "-i",
            "canvas-print",
            "--at",
            "2026-03-15T12:00:00Z",
            "--fixed-point",
            "--max-iterations",
            "3",
            "--log-format",
            "json",
        ])?;

        assert_eq!(
            args.items,
            vec![ItemId::from("newborn-session"), ItemId::from("canvas-print")]
        );
        assert_eq!(args.point_in_time(), "2026-03-15T12:00:00Z".parse::<Timestamp>()?);
        assert_eq!(
            args.engine_settings().strategy,
            EvaluationStrategy::FixedPoint { max_iterations: 3 }
        );
        assert_eq!(args.logging.log_format, LogFormat::Json);

        Ok(())
    }

    #[test]
    fn rejects_a_malformed_timestamp() {
        assert!(Args::try_parse_from(["cartwright", "--at", "yesterday"]).is_err());
    }
}
