//! Logging: tracing subscriber setup plus an append-only JSONL event journal.

pub mod jsonl;

use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

use crate::core::config::LoggingConfig;
use crate::core::errors::{BodewellError, Result};

/// Env var that overrides the configured filter directive.
pub const LOG_ENV: &str = "BODEWELL_LOG";

/// Install the global tracing subscriber.
///
/// `verbose` forces `debug` regardless of config or environment.
pub fn init(config: &LoggingConfig, verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        let directive = std::env::var(LOG_ENV).unwrap_or_else(|_| config.level.clone());
        EnvFilter::try_new(&directive).map_err(|err| BodewellError::InvalidConfig {
            details: format!("invalid log filter '{directive}': {err}"),
        })?
    };

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if config.json {
        registry
            .with(fmt::layer().json().with_target(false))
            .try_init()
    } else {
        registry.with(fmt::layer().with_target(false)).try_init()
    };
    installed.map_err(|err| BodewellError::Runtime {
        details: format!("failed to install log subscriber: {err}"),
    })
}
