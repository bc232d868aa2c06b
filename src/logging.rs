//! Logging setup
//!
//! The SDK crates log through `log`; the subscriber's `tracing-log` bridge
//! routes those records into the same `tracing` output as the portal's events.

use tracing_subscriber::EnvFilter;

use crate::error::{PortalError, Result};

/// Noisy dependencies capped at `warn` unless `RUST_LOG` says otherwise
const QUIET_TARGETS: &[&str] = &["hyper", "reqwest", "h2", "rustls"];

/// Build the filter from `RUST_LOG`, else `default_level` plus the quiet targets.
pub fn build_env_filter(default_level: &str) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let mut directives = vec![default_level.to_string()];
    for target in QUIET_TARGETS {
        directives.push(format!("{}=warn", target));
    }

    let filter_str = directives.join(",");
    EnvFilter::try_new(&filter_str)
        .map_err(|e| PortalError::Config(format!("Invalid log filter '{}': {}", filter_str, e)))
}

/// Install the global subscriber. Calling it twice is a config error, not a panic.
pub fn init_logging(default_level: &str) -> Result<()> {
    let filter = build_env_filter(default_level)?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| PortalError::Config(format!("Logging already initialised: {}", e)))
}
