//! Tracing bootstrap
//!
//! `BISYNC_LOG` overrides the configured filter, e.g.
//! `BISYNC_LOG=bisync_conflict=debug,bisync_delta=info`.

use crate::error::SyncError;
use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Environment variable holding a filter directive
pub const LOG_ENV: &str = "BISYNC_LOG";

/// Subscriber settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Filter directive used when `BISYNC_LOG` is unset
    pub filter: String,
    /// Emit JSON lines instead of human-readable text
    pub json: bool,
    /// Include the event target
    pub with_target: bool,
}

impl TelemetryConfig {
    /// Create default config
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With filter directive
    #[inline]
    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    /// With JSON output
    #[inline]
    #[must_use]
    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
            with_target: true,
        }
    }
}

/// Install the global tracing subscriber
///
/// # Errors
/// [`SyncError::Telemetry`] if the filter is malformed or a subscriber is
/// already installed.
pub fn init_tracing(config: &TelemetryConfig) -> Result<(), SyncError> {
    let filter = match EnvFilter::try_from_env(LOG_ENV) {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.filter).map_err(|e| SyncError::telemetry(e.to_string()))?,
    };

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if config.json {
        registry
            .with(fmt::layer().json().with_target(config.with_target))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(config.with_target))
            .try_init()
    };
    installed.map_err(|e| SyncError::telemetry(e.to_string()))?;

    tracing::debug!(filter = %config.filter, json = config.json, "tracing initialized");
    Ok(())
}
