//! Session configuration
//!
//! One file describes a session: its two endpoints, scan and link-slicing
//! settings, conflict policy overrides, mapping rules and telemetry.
//!
//! ```toml
//! session = "7d0b2c9e-2f55-4b8e-9a43-0c8f6a1d2e01"
//!
//! [left]
//! source = "0a8e7f44-5d9b-4c55-8a37-6b7f6f1e9a10"
//! name = "tfs"
//!
//! [right]
//! source = "5c1e2d33-7a44-4f1b-b3a9-2d4e8c0f7b22"
//! name = "git"
//!
//! [links]
//! max_slice_size = 200
//!
//! [[conflicts.policies]]
//! conflict_type = "6a1d0001-0000-4000-8000-000000000002"
//! policy = "halt_session"
//!
//! [[mapping.aliases]]
//! left = "alice"
//! right = "asmith"
//! ```

use crate::error::ConfigError;
use crate::telemetry::TelemetryConfig;
use bisync_conflict::ConflictPolicy;
use bisync_delta::LinkSlicerConfig;
use bisync_mapping::MappingConfig;
use bisync_model::{ConflictTypeId, SessionId, SourceId};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Watermark name used for content scanning unless configured otherwise
pub const DEFAULT_WATERMARK: &str = "content";

fn default_watermark() -> String {
    DEFAULT_WATERMARK.to_string()
}

/// One side of the session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Source identity used as the stream key
    pub source: SourceId,
    /// Display name
    #[serde(default)]
    pub name: String,
}

impl EndpointConfig {
    /// Create endpoint
    #[inline]
    #[must_use]
    pub fn new(source: SourceId, name: impl Into<String>) -> Self {
        Self {
            source,
            name: name.into(),
        }
    }
}

/// Policy for one conflict type, replacing its default
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyOverride {
    /// Conflict type
    pub conflict_type: ConflictTypeId,
    /// Policy to apply on both endpoints
    pub policy: ConflictPolicy,
}

/// Conflict handling settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConflictSettings {
    /// Per-type policy overrides
    pub policies: Vec<PolicyOverride>,
}

/// Everything needed to open a [`crate::SyncSession`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Session identity
    pub session: SessionId,
    /// Left endpoint
    pub left: EndpointConfig,
    /// Right endpoint
    pub right: EndpointConfig,
    /// Content watermark name
    #[serde(default = "default_watermark")]
    pub watermark: String,
    /// Link slicing
    #[serde(default)]
    pub links: LinkSlicerConfig,
    /// Conflict policies
    #[serde(default)]
    pub conflicts: ConflictSettings,
    /// Mapping rules
    #[serde(default)]
    pub mapping: MappingConfig,
    /// Tracing subscriber
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl SessionConfig {
    /// Create config with default settings
    #[must_use]
    pub fn new(session: SessionId, left: EndpointConfig, right: EndpointConfig) -> Self {
        Self {
            session,
            left,
            right,
            watermark: default_watermark(),
            links: LinkSlicerConfig::default(),
            conflicts: ConflictSettings::default(),
            mapping: MappingConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }

    /// With mapping rules
    #[inline]
    #[must_use]
    pub fn with_mapping(mut self, mapping: MappingConfig) -> Self {
        self.mapping = mapping;
        self
    }

    /// With link slicing settings
    #[inline]
    #[must_use]
    pub fn with_links(mut self, links: LinkSlicerConfig) -> Self {
        self.links = links;
        self
    }

    /// With a policy override
    #[must_use]
    pub fn with_policy(mut self, conflict_type: ConflictTypeId, policy: ConflictPolicy) -> Self {
        self.conflicts.policies.push(PolicyOverride { conflict_type, policy });
        self
    }

    /// Parse and validate TOML
    ///
    /// # Errors
    /// Returns error if the document is malformed or fails validation
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate JSON
    ///
    /// # Errors
    /// Returns error if the document is malformed or fails validation
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a `.toml` or `.json` file
    ///
    /// # Errors
    /// Returns error if the file cannot be read, has another extension, or
    /// fails validation
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        let parse: fn(&str) -> Result<Self, ConfigError> = match extension.as_deref() {
            Some("toml") => Self::from_toml_str,
            Some("json") => Self::from_json_str,
            _ => return Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
        };
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = parse(&text)?;
        tracing::info!(path = %path.display(), session = %config.session, "session configuration loaded");
        Ok(config)
    }

    /// Serialize as TOML
    ///
    /// # Errors
    /// Returns error if a value cannot be represented in TOML
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::invalid("session", e.to_string()))
    }

    /// Reject inconsistent settings
    ///
    /// # Errors
    /// Returns the first problem found
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.left.source == self.right.source {
            return Err(ConfigError::invalid("right.source", "same as left.source"));
        }
        if self.watermark.trim().is_empty() {
            return Err(ConfigError::invalid("watermark", "name is empty"));
        }
        if self.links.max_slice_size == 0 {
            return Err(ConfigError::invalid("links.max_slice_size", "must be at least 1"));
        }
        if self.links.lookback_secs < 0 {
            return Err(ConfigError::invalid("links.lookback_secs", "must not be negative"));
        }
        self.mapping.validate()?;
        Ok(())
    }
}
