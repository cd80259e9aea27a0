//! Error types for the session facade
//!
//! [`SyncError`] aggregates every crate error so callers driving a session
//! deal with one type. [`ConfigError`] covers session configuration only;
//! mapping rule problems keep their own [`MappingConfigError`].

use bisync_conflict::ConflictError;
use bisync_delta::DeltaError;
use bisync_mapping::MappingConfigError;
use bisync_model::{ConflictTypeId, ModelError};
use bisync_store::StoreError;
use std::path::PathBuf;

/// Malformed or unreadable session configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("cannot read {path}: {source}")]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// TOML syntax or shape error
    #[error("invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON syntax or shape error
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// File extension is neither `.toml` nor `.json`
    #[error("unsupported configuration format: {0}")]
    UnsupportedFormat(PathBuf),

    /// Mapping rules are malformed
    #[error("mapping configuration: {0}")]
    Mapping(#[from] MappingConfigError),

    /// A setting is out of range or inconsistent
    #[error("invalid setting {field}: {reason}")]
    Invalid {
        /// Setting name
        field: &'static str,
        /// What is wrong
        reason: String,
    },

    /// A policy override names a type nobody registered
    #[error("policy override for unregistered conflict type {0}")]
    UnknownConflictType(ConflictTypeId),
}

impl ConfigError {
    /// Create invalid-setting error
    #[inline]
    #[must_use]
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Any failure surfaced by a [`crate::SyncSession`]
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Session configuration rejected
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Persistence failed
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Scanning or batch lifecycle failed
    #[error("delta error: {0}")]
    Delta(#[from] DeltaError),

    /// Conflict handling failed
    #[error("conflict error: {0}")]
    Conflict(#[from] ConflictError),

    /// Mapping rules rejected on reload
    #[error("mapping error: {0}")]
    Mapping(#[from] MappingConfigError),

    /// Model invariant violated
    #[error(transparent)]
    Model(#[from] ModelError),

    /// Tracing subscriber could not be installed
    #[error("telemetry error: {0}")]
    Telemetry(String),
}

impl SyncError {
    /// Create telemetry error
    #[inline]
    #[must_use]
    pub fn telemetry(message: impl Into<String>) -> Self {
        Self::Telemetry(message.into())
    }

    /// Check if repeating the operation may succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Store(err) => err.is_retryable(),
            Self::Delta(err) => err.is_retryable(),
            Self::Conflict(err) => err.is_retryable(),
            _ => false,
        }
    }

    /// Check if the error comes from configuration rather than runtime
    #[inline]
    #[must_use]
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Mapping(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_follows_inner_error() {
        let err: SyncError = StoreError::backend("timeout").into();
        assert!(err.is_retryable());

        let err: SyncError = StoreError::not_found("batch", 3).into();
        assert!(!err.is_retryable());

        let err: SyncError = ConfigError::invalid("watermark", "empty").into();
        assert!(!err.is_retryable());
        assert!(err.is_config());
    }

    #[test]
    fn config_error_display() {
        let err = ConfigError::invalid("right.source", "same as left.source");
        assert_eq!(err.to_string(), "invalid setting right.source: same as left.source");
    }
}
