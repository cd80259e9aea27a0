//! Mapping configuration errors

use std::path::PathBuf;

/// Malformed or unreadable mapping configuration
#[derive(Debug, thiserror::Error)]
pub enum MappingConfigError {
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

    /// A rule record is malformed
    #[error("{collection}[{index}]: {reason}")]
    Invalid {
        /// Rule collection name
        collection: String,
        /// Position within the collection
        index: usize,
        /// What is wrong
        reason: String,
    },

    /// Two value maps share a name
    #[error("value map {0:?} is declared more than once")]
    DuplicateValueMap(String),
}

impl MappingConfigError {
    /// Create invalid-rule error
    #[inline]
    #[must_use]
    pub fn invalid(collection: impl Into<String>, index: usize, reason: impl Into<String>) -> Self {
        Self::Invalid {
            collection: collection.into(),
            index,
            reason: reason.into(),
        }
    }

    /// Check if the error comes from reading rather than content
    #[inline]
    #[must_use]
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io { .. })
    }
}
