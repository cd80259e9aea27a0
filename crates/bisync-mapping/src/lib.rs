//! bisync Mapping
//!
//! Bidirectional, wildcard-aware rule evaluators for identities and field values.
//!
//! # Core Concepts
//!
//! - [`RuleBook`]: rules grouped by direction; directional rules shadow two-way ones
//! - [`DirectionalRule`]: how a rule ranks itself against an input (lower is more specific)
//! - [`AttributeMapper`]: alias, display name or domain translation
//! - [`UserMapper`]: alias plus domain translation
//! - [`ValueMap`]: conditional field value translation
//! - [`MappingSet`]: every evaluator of a session, built from a [`MappingConfig`]
//!
//! # Example
//!
//! ```rust,ignore
//! use bisync_mapping::{AttributeMapper, AttributeRule, MappingDirection, TranslationDirection};
//!
//! let aliases = AttributeMapper::alias(vec![
//!     AttributeRule::new("user2", "user2 target", MappingDirection::LeftToRight),
//!     AttributeRule::new("*", "default", MappingDirection::LeftToRight),
//! ]);
//! assert_eq!(aliases.map_or_source("user2", TranslationDirection::LeftToRight), "user2 target");
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod config;
mod error;
mod evaluator;
mod identity;
mod rule;
mod value_map;

pub use config::{MappingConfig, MappingSet, ValueMapRecord};
pub use error::MappingConfigError;
pub use evaluator::{DirectionalRule, RuleBook};
pub use identity::{
    AttributeMapper, AttributeRank, AttributeRule, IdentityAttribute, UserIdentity, UserMapper,
    UserRank, UserRule,
};
pub use rule::{
    apply_kind, Mapped, MappingDirection, MappingRuleKind, Side, TranslationDirection,
    PLACEHOLDER, WILDCARD,
};
pub use value_map::{Condition, FieldValues, ValueMap, ValueMapRegistry, ValueRule};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
