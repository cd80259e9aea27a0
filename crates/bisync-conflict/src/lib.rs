//! bisync Conflict
//!
//! Conflict taxonomy, scope-matched resolution rules and back-fill resolution.
//!
//! # Core Concepts
//!
//! - [`ConflictType`]: behaviour record (scope interpreter, actions, handler)
//! - [`ConflictRegistry`]: flat table keyed by (scope, conflict type id)
//! - [`ScopeInterpreter`]: decides whether a rule scope covers a conflict's scope hint
//! - [`ResolutionAction`]: menu entry with required data keys and a [`ResolutionEffect`]
//! - [`ConflictResolutionEngine`]: raise, resolve with a new rule, back-fill
//!
//! # Example
//!
//! ```rust,ignore
//! use bisync_conflict::{builtin, ConflictRegistry, ConflictResolutionEngine};
//!
//! let engine = ConflictResolutionEngine::new(store, session, Arc::new(ConflictRegistry::with_defaults()));
//! let raised = engine.raise_conflict(source, builtin::ITEM_NOT_FOUND, details, "$/proj/a.txt", origin)?;
//!
//! let rule = builtin::skip().new_rule("$/proj", "missing upstream", IndexMap::new())?;
//! let report = engine.resolve_with_new_rule(raised.conflict_id, rule)?;
//! println!("{} conflicts resolved", report.resolved_count());
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod action;
pub mod builtin;
mod conflict_type;
mod engine;
mod error;
mod registry;
mod scope;

pub use action::{ResolutionAction, ResolutionEffect};
pub use conflict_type::{
    ConflictHandler, ConflictPolicy, ConflictType, HandlerOutcome, ResolutionContext,
    ResolutionKind, StandardHandler,
};
pub use engine::{
    ActionView, ConflictResolutionEngine, ConflictView, Guarded, RaiseOutcome, ResolutionReport,
    ResolutionResult,
};
pub use error::ConflictError;
pub use registry::{ConflictRegistry, Registration, RegistryScope};
pub use scope::ScopeInterpreter;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
