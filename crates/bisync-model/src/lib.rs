//! bisync Model
//!
//! Leaf types shared by every bisync crate.
//!
//! # Core Concepts
//!
//! - [`ChangeBatch`]: ordered set of [`ChangeAction`]s sharing one execution order key
//! - [`Conflict`]: a failure waiting for a [`ResolutionRule`]
//! - [`LinkChangeGroup`]: consolidated link changes for one artifact
//! - [`Lifecycle`]: transition tables for [`BatchStatus`], [`ConflictStatus`]
//!   and [`LinkGroupStatus`]
//! - [`ActionKind`] / [`ContentType`]: closed vocabularies with stable reference names
//!
//! # Example
//!
//! ```rust,ignore
//! use bisync_model::{ActionKind, ChangeAction, ChangeBatch, ContentType, SessionId, SourceId};
//!
//! let mut batch = ChangeBatch::new(SessionId::new(), SourceId::new(), 1).with_name("C42");
//! batch.push_action(ChangeAction::new(ActionKind::Edit, "$/src/main.rs", "42", ContentType::File));
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod batch;
mod conflict;
mod error;
mod ids;
mod kinds;
mod lifecycle;
mod link;

pub use batch::{ActionState, ChangeAction, ChangeBatch};
pub use conflict::{Conflict, ConflictOrigin, ResolutionRule, RuleRecord};
pub use error::ModelError;
pub use ids::{
    BatchId, ConflictId, ConflictTypeId, LinkGroupId, ResolutionActionId, RuleId, SessionId,
    SourceId,
};
pub use kinds::{ActionKind, ContentType};
pub use lifecycle::{validate_transition, BatchStatus, ConflictStatus, Lifecycle, LinkGroupStatus};
pub use link::{ArtifactLink, LinkActionKind, LinkChangeAction, LinkChangeGroup};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
