//! Lifecycle state machines
//!
//! Batches, conflicts and link groups all move through small, closed
//! state machines. Each status type lists its legal successors; every
//! status write in the engine goes through [`validate_transition`].

use crate::error::ModelError;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// A status type with a fixed transition table
pub trait Lifecycle: Copy + Eq + Debug + 'static {
    /// Entity name used in error messages
    const ENTITY: &'static str;

    /// Legal successor states
    fn allowed_transitions(self) -> &'static [Self];

    /// Whether no further transition is possible
    #[inline]
    fn is_terminal(self) -> bool {
        self.allowed_transitions().is_empty()
    }
}

/// Validates a state transition
///
/// # Errors
/// Returns [`ModelError::IllegalTransition`] when `to` is not a legal
/// successor of `from`.
pub fn validate_transition<S: Lifecycle>(from: S, to: S) -> Result<(), ModelError> {
    if from.allowed_transitions().contains(&to) {
        Ok(())
    } else {
        Err(ModelError::illegal_transition(S::ENTITY, from, to))
    }
}

/// Change batch status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    /// Produced by a scan pass that has not finished yet
    #[default]
    Delta,
    /// Scan pass finished, promotion in progress
    DeltaPending,
    /// Visible to the consumption stage
    Pending,
    /// Being applied to the other side
    InProgress,
    /// Applied
    Completed,
    /// Blocked by an unresolved conflict
    Conflicted,
    /// Suppressed by a resolution action
    Skipped,
    /// Discarded by a retry-from-scratch
    Obsolete,
}

impl BatchStatus {
    /// Every status in declaration order
    pub const ALL: [BatchStatus; 8] = [
        Self::Delta,
        Self::DeltaPending,
        Self::Pending,
        Self::InProgress,
        Self::Completed,
        Self::Conflicted,
        Self::Skipped,
        Self::Obsolete,
    ];

    /// Statuses produced by a scan pass and not yet promoted
    pub const UNPROMOTED: [BatchStatus; 2] = [Self::Delta, Self::DeltaPending];

    /// Statuses discarded by a retry-from-scratch
    pub const IN_FLIGHT: [BatchStatus; 4] =
        [Self::Delta, Self::DeltaPending, Self::Pending, Self::InProgress];

    /// Statuses whose rows may be pruned
    pub const FINISHED: [BatchStatus; 3] = [Self::Completed, Self::Skipped, Self::Obsolete];
}

impl Lifecycle for BatchStatus {
    const ENTITY: &'static str = "batch";

    fn allowed_transitions(self) -> &'static [Self] {
        use BatchStatus::*;
        match self {
            Delta => &[DeltaPending, Obsolete],
            DeltaPending => &[Pending, Obsolete],
            Pending => &[InProgress, Conflicted, Obsolete],
            InProgress => &[Completed, Conflicted, Obsolete],
            Conflicted => &[Pending, Skipped],
            Completed | Skipped | Obsolete => &[],
        }
    }
}

/// Conflict status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStatus {
    /// Waiting for a rule
    #[default]
    Unresolved,
    /// Resolved by a rule
    Resolved,
    /// A handler ran and reported failure; still waits for another rule
    Failed,
    /// A handler asked for a later retry
    ScheduledForRetry,
}

impl ConflictStatus {
    /// Whether the conflict still belongs to the backlog
    ///
    /// A failed conflict keeps its batch held, so it stays listed until a
    /// later rule resolves it.
    #[inline]
    #[must_use]
    pub fn is_open(self) -> bool {
        !matches!(self, Self::Resolved)
    }
}

impl Lifecycle for ConflictStatus {
    const ENTITY: &'static str = "conflict";

    fn allowed_transitions(self) -> &'static [Self] {
        use ConflictStatus::*;
        match self {
            Unresolved => &[Resolved, Failed, ScheduledForRetry],
            ScheduledForRetry => &[Resolved, Failed, Unresolved],
            Failed => &[Resolved, ScheduledForRetry],
            Resolved => &[],
        }
    }
}

/// Link change group status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkGroupStatus {
    /// Persisted by the slicer
    #[default]
    Created,
    /// Ready to be applied to the other side
    ReadyForMigration,
    /// Blocked by an unresolved conflict
    Conflicted,
    /// Applied
    Completed,
}

impl Lifecycle for LinkGroupStatus {
    const ENTITY: &'static str = "link group";

    fn allowed_transitions(self) -> &'static [Self] {
        use LinkGroupStatus::*;
        match self {
            Created => &[ReadyForMigration, Conflicted],
            ReadyForMigration => &[Completed, Conflicted],
            Conflicted => &[ReadyForMigration, Completed],
            Completed => &[],
        }
    }
}
