//! Persistence collaborator contracts
//!
//! The engine defines operation shapes only. Every method is synchronous
//! and may block on I/O. Implementations must serialize writes per
//! (session, stream) key and make each multi-row operation atomic.

use crate::error::StoreError;
use bisync_model::{
    BatchId, BatchStatus, ChangeBatch, Conflict, ConflictId, ConflictStatus, ConflictTypeId,
    LinkActionKind, ArtifactLink, LinkChangeGroup, LinkGroupId, LinkGroupStatus, RuleId,
    RuleRecord, SessionId, SourceId,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// High-water mark row key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WatermarkKey {
    /// Owning session
    pub session: SessionId,
    /// Source being scanned
    pub source: SourceId,
    /// Named stream within the source (content, links, ...)
    pub name: String,
}

impl WatermarkKey {
    /// Create new key
    #[inline]
    #[must_use]
    pub fn new(session: SessionId, source: SourceId, name: impl Into<String>) -> Self {
        Self {
            session,
            source,
            name: name.into(),
        }
    }
}

impl fmt::Display for WatermarkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.session, self.source, self.name)
    }
}

/// High-water mark rows, persisted as strings
pub trait WatermarkStore: Send + Sync + fmt::Debug {
    /// Load a value; `None` if never written
    ///
    /// # Errors
    /// Backend failure.
    fn load_watermark(&self, key: &WatermarkKey) -> Result<Option<String>, StoreError>;

    /// Write a value
    ///
    /// # Errors
    /// Backend failure.
    fn save_watermark(&self, key: &WatermarkKey, value: &str) -> Result<(), StoreError>;
}

/// Batch selection filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchQuery {
    /// Owning session
    pub session: SessionId,
    /// Restrict to one stream
    pub stream: Option<SourceId>,
    /// Restrict to these statuses (empty means any)
    pub statuses: Vec<BatchStatus>,
}

impl BatchQuery {
    /// All batches of a session
    #[inline]
    #[must_use]
    pub fn session(session: SessionId) -> Self {
        Self {
            session,
            stream: None,
            statuses: Vec::new(),
        }
    }

    /// Restrict to one stream
    #[inline]
    #[must_use]
    pub fn with_stream(mut self, stream: SourceId) -> Self {
        self.stream = Some(stream);
        self
    }

    /// Restrict to some statuses
    #[inline]
    #[must_use]
    pub fn with_statuses(mut self, statuses: &[BatchStatus]) -> Self {
        self.statuses = statuses.to_vec();
        self
    }

    /// Whether a batch passes the filter
    #[must_use]
    pub fn matches(&self, batch: &ChangeBatch) -> bool {
        batch.session == self.session
            && self.stream.map_or(true, |s| s == batch.stream)
            && (self.statuses.is_empty() || self.statuses.contains(&batch.status))
    }
}

/// Change batch rows
pub trait BatchStore: Send + Sync + fmt::Debug {
    /// Insert a batch and its actions atomically, returning the new id
    ///
    /// # Errors
    /// Backend failure.
    fn insert_batch(&self, batch: &ChangeBatch) -> Result<BatchId, StoreError>;

    /// Fetch a batch
    ///
    /// # Errors
    /// [`StoreError::NotFound`] if absent.
    fn batch(&self, id: BatchId) -> Result<ChangeBatch, StoreError>;

    /// Overwrite a saved batch (status and action states)
    ///
    /// # Errors
    /// [`StoreError::Unsaved`] without an id, [`StoreError::NotFound`] if absent.
    fn update_batch(&self, batch: &ChangeBatch) -> Result<(), StoreError>;

    /// Batches matching a query, ordered by execution order then id
    ///
    /// # Errors
    /// Backend failure.
    fn batches(&self, query: &BatchQuery) -> Result<Vec<ChangeBatch>, StoreError>;

    /// Move every batch matching `query` to `to` in one atomic step
    ///
    /// Returns the ids that moved.
    ///
    /// # Errors
    /// Backend failure.
    fn transition_batches(
        &self,
        query: &BatchQuery,
        to: BatchStatus,
    ) -> Result<Vec<BatchId>, StoreError>;

    /// Delete every batch matching `query`, returning how many went
    ///
    /// # Errors
    /// Backend failure.
    fn remove_batches(&self, query: &BatchQuery) -> Result<usize, StoreError>;

    /// Highest execution order used on a stream
    ///
    /// # Errors
    /// Backend failure.
    fn max_execution_order(
        &self,
        session: SessionId,
        stream: SourceId,
    ) -> Result<Option<i64>, StoreError>;

    /// Locate a live action recording `target` at `version`
    ///
    /// Obsolete batches are ignored so a retry-from-scratch can re-record.
    ///
    /// # Errors
    /// Backend failure.
    fn find_action(
        &self,
        session: SessionId,
        stream: SourceId,
        target: &str,
        version: &str,
    ) -> Result<Option<(BatchId, usize)>, StoreError>;
}

/// Conflict selection filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictQuery {
    /// Owning session
    pub session: SessionId,
    /// Restrict to one source
    pub source: Option<SourceId>,
    /// Restrict to one type
    pub type_id: Option<ConflictTypeId>,
    /// Restrict to these statuses (empty means any)
    pub statuses: Vec<ConflictStatus>,
    /// Restrict to rows inserted up to and including this id
    pub up_to: Option<ConflictId>,
}

impl ConflictQuery {
    /// All conflicts of a session
    #[inline]
    #[must_use]
    pub fn session(session: SessionId) -> Self {
        Self {
            session,
            source: None,
            type_id: None,
            statuses: Vec::new(),
            up_to: None,
        }
    }

    /// Only open conflicts (anything not yet resolved)
    #[inline]
    #[must_use]
    pub fn open(session: SessionId) -> Self {
        Self::session(session).with_statuses(&[
            ConflictStatus::Unresolved,
            ConflictStatus::Failed,
            ConflictStatus::ScheduledForRetry,
        ])
    }

    /// Restrict to one source
    #[inline]
    #[must_use]
    pub fn with_source(mut self, source: SourceId) -> Self {
        self.source = Some(source);
        self
    }

    /// Restrict to one type
    #[inline]
    #[must_use]
    pub fn with_type(mut self, type_id: ConflictTypeId) -> Self {
        self.type_id = Some(type_id);
        self
    }

    /// Restrict to some statuses
    #[inline]
    #[must_use]
    pub fn with_statuses(mut self, statuses: &[ConflictStatus]) -> Self {
        self.statuses = statuses.to_vec();
        self
    }

    /// Restrict to rows that existed when `id` was the newest
    #[inline]
    #[must_use]
    pub fn up_to(mut self, id: ConflictId) -> Self {
        self.up_to = Some(id);
        self
    }

    /// Whether a conflict passes the filter
    #[must_use]
    pub fn matches(&self, conflict: &Conflict) -> bool {
        conflict.session == self.session
            && self.source.map_or(true, |s| s == conflict.source)
            && self.type_id.map_or(true, |t| t == conflict.type_id)
            && (self.statuses.is_empty() || self.statuses.contains(&conflict.status))
            && match (self.up_to, conflict.id) {
                (Some(limit), Some(id)) => id <= limit,
                _ => true,
            }
    }
}

/// How a new conflict folds into existing open rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dedup {
    /// Always insert
    Insert,
    /// Reuse an open row with the same occurrence (origin included)
    #[default]
    Reuse,
    /// Increment the count of an open row with the same occurrence (origin ignored)
    Count,
}

/// Result of [`ConflictStore::record_conflict`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Recorded {
    /// Row holding the occurrence
    pub id: ConflictId,
    /// Whether a new row was created
    pub inserted: bool,
    /// Occurrence count after recording
    pub count: u32,
}

/// Conflict rows
pub trait ConflictStore: Send + Sync + fmt::Debug {
    /// Record an occurrence atomically, folding it per `dedup`
    ///
    /// # Errors
    /// Backend failure.
    fn record_conflict(&self, conflict: &Conflict, dedup: Dedup) -> Result<Recorded, StoreError>;

    /// Fetch a conflict
    ///
    /// # Errors
    /// [`StoreError::NotFound`] if absent.
    fn conflict(&self, id: ConflictId) -> Result<Conflict, StoreError>;

    /// Overwrite a saved conflict
    ///
    /// # Errors
    /// [`StoreError::Unsaved`] without an id, [`StoreError::NotFound`] if absent.
    fn update_conflict(&self, conflict: &Conflict) -> Result<(), StoreError>;

    /// Conflicts matching a query, ordered by id
    ///
    /// # Errors
    /// Backend failure.
    fn conflicts(&self, query: &ConflictQuery) -> Result<Vec<Conflict>, StoreError>;

    /// Newest conflict id, if any row exists
    ///
    /// # Errors
    /// Backend failure.
    fn latest_conflict_id(&self) -> Result<Option<ConflictId>, StoreError>;
}

/// Resolution rule rows
pub trait RuleStore: Send + Sync + fmt::Debug {
    /// Persist a rule (idempotent on rule id)
    ///
    /// Returns `true` if the rule was new.
    ///
    /// # Errors
    /// Backend failure.
    fn save_rule(&self, record: &RuleRecord) -> Result<bool, StoreError>;

    /// Fetch a rule
    ///
    /// # Errors
    /// [`StoreError::NotFound`] if absent.
    fn rule(&self, id: RuleId) -> Result<RuleRecord, StoreError>;

    /// Rules for one session and conflict type, in authoring order
    ///
    /// # Errors
    /// Backend failure.
    fn rules_for(
        &self,
        session: SessionId,
        type_id: ConflictTypeId,
    ) -> Result<Vec<RuleRecord>, StoreError>;
}

/// Link change group rows
pub trait LinkStore: Send + Sync + fmt::Debug {
    /// Insert groups atomically, returning their ids in input order
    ///
    /// # Errors
    /// Backend failure.
    fn insert_link_groups(&self, groups: &[LinkChangeGroup]) -> Result<Vec<LinkGroupId>, StoreError>;

    /// Fetch a group
    ///
    /// # Errors
    /// [`StoreError::NotFound`] if absent.
    fn link_group(&self, id: LinkGroupId) -> Result<LinkChangeGroup, StoreError>;

    /// Overwrite a saved group
    ///
    /// # Errors
    /// [`StoreError::Unsaved`] without an id, [`StoreError::NotFound`] if absent.
    fn update_link_group(&self, group: &LinkChangeGroup) -> Result<(), StoreError>;

    /// Groups of a source in the given statuses (empty means any), ordered by id
    ///
    /// # Errors
    /// Backend failure.
    fn link_groups(
        &self,
        session: SessionId,
        source: SourceId,
        statuses: &[LinkGroupStatus],
    ) -> Result<Vec<LinkChangeGroup>, StoreError>;

    /// Whether a matching action exists in a group that is not completed
    ///
    /// # Errors
    /// Backend failure.
    fn has_open_link_action(
        &self,
        session: SessionId,
        source: SourceId,
        kind: LinkActionKind,
        link: &ArtifactLink,
    ) -> Result<bool, StoreError>;
}

/// Everything the engine persists
pub trait SyncStore: WatermarkStore + BatchStore + ConflictStore + RuleStore + LinkStore {}

impl<T> SyncStore for T where T: WatermarkStore + BatchStore + ConflictStore + RuleStore + LinkStore {}
