//! Change batches and change actions

use crate::error::ModelError;
use crate::ids::{BatchId, SessionId, SourceId};
use crate::kinds::{ActionKind, ContentType};
use crate::lifecycle::BatchStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Processing state of a single action inside a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionState {
    /// Waiting to be applied
    #[default]
    Ready,
    /// Held back by a conflict
    Backlogged,
    /// Dropped by a resolution action
    Skipped,
    /// Applied
    Completed,
}

/// One change to one item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeAction {
    /// What happened
    pub kind: ActionKind,
    /// Item reference (path, URI or work item id, adapter-defined)
    pub target: String,
    /// Version token on the source side
    pub version: String,
    /// Content type tag
    pub content_type: ContentType,
    /// Processing state
    pub state: ActionState,
}

impl ChangeAction {
    /// Create new action in state [`ActionState::Ready`]
    #[inline]
    #[must_use]
    pub fn new(
        kind: ActionKind,
        target: impl Into<String>,
        version: impl Into<String>,
        content_type: ContentType,
    ) -> Self {
        Self {
            kind,
            target: target.into(),
            version: version.into(),
            content_type,
            state: ActionState::Ready,
        }
    }

    /// Whether this action records `target` at `version`
    #[inline]
    #[must_use]
    pub fn records(&self, target: &str, version: &str) -> bool {
        self.target == target && self.version == version
    }
}

/// Ordered set of change actions sharing one execution order key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeBatch {
    /// Row id, assigned on save
    pub id: Option<BatchId>,
    /// Owning session
    pub session: SessionId,
    /// Stream the batch was scanned from
    pub stream: SourceId,
    /// Batch name (changeset number, revision id, ...)
    pub name: String,
    /// Author on the source side
    pub owner: String,
    /// Check-in comment
    pub comment: String,
    /// Source-side timestamp
    pub timestamp: DateTime<Utc>,
    /// Total order key within the stream
    pub execution_order: i64,
    /// Lifecycle status
    pub status: BatchStatus,
    /// Actions in apply order
    pub actions: Vec<ChangeAction>,
}

impl ChangeBatch {
    /// Create new unsaved batch in status [`BatchStatus::Delta`]
    #[must_use]
    pub fn new(session: SessionId, stream: SourceId, execution_order: i64) -> Self {
        Self {
            id: None,
            session,
            stream,
            name: String::new(),
            owner: String::new(),
            comment: String::new(),
            timestamp: Utc::now(),
            execution_order,
            status: BatchStatus::Delta,
            actions: Vec::new(),
        }
    }

    /// With name
    #[inline]
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// With owner
    #[inline]
    #[must_use]
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = owner.into();
        self
    }

    /// With comment
    #[inline]
    #[must_use]
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    /// With source-side timestamp
    #[inline]
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Append an action, returning its index
    pub fn push_action(&mut self, action: ChangeAction) -> usize {
        self.actions.push(action);
        self.actions.len() - 1
    }

    /// Get action by index
    ///
    /// # Errors
    /// Returns [`ModelError::ActionOutOfRange`] if the index is past the end.
    pub fn action(&self, index: usize) -> Result<&ChangeAction, ModelError> {
        self.actions.get(index).ok_or(ModelError::ActionOutOfRange {
            index,
            len: self.actions.len(),
        })
    }

    /// Get mutable action by index
    ///
    /// # Errors
    /// Returns [`ModelError::ActionOutOfRange`] if the index is past the end.
    pub fn action_mut(&mut self, index: usize) -> Result<&mut ChangeAction, ModelError> {
        let len = self.actions.len();
        self.actions
            .get_mut(index)
            .ok_or(ModelError::ActionOutOfRange { index, len })
    }

    /// Whether any action is held back by a conflict
    #[inline]
    #[must_use]
    pub fn has_backlogged_actions(&self) -> bool {
        self.actions.iter().any(|a| a.state == ActionState::Backlogged)
    }

    /// Whether the batch has been persisted
    #[inline]
    #[must_use]
    pub fn is_saved(&self) -> bool {
        self.id.is_some()
    }

    /// Number of actions
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Whether the batch has no actions
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}
