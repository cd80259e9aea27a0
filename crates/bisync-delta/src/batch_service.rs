//! Change batch lifecycle
//!
//! [`ChangeBatchService`] owns batches from creation until they complete or
//! are discarded. Scanning produces `Delta` batches; promotion makes a whole
//! pass visible at once; consumption walks `Pending` batches per stream in
//! execution order and stops at the first `Conflicted` one.

use crate::error::DeltaError;
use bisync_model::{
    validate_transition, ActionKind, ActionState, BatchId, BatchStatus, ChangeAction,
    ChangeBatch, ContentType, SessionId, SourceId,
};
use bisync_store::{BatchQuery, SyncStore};
use std::sync::Arc;

/// Creates, sequences and persists change batches for one session
#[derive(Debug, Clone)]
pub struct ChangeBatchService {
    store: Arc<dyn SyncStore>,
    session: SessionId,
}

impl ChangeBatchService {
    /// Create service for a session
    #[must_use]
    pub fn new(store: Arc<dyn SyncStore>, session: SessionId) -> Self {
        Self { store, session }
    }

    /// Owning session
    #[inline]
    #[must_use]
    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Start a new, unsaved batch in status `Delta`
    #[must_use]
    pub fn create_batch(&self, stream: SourceId, execution_order: i64) -> ChangeBatch {
        ChangeBatch::new(self.session, stream, execution_order)
    }

    /// Execution order following the highest one used on `stream`
    ///
    /// # Errors
    /// Store failure.
    pub fn next_execution_order(&self, stream: SourceId) -> Result<i64, DeltaError> {
        Ok(self
            .store
            .max_execution_order(self.session, stream)?
            .map_or(1, |max| max + 1))
    }

    /// Append an action to an unsaved batch, returning its index
    ///
    /// # Errors
    /// [`DeltaError::AlreadySaved`] once the batch is persisted.
    pub fn append_action(
        &self,
        batch: &mut ChangeBatch,
        kind: ActionKind,
        target: impl Into<String>,
        version: impl Into<String>,
        content_type: ContentType,
    ) -> Result<usize, DeltaError> {
        if let Some(id) = batch.id {
            return Err(DeltaError::AlreadySaved(id));
        }
        Ok(batch.push_action(ChangeAction::new(kind, target, version, content_type)))
    }

    /// Persist a batch and its actions atomically
    ///
    /// # Errors
    /// [`DeltaError::AlreadySaved`] for a persisted batch,
    /// [`DeltaError::ForeignBatch`] for another session's batch, store failure.
    pub fn save(&self, batch: &mut ChangeBatch) -> Result<BatchId, DeltaError> {
        if let Some(id) = batch.id {
            return Err(DeltaError::AlreadySaved(id));
        }
        if batch.session != self.session {
            return Err(DeltaError::ForeignBatch);
        }
        let id = self.store.insert_batch(batch)?;
        batch.id = Some(id);
        tracing::debug!(%id, stream = %batch.stream, order = batch.execution_order, "batch saved");
        Ok(id)
    }

    /// Whether a live action already records `target` at `version`
    ///
    /// Adapters call this before creating an action so re-scans stay idempotent.
    ///
    /// # Errors
    /// Store failure.
    pub fn is_recorded(
        &self,
        stream: SourceId,
        target: &str,
        version: &str,
    ) -> Result<bool, DeltaError> {
        Ok(self
            .store
            .find_action(self.session, stream, target, version)?
            .is_some())
    }

    /// Make every unpromoted batch of the session visible as `Pending`
    ///
    /// # Errors
    /// Store failure.
    pub fn promote_delta_to_pending(&self) -> Result<usize, DeltaError> {
        self.promote(BatchQuery::session(self.session))
    }

    /// Make every unpromoted batch of one stream visible as `Pending`
    ///
    /// # Errors
    /// Store failure.
    pub fn promote_stream(&self, stream: SourceId) -> Result<usize, DeltaError> {
        self.promote(BatchQuery::session(self.session).with_stream(stream))
    }

    fn promote(&self, scope: BatchQuery) -> Result<usize, DeltaError> {
        // Rows left in DeltaPending by an interrupted promotion are picked up here too.
        self.store.transition_batches(
            &scope.clone().with_statuses(&[BatchStatus::Delta]),
            BatchStatus::DeltaPending,
        )?;
        let promoted = self.store.transition_batches(
            &scope.with_statuses(&[BatchStatus::DeltaPending]),
            BatchStatus::Pending,
        )?;
        tracing::info!(session = %self.session, promoted = promoted.len(), "delta promoted to pending");
        Ok(promoted.len())
    }

    /// Drop consumed rows (completed, skipped, obsolete) of a stream
    ///
    /// # Errors
    /// Store failure.
    pub fn mark_delta_completed(&self, stream: SourceId) -> Result<usize, DeltaError> {
        let removed = self.store.remove_batches(
            &BatchQuery::session(self.session)
                .with_stream(stream)
                .with_statuses(&BatchStatus::FINISHED),
        )?;
        tracing::debug!(%stream, removed, "consumed batches pruned");
        Ok(removed)
    }

    /// Discard every in-flight batch of a stream for a retry from scratch
    ///
    /// Delta, pending and in-progress batches become `Obsolete`. Callers
    /// must re-scan; nothing discarded here survives.
    ///
    /// # Errors
    /// Store failure.
    pub fn remove_in_progress_change_groups(&self, stream: SourceId) -> Result<usize, DeltaError> {
        let discarded = self.store.transition_batches(
            &BatchQuery::session(self.session)
                .with_stream(stream)
                .with_statuses(&BatchStatus::IN_FLIGHT),
            BatchStatus::Obsolete,
        )?;
        tracing::info!(%stream, discarded = discarded.len(), "in-flight batches discarded");
        Ok(discarded.len())
    }

    /// Fetch a batch
    ///
    /// # Errors
    /// Store failure or unknown id.
    pub fn batch(&self, id: BatchId) -> Result<ChangeBatch, DeltaError> {
        Ok(self.store.batch(id)?)
    }

    /// Batches in the given statuses, optionally restricted to one stream
    ///
    /// # Errors
    /// Store failure.
    pub fn batches(
        &self,
        stream: Option<SourceId>,
        statuses: &[BatchStatus],
    ) -> Result<Vec<ChangeBatch>, DeltaError> {
        let mut query = BatchQuery::session(self.session).with_statuses(statuses);
        query.stream = stream;
        Ok(self.store.batches(&query)?)
    }

    /// `Pending` batches in execution order
    ///
    /// # Errors
    /// Store failure.
    pub fn pending(&self, stream: Option<SourceId>) -> Result<Vec<ChangeBatch>, DeltaError> {
        self.batches(stream, &[BatchStatus::Pending])
    }

    /// Earliest `Pending` batch of a stream, unless a `Conflicted` batch precedes it
    ///
    /// # Errors
    /// Store failure.
    pub fn next_pending(&self, stream: SourceId) -> Result<Option<ChangeBatch>, DeltaError> {
        let rows = self.batches(Some(stream), &[BatchStatus::Pending, BatchStatus::Conflicted])?;
        match rows.into_iter().next() {
            Some(batch) if batch.status == BatchStatus::Pending => Ok(Some(batch)),
            Some(blocker) => {
                tracing::debug!(%stream, blocker = ?blocker.id, "stream blocked by conflicted batch");
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// Whether a `Conflicted` batch holds up a stream
    ///
    /// # Errors
    /// Store failure.
    pub fn is_stream_blocked(&self, stream: SourceId) -> Result<bool, DeltaError> {
        Ok(!self.batches(Some(stream), &[BatchStatus::Conflicted])?.is_empty())
    }

    /// `Pending` → `InProgress`
    ///
    /// # Errors
    /// Illegal transition or store failure.
    pub fn begin(&self, id: BatchId) -> Result<ChangeBatch, DeltaError> {
        self.transition(id, BatchStatus::InProgress)
    }

    /// `InProgress` → `Completed`; every ready action is marked completed
    ///
    /// # Errors
    /// Illegal transition or store failure.
    pub fn complete(&self, id: BatchId) -> Result<ChangeBatch, DeltaError> {
        let mut batch = self.store.batch(id)?;
        validate_transition(batch.status, BatchStatus::Completed)?;
        for action in batch.actions.iter_mut().filter(|a| a.state == ActionState::Ready) {
            action.state = ActionState::Completed;
        }
        batch.status = BatchStatus::Completed;
        self.store.update_batch(&batch)?;
        tracing::debug!(%id, "batch completed");
        Ok(batch)
    }

    /// → `Conflicted`; blocks later batches of the same stream
    ///
    /// Idempotent for a batch that is already conflicted.
    ///
    /// # Errors
    /// Illegal transition or store failure.
    pub fn mark_conflicted(&self, id: BatchId) -> Result<ChangeBatch, DeltaError> {
        let batch = self.store.batch(id)?;
        if batch.status == BatchStatus::Conflicted {
            return Ok(batch);
        }
        self.transition(id, BatchStatus::Conflicted)
    }

    /// `Conflicted` → `Pending`
    ///
    /// # Errors
    /// Illegal transition or store failure.
    pub fn reactivate(&self, id: BatchId) -> Result<ChangeBatch, DeltaError> {
        self.transition(id, BatchStatus::Pending)
    }

    /// `Conflicted` → `Skipped`; remaining actions are skipped
    ///
    /// # Errors
    /// Illegal transition or store failure.
    pub fn skip(&self, id: BatchId) -> Result<ChangeBatch, DeltaError> {
        let mut batch = self.store.batch(id)?;
        validate_transition(batch.status, BatchStatus::Skipped)?;
        for action in batch
            .actions
            .iter_mut()
            .filter(|a| a.state != ActionState::Completed)
        {
            action.state = ActionState::Skipped;
        }
        batch.status = BatchStatus::Skipped;
        self.store.update_batch(&batch)?;
        tracing::info!(%id, "batch skipped");
        Ok(batch)
    }

    /// Hold back one action because a conflict was raised on it
    ///
    /// # Errors
    /// Unknown batch, index out of range, or store failure.
    pub fn backlog_action(&self, id: BatchId, index: usize) -> Result<ChangeBatch, DeltaError> {
        self.set_action_state(id, index, ActionState::Backlogged)
    }

    /// Release a backlogged action into `state`
    ///
    /// # Errors
    /// Unknown batch, index out of range, or store failure.
    pub fn release_action(
        &self,
        id: BatchId,
        index: usize,
        state: ActionState,
    ) -> Result<ChangeBatch, DeltaError> {
        self.set_action_state(id, index, state)
    }

    /// Mark one applied action completed while its batch is still running
    ///
    /// # Errors
    /// Unknown batch, index out of range, or store failure.
    pub fn complete_action(&self, id: BatchId, index: usize) -> Result<ChangeBatch, DeltaError> {
        self.set_action_state(id, index, ActionState::Completed)
    }

    fn set_action_state(
        &self,
        id: BatchId,
        index: usize,
        state: ActionState,
    ) -> Result<ChangeBatch, DeltaError> {
        let mut batch = self.store.batch(id)?;
        batch.action_mut(index)?.state = state;
        self.store.update_batch(&batch)?;
        Ok(batch)
    }

    fn transition(&self, id: BatchId, to: BatchStatus) -> Result<ChangeBatch, DeltaError> {
        let mut batch = self.store.batch(id)?;
        validate_transition(batch.status, to)?;
        let from = batch.status;
        batch.status = to;
        self.store.update_batch(&batch)?;
        tracing::debug!(%id, ?from, ?to, "batch transition");
        Ok(batch)
    }
}
