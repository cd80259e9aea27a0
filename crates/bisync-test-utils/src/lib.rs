//! Testing utilities for the bisync workspace
//!
//! Shared fixtures, batch builders and a store that fails on demand.

#![allow(missing_docs)]

use bisync_delta::ChangeBatchService;
use bisync_model::{
    ActionKind, ArtifactLink, BatchId, BatchStatus, ChangeAction, ChangeBatch, Conflict,
    ConflictId, ConflictTypeId, ContentType, LinkActionKind, LinkChangeGroup, LinkGroupId,
    LinkChangeAction, LinkGroupStatus, RuleId, RuleRecord, SessionId, SourceId,
};
use bisync_store::{
    BatchQuery, BatchStore, ConflictQuery, ConflictStore, Dedup, LinkStore, MemoryStore, Recorded,
    RuleStore, StoreError, SyncStore, WatermarkKey, WatermarkStore,
};
use parking_lot::Mutex;
use std::sync::Arc;

pub fn edit(target: &str, version: &str) -> ChangeAction {
    ChangeAction::new(ActionKind::Edit, target, version, ContentType::File)
}

pub fn add(target: &str, version: &str) -> ChangeAction {
    ChangeAction::new(ActionKind::Add, target, version, ContentType::File)
}

/// One session and source over a fresh in-memory store
#[derive(Debug, Clone)]
pub struct Fixture {
    pub memory: Arc<MemoryStore>,
    pub store: Arc<dyn SyncStore>,
    pub session: SessionId,
    pub source: SourceId,
}

impl Default for Fixture {
    fn default() -> Self {
        Self::new()
    }
}

impl Fixture {
    pub fn new() -> Self {
        let memory = Arc::new(MemoryStore::new());
        Self {
            store: memory.clone(),
            memory,
            session: SessionId::new(),
            source: SourceId::new(),
        }
    }

    pub fn batches(&self) -> ChangeBatchService {
        ChangeBatchService::new(self.store.clone(), self.session)
    }

    /// Save a batch of `actions` and promote it to `Pending`
    pub fn pending_batch(&self, actions: Vec<ChangeAction>) -> BatchId {
        let batches = self.batches();
        let order = batches.next_execution_order(self.source).unwrap();
        let mut batch = batches.create_batch(self.source, order).with_name(format!("C{order}"));
        for action in actions {
            batch.push_action(action);
        }
        let id = batches.save(&mut batch).unwrap();
        batches.promote_stream(self.source).unwrap();
        id
    }

    /// Save a pending batch and move it to `InProgress`
    pub fn in_progress_batch(&self, actions: Vec<ChangeAction>) -> BatchId {
        let id = self.pending_batch(actions);
        self.batches().begin(id).unwrap();
        id
    }

    pub fn batch(&self, id: BatchId) -> ChangeBatch {
        self.store.batch(id).unwrap()
    }

    pub fn batch_status(&self, id: BatchId) -> BatchStatus {
        self.batch(id).status
    }

    pub fn conflict(&self, id: ConflictId) -> Conflict {
        self.store.conflict(id).unwrap()
    }

    /// Insert a freshly sliced link group
    pub fn link_group(&self, name: &str, links: &[(&str, &str)]) -> LinkGroupId {
        let mut group = LinkChangeGroup::new(self.session, self.source, name);
        for (from, to) in links {
            group.actions.push(LinkChangeAction::new(
                LinkActionKind::Add,
                ArtifactLink::new(*from, *to, "related"),
            ));
        }
        let ids = self.store.insert_link_groups(&[group]).unwrap();
        ids[0]
    }
}

/// Wraps a [`MemoryStore`]; every write fails while armed
#[derive(Debug, Default)]
pub struct FaultyStore {
    inner: MemoryStore,
    failure: Mutex<Option<String>>,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every subsequent write with `message`
    pub fn arm(&self, message: &str) {
        *self.failure.lock() = Some(message.to_string());
    }

    pub fn disarm(&self) {
        *self.failure.lock() = None;
    }

    fn check(&self) -> Result<(), StoreError> {
        match self.failure.lock().as_deref() {
            Some(message) => Err(StoreError::backend(message)),
            None => Ok(()),
        }
    }
}

impl WatermarkStore for FaultyStore {
    fn load_watermark(&self, key: &WatermarkKey) -> Result<Option<String>, StoreError> {
        self.inner.load_watermark(key)
    }

    fn save_watermark(&self, key: &WatermarkKey, value: &str) -> Result<(), StoreError> {
        self.check()?;
        self.inner.save_watermark(key, value)
    }
}

impl BatchStore for FaultyStore {
    fn insert_batch(&self, batch: &ChangeBatch) -> Result<BatchId, StoreError> {
        self.check()?;
        self.inner.insert_batch(batch)
    }

    fn batch(&self, id: BatchId) -> Result<ChangeBatch, StoreError> {
        self.inner.batch(id)
    }

    fn update_batch(&self, batch: &ChangeBatch) -> Result<(), StoreError> {
        self.check()?;
        self.inner.update_batch(batch)
    }

    fn batches(&self, query: &BatchQuery) -> Result<Vec<ChangeBatch>, StoreError> {
        self.inner.batches(query)
    }

    fn transition_batches(&self, query: &BatchQuery, to: BatchStatus) -> Result<Vec<BatchId>, StoreError> {
        self.check()?;
        self.inner.transition_batches(query, to)
    }

    fn remove_batches(&self, query: &BatchQuery) -> Result<usize, StoreError> {
        self.check()?;
        self.inner.remove_batches(query)
    }

    fn max_execution_order(&self, session: SessionId, stream: SourceId) -> Result<Option<i64>, StoreError> {
        self.inner.max_execution_order(session, stream)
    }

    fn find_action(
        &self,
        session: SessionId,
        stream: SourceId,
        target: &str,
        version: &str,
    ) -> Result<Option<(BatchId, usize)>, StoreError> {
        self.inner.find_action(session, stream, target, version)
    }
}

impl ConflictStore for FaultyStore {
    fn record_conflict(&self, conflict: &Conflict, dedup: Dedup) -> Result<Recorded, StoreError> {
        self.check()?;
        self.inner.record_conflict(conflict, dedup)
    }

    fn conflict(&self, id: ConflictId) -> Result<Conflict, StoreError> {
        self.inner.conflict(id)
    }

    fn update_conflict(&self, conflict: &Conflict) -> Result<(), StoreError> {
        self.check()?;
        self.inner.update_conflict(conflict)
    }

    fn conflicts(&self, query: &ConflictQuery) -> Result<Vec<Conflict>, StoreError> {
        self.inner.conflicts(query)
    }

    fn latest_conflict_id(&self) -> Result<Option<ConflictId>, StoreError> {
        self.inner.latest_conflict_id()
    }
}

impl RuleStore for FaultyStore {
    fn save_rule(&self, record: &RuleRecord) -> Result<bool, StoreError> {
        self.check()?;
        self.inner.save_rule(record)
    }

    fn rule(&self, id: RuleId) -> Result<RuleRecord, StoreError> {
        self.inner.rule(id)
    }

    fn rules_for(&self, session: SessionId, type_id: ConflictTypeId) -> Result<Vec<RuleRecord>, StoreError> {
        self.inner.rules_for(session, type_id)
    }
}

impl LinkStore for FaultyStore {
    fn insert_link_groups(&self, groups: &[LinkChangeGroup]) -> Result<Vec<LinkGroupId>, StoreError> {
        self.check()?;
        self.inner.insert_link_groups(groups)
    }

    fn link_group(&self, id: LinkGroupId) -> Result<LinkChangeGroup, StoreError> {
        self.inner.link_group(id)
    }

    fn update_link_group(&self, group: &LinkChangeGroup) -> Result<(), StoreError> {
        self.check()?;
        self.inner.update_link_group(group)
    }

    fn link_groups(
        &self,
        session: SessionId,
        source: SourceId,
        statuses: &[LinkGroupStatus],
    ) -> Result<Vec<LinkChangeGroup>, StoreError> {
        self.inner.link_groups(session, source, statuses)
    }

    fn has_open_link_action(
        &self,
        session: SessionId,
        source: SourceId,
        kind: LinkActionKind,
        link: &ArtifactLink,
    ) -> Result<bool, StoreError> {
        self.inner.has_open_link_action(session, source, kind, link)
    }
}
