//! In-memory reference store
//!
//! Thread-safe: watermarks live in a `DashMap`, every other table behind a
//! `parking_lot::RwLock`. Multi-row operations hold the table's write lock
//! for their whole duration, which makes them atomic and serializes writes
//! per (session, stream) trivially.

use crate::error::StoreError;
use crate::traits::{
    BatchQuery, BatchStore, ConflictQuery, ConflictStore, Dedup, LinkStore, Recorded, RuleStore,
    WatermarkKey, WatermarkStore,
};
use bisync_model::{
    ArtifactLink, BatchId, BatchStatus, ChangeBatch, Conflict, ConflictId, ConflictTypeId,
    LinkActionKind, LinkChangeGroup, LinkGroupId, LinkGroupStatus, RuleId, RuleRecord, SessionId,
    SourceId,
};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Store keeping every table in process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    watermarks: DashMap<WatermarkKey, String>,
    batches: RwLock<BTreeMap<BatchId, ChangeBatch>>,
    conflicts: RwLock<BTreeMap<ConflictId, Conflict>>,
    rules: RwLock<Vec<RuleRecord>>,
    links: RwLock<BTreeMap<LinkGroupId, LinkChangeGroup>>,
    next_id: AtomicU64,
}

impl MemoryStore {
    /// Create empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Number of batch rows
    #[must_use]
    pub fn batch_count(&self) -> usize {
        self.batches.read().len()
    }

    /// Number of conflict rows
    #[must_use]
    pub fn conflict_count(&self) -> usize {
        self.conflicts.read().len()
    }
}

impl WatermarkStore for MemoryStore {
    fn load_watermark(&self, key: &WatermarkKey) -> Result<Option<String>, StoreError> {
        Ok(self.watermarks.get(key).map(|v| v.value().clone()))
    }

    fn save_watermark(&self, key: &WatermarkKey, value: &str) -> Result<(), StoreError> {
        self.watermarks.insert(key.clone(), value.to_string());
        Ok(())
    }
}

fn sort_batches(batches: &mut [ChangeBatch]) {
    batches.sort_by_key(|b| (b.execution_order, b.id));
}

impl BatchStore for MemoryStore {
    fn insert_batch(&self, batch: &ChangeBatch) -> Result<BatchId, StoreError> {
        let id = BatchId(self.allocate());
        let mut row = batch.clone();
        row.id = Some(id);
        self.batches.write().insert(id, row);
        tracing::trace!(%id, actions = batch.len(), "batch inserted");
        Ok(id)
    }

    fn batch(&self, id: BatchId) -> Result<ChangeBatch, StoreError> {
        self.batches
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("batch", id))
    }

    fn update_batch(&self, batch: &ChangeBatch) -> Result<(), StoreError> {
        let id = batch.id.ok_or(StoreError::Unsaved { entity: "batch" })?;
        let mut table = self.batches.write();
        let row = table.get_mut(&id).ok_or_else(|| StoreError::not_found("batch", id))?;
        *row = batch.clone();
        Ok(())
    }

    fn batches(&self, query: &BatchQuery) -> Result<Vec<ChangeBatch>, StoreError> {
        let mut out: Vec<_> = self
            .batches
            .read()
            .values()
            .filter(|b| query.matches(b))
            .cloned()
            .collect();
        sort_batches(&mut out);
        Ok(out)
    }

    fn transition_batches(
        &self,
        query: &BatchQuery,
        to: BatchStatus,
    ) -> Result<Vec<BatchId>, StoreError> {
        let mut table = self.batches.write();
        let mut moved = Vec::new();
        for (id, batch) in table.iter_mut() {
            if query.matches(batch) {
                batch.status = to;
                moved.push(*id);
            }
        }
        Ok(moved)
    }

    fn remove_batches(&self, query: &BatchQuery) -> Result<usize, StoreError> {
        let mut table = self.batches.write();
        let before = table.len();
        table.retain(|_, b| !query.matches(b));
        Ok(before - table.len())
    }

    fn max_execution_order(
        &self,
        session: SessionId,
        stream: SourceId,
    ) -> Result<Option<i64>, StoreError> {
        Ok(self
            .batches
            .read()
            .values()
            .filter(|b| b.session == session && b.stream == stream)
            .map(|b| b.execution_order)
            .max())
    }

    fn find_action(
        &self,
        session: SessionId,
        stream: SourceId,
        target: &str,
        version: &str,
    ) -> Result<Option<(BatchId, usize)>, StoreError> {
        let table = self.batches.read();
        let hit = table
            .iter()
            .filter(|(_, b)| {
                b.session == session && b.stream == stream && b.status != BatchStatus::Obsolete
            })
            .find_map(|(id, b)| {
                b.actions
                    .iter()
                    .position(|a| a.records(target, version))
                    .map(|index| (*id, index))
            });
        Ok(hit)
    }
}

impl ConflictStore for MemoryStore {
    fn record_conflict(&self, conflict: &Conflict, dedup: Dedup) -> Result<Recorded, StoreError> {
        let mut table = self.conflicts.write();

        if dedup != Dedup::Insert {
            let ignore_origin = dedup == Dedup::Count;
            let existing = table.values_mut().find(|c| {
                c.status.is_open() && c.same_occurrence(conflict, ignore_origin)
            });
            if let Some(row) = existing {
                if dedup == Dedup::Count {
                    row.count = row.count.saturating_add(1);
                }
                let id = row.id.ok_or(StoreError::Unsaved { entity: "conflict" })?;
                return Ok(Recorded {
                    id,
                    inserted: false,
                    count: row.count,
                });
            }
        }

        let id = ConflictId(self.allocate());
        let mut row = conflict.clone();
        row.id = Some(id);
        let count = row.count;
        table.insert(id, row);
        Ok(Recorded {
            id,
            inserted: true,
            count,
        })
    }

    fn conflict(&self, id: ConflictId) -> Result<Conflict, StoreError> {
        self.conflicts
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("conflict", id))
    }

    fn update_conflict(&self, conflict: &Conflict) -> Result<(), StoreError> {
        let id = conflict.id.ok_or(StoreError::Unsaved { entity: "conflict" })?;
        let mut table = self.conflicts.write();
        let row = table
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("conflict", id))?;
        *row = conflict.clone();
        Ok(())
    }

    fn conflicts(&self, query: &ConflictQuery) -> Result<Vec<Conflict>, StoreError> {
        Ok(self
            .conflicts
            .read()
            .values()
            .filter(|c| query.matches(c))
            .cloned()
            .collect())
    }

    fn latest_conflict_id(&self) -> Result<Option<ConflictId>, StoreError> {
        Ok(self.conflicts.read().keys().next_back().copied())
    }
}

impl RuleStore for MemoryStore {
    fn save_rule(&self, record: &RuleRecord) -> Result<bool, StoreError> {
        let mut table = self.rules.write();
        if table.iter().any(|r| r.rule.id == record.rule.id) {
            return Ok(false);
        }
        table.push(record.clone());
        Ok(true)
    }

    fn rule(&self, id: RuleId) -> Result<RuleRecord, StoreError> {
        self.rules
            .read()
            .iter()
            .find(|r| r.rule.id == id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("rule", id))
    }

    fn rules_for(
        &self,
        session: SessionId,
        type_id: ConflictTypeId,
    ) -> Result<Vec<RuleRecord>, StoreError> {
        Ok(self
            .rules
            .read()
            .iter()
            .filter(|r| r.session == session && r.type_id == type_id)
            .cloned()
            .collect())
    }
}

impl LinkStore for MemoryStore {
    fn insert_link_groups(&self, groups: &[LinkChangeGroup]) -> Result<Vec<LinkGroupId>, StoreError> {
        let mut table = self.links.write();
        let ids = groups
            .iter()
            .map(|group| {
                let id = LinkGroupId(self.allocate());
                let mut row = group.clone();
                row.id = Some(id);
                table.insert(id, row);
                id
            })
            .collect();
        Ok(ids)
    }

    fn link_group(&self, id: LinkGroupId) -> Result<LinkChangeGroup, StoreError> {
        self.links
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("link group", id))
    }

    fn update_link_group(&self, group: &LinkChangeGroup) -> Result<(), StoreError> {
        let id = group.id.ok_or(StoreError::Unsaved { entity: "link group" })?;
        let mut table = self.links.write();
        let row = table
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("link group", id))?;
        *row = group.clone();
        Ok(())
    }

    fn link_groups(
        &self,
        session: SessionId,
        source: SourceId,
        statuses: &[LinkGroupStatus],
    ) -> Result<Vec<LinkChangeGroup>, StoreError> {
        Ok(self
            .links
            .read()
            .values()
            .filter(|g| g.session == session && g.source == source)
            .filter(|g| statuses.is_empty() || statuses.contains(&g.status))
            .cloned()
            .collect())
    }

    fn has_open_link_action(
        &self,
        session: SessionId,
        source: SourceId,
        kind: LinkActionKind,
        link: &ArtifactLink,
    ) -> Result<bool, StoreError> {
        Ok(self.links.read().values().any(|g| {
            g.session == session
                && g.source == source
                && g.status != LinkGroupStatus::Completed
                && g.actions.iter().any(|a| a.kind == kind && &a.link == link)
        }))
    }
}
