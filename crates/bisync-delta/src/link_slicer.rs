//! Link delta slicing
//!
//! Links are scanned on their own watermark so link and content passes
//! can run at different cadences. Changes are consolidated into one
//! [`LinkChangeGroup`] per source artifact and spilled to storage every
//! time the accumulated action count reaches the slice size.

use crate::error::DeltaError;
use crate::watermark::HighWaterMark;
use crate::window::ScanWindow;
use bisync_model::{
    validate_transition, LinkChangeAction, LinkChangeGroup, LinkGroupId, LinkGroupStatus,
    SessionId, SourceId,
};
use bisync_store::{SyncStore, WatermarkKey};
use chrono::{DateTime, Duration, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Watermark name used for link scanning
pub const LINK_WATERMARK: &str = "links";

/// An artifact whose links may have changed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedItem {
    /// Artifact reference
    pub artifact: String,
    /// Last change time on the source side
    pub changed_at: DateTime<Utc>,
}

impl ChangedItem {
    /// Create new item
    #[inline]
    #[must_use]
    pub fn new(artifact: impl Into<String>, changed_at: DateTime<Utc>) -> Self {
        Self {
            artifact: artifact.into(),
            changed_at,
        }
    }
}

/// Adapter side of link scanning
pub trait LinkChangeSource {
    /// Artifacts changed inside `window`
    ///
    /// # Errors
    /// Any adapter failure.
    fn changed_items(&self, window: &ScanWindow<DateTime<Utc>>) -> anyhow::Result<Vec<ChangedItem>>;

    /// Link additions and removals for one artifact
    ///
    /// # Errors
    /// Any adapter failure.
    fn link_changes(&self, item: &ChangedItem) -> anyhow::Result<Vec<LinkChangeAction>>;
}

/// Slicer tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkSlicerConfig {
    /// Action count that triggers a spill to storage
    pub max_slice_size: usize,
    /// Seconds subtracted from the watermark to tolerate clock skew
    pub lookback_secs: i64,
}

impl LinkSlicerConfig {
    /// Create default config
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With slice size
    #[inline]
    #[must_use]
    pub fn with_max_slice_size(mut self, size: usize) -> Self {
        self.max_slice_size = size;
        self
    }

    /// With look-back
    #[inline]
    #[must_use]
    pub fn with_lookback_secs(mut self, secs: i64) -> Self {
        self.lookback_secs = secs;
        self
    }
}

impl Default for LinkSlicerConfig {
    fn default() -> Self {
        Self {
            max_slice_size: 500,
            lookback_secs: 60,
        }
    }
}

/// Outcome of one slice
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkSlice {
    /// Groups persisted, in spill order
    pub groups: Vec<LinkGroupId>,
    /// Actions persisted
    pub actions: usize,
    /// Items examined
    pub items: usize,
    /// Number of spills to storage
    pub flushes: usize,
}

/// Scans link changes for one source
#[derive(Debug)]
pub struct LinkDeltaSlicer {
    store: Arc<dyn SyncStore>,
    session: SessionId,
    source: SourceId,
    watermark: HighWaterMark<DateTime<Utc>>,
    config: LinkSlicerConfig,
}

impl LinkDeltaSlicer {
    /// Create slicer for a source
    #[must_use]
    pub fn new(
        store: Arc<dyn SyncStore>,
        session: SessionId,
        source: SourceId,
        config: LinkSlicerConfig,
    ) -> Self {
        let key = WatermarkKey::new(session, source, LINK_WATERMARK);
        Self {
            watermark: HighWaterMark::new(store.clone(), key),
            store,
            session,
            source,
            config,
        }
    }

    /// Current link watermark (as last loaded)
    #[inline]
    #[must_use]
    pub fn watermark(&self) -> &DateTime<Utc> {
        self.watermark.value()
    }

    /// Scan with the configured slice size and `now` as cutoff
    ///
    /// # Errors
    /// See [`next_slice_at`](Self::next_slice_at).
    pub fn next_slice(&mut self, source: &dyn LinkChangeSource) -> Result<LinkSlice, DeltaError> {
        self.next_slice_at(source, self.config.max_slice_size, Utc::now())
    }

    /// Scan items changed in `(watermark - lookback, cutoff]`
    ///
    /// Groups are persisted whenever `max_size` actions have accumulated and
    /// once more at the end; the watermark moves to `cutoff` only after the
    /// last spill succeeded.
    ///
    /// # Errors
    /// [`DeltaError::InvalidSliceSize`] for a zero size, adapter or store failure.
    pub fn next_slice_at(
        &mut self,
        source: &dyn LinkChangeSource,
        max_size: usize,
        cutoff: DateTime<Utc>,
    ) -> Result<LinkSlice, DeltaError> {
        if max_size == 0 {
            return Err(DeltaError::InvalidSliceSize);
        }
        let lower = *self.watermark.reload()?;
        let window = ScanWindow::new(lower, cutoff)
            .with_lookback(Duration::seconds(self.config.lookback_secs));

        let mut slice = LinkSlice::default();
        let mut buffer: Vec<LinkChangeGroup> = Vec::new();
        let mut accumulated = 0usize;

        for item in source.changed_items(&window)? {
            if !window.contains(&item.changed_at) {
                continue;
            }
            slice.items += 1;
            let actions = source.link_changes(&item)?;
            for group in self.consolidate(&item, actions, &buffer)? {
                accumulated += group.len();
                buffer.push(group);
                if accumulated >= max_size {
                    self.flush(&mut buffer, &mut slice)?;
                    accumulated = 0;
                }
            }
        }
        self.flush(&mut buffer, &mut slice)?;

        if cutoff > *self.watermark.value() {
            self.watermark.update(cutoff)?;
        }
        tracing::info!(
            source = %self.source,
            items = slice.items,
            groups = slice.groups.len(),
            actions = slice.actions,
            "link slice generated"
        );
        Ok(slice)
    }

    /// One group per source artifact, the item's own group first; duplicates dropped
    fn consolidate(
        &self,
        item: &ChangedItem,
        actions: Vec<LinkChangeAction>,
        buffered: &[LinkChangeGroup],
    ) -> Result<Vec<LinkChangeGroup>, DeltaError> {
        let mut groups: IndexMap<String, LinkChangeGroup> = IndexMap::new();
        groups.insert(
            item.artifact.clone(),
            LinkChangeGroup::new(self.session, self.source, item.artifact.clone()),
        );

        for action in actions {
            let already_buffered = buffered
                .iter()
                .chain(groups.values())
                .flat_map(|g| g.actions.iter())
                .any(|a| a.kind == action.kind && a.link == action.link);
            if already_buffered
                || self
                    .store
                    .has_open_link_action(self.session, self.source, action.kind, &action.link)?
            {
                tracing::trace!(link = ?action.link, "duplicate link action skipped");
                continue;
            }
            let key = action.link.source_artifact.clone();
            groups
                .entry(key.clone())
                .or_insert_with(|| LinkChangeGroup::new(self.session, self.source, key))
                .actions
                .push(action);
        }

        Ok(groups.into_values().filter(|g| !g.is_empty()).collect())
    }

    fn flush(
        &self,
        buffer: &mut Vec<LinkChangeGroup>,
        slice: &mut LinkSlice,
    ) -> Result<(), DeltaError> {
        if buffer.is_empty() {
            return Ok(());
        }
        let ids = self.store.insert_link_groups(buffer)?;
        slice.actions += buffer.iter().map(LinkChangeGroup::len).sum::<usize>();
        slice.groups.extend(ids);
        slice.flushes += 1;
        tracing::debug!(groups = buffer.len(), "link groups spilled to storage");
        buffer.clear();
        Ok(())
    }
}

/// Lifecycle operations on persisted link change groups
#[derive(Debug, Clone)]
pub struct LinkChangeService {
    store: Arc<dyn SyncStore>,
    session: SessionId,
}

impl LinkChangeService {
    /// Create service for a session
    #[must_use]
    pub fn new(store: Arc<dyn SyncStore>, session: SessionId) -> Self {
        Self { store, session }
    }

    /// Groups of a source in the given statuses (empty means any)
    ///
    /// # Errors
    /// Store failure.
    pub fn groups(
        &self,
        source: SourceId,
        statuses: &[LinkGroupStatus],
    ) -> Result<Vec<LinkChangeGroup>, DeltaError> {
        Ok(self.store.link_groups(self.session, source, statuses)?)
    }

    /// Move a group to `to`
    ///
    /// Idempotent when the group is already in `to`.
    ///
    /// # Errors
    /// Illegal transition, unknown group, or store failure.
    pub fn transition(
        &self,
        id: LinkGroupId,
        to: LinkGroupStatus,
    ) -> Result<LinkChangeGroup, DeltaError> {
        let mut group = self.store.link_group(id)?;
        if group.status == to {
            return Ok(group);
        }
        validate_transition(group.status, to)?;
        group.status = to;
        self.store.update_link_group(&group)?;
        tracing::debug!(%id, ?to, "link group transition");
        Ok(group)
    }
}
