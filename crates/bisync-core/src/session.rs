//! Sync session facade
//!
//! A [`SyncSession`] wires one session's store, batch service, conflict
//! engine and mapping rules together. Adapters plug in through two traits:
//!
//! - [`DeltaProvider`] records change batches inside a scan window
//! - [`ChangeApplier`] applies one change action to the other side
//!
//! Consumption walks a stream's pending batches in execution order. A
//! failure on an action becomes a conflict; the batch is held back and the
//! stream stops until the conflict is resolved.

use crate::config::SessionConfig;
use crate::error::{ConfigError, SyncError};
use bisync_conflict::{
    ConflictRegistry, ConflictResolutionEngine, ConflictView, RaiseOutcome, RegistryScope,
    ResolutionReport,
};
use bisync_delta::{
    ChangeBatchService, DeltaError, HighWaterMark, LinkChangeService, LinkChangeSource,
    LinkDeltaSlicer, LinkSlice, ScanPass, ScanSummary, Watermark,
};
use bisync_mapping::{MappingConfig, MappingSet, TranslationDirection};
use bisync_model::{
    ActionState, BatchId, BatchStatus, ChangeAction, ChangeBatch, ConflictId, ConflictOrigin,
    ConflictTypeId, ResolutionRule, SessionId, SourceId,
};
use bisync_store::{StoreError, SyncStore, WatermarkKey};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

/// Adapter side of content scanning
pub trait DeltaProvider<T: Watermark> {
    /// Record every change inside `pass.window()` as batches
    ///
    /// # Errors
    /// Any adapter failure; the pass is abandoned and the watermark stays put.
    fn collect(&self, pass: &mut ScanPass<'_, T>) -> anyhow::Result<()>;
}

/// Why an action could not be applied
#[derive(Debug, thiserror::Error)]
pub enum ApplyError {
    /// A failure the conflict taxonomy knows about
    #[error("conflict {type_id} on {scope_hint:?}")]
    Conflict {
        /// Registered conflict type
        type_id: ConflictTypeId,
        /// Type-specific payload
        details: String,
        /// Applicability key for resolution rules
        scope_hint: String,
    },

    /// Anything else; becomes a generic conflict
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ApplyError {
    /// Create conflict error
    #[inline]
    #[must_use]
    pub fn conflict(type_id: ConflictTypeId, details: impl Into<String>, scope_hint: impl Into<String>) -> Self {
        Self::Conflict {
            type_id,
            details: details.into(),
            scope_hint: scope_hint.into(),
        }
    }
}

/// Adapter side of consumption
pub trait ChangeApplier {
    /// Apply one action of `batch` to the other side
    ///
    /// # Errors
    /// [`ApplyError::Conflict`] for a known failure, [`ApplyError::Other`]
    /// for anything unexpected.
    fn apply(&self, batch: &ChangeBatch, index: usize, action: &ChangeAction) -> Result<(), ApplyError>;
}

/// Outcome of [`SyncSession::apply_pending`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplyReport {
    /// Batches applied to the end
    pub completed: Vec<BatchId>,
    /// Batches suppressed by a persisted rule while applying
    pub skipped: Vec<BatchId>,
    /// Actions applied
    pub actions_applied: usize,
    /// Conflicts raised, in order
    pub conflicts: Vec<RaiseOutcome>,
    /// Batch sent back to pending by a retry rule; picked up next call
    pub requeued: Option<BatchId>,
    /// A conflicted batch holds the stream
    pub blocked: bool,
    /// A conflict with the halt policy is open; stop the session
    pub halted: bool,
}

impl ApplyReport {
    /// Whether every pending batch was consumed
    #[inline]
    #[must_use]
    pub fn is_drained(&self) -> bool {
        !self.blocked && !self.halted && self.requeued.is_none()
    }
}

/// Where a batch ended up after its actions ran
enum BatchEnd {
    Finished,
    Skipped,
    Blocked,
    Requeued,
}

/// Orchestrates scanning, applying and conflict handling for one session
#[derive(Debug)]
pub struct SyncSession {
    config: SessionConfig,
    store: Arc<dyn SyncStore>,
    batches: ChangeBatchService,
    links: LinkChangeService,
    conflicts: ConflictResolutionEngine,
    mappings: RwLock<Arc<MappingSet>>,
}

impl SyncSession {
    /// Open a session with the built-in conflict taxonomy
    ///
    /// # Errors
    /// Invalid configuration.
    pub fn new(config: SessionConfig, store: Arc<dyn SyncStore>) -> Result<Self, SyncError> {
        Self::with_registry(config, store, ConflictRegistry::with_defaults())
    }

    /// Open a session with a caller-built registry
    ///
    /// Policy overrides from the configuration are registered for both
    /// endpoints on top of `registry`.
    ///
    /// # Errors
    /// Invalid configuration or an override for an unregistered type.
    pub fn with_registry(
        config: SessionConfig,
        store: Arc<dyn SyncStore>,
        mut registry: ConflictRegistry,
    ) -> Result<Self, SyncError> {
        config.validate()?;
        for policy in &config.conflicts.policies {
            let conflict_type = registry
                .lookup(policy.conflict_type, config.left.source)
                .map_err(|_| ConfigError::UnknownConflictType(policy.conflict_type))?
                .conflict_type
                .as_ref()
                .clone();
            for source in [config.left.source, config.right.source] {
                registry.register(conflict_type.clone(), RegistryScope::Source(source), policy.policy)?;
            }
        }
        let mappings = MappingSet::from_config(&config.mapping)?;

        let session = config.session;
        tracing::info!(
            %session,
            left = %config.left.name,
            right = %config.right.name,
            conflict_types = registry.len(),
            "sync session opened"
        );
        Ok(Self {
            batches: ChangeBatchService::new(store.clone(), session),
            links: LinkChangeService::new(store.clone(), session),
            conflicts: ConflictResolutionEngine::new(store.clone(), session, Arc::new(registry)),
            mappings: RwLock::new(Arc::new(mappings)),
            store,
            config,
        })
    }

    /// Session identity
    #[inline]
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.config.session
    }

    /// Configuration the session was opened with
    #[inline]
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Change batch lifecycle
    #[inline]
    #[must_use]
    pub fn batches(&self) -> &ChangeBatchService {
        &self.batches
    }

    /// Link change group lifecycle
    #[inline]
    #[must_use]
    pub fn links(&self) -> &LinkChangeService {
        &self.links
    }

    /// Conflict engine
    #[inline]
    #[must_use]
    pub fn conflicts(&self) -> &ConflictResolutionEngine {
        &self.conflicts
    }

    /// Current mapping rules
    #[must_use]
    pub fn mappings(&self) -> Arc<MappingSet> {
        self.mappings.read().clone()
    }

    /// Translation direction for values read from `source`
    #[must_use]
    pub fn direction_from(&self, source: SourceId) -> Option<TranslationDirection> {
        if source == self.config.left.source {
            Some(TranslationDirection::LeftToRight)
        } else if source == self.config.right.source {
            Some(TranslationDirection::RightToLeft)
        } else {
            None
        }
    }

    /// Replace every mapping collection; on error the current rules stay
    ///
    /// Evaluations already holding the previous set finish against it.
    ///
    /// # Errors
    /// The new configuration fails validation.
    pub fn reload_mappings(&self, config: &MappingConfig) -> Result<(), SyncError> {
        let next = MappingSet::from_config(config)?;
        *self.mappings.write() = Arc::new(next);
        tracing::info!(session = %self.config.session, rules = config.rule_count(), "mapping rules reloaded");
        Ok(())
    }

    /// Content watermark of a source
    #[must_use]
    pub fn watermark<T: Watermark>(&self, source: SourceId) -> HighWaterMark<T> {
        let key = WatermarkKey::new(self.config.session, source, self.config.watermark.clone());
        HighWaterMark::new(self.store.clone(), key)
    }

    /// Run one scan pass ending at `cutoff`
    ///
    /// # Errors
    /// Store or provider failure; the watermark has not moved.
    pub fn scan<T: Watermark>(
        &self,
        source: SourceId,
        provider: &dyn DeltaProvider<T>,
        cutoff: T,
    ) -> Result<ScanSummary<T>, SyncError> {
        self.ensure_endpoint(source)?;
        let mut watermark = self.watermark::<T>(source);
        let mut pass = ScanPass::begin(&mut watermark, &self.batches, source, cutoff)?;
        provider.collect(&mut pass).map_err(DeltaError::Source)?;
        Ok(pass.commit()?)
    }

    /// Slice link changes of a source with the configured size
    ///
    /// # Errors
    /// Store or adapter failure.
    pub fn scan_links(&self, source: SourceId, adapter: &dyn LinkChangeSource) -> Result<LinkSlice, SyncError> {
        self.ensure_endpoint(source)?;
        let mut slicer = LinkDeltaSlicer::new(self.store.clone(), self.config.session, source, self.config.links);
        Ok(slicer.next_slice(adapter)?)
    }

    /// Apply a stream's pending batches in execution order
    ///
    /// Stops at the first batch a conflict holds back, when a conflict
    /// with the halt policy stays open, or when a batch comes back to
    /// pending during this call.
    ///
    /// # Errors
    /// Store failure or a failure to record a conflict.
    pub fn apply_pending(&self, source: SourceId, applier: &dyn ChangeApplier) -> Result<ApplyReport, SyncError> {
        self.ensure_endpoint(source)?;
        let mut report = ApplyReport::default();
        let mut visited = HashSet::new();

        while let Some(batch) = self.batches.next_pending(source)? {
            let id = batch.id.ok_or(StoreError::Unsaved { entity: "batch" })?;
            if !visited.insert(id) {
                report.requeued = Some(id);
                break;
            }
            match self.apply_batch(source, id, applier, &mut report)? {
                BatchEnd::Finished => report.completed.push(id),
                BatchEnd::Skipped => report.skipped.push(id),
                BatchEnd::Blocked => break,
                BatchEnd::Requeued => {
                    report.requeued = Some(id);
                    break;
                }
            }
            if report.halted {
                break;
            }
        }

        report.blocked = self.batches.is_stream_blocked(source)?;
        tracing::info!(
            %source,
            completed = report.completed.len(),
            actions = report.actions_applied,
            conflicts = report.conflicts.len(),
            blocked = report.blocked,
            halted = report.halted,
            "pending batches applied"
        );
        Ok(report)
    }

    fn apply_batch(
        &self,
        source: SourceId,
        id: BatchId,
        applier: &dyn ChangeApplier,
        report: &mut ApplyReport,
    ) -> Result<BatchEnd, SyncError> {
        let mut batch = self.batches.begin(id)?;
        for index in 0..batch.len() {
            let action = batch.action(index)?.clone();
            if action.state != ActionState::Ready {
                continue;
            }
            let origin = ConflictOrigin::Action { batch: id, index };
            let raised = match applier.apply(&batch, index, &action) {
                Ok(()) => {
                    batch = self.batches.complete_action(id, index)?;
                    report.actions_applied += 1;
                    continue;
                }
                Err(ApplyError::Conflict {
                    type_id,
                    details,
                    scope_hint,
                }) => self
                    .conflicts
                    .raise_conflict(source, type_id, details, scope_hint, origin)?,
                Err(ApplyError::Other(error)) => self.conflicts.raise_unexpected(source, origin, &error)?,
            };
            report.halted |= raised.halt;
            report.conflicts.push(raised);

            batch = self.batches.batch(id)?;
            let released = batch.action(index)?.state == ActionState::Ready;
            match batch.status {
                BatchStatus::Conflicted => return Ok(BatchEnd::Blocked),
                BatchStatus::Skipped => return Ok(BatchEnd::Skipped),
                // A persisted retry rule released the action right away
                BatchStatus::Pending if released => return Ok(BatchEnd::Requeued),
                BatchStatus::Pending => batch = self.batches.begin(id)?,
                _ => {}
            }
            if report.halted {
                return Ok(BatchEnd::Blocked);
            }
        }
        self.batches.complete(id)?;
        Ok(BatchEnd::Finished)
    }

    /// Resolve a conflict with a new rule and back-fill it
    ///
    /// # Errors
    /// See [`ConflictResolutionEngine::resolve_with_new_rule`].
    pub fn resolve(&self, conflict: ConflictId, rule: ResolutionRule) -> Result<ResolutionReport, SyncError> {
        Ok(self.conflicts.resolve_with_new_rule(conflict, rule)?)
    }

    /// Open conflicts, optionally for one source
    ///
    /// # Errors
    /// Store failure.
    pub fn unresolved(&self, source: Option<SourceId>) -> Result<Vec<ConflictView>, SyncError> {
        Ok(self.conflicts.unresolved(source)?)
    }

    /// Discard a stream's in-flight batches and rewind its watermark
    ///
    /// The next scan starting from `rewind_to` re-records what was discarded.
    ///
    /// # Errors
    /// Store failure.
    pub fn retry_from_scratch<T: Watermark>(&self, source: SourceId, rewind_to: T) -> Result<usize, SyncError> {
        self.ensure_endpoint(source)?;
        let discarded = self.batches.remove_in_progress_change_groups(source)?;
        self.watermark::<T>(source).reset(rewind_to)?;
        Ok(discarded)
    }

    /// Drop consumed batch rows of a stream
    ///
    /// # Errors
    /// Store failure.
    pub fn prune(&self, source: SourceId) -> Result<usize, SyncError> {
        Ok(self.batches.mark_delta_completed(source)?)
    }

    fn ensure_endpoint(&self, source: SourceId) -> Result<(), SyncError> {
        if self.direction_from(source).is_some() {
            Ok(())
        } else {
            Err(ConfigError::invalid("source", format!("{source} is not an endpoint of this session")).into())
        }
    }
}
