//! One incremental scan pass over a stream
//!
//! The protocol is fixed:
//!
//! 1. [`ScanPass::begin`] reloads the watermark and fixes the cutoff.
//! 2. The adapter examines only items inside [`ScanPass::window`] and
//!    records batches with [`ScanPass::record`]. Recorded batches stay in
//!    `Delta` and are invisible to consumers.
//! 3. [`ScanPass::commit`] promotes the pass's batches and only then moves
//!    the watermark to the cutoff.
//!
//! Dropping a pass without committing leaves the watermark where it was;
//! the next pass re-scans the same window and the idempotence check
//! ([`ScanPass::is_recorded`]) keeps it from recording duplicates.

use crate::batch_service::ChangeBatchService;
use crate::error::DeltaError;
use crate::watermark::{HighWaterMark, Watermark};
use crate::window::ScanWindow;
use bisync_model::{BatchId, ChangeBatch, SourceId};

/// Outcome of a committed pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSummary<T> {
    /// Batches recorded by this pass
    pub recorded: Vec<BatchId>,
    /// Batches made visible by promotion (includes leftovers of interrupted passes)
    pub promoted: usize,
    /// Watermark after commit
    pub watermark: T,
}

/// An open scan pass
#[derive(Debug)]
pub struct ScanPass<'a, T: Watermark> {
    watermark: &'a mut HighWaterMark<T>,
    batches: &'a ChangeBatchService,
    stream: SourceId,
    window: ScanWindow<T>,
    next_order: i64,
    recorded: Vec<BatchId>,
}

impl<'a, T: Watermark> ScanPass<'a, T> {
    /// Open a pass ending at `cutoff`
    ///
    /// # Errors
    /// Store failure or a corrupt watermark.
    pub fn begin(
        watermark: &'a mut HighWaterMark<T>,
        batches: &'a ChangeBatchService,
        stream: SourceId,
        cutoff: T,
    ) -> Result<Self, DeltaError> {
        let lower = watermark.reload()?.clone();
        let window = ScanWindow::new(lower, cutoff);
        let next_order = batches.next_execution_order(stream)?;
        tracing::info!(
            %stream,
            lower = %window.lower(),
            cutoff = %window.cutoff(),
            "scan pass started"
        );
        Ok(Self {
            watermark,
            batches,
            stream,
            window,
            next_order,
            recorded: Vec::new(),
        })
    }

    /// Window the adapter must test candidates against
    #[inline]
    #[must_use]
    pub fn window(&self) -> &ScanWindow<T> {
        &self.window
    }

    /// Stream being scanned
    #[inline]
    #[must_use]
    pub fn stream(&self) -> SourceId {
        self.stream
    }

    /// Start a batch with the next execution order of this pass
    pub fn new_batch(&mut self) -> ChangeBatch {
        let batch = self.batches.create_batch(self.stream, self.next_order);
        self.next_order += 1;
        batch
    }

    /// Whether `target` at `version` is already recorded on this stream
    ///
    /// # Errors
    /// Store failure.
    pub fn is_recorded(&self, target: &str, version: &str) -> Result<bool, DeltaError> {
        self.batches.is_recorded(self.stream, target, version)
    }

    /// Persist a batch; empty batches are dropped
    ///
    /// # Errors
    /// Store failure or an already saved batch.
    pub fn record(&mut self, mut batch: ChangeBatch) -> Result<Option<BatchId>, DeltaError> {
        if batch.is_empty() {
            tracing::debug!(stream = %self.stream, name = %batch.name, "empty batch dropped");
            return Ok(None);
        }
        let id = self.batches.save(&mut batch)?;
        self.recorded.push(id);
        Ok(Some(id))
    }

    /// Promote this stream's batches, then advance the watermark to the cutoff
    ///
    /// # Errors
    /// Store failure. On error the watermark has not moved.
    pub fn commit(self) -> Result<ScanSummary<T>, DeltaError> {
        let promoted = self.batches.promote_stream(self.stream)?;
        let cutoff = self.window.cutoff().clone();
        if cutoff > *self.watermark.value() {
            self.watermark.update(cutoff)?;
        } else {
            tracing::debug!(stream = %self.stream, "cutoff not ahead of watermark; left unchanged");
        }
        tracing::info!(
            stream = %self.stream,
            recorded = self.recorded.len(),
            promoted,
            watermark = %self.watermark.value(),
            "scan pass committed"
        );
        Ok(ScanSummary {
            recorded: self.recorded,
            promoted,
            watermark: self.watermark.value().clone(),
        })
    }
}
