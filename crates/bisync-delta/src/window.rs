//! Half-open scan windows

use crate::watermark::Watermark;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// The `(lower, cutoff]` window a scan pass examines
///
/// `lower` is the watermark loaded when the pass began; `cutoff` is fixed
/// at the same moment and never moves during the pass. An item changed
/// after the cutoff belongs to the next pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanWindow<T> {
    lower: T,
    cutoff: T,
}

impl<T: Watermark> ScanWindow<T> {
    /// Create window; `lower` is exclusive, `cutoff` inclusive
    #[inline]
    #[must_use]
    pub fn new(lower: T, cutoff: T) -> Self {
        Self { lower, cutoff }
    }

    /// Exclusive lower bound
    #[inline]
    #[must_use]
    pub fn lower(&self) -> &T {
        &self.lower
    }

    /// Inclusive upper bound
    #[inline]
    #[must_use]
    pub fn cutoff(&self) -> &T {
        &self.cutoff
    }

    /// Whether `point` falls inside the window
    #[inline]
    #[must_use]
    pub fn contains(&self, point: &T) -> bool {
        &self.lower < point && point <= &self.cutoff
    }

    /// Whether no point can fall inside the window
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cutoff <= self.lower
    }
}

impl ScanWindow<DateTime<Utc>> {
    /// Widen the lower bound by `lookback`, unless it sits at the minimum
    #[must_use]
    pub fn with_lookback(mut self, lookback: Duration) -> Self {
        if self.lower != DateTime::<Utc>::minimum() {
            self.lower = self
                .lower
                .checked_sub_signed(lookback)
                .unwrap_or_else(DateTime::<Utc>::minimum);
        }
        self
    }
}
