//! Persisted high-water marks
//!
//! A [`HighWaterMark`] is the cursor bounding incremental scans for one
//! (session, source, name) key. It is only ever advanced to the cutoff of a
//! scan pass whose batches are already durable; see [`crate::ScanPass`].

use crate::error::DeltaError;
use bisync_store::{SyncStore, WatermarkKey};
use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt;
use std::sync::Arc;

/// Ordered cursor value with a persisted string form
pub trait Watermark: Ord + Clone + fmt::Debug + fmt::Display + Send + Sync + 'static {
    /// Value reported before anything was ever persisted
    fn minimum() -> Self;

    /// Persisted representation
    fn encode(&self) -> String;

    /// Parse the persisted representation
    ///
    /// # Errors
    /// Returns a human-readable reason when `raw` is malformed.
    fn decode(raw: &str) -> Result<Self, String>;
}

impl Watermark for DateTime<Utc> {
    /// The Unix epoch
    fn minimum() -> Self {
        DateTime::<Utc>::default()
    }

    fn encode(&self) -> String {
        self.to_rfc3339_opts(SecondsFormat::Nanos, true)
    }

    fn decode(raw: &str) -> Result<Self, String> {
        DateTime::parse_from_rfc3339(raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| e.to_string())
    }
}

impl Watermark for i64 {
    fn minimum() -> Self {
        0
    }

    fn encode(&self) -> String {
        self.to_string()
    }

    fn decode(raw: &str) -> Result<Self, String> {
        raw.trim().parse().map_err(|e: std::num::ParseIntError| e.to_string())
    }
}

impl Watermark for u64 {
    fn minimum() -> Self {
        0
    }

    fn encode(&self) -> String {
        self.to_string()
    }

    fn decode(raw: &str) -> Result<Self, String> {
        raw.trim().parse().map_err(|e: std::num::ParseIntError| e.to_string())
    }
}

/// Cursor for one (session, source, name) key
#[derive(Debug)]
pub struct HighWaterMark<T: Watermark> {
    key: WatermarkKey,
    value: T,
    store: Arc<dyn SyncStore>,
}

impl<T: Watermark> HighWaterMark<T> {
    /// Create a cursor at [`Watermark::minimum`]; call [`reload`](Self::reload) to read the store
    #[must_use]
    pub fn new(store: Arc<dyn SyncStore>, key: WatermarkKey) -> Self {
        Self {
            key,
            value: T::minimum(),
            store,
        }
    }

    /// Row key
    #[inline]
    #[must_use]
    pub fn key(&self) -> &WatermarkKey {
        &self.key
    }

    /// Last loaded or updated value
    #[inline]
    #[must_use]
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Whether the cursor still sits at the minimum
    #[inline]
    #[must_use]
    pub fn is_unset(&self) -> bool {
        self.value == T::minimum()
    }

    /// Fetch the persisted value, falling back to the minimum if never set
    ///
    /// # Errors
    /// Store failure, or [`DeltaError::CorruptWatermark`] for an undecodable row.
    pub fn reload(&mut self) -> Result<&T, DeltaError> {
        self.value = match self.store.load_watermark(&self.key)? {
            Some(raw) => T::decode(&raw).map_err(|reason| DeltaError::CorruptWatermark {
                key: self.key.clone(),
                value: raw.clone(),
                reason,
            })?,
            None => T::minimum(),
        };
        tracing::debug!(key = %self.key, value = %self.value, "watermark reloaded");
        Ok(&self.value)
    }

    /// Persist and adopt a new value
    ///
    /// # Errors
    /// [`DeltaError::WatermarkRegression`] if `new_value` is below the
    /// current value; store failure otherwise. The in-memory value is only
    /// replaced once the write succeeded.
    pub fn update(&mut self, new_value: T) -> Result<(), DeltaError> {
        if new_value < self.value {
            return Err(DeltaError::WatermarkRegression {
                key: self.key.clone(),
                current: self.value.to_string(),
                requested: new_value.to_string(),
            });
        }
        self.persist(new_value)
    }

    /// Persist a value unconditionally, allowing an operator rewind
    ///
    /// # Errors
    /// Store failure.
    pub fn reset(&mut self, new_value: T) -> Result<(), DeltaError> {
        if new_value < self.value {
            tracing::warn!(
                key = %self.key,
                from = %self.value,
                to = %new_value,
                "watermark rewound"
            );
        }
        self.persist(new_value)
    }

    fn persist(&mut self, new_value: T) -> Result<(), DeltaError> {
        self.store.save_watermark(&self.key, &new_value.encode())?;
        tracing::debug!(key = %self.key, value = %new_value, "watermark updated");
        self.value = new_value;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bisync_model::{SessionId, SourceId};
    use bisync_store::{MemoryStore, WatermarkStore};
    use chrono::TimeZone;

    fn mark<T: Watermark>(store: &Arc<MemoryStore>) -> HighWaterMark<T> {
        let key = WatermarkKey::new(SessionId::new(), SourceId::new(), "content");
        HighWaterMark::new(store.clone(), key)
    }

    #[test]
    fn reload_without_row_yields_minimum() {
        let store = Arc::new(MemoryStore::new());
        let mut hwm = mark::<i64>(&store);
        assert_eq!(*hwm.reload().unwrap(), 0);
        assert!(hwm.is_unset());
    }

    #[test]
    fn update_then_reload() {
        let store = Arc::new(MemoryStore::new());
        let mut hwm = mark::<u64>(&store);
        hwm.update(17).unwrap();

        let mut other = HighWaterMark::<u64>::new(store.clone(), hwm.key().clone());
        assert_eq!(*other.reload().unwrap(), 17);
    }

    #[test]
    fn regression_is_rejected_and_value_kept() {
        let store = Arc::new(MemoryStore::new());
        let mut hwm = mark::<i64>(&store);
        hwm.update(10).unwrap();
        let err = hwm.update(3).unwrap_err();
        assert!(matches!(err, DeltaError::WatermarkRegression { .. }));
        assert_eq!(*hwm.value(), 10);
        assert_eq!(*hwm.reload().unwrap(), 10);
    }

    #[test]
    fn reset_allows_rewind() {
        let store = Arc::new(MemoryStore::new());
        let mut hwm = mark::<i64>(&store);
        hwm.update(10).unwrap();
        hwm.reset(2).unwrap();
        assert_eq!(*hwm.reload().unwrap(), 2);
    }

    #[test]
    fn corrupt_row_is_reported() {
        let store = Arc::new(MemoryStore::new());
        let mut hwm = mark::<i64>(&store);
        store.save_watermark(hwm.key(), "not a number").unwrap();
        assert!(matches!(
            hwm.reload(),
            Err(DeltaError::CorruptWatermark { .. })
        ));
    }

    #[test]
    fn timestamps_keep_sub_second_precision() {
        let store = Arc::new(MemoryStore::new());
        let mut hwm = mark::<DateTime<Utc>>(&store);
        let t = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();
        hwm.update(t).unwrap();
        assert_eq!(*hwm.reload().unwrap(), t);
    }
}
