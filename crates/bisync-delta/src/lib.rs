//! bisync Delta
//!
//! Incremental delta scanning and the change batch lifecycle.
//!
//! # Core Concepts
//!
//! - [`HighWaterMark`]: persisted cursor per (session, source, name)
//! - [`ScanWindow`]: the `(watermark, cutoff]` window of one pass
//! - [`ScanPass`]: begin → record → commit, advancing the cursor last
//! - [`ChangeBatchService`]: `Delta → DeltaPending → Pending → InProgress → Completed | Conflicted`
//! - [`LinkDeltaSlicer`]: the same watermark discipline for artifact links
//!
//! # Example
//!
//! ```rust,ignore
//! use bisync_delta::{ChangeBatchService, HighWaterMark, ScanPass};
//!
//! let batches = ChangeBatchService::new(store.clone(), session);
//! let mut hwm = HighWaterMark::<i64>::new(store.clone(), key);
//! let mut pass = ScanPass::begin(&mut hwm, &batches, stream, latest_changeset)?;
//! for changeset in adapter.changesets().filter(|c| pass.window().contains(&c.id)) {
//!     let mut batch = pass.new_batch();
//!     // append actions ...
//!     pass.record(batch)?;
//! }
//! pass.commit()?;
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod batch_service;
mod error;
mod link_slicer;
mod scan;
mod watermark;
mod window;

pub use batch_service::ChangeBatchService;
pub use error::DeltaError;
pub use link_slicer::{
    ChangedItem, LinkChangeService, LinkChangeSource, LinkDeltaSlicer, LinkSlice,
    LinkSlicerConfig, LINK_WATERMARK,
};
pub use scan::{ScanPass, ScanSummary};
pub use watermark::{HighWaterMark, Watermark};
pub use window::ScanWindow;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
