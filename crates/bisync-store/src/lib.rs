//! bisync Store
//!
//! Persistence collaborator contracts and an in-memory implementation.
//!
//! # Core Concepts
//!
//! - [`WatermarkStore`], [`BatchStore`], [`ConflictStore`], [`RuleStore`],
//!   [`LinkStore`]: operation shapes the engine needs; no schema is implied
//! - [`SyncStore`]: all of the above, blanket-implemented
//! - [`MemoryStore`]: thread-safe reference implementation
//!
//! # Example
//!
//! ```rust,ignore
//! use bisync_store::{MemoryStore, SyncStore};
//! use std::sync::Arc;
//!
//! let store: Arc<dyn SyncStore> = Arc::new(MemoryStore::new());
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod error;
mod memory;
mod traits;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use traits::{
    BatchQuery, BatchStore, ConflictQuery, ConflictStore, Dedup, LinkStore, Recorded, RuleStore,
    SyncStore, WatermarkKey, WatermarkStore,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
