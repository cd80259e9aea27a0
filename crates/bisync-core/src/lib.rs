//! bisync Core
//!
//! Session facade for a bidirectional sync engine. Ties the watermark,
//! batch, conflict and mapping crates to one configured pair of endpoints.
//!
//! # Core Concepts
//!
//! - [`SessionConfig`]: endpoints, slicing, policy overrides and mapping rules
//! - [`SyncSession`]: scan, apply pending batches, resolve conflicts
//! - [`DeltaProvider`]: adapter that records batches inside a scan window
//! - [`ChangeApplier`]: adapter that applies one action to the other side
//! - [`telemetry::init_tracing`]: subscriber bootstrap
//!
//! # Example
//!
//! ```rust,ignore
//! use bisync_core::prelude::*;
//!
//! let config = SessionConfig::from_path("session.toml")?;
//! telemetry::init_tracing(&config.telemetry)?;
//!
//! let session = SyncSession::new(config, Arc::new(MemoryStore::new()))?;
//! let left = session.config().left.source;
//! session.scan(left, &provider, 1_042_i64)?;
//!
//! let report = session.apply_pending(left, &applier)?;
//! for conflict in session.unresolved(Some(left))? {
//!     println!("{} on {}", conflict.type_name, conflict.scope_hint);
//! }
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod config;
mod error;
mod session;
pub mod telemetry;

pub use config::{
    ConflictSettings, EndpointConfig, PolicyOverride, SessionConfig, DEFAULT_WATERMARK,
};
pub use error::{ConfigError, SyncError};
pub use session::{ApplyError, ApplyReport, ChangeApplier, DeltaProvider, SyncSession};

pub mod prelude {
    //! Common imports for driving a sync session
    pub use crate::{
        telemetry, ApplyError, ApplyReport, ChangeApplier, DeltaProvider, SessionConfig,
        SyncError, SyncSession,
    };
    pub use bisync_conflict::{builtin, ConflictPolicy, ConflictView, ResolutionReport};
    pub use bisync_delta::{LinkChangeSource, ScanPass, Watermark};
    pub use bisync_model::{ChangeAction, ChangeBatch, ResolutionRule, SourceId};
    pub use bisync_store::MemoryStore;
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
