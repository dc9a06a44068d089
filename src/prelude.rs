//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use fsevents_agent::prelude::*;
//! ```

// Core
pub use crate::core::config::{Config, EngineConfig, RestorePolicy};
pub use crate::core::errors::{AgentError, Result};

// Platform
pub use crate::platform::pal::{HostPlatform, Platform, detect_platform};

// Aggregation
pub use crate::aggregator::{
    AccessRecord, AccessStore, AggregateStats, Classifier, CloseOutcome, Snapshot, SnapshotEntry,
};

// Persistence and reporting
pub use crate::persist::{PersistedState, RestoreOutcome};
pub use crate::report::{CheckReport, JsonLineSink, ReportSink};

// Watcher
pub use crate::watcher::{AccessEvent, AccessKind, WatchMessage};

// Daemon
#[cfg(feature = "daemon")]
pub use crate::daemon::loop_main::AgentDaemon;
