//! Access-latency aggregation engine: classifier, per-path register,
//! incremental statistics and the bounded snapshot view.

pub mod classifier;
pub mod record;
pub mod register;
pub mod snapshot;
pub mod stats;
pub mod store;

pub use classifier::Classifier;
pub use record::{AccessRecord, CompletedAccess};
pub use register::{AccessRegister, CloseOutcome};
pub use snapshot::{STATE_VERSION, Snapshot, SnapshotEntry, build_snapshot};
pub use stats::AggregateStats;
pub use store::AccessStore;
