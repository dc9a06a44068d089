#![forbid(unsafe_code)]

//! fsevents-agent: file open/close latency telemetry.
//!
//! Watches directories for open and close notifications, times each
//! open/close cycle per path and classifies it as served from the page cache
//! or from the underlying media ("tape"). Running statistics and the most
//! recent slow accesses are reported periodically and persisted so they
//! survive restarts.
//!
//! # Library usage
//!
//! ```rust,no_run
//! use fsevents_agent::prelude::*;
//! ```
//!
//! The engine can be driven without a watcher:
//!
//! ```rust,no_run
//! use std::path::Path;
//! use fsevents_agent::aggregator::AccessStore;
//! use fsevents_agent::core::config::EngineConfig;
//! use fsevents_agent::platform::pal::detect_platform;
//!
//! let store = AccessStore::new(EngineConfig::default(), detect_platform());
//! store.open(Path::new("/data/archive/run-17.tar"));
//! store.close(Path::new("/data/archive/run-17.tar"));
//! let snapshot = store.snapshot();
//! println!("{} paths reported", snapshot.entries.len());
//! ```

pub mod prelude;

pub mod aggregator;
pub mod core;
pub mod daemon;
pub mod logger;
pub mod persist;
pub mod platform;
pub mod report;
pub mod watcher;
