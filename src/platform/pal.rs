//! PAL trait: the host facilities the aggregation engine depends on.
//!
//! The engine needs exactly three things from the OS: the size of a file at
//! close time, whether a path is a directory, and the wall clock. Routing them
//! through a trait keeps the register deterministic under test.

#![allow(missing_docs)]

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};

use crate::core::errors::{AgentError, Result};

/// OS abstraction used by the access store and the event consumer.
pub trait Platform: Send + Sync {
    /// Current size in bytes of the file at `path`.
    fn file_size(&self, path: &Path) -> Result<u64>;
    /// Whether `path` currently resolves to a directory.
    fn is_dir(&self, path: &Path) -> bool;
    /// Wall-clock time.
    fn now(&self) -> DateTime<Utc>;
}

/// Real host implementation backed by `std::fs` and the system clock.
#[derive(Debug, Default)]
pub struct HostPlatform;

impl HostPlatform {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Platform for HostPlatform {
    fn file_size(&self, path: &Path) -> Result<u64> {
        fs::metadata(path)
            .map(|meta| meta.len())
            .map_err(|error| AgentError::FileStat {
                path: path.to_path_buf(),
                details: error.to_string(),
            })
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// In-memory mock implementation for deterministic tests.
///
/// The clock only moves when [`MockPlatform::advance`] or
/// [`MockPlatform::set_now`] is called. Paths without a registered size fail
/// the size query the way a vanished file would.
#[derive(Debug)]
pub struct MockPlatform {
    now: Mutex<DateTime<Utc>>,
    sizes: RwLock<HashMap<PathBuf, u64>>,
    dirs: RwLock<Vec<PathBuf>>,
}

impl MockPlatform {
    #[must_use]
    pub fn new(start: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(start),
            sizes: RwLock::new(HashMap::new()),
            dirs: RwLock::new(Vec::new()),
        })
    }

    pub fn set_size(&self, path: impl Into<PathBuf>, size: u64) {
        self.sizes.write().insert(path.into(), size);
    }

    pub fn remove_file(&self, path: &Path) {
        self.sizes.write().remove(path);
    }

    pub fn add_dir(&self, path: impl Into<PathBuf>) {
        self.dirs.write().push(path.into());
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }

    pub fn advance_secs_f64(&self, secs: f64) {
        #[allow(clippy::cast_possible_truncation)]
        let micros = (secs * 1_000_000.0).round() as i64;
        self.advance(Duration::microseconds(micros));
    }

    pub fn set_now(&self, at: DateTime<Utc>) {
        *self.now.lock() = at;
    }
}

impl Platform for MockPlatform {
    fn file_size(&self, path: &Path) -> Result<u64> {
        self.sizes
            .read()
            .get(path)
            .copied()
            .ok_or_else(|| AgentError::FileStat {
                path: path.to_path_buf(),
                details: "mock file not found".to_string(),
            })
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.dirs.read().iter().any(|dir| dir == path)
    }

    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Detect active platform implementation.
pub fn detect_platform() -> Arc<dyn Platform> {
    Arc::new(HostPlatform::new())
}
