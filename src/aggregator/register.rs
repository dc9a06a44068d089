//! Path -> access record map and the open/close state machine.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use super::classifier::Classifier;
use super::record::{AccessRecord, CompletedAccess};
use super::stats::AggregateStats;
use crate::core::errors::{AgentError, Result};

/// What a close notification did to the register.
#[derive(Debug)]
pub enum CloseOutcome {
    /// No open was ever seen for this path; nothing changed.
    Untracked,
    /// The size probe failed; the record and statistics are untouched.
    StatFailed(AgentError),
    /// The cycle completed and was folded into the statistics.
    Completed(CompletedAccess),
}

impl CloseOutcome {
    #[must_use]
    pub fn completed(&self) -> Option<&CompletedAccess> {
        match self {
            Self::Completed(done) => Some(done),
            _ => None,
        }
    }
}

/// Per-path access records. Not synchronized; the store wraps it in a lock.
#[derive(Debug, Default)]
pub struct AccessRegister {
    records: HashMap<PathBuf, AccessRecord>,
}

impl AccessRegister {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or restart) an access cycle for `path`.
    pub fn open(&mut self, path: &Path, now: DateTime<Utc>) {
        match self.records.get_mut(path) {
            Some(record) => record.reopen(now),
            None => {
                self.records
                    .insert(path.to_path_buf(), AccessRecord::opened(path, now));
            }
        }
    }

    /// Finish the current cycle for `path`.
    ///
    /// A path is tracked once an open has been seen for it; restored records
    /// wait for their next open. `probe_size` is only called for tracked
    /// paths, so closes of unknown files never touch the filesystem.
    pub fn close<F>(
        &mut self,
        path: &Path,
        now: DateTime<Utc>,
        classifier: &Classifier,
        stats: &mut AggregateStats,
        probe_size: F,
    ) -> CloseOutcome
    where
        F: FnOnce(&Path) -> Result<u64>,
    {
        let Some(record) = self
            .records
            .get_mut(path)
            .filter(|record| record.open_observed())
        else {
            return CloseOutcome::Untracked;
        };

        let size_bytes = match probe_size(path) {
            Ok(size) => size,
            Err(error) => return CloseOutcome::StatFailed(error),
        };

        let done = record.complete(now, size_bytes, |elapsed, bps| {
            classifier.is_from_cache(elapsed, bps)
        });
        stats.record_completed(done.elapsed_secs, done.size_bytes, !done.from_cache);
        CloseOutcome::Completed(done)
    }

    #[must_use]
    pub fn get(&self, path: &Path) -> Option<&AccessRecord> {
        self.records.get(path)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records with at least one completed access.
    #[must_use]
    pub fn completed_len(&self) -> usize {
        self.records.values().filter(|r| r.has_completed()).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AccessRecord> {
        self.records.values()
    }

    pub(crate) fn remove(&mut self, path: &Path) -> Option<AccessRecord> {
        self.records.remove(path)
    }

    /// Insert a record rebuilt from persisted state, replacing any existing one.
    pub(crate) fn insert_restored(&mut self, record: AccessRecord) {
        self.records.insert(record.path().to_path_buf(), record);
    }

    pub(crate) fn clear(&mut self) {
        self.records.clear();
    }
}
