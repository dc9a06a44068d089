//! Lock-guarded aggregation store shared by the event consumer and the check loop.

use std::path::Path;
use std::sync::Arc;

use chrono::Duration;
use parking_lot::Mutex;

use super::classifier::Classifier;
use super::record::AccessRecord;
use super::register::{AccessRegister, CloseOutcome};
use super::snapshot::{Snapshot, build_snapshot};
use super::stats::AggregateStats;
use crate::core::config::EngineConfig;
use crate::platform::pal::Platform;

#[derive(Debug, Default)]
struct StoreInner {
    register: AccessRegister,
    stats: AggregateStats,
}

/// Register plus statistics behind one mutex.
///
/// Every operation holds the lock for its whole duration, including the size
/// probe in [`AccessStore::close`].
pub struct AccessStore {
    inner: Mutex<StoreInner>,
    classifier: Classifier,
    config: EngineConfig,
    platform: Arc<dyn Platform>,
}

impl AccessStore {
    #[must_use]
    pub fn new(config: EngineConfig, platform: Arc<dyn Platform>) -> Self {
        Self {
            inner: Mutex::new(StoreInner::default()),
            classifier: Classifier::from_config(&config),
            config,
            platform,
        }
    }

    pub fn open(&self, path: &Path) {
        let now = self.platform.now();
        self.inner.lock().register.open(path, now);
    }

    pub fn close(&self, path: &Path) -> CloseOutcome {
        let mut guard = self.inner.lock();
        let now = self.platform.now();
        let StoreInner { register, stats } = &mut *guard;
        register.close(path, now, &self.classifier, stats, |p| self.platform.file_size(p))
    }

    /// Ranked view capped at `max_files`; evicts everything past the cap.
    pub fn snapshot(&self) -> Snapshot {
        let stale_open_before = match self.config.stale_open_ttl_secs {
            0 => None,
            ttl => i64::try_from(ttl)
                .ok()
                .and_then(Duration::try_seconds)
                .and_then(|ttl| self.platform.now().checked_sub_signed(ttl)),
        };
        let mut guard = self.inner.lock();
        let StoreInner { register, stats } = &mut *guard;
        build_snapshot(
            register,
            stats,
            &self.classifier,
            self.config.max_files,
            stale_open_before,
        )
    }

    #[must_use]
    pub fn stats(&self) -> AggregateStats {
        self.inner.lock().stats
    }

    #[must_use]
    pub fn record(&self, path: &Path) -> Option<AccessRecord> {
        self.inner.lock().register.get(path).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().register.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn platform(&self) -> &Arc<dyn Platform> {
        &self.platform
    }

    /// Replace the whole state with restored statistics and records.
    pub(crate) fn replace_state<I>(&self, stats: AggregateStats, records: I) -> usize
    where
        I: IntoIterator<Item = AccessRecord>,
    {
        let mut guard = self.inner.lock();
        guard.register.clear();
        for record in records {
            guard.register.insert_restored(record);
        }
        guard.stats = stats;
        guard.register.len()
    }
}

impl std::fmt::Debug for AccessStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessStore")
            .field("classifier", &self.classifier)
            .field("config", &self.config)
            .field("records", &self.len())
            .finish_non_exhaustive()
    }
}
