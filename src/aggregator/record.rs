//! Per-path access record and the measurements of one completed access.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

/// Latency history for a single path.
///
/// The `last_*` fields describe the most recent open/close cycle and are
/// zeroed on every reopen. The `longest_*` fields hold the slowest cycle
/// ever seen; they only move when a strictly slower cycle completes.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessRecord {
    path: PathBuf,
    pub last_open_time: DateTime<Utc>,
    pub last_duration: f64,
    pub last_file_size: u64,
    pub last_bytes_per_sec: f64,
    /// Open time of the slowest completed cycle; `None` until the first close.
    pub longest_time: Option<DateTime<Utc>>,
    pub longest_duration: f64,
    pub longest_file_size: u64,
    pub longest_bytes_per_sec: f64,
    /// Set by an observed open; restored records start without one.
    open_observed: bool,
}

/// Measurements taken when a tracked path closes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletedAccess {
    pub elapsed_secs: f64,
    pub size_bytes: u64,
    pub bytes_per_sec: f64,
    pub from_cache: bool,
    /// Whether this cycle replaced the record's longest access.
    pub new_longest: bool,
}

impl AccessRecord {
    /// Fresh record for a path seen opening for the first time.
    #[must_use]
    pub fn opened(path: impl Into<PathBuf>, now: DateTime<Utc>) -> Self {
        Self {
            path: path.into(),
            last_open_time: now,
            last_duration: 0.0,
            last_file_size: 0,
            last_bytes_per_sec: 0.0,
            longest_time: None,
            longest_duration: 0.0,
            longest_file_size: 0,
            longest_bytes_per_sec: 0.0,
            open_observed: true,
        }
    }

    /// Record rebuilt from persisted longest-access history.
    ///
    /// The transient last-access fields stay zero and the open time is pinned
    /// to the longest access. No open has been observed for it, so a close
    /// arriving before the next open is ignored.
    #[must_use]
    pub fn restored(
        path: impl Into<PathBuf>,
        longest_time: DateTime<Utc>,
        longest_duration: f64,
        longest_file_size: u64,
        longest_bytes_per_sec: f64,
    ) -> Self {
        Self {
            longest_time: Some(longest_time),
            longest_duration,
            longest_file_size,
            longest_bytes_per_sec,
            open_observed: false,
            ..Self::opened(path, longest_time)
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether at least one open/close cycle has completed.
    #[must_use]
    pub fn has_completed(&self) -> bool {
        self.longest_time.is_some()
    }

    /// Whether an open has been seen since the record was created or restored.
    #[must_use]
    pub fn open_observed(&self) -> bool {
        self.open_observed
    }

    /// Start a new cycle: forget the previous last-access metrics.
    pub fn reopen(&mut self, now: DateTime<Utc>) {
        self.open_observed = true;
        self.last_open_time = now;
        self.last_duration = 0.0;
        self.last_file_size = 0;
        self.last_bytes_per_sec = 0.0;
    }

    /// Seconds since the current cycle opened, clamped at zero.
    #[must_use]
    pub fn elapsed_since_open(&self, now: DateTime<Utc>) -> f64 {
        now.signed_duration_since(self.last_open_time)
            .to_std()
            .map_or(0.0, |elapsed| elapsed.as_secs_f64())
    }

    /// Close the current cycle with the measured size.
    ///
    /// `from_cache` is the classifier verdict for `(elapsed, throughput)`.
    pub fn complete<F>(&mut self, now: DateTime<Utc>, size_bytes: u64, from_cache: F) -> CompletedAccess
    where
        F: FnOnce(f64, f64) -> bool,
    {
        let elapsed_secs = self.elapsed_since_open(now);
        let bytes_per_sec = throughput(size_bytes, elapsed_secs);
        let from_cache = from_cache(elapsed_secs, bytes_per_sec);

        let new_longest = elapsed_secs > self.longest_duration || self.longest_time.is_none();
        if new_longest {
            self.longest_duration = elapsed_secs;
            self.longest_time = Some(self.last_open_time);
            self.longest_file_size = size_bytes;
            self.longest_bytes_per_sec = bytes_per_sec;
        }

        self.last_duration = elapsed_secs;
        self.last_file_size = size_bytes;
        self.last_bytes_per_sec = bytes_per_sec;

        CompletedAccess {
            elapsed_secs,
            size_bytes,
            bytes_per_sec,
            from_cache,
            new_longest,
        }
    }
}

/// Bytes per second, or 0 when no time elapsed.
#[must_use]
pub fn throughput(size_bytes: u64, elapsed_secs: f64) -> f64 {
    if elapsed_secs > 0.0 {
        #[allow(clippy::cast_precision_loss)]
        let bytes = size_bytes as f64;
        bytes / elapsed_secs
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap()
    }

    #[test]
    fn fresh_record_has_no_completed_access() {
        let record = AccessRecord::opened("/data/a", t0());
        assert!(!record.has_completed());
        assert_eq!(record.last_open_time, t0());
        assert_eq!(record.longest_file_size, 0);
    }

    #[test]
    fn first_close_always_sets_longest() {
        let mut record = AccessRecord::opened("/data/a", t0());
        let done = record.complete(t0(), 100, |_, _| true);
        assert!(done.new_longest);
        assert!(record.has_completed());
        assert_eq!(record.longest_time, Some(t0()));
        assert!(done.bytes_per_sec.abs() < f64::EPSILON, "zero elapsed means zero throughput");
    }

    #[test]
    fn shorter_cycle_keeps_longest() {
        let mut record = AccessRecord::opened("/data/a", t0());
        record.complete(t0() + Duration::seconds(10), 1_000, |_, _| false);

        let reopen_at = t0() + Duration::seconds(60);
        record.reopen(reopen_at);
        assert!(record.last_duration.abs() < f64::EPSILON);
        assert_eq!(record.last_file_size, 0);

        let done = record.complete(reopen_at + Duration::seconds(2), 4_000, |_, _| true);
        assert!(!done.new_longest);
        assert!((record.longest_duration - 10.0).abs() < 1e-9);
        assert_eq!(record.longest_time, Some(t0()));
        assert!((record.last_duration - 2.0).abs() < 1e-9);
        assert!((record.last_bytes_per_sec - 2_000.0).abs() < 1e-9);
    }

    #[test]
    fn clock_going_backwards_counts_as_zero_elapsed() {
        let record = AccessRecord::opened("/data/a", t0());
        assert!(record.elapsed_since_open(t0() - Duration::seconds(5)).abs() < f64::EPSILON);
    }

    #[test]
    fn restored_record_has_zero_last_fields() {
        let record = AccessRecord::restored("/data/a", t0(), 12.5, 2_048, 163.84);
        assert!(record.has_completed());
        assert!(record.last_duration.abs() < f64::EPSILON);
        assert_eq!(record.last_file_size, 0);
        assert_eq!(record.last_open_time, t0());
        assert!((record.longest_duration - 12.5).abs() < f64::EPSILON);
        assert!(!record.open_observed());
    }

    #[test]
    fn reopen_marks_a_restored_record_open() {
        let mut record = AccessRecord::restored("/data/a", t0(), 12.5, 2_048, 163.84);
        let at = t0() + Duration::days(1);
        record.reopen(at);
        assert!(record.open_observed());
        assert_eq!(record.last_open_time, at);
        assert_eq!(record.longest_time, Some(t0()));
    }
}
