//! Bounded, ranked reporting view of the register, with eviction.

use std::cmp::Ordering;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::classifier::Classifier;
use super::record::AccessRecord;
use super::register::AccessRegister;
use super::stats::AggregateStats;

/// Schema version written into snapshots and persisted state.
pub const STATE_VERSION: u32 = 1;

/// One reported path. Field names are the persisted/reporting wire names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SnapshotEntry {
    pub name: String,
    /// Unix seconds.
    pub last_time: i64,
    pub last_duration: f64,
    pub last_file_size: u64,
    pub last_bytes_per_sec: f64,
    pub last_from_cache: bool,
    /// Unix seconds.
    pub longest_time: i64,
    pub longest_duration: f64,
    pub longest_file_size: u64,
    pub longest_bytes_per_sec: f64,
    pub longest_from_cache: bool,
}

impl SnapshotEntry {
    fn from_record(record: &AccessRecord, longest_time: DateTime<Utc>, classifier: &Classifier) -> Self {
        Self {
            name: record.path().to_string_lossy().into_owned(),
            last_time: record.last_open_time.timestamp(),
            last_duration: record.last_duration,
            last_file_size: record.last_file_size,
            last_bytes_per_sec: record.last_bytes_per_sec,
            last_from_cache: classifier.is_from_cache(record.last_duration, record.last_bytes_per_sec),
            longest_time: longest_time.timestamp(),
            longest_duration: record.longest_duration,
            longest_file_size: record.longest_file_size,
            longest_bytes_per_sec: record.longest_bytes_per_sec,
            longest_from_cache: classifier
                .is_from_cache(record.longest_duration, record.longest_bytes_per_sec),
        }
    }

    #[must_use]
    pub fn is_tape(&self) -> bool {
        !self.longest_from_cache
    }
}

/// Immutable result of one snapshot pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub version: u32,
    /// Newest longest-access first.
    pub entries: Vec<SnapshotEntry>,
    pub avg_latest: f64,
    pub avg_latest_tape: f64,
    pub bytes_per_sec_latest_tape: f64,
    pub num_tape: usize,
    pub stats: AggregateStats,
    /// Records dropped from the register by this pass.
    pub evicted: usize,
}

impl Snapshot {
    #[must_use]
    pub fn num_latest(&self) -> usize {
        self.entries.len()
    }
}

/// Rank, evict and summarize the register.
///
/// Keeps at most `max_entries` completed records (newest `longest_time`
/// first, ties by path). When `stale_open_before` is set, never-completed
/// records opened before that instant are dropped too.
pub fn build_snapshot(
    register: &mut AccessRegister,
    stats: &AggregateStats,
    classifier: &Classifier,
    max_entries: usize,
    stale_open_before: Option<DateTime<Utc>>,
) -> Snapshot {
    let mut ranked: Vec<(DateTime<Utc>, PathBuf)> = Vec::new();
    let mut evict: Vec<PathBuf> = Vec::new();
    for record in register.iter() {
        match record.longest_time {
            Some(longest) => ranked.push((longest, record.path().to_path_buf())),
            None => {
                if let Some(cutoff) = stale_open_before
                    && record.last_open_time < cutoff
                {
                    evict.push(record.path().to_path_buf());
                }
            }
        }
    }
    ranked.sort_by(|(a_time, a_path), (b_time, b_path)| match b_time.cmp(a_time) {
        Ordering::Equal => a_path.cmp(b_path),
        other => other,
    });

    if ranked.len() > max_entries {
        evict.extend(ranked.split_off(max_entries).into_iter().map(|(_, path)| path));
    }
    let evicted = evict
        .iter()
        .filter(|path| register.remove(path).is_some())
        .count();

    let mut entries = Vec::with_capacity(ranked.len());
    for (longest, path) in &ranked {
        if let Some(record) = register.get(path) {
            entries.push(SnapshotEntry::from_record(record, *longest, classifier));
        }
    }

    summarize(entries, *stats, evicted)
}

fn summarize(entries: Vec<SnapshotEntry>, stats: AggregateStats, evicted: usize) -> Snapshot {
    let mut duration_sum = 0.0;
    let mut tape_duration_sum = 0.0;
    let mut tape_bytes_sum = 0.0;
    let mut num_tape = 0_usize;
    for entry in &entries {
        duration_sum += entry.longest_duration;
        if entry.is_tape() {
            num_tape += 1;
            tape_duration_sum += entry.longest_duration;
            #[allow(clippy::cast_precision_loss)]
            let bytes = entry.longest_file_size as f64;
            tape_bytes_sum += bytes;
        }
    }

    #[allow(clippy::cast_precision_loss)]
    let avg_latest = if entries.is_empty() {
        0.0
    } else {
        duration_sum / entries.len() as f64
    };
    #[allow(clippy::cast_precision_loss)]
    let avg_latest_tape = if num_tape == 0 {
        0.0
    } else {
        tape_duration_sum / num_tape as f64
    };
    let bytes_per_sec_latest_tape = if tape_duration_sum > 0.0 {
        tape_bytes_sum / tape_duration_sum
    } else {
        0.0
    };

    Snapshot {
        version: STATE_VERSION,
        entries,
        avg_latest,
        avg_latest_tape,
        bytes_per_sec_latest_tape,
        num_tape,
        stats,
        evicted,
    }
}
