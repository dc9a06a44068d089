//! Durable JSON state: aggregate counters plus per-path longest-access history.

#![allow(missing_docs)]

use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::DateTime;
use serde::{Deserialize, Serialize};

use crate::aggregator::{AccessRecord, AccessStore, AggregateStats, Snapshot, SnapshotEntry};
use crate::core::config::RestorePolicy;
use crate::core::errors::{AgentError, Result};

/// On-disk layout. Missing fields default; unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistedState {
    pub version: u32,
    pub average: f64,
    #[serde(rename = "averageTape")]
    pub average_tape: f64,
    pub n: u64,
    #[serde(rename = "nTape")]
    pub n_tape: u64,
    #[serde(rename = "bytesTape")]
    pub bytes_tape: u64,
    #[serde(rename = "durationTape")]
    pub duration_tape: f64,
    pub latest: Vec<SnapshotEntry>,
}

impl PersistedState {
    #[must_use]
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        let stats = &snapshot.stats;
        Self {
            version: snapshot.version,
            average: stats.total_average(),
            average_tape: stats.tape_average(),
            n: stats.total_count(),
            n_tape: stats.tape_count(),
            bytes_tape: stats.cumulative_tape_bytes(),
            duration_tape: stats.cumulative_tape_duration(),
            latest: snapshot.entries.clone(),
        }
    }

    #[must_use]
    pub fn stats(&self) -> AggregateStats {
        AggregateStats::from_parts(
            self.n,
            self.average,
            self.n_tape,
            self.average_tape,
            self.bytes_tape,
            self.duration_tape,
        )
    }

    /// Records rebuilt from `latest`, skipping entries without a name or a
    /// usable longest-access time.
    pub fn records(&self) -> impl Iterator<Item = AccessRecord> + '_ {
        self.latest.iter().filter_map(|entry| {
            if entry.name.is_empty() || entry.longest_time == 0 {
                return None;
            }
            let longest_time = DateTime::from_timestamp(entry.longest_time, 0)?;
            Some(AccessRecord::restored(
                PathBuf::from(&entry.name),
                longest_time,
                finite_or_zero(entry.longest_duration),
                entry.longest_file_size,
                finite_or_zero(entry.longest_bytes_per_sec),
            ))
        })
    }
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 { value } else { 0.0 }
}

/// What startup restore found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// No state file; cold start.
    Missing,
    Restored { records: usize, total_count: u64 },
    /// The file existed but was unusable; cold start under the lenient policy.
    Discarded { reason: String },
}

/// `<path>.tmp`, the staging file for atomic saves.
#[must_use]
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Serialize `state` as pretty JSON and atomically replace `path`.
pub fn save_state(path: &Path, state: &PersistedState) -> Result<()> {
    let json = serde_json::to_string_pretty(state).map_err(|error| AgentError::Serialization {
        context: "state file",
        details: error.to_string(),
    })?;

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|source| AgentError::io(parent, source))?;
    }

    let tmp_path = temp_path(path);
    let result = (|| {
        let mut opts = OpenOptions::new();
        opts.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt as _;
            opts.mode(0o644);
        }
        let mut file = opts.open(&tmp_path)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp_path, path)
    })();

    if let Err(source) = result {
        let _ = fs::remove_file(&tmp_path);
        return Err(AgentError::io(path, source));
    }
    Ok(())
}

/// Persist the counters and entries of an already-built snapshot.
pub fn save_snapshot(path: &Path, snapshot: &Snapshot) -> Result<()> {
    save_state(path, &PersistedState::from_snapshot(snapshot))
}

/// Read and parse the state file. `Ok(None)` when it does not exist.
pub fn load_state(path: &Path) -> Result<Option<PersistedState>> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => return Err(AgentError::io(path, source)),
    };
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|error| AgentError::StateParse {
            path: path.to_path_buf(),
            details: error.to_string(),
        })
}

/// Load `path` into `store`, replacing its state.
///
/// Read failures always degrade to a cold start. Parse failures abort only
/// under [`RestorePolicy::Strict`].
pub fn restore(store: &AccessStore, path: &Path, policy: RestorePolicy) -> Result<RestoreOutcome> {
    let state = match load_state(path) {
        Ok(Some(state)) => state,
        Ok(None) => return Ok(RestoreOutcome::Missing),
        Err(error @ AgentError::StateParse { .. }) if policy == RestorePolicy::Strict => {
            return Err(error);
        }
        Err(error) => {
            return Ok(RestoreOutcome::Discarded {
                reason: error.to_string(),
            });
        }
    };

    let stats = state.stats();
    let records = store.replace_state(stats, state.records());
    Ok(RestoreOutcome::Restored {
        records,
        total_count: stats.total_count(),
    })
}
