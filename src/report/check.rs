//! Periodic check: snapshot, persist, and shape the upstream report.

#![allow(missing_docs)]

use std::io::Write;
use std::path::Path;

use serde::Serialize;

use crate::aggregator::{AccessStore, Snapshot, SnapshotEntry};
use crate::core::errors::{AgentError, Result};
use crate::persist::save_snapshot;

/// Agent identity reported with every check.
pub const AGENT_NAME: &str = "fsevents";

/// Summary row of the `stats` section.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsRow {
    pub name: &'static str,
    pub counter: u64,
    pub counter_tape: u64,
    pub average: f64,
    pub average_tape: f64,
    pub avg_latest: f64,
    pub avg_latest_tape: f64,
    pub bytes_per_sec_tape: f64,
    pub bytes_per_sec_latest_tape: f64,
    pub num_latest: usize,
    pub num_latest_tape: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentInfo {
    pub name: &'static str,
    pub version: &'static str,
}

/// One check's output: three named sections.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckReport {
    pub latest: Vec<SnapshotEntry>,
    pub stats: Vec<StatsRow>,
    pub agent: Vec<AgentInfo>,
}

impl CheckReport {
    #[must_use]
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        let stats = &snapshot.stats;
        Self {
            latest: snapshot.entries.clone(),
            stats: vec![StatsRow {
                name: "stats",
                counter: stats.total_count(),
                counter_tape: stats.tape_count(),
                average: stats.total_average(),
                average_tape: stats.tape_average(),
                avg_latest: snapshot.avg_latest,
                avg_latest_tape: snapshot.avg_latest_tape,
                bytes_per_sec_tape: stats.bytes_per_sec_tape(),
                bytes_per_sec_latest_tape: snapshot.bytes_per_sec_latest_tape,
                num_latest: snapshot.num_latest(),
                num_latest_tape: snapshot.num_tape,
            }],
            agent: vec![AgentInfo {
                name: AGENT_NAME,
                version: env!("CARGO_PKG_VERSION"),
            }],
        }
    }
}

/// Report plus the outcome of the save that accompanied it.
///
/// A failed save does not suppress the report.
#[derive(Debug)]
pub struct CheckOutcome {
    pub report: CheckReport,
    pub evicted: usize,
    pub save_error: Option<AgentError>,
}

/// Snapshot the store and, when `state_path` is given, persist it.
pub fn run_check(store: &AccessStore, state_path: Option<&Path>) -> CheckOutcome {
    let snapshot = store.snapshot();
    let save_error = state_path.and_then(|path| save_snapshot(path, &snapshot).err());
    CheckOutcome {
        report: CheckReport::from_snapshot(&snapshot),
        evicted: snapshot.evicted,
        save_error,
    }
}

/// Destination for check reports.
pub trait ReportSink: Send {
    fn emit(&mut self, report: &CheckReport) -> Result<()>;
}

/// Writes each report as a single JSON line.
pub struct JsonLineSink<W: Write + Send> {
    writer: W,
    pretty: bool,
}

impl<W: Write + Send> JsonLineSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            pretty: false,
        }
    }

    /// Indented multi-line output, for interactive use.
    #[must_use]
    pub fn pretty(mut self) -> Self {
        self.pretty = true;
        self
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> ReportSink for JsonLineSink<W> {
    fn emit(&mut self, report: &CheckReport) -> Result<()> {
        let encoded = if self.pretty {
            serde_json::to_string_pretty(report)
        } else {
            serde_json::to_string(report)
        }
        .map_err(|error| AgentError::Serialization {
            context: "check report",
            details: error.to_string(),
        })?;
        writeln!(self.writer, "{encoded}")
            .and_then(|()| self.writer.flush())
            .map_err(|source| AgentError::io("<report sink>", source))
    }
}

/// Sink that keeps reports in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    pub reports: Vec<CheckReport>,
}

impl ReportSink for CollectingSink {
    fn emit(&mut self, report: &CheckReport) -> Result<()> {
        self.reports.push(report.clone());
        Ok(())
    }
}
