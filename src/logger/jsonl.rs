//! Append-only JSONL activity log.
//!
//! One self-contained JSON object per line, built in memory and written with
//! a single `write_all` so a tailing reader never sees half a line. When the
//! file cannot be opened or written the writer degrades to stderr (prefixed
//! `[FSE-JSONL]`) and finally to discarding; logging never takes the agent
//! down.

#![allow(missing_docs)]

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::core::errors::{AgentError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// Agent lifecycle and aggregation events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    AgentStart,
    AgentStop,
    StateRestored,
    CheckCompleted,
    StateSaveFailed,
    StatFailed,
    WatchError,
    EventsDropped,
}

/// One activity line. Only `ts`, `event` and `severity` are always present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// RFC 3339 UTC, millisecond precision.
    pub ts: String,
    pub event: EventType,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Records affected (restored, reported).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub records: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evicted: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counter: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counter_tape: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl LogEntry {
    pub fn new(event: EventType, severity: Severity) -> Self {
        Self {
            ts: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            event,
            severity,
            path: None,
            records: None,
            evicted: None,
            counter: None,
            counter_tape: None,
            duration_ms: None,
            error_code: None,
            error_message: None,
            details: None,
        }
    }

    /// Attach an error's code and message.
    #[must_use]
    pub fn with_error(mut self, error: &AgentError) -> Self {
        self.error_code = Some(error.code().to_string());
        self.error_message = Some(error.to_string());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sink {
    File,
    Stderr,
    Discard,
}

#[derive(Debug, Clone)]
pub struct JsonlConfig {
    pub path: PathBuf,
    /// Rotate once the file would grow past this. Default: 32 MiB.
    pub max_size_bytes: u64,
    /// Rotated generations kept as `<path>.1 .. <path>.N`. Default: 3.
    pub max_rotated_files: u32,
    pub fsync_interval: Duration,
}

impl JsonlConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_size_bytes: 32 * 1024 * 1024,
            max_rotated_files: 3,
            fsync_interval: Duration::from_secs(10),
        }
    }
}

pub struct JsonlWriter {
    config: JsonlConfig,
    file: Option<BufWriter<File>>,
    sink: Sink,
    bytes_written: u64,
    last_fsync: Instant,
}

impl JsonlWriter {
    /// Open the log, degrading to stderr when the file is unusable.
    pub fn open(config: JsonlConfig) -> Self {
        let mut writer = Self {
            config,
            file: None,
            sink: Sink::Discard,
            bytes_written: 0,
            last_fsync: Instant::now(),
        };
        writer.reopen();
        writer
    }

    pub fn write_entry(&mut self, entry: &LogEntry) {
        match serde_json::to_string(entry) {
            Ok(json) => self.write_line(&format!("{json}\n")),
            Err(error) => eprintln!("[FSE-JSONL] serialize error: {error}"),
        }
    }

    pub fn flush(&mut self) {
        if let Some(file) = self.file.as_mut() {
            let _ = file.flush();
        }
    }

    pub fn fsync(&mut self) {
        if let Some(file) = self.file.as_mut() {
            let _ = file.flush();
            let _ = file.get_ref().sync_data();
        }
        self.last_fsync = Instant::now();
    }

    /// `"file"`, `"stderr"` or `"discard"`.
    pub fn state(&self) -> &'static str {
        match self.sink {
            Sink::File => "file",
            Sink::Stderr => "stderr",
            Sink::Discard => "discard",
        }
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    // ──────────────────────── internals ────────────────────────

    fn write_line(&mut self, line: &str) {
        let len = line.len() as u64;
        if self.sink == Sink::File && self.bytes_written + len > self.config.max_size_bytes {
            self.rotate();
        }

        match self.sink {
            Sink::File => {
                let written = self
                    .file
                    .as_mut()
                    .is_some_and(|file| file.write_all(line.as_bytes()).is_ok());
                if written {
                    self.bytes_written += len;
                    if self.last_fsync.elapsed() >= self.config.fsync_interval {
                        self.fsync();
                    }
                } else {
                    self.degrade();
                    self.write_line(line);
                }
            }
            Sink::Stderr => {
                if write!(io::stderr(), "[FSE-JSONL] {line}").is_err() {
                    self.degrade();
                }
            }
            Sink::Discard => {}
        }
    }

    fn reopen(&mut self) {
        match open_append(&self.config.path) {
            Ok((file, size)) => {
                self.file = Some(BufWriter::with_capacity(64 * 1024, file));
                self.sink = Sink::File;
                self.bytes_written = size;
            }
            Err(error) => {
                eprintln!("[FSE-JSONL] cannot open activity log, using stderr: {error}");
                self.file = None;
                self.sink = Sink::Stderr;
            }
        }
    }

    fn degrade(&mut self) {
        self.file = None;
        self.sink = match self.sink {
            Sink::File => {
                eprintln!("[FSE-JSONL] activity log write failed, using stderr");
                Sink::Stderr
            }
            Sink::Stderr | Sink::Discard => Sink::Discard,
        };
    }

    fn rotate(&mut self) {
        if let Some(file) = self.file.as_mut() {
            let _ = file.flush();
        }
        self.file = None;

        let base = self.config.path.clone();
        let keep = self.config.max_rotated_files;
        if keep == 0 {
            let _ = fs::remove_file(&base);
        } else {
            let _ = fs::remove_file(rotated_name(&base, keep));
            for index in (1..keep).rev() {
                let _ = fs::rename(rotated_name(&base, index), rotated_name(&base, index + 1));
            }
            let _ = fs::rename(&base, rotated_name(&base, 1));
        }
        self.reopen();
    }
}

/// Open or create `path` for appending; returns the file and its current size.
fn open_append(path: &Path) -> Result<(File, u64)> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|source| AgentError::io(parent, source))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| AgentError::io(path, source))?;
    let size = file.metadata().map(|meta| meta.len()).unwrap_or(0);
    Ok((file, size))
}

/// `activity.jsonl` -> `activity.jsonl.2`.
fn rotated_name(base: &Path, index: u32) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(format!(".{index}"));
    PathBuf::from(name)
}
