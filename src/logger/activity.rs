//! Activity logger thread.
//!
//! A dedicated thread owns the [`JsonlWriter`]. Everything else sends
//! [`ActivityEvent`]s through a bounded crossbeam channel with `try_send()`,
//! so the event consumer and the check loop never block on logging.

#![allow(missing_docs)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

use crate::core::errors::{AgentError, Result};
use crate::logger::jsonl::{EventType, JsonlConfig, JsonlWriter, LogEntry, Severity};

const CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq)]
pub enum ActivityEvent {
    AgentStarted {
        version: String,
        config_hash: String,
        watch_dirs: usize,
    },
    AgentStopped {
        reason: String,
        uptime_secs: u64,
    },
    StateRestored {
        path: String,
        records: usize,
        counter: u64,
    },
    /// The state file was unusable and the agent started cold.
    StateDiscarded {
        path: String,
        reason: String,
    },
    CheckCompleted {
        records: usize,
        evicted: usize,
        counter: u64,
        counter_tape: u64,
        duration_ms: u64,
    },
    StateSaveFailed {
        path: String,
        error_code: String,
        error_message: String,
    },
    StatFailed {
        path: String,
        error_message: String,
    },
    WatchError {
        message: String,
    },
    /// Stop the logger thread after flushing.
    Shutdown,
}

impl ActivityEvent {
    pub fn save_failed(path: &std::path::Path, error: &AgentError) -> Self {
        Self::StateSaveFailed {
            path: path.display().to_string(),
            error_code: error.code().to_string(),
            error_message: error.to_string(),
        }
    }
}

/// Cloneable sender side of the activity log.
#[derive(Clone)]
pub struct ActivityLoggerHandle {
    tx: Sender<ActivityEvent>,
    dropped_events: Arc<AtomicU64>,
}

impl ActivityLoggerHandle {
    /// Non-blocking; a full channel drops the event and bumps the counter.
    pub fn send(&self, event: ActivityEvent) {
        if let Err(TrySendError::Full(_)) = self.tx.try_send(event) {
            self.dropped_events.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    /// Ask the logger thread to flush and exit. Blocks only if the queue is full.
    pub fn shutdown(&self) {
        let _ = self.tx.send(ActivityEvent::Shutdown);
    }

    /// Handle whose events go nowhere, for tests and one-shot commands.
    pub fn disabled() -> Self {
        let (tx, _rx) = bounded(1);
        Self {
            tx,
            dropped_events: Arc::new(AtomicU64::new(0)),
        }
    }
}

/// Spawn the `fse-logger` thread writing to `config.path`.
pub fn spawn_logger(config: JsonlConfig) -> Result<(ActivityLoggerHandle, thread::JoinHandle<()>)> {
    spawn_logger_with_capacity(config, CHANNEL_CAPACITY)
}

pub fn spawn_logger_with_capacity(
    config: JsonlConfig,
    capacity: usize,
) -> Result<(ActivityLoggerHandle, thread::JoinHandle<()>)> {
    let (tx, rx) = bounded::<ActivityEvent>(capacity.max(1));
    let dropped = Arc::new(AtomicU64::new(0));
    let handle = ActivityLoggerHandle {
        tx,
        dropped_events: Arc::clone(&dropped),
    };

    let join = thread::Builder::new()
        .name("fse-logger".to_string())
        .spawn(move || logger_thread_main(&rx, JsonlWriter::open(config), &dropped))
        .map_err(|error| AgentError::Runtime {
            details: format!("failed to spawn logger thread: {error}"),
        })?;

    Ok((handle, join))
}

fn logger_thread_main(rx: &Receiver<ActivityEvent>, mut jsonl: JsonlWriter, dropped: &AtomicU64) {
    while let Ok(event) = rx.recv() {
        let lost = dropped.swap(0, Ordering::Relaxed);
        if lost > 0 {
            let mut warn = LogEntry::new(EventType::EventsDropped, Severity::Warning);
            warn.records = Some(lost);
            warn.details = Some(format!("{lost} activity events dropped under back-pressure"));
            jsonl.write_entry(&warn);
        }

        if event == ActivityEvent::Shutdown {
            break;
        }
        jsonl.write_entry(&to_log_entry(&event));
        jsonl.flush();
    }

    jsonl.flush();
    jsonl.fsync();
}

fn to_log_entry(event: &ActivityEvent) -> LogEntry {
    match event {
        ActivityEvent::AgentStarted {
            version,
            config_hash,
            watch_dirs,
        } => {
            let mut e = LogEntry::new(EventType::AgentStart, Severity::Info);
            e.records = Some(*watch_dirs as u64);
            e.details = Some(format!("version={version} config_hash={config_hash}"));
            e
        }
        ActivityEvent::AgentStopped {
            reason,
            uptime_secs,
        } => {
            let mut e = LogEntry::new(EventType::AgentStop, Severity::Info);
            e.details = Some(format!("reason={reason} uptime={uptime_secs}s"));
            e
        }
        ActivityEvent::StateRestored {
            path,
            records,
            counter,
        } => {
            let mut e = LogEntry::new(EventType::StateRestored, Severity::Info);
            e.path = Some(path.clone());
            e.records = Some(*records as u64);
            e.counter = Some(*counter);
            e
        }
        ActivityEvent::StateDiscarded { path, reason } => {
            let mut e = LogEntry::new(EventType::StateRestored, Severity::Warning);
            e.path = Some(path.clone());
            e.records = Some(0);
            e.error_message = Some(reason.clone());
            e
        }
        ActivityEvent::CheckCompleted {
            records,
            evicted,
            counter,
            counter_tape,
            duration_ms,
        } => {
            let mut e = LogEntry::new(EventType::CheckCompleted, Severity::Info);
            e.records = Some(*records as u64);
            e.evicted = Some(*evicted as u64);
            e.counter = Some(*counter);
            e.counter_tape = Some(*counter_tape);
            e.duration_ms = Some(*duration_ms);
            e
        }
        ActivityEvent::StateSaveFailed {
            path,
            error_code,
            error_message,
        } => {
            let mut e = LogEntry::new(EventType::StateSaveFailed, Severity::Critical);
            e.path = Some(path.clone());
            e.error_code = Some(error_code.clone());
            e.error_message = Some(error_message.clone());
            e
        }
        ActivityEvent::StatFailed {
            path,
            error_message,
        } => {
            let mut e = LogEntry::new(EventType::StatFailed, Severity::Warning);
            e.path = Some(path.clone());
            e.error_message = Some(error_message.clone());
            e
        }
        ActivityEvent::WatchError { message } => {
            let mut e = LogEntry::new(EventType::WatchError, Severity::Warning);
            e.error_message = Some(message.clone());
            e
        }
        ActivityEvent::Shutdown => LogEntry::new(EventType::AgentStop, Severity::Info),
    }
}
