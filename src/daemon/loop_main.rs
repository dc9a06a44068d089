//! Agent main loop: event consumer thread, periodic checks, final save.
//!
//! ```text
//!   watcher ──bounded──► fse-consumer ──► AccessStore ◄── check loop ──► ReportSink
//!                                                              │
//!                                                              └──► state file
//! ```
//!
//! The consumer owns the receive side of the watcher channel and applies
//! events to the store one at a time. The calling thread sleeps between
//! checks, waking early on SIGTERM/SIGINT, and runs one last check on the
//! way out.

#![allow(missing_docs)]

use std::cell::RefCell;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError};

use crate::aggregator::{AccessStore, CloseOutcome};
use crate::core::config::Config;
use crate::core::errors::{AgentError, Result};
use crate::daemon::signals::{ShutdownCoordinator, SignalHandler};
use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle, spawn_logger};
use crate::logger::jsonl::JsonlConfig;
use crate::persist::{RestoreOutcome, restore};
use crate::platform::pal::{Platform, detect_platform};
use crate::report::{CheckOutcome, JsonLineSink, ReportSink, run_check};
use crate::watcher::{
    AccessEvent, AccessKind, DEFAULT_CHANNEL_CAPACITY, FsWatcher, WatchMessage, read_watch_list,
};

/// How long the consumer blocks before rechecking the shutdown flag.
const CONSUMER_POLL: Duration = Duration::from_millis(250);
/// Granularity of the interruptible sleep between checks.
const SLEEP_TICK: Duration = Duration::from_millis(250);

// ──────────────────── main daemon struct ────────────────────

pub struct AgentDaemon {
    config: Config,
    store: Arc<AccessStore>,
    logger_handle: ActivityLoggerHandle,
    logger_join: Option<thread::JoinHandle<()>>,
    signal_handler: SignalHandler,
    start_time: Instant,
    restore_outcome: RestoreOutcome,
}

impl AgentDaemon {
    /// Host platform, real signal registration, activity log from config.
    pub fn init(config: Config) -> Result<Self> {
        Self::init_with(config, detect_platform(), SignalHandler::new())
    }

    /// Build the store, start the activity logger and restore persisted state.
    ///
    /// A corrupt state file aborts here only under the strict restore policy.
    pub fn init_with(
        config: Config,
        platform: Arc<dyn Platform>,
        signal_handler: SignalHandler,
    ) -> Result<Self> {
        let (logger_handle, logger_join) =
            spawn_logger(JsonlConfig::new(config.paths.activity_log.clone()))?;

        let store = Arc::new(AccessStore::new(config.engine.clone(), platform));
        let state_path = config.paths.state_file.clone();
        let restore_outcome = match restore(&store, &state_path, config.persistence.restore_policy) {
            Ok(outcome) => outcome,
            Err(error) => {
                eprintln!("[FSE-STATE] refusing to start: {error}");
                logger_handle.shutdown();
                let _ = logger_join.join();
                return Err(error);
            }
        };
        log_restore(&logger_handle, &state_path, &restore_outcome);

        Ok(Self {
            config,
            store,
            logger_handle,
            logger_join: Some(logger_join),
            signal_handler,
            start_time: Instant::now(),
            restore_outcome,
        })
    }

    pub fn store(&self) -> &Arc<AccessStore> {
        &self.store
    }

    pub fn signal_handler(&self) -> &SignalHandler {
        &self.signal_handler
    }

    pub fn restore_outcome(&self) -> &RestoreOutcome {
        &self.restore_outcome
    }

    /// Watch the configured directories and report to stdout until shutdown.
    ///
    /// This is the entry point for `fsevents-agent run`.
    pub fn run(&mut self) -> Result<()> {
        let dirs = read_watch_list(&self.config.paths.watch_list)?;
        let (watcher, rx) = FsWatcher::start(&dirs, DEFAULT_CHANNEL_CAPACITY)?;
        eprintln!(
            "[FSE-WATCH] watching {} director{}",
            dirs.len(),
            if dirs.len() == 1 { "y" } else { "ies" }
        );

        let mut sink = JsonLineSink::new(io::stdout());
        let result = self.run_with_source(rx, dirs.len(), &mut sink);

        let dropped = watcher.dropped_events();
        if dropped > 0 {
            eprintln!("[FSE-WATCH] {dropped} events dropped while the consumer was busy");
        }
        drop(watcher);
        result
    }

    /// Consume `rx` and run periodic checks into `sink` until shutdown.
    pub fn run_with_source(
        &mut self,
        rx: Receiver<WatchMessage>,
        watch_dirs: usize,
        sink: &mut dyn ReportSink,
    ) -> Result<()> {
        let config_hash = self.config.stable_hash().unwrap_or_default();
        eprintln!(
            "[FSE-DAEMON] starting v{} (config_hash={config_hash}, interval={}s)",
            env!("CARGO_PKG_VERSION"),
            self.config.schedule.check_interval_secs
        );
        self.logger_handle.send(ActivityEvent::AgentStarted {
            version: env!("CARGO_PKG_VERSION").to_string(),
            config_hash,
            watch_dirs,
        });

        let consumer = self.spawn_consumer_thread(rx)?;
        let interval = Duration::from_secs(self.config.schedule.check_interval_secs);

        // ──────── check loop ────────
        loop {
            if self.signal_handler.sleep_unless_shutdown(interval, SLEEP_TICK) {
                eprintln!("[FSE-DAEMON] shutdown requested");
                break;
            }
            self.check(sink);
        }

        if consumer.join().is_err() {
            eprintln!("[FSE-DAEMON] event consumer panicked");
        }
        self.shutdown(sink);
        Ok(())
    }

    /// One check: snapshot, save, emit, log.
    pub fn check(&self, sink: &mut dyn ReportSink) -> CheckOutcome {
        let started = Instant::now();
        let state_path = &self.config.paths.state_file;
        let outcome = run_check(&self.store, Some(state_path));

        if let Some(error) = &outcome.save_error {
            eprintln!("[FSE-STATE] failed to save {}: {error}", state_path.display());
            self.logger_handle
                .send(ActivityEvent::save_failed(state_path, error));
        }
        if let Err(error) = sink.emit(&outcome.report) {
            eprintln!("[FSE-DAEMON] report not delivered: {error}");
        }

        let stats = outcome.report.stats.first();
        self.logger_handle.send(ActivityEvent::CheckCompleted {
            records: outcome.report.latest.len(),
            evicted: outcome.evicted,
            counter: stats.map_or(0, |row| row.counter),
            counter_tape: stats.map_or(0, |row| row.counter_tape),
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        });
        outcome
    }

    fn spawn_consumer_thread(&self, rx: Receiver<WatchMessage>) -> Result<thread::JoinHandle<()>> {
        let store = Arc::clone(&self.store);
        let logger = self.logger_handle.clone();
        let signals = self.signal_handler.clone();

        thread::Builder::new()
            .name("fse-consumer".to_string())
            .spawn(move || consumer_thread_main(&rx, &store, &logger, &signals))
            .map_err(|source| AgentError::Runtime {
                details: format!("failed to spawn consumer thread: {source}"),
            })
    }

    // ──────────────────── shutdown ────────────────────

    fn shutdown(&mut self, sink: &mut dyn ReportSink) {
        let uptime_secs = self.start_time.elapsed().as_secs();
        let sink = RefCell::new(sink);

        let final_check = || {
            let mut sink = sink.borrow_mut();
            self.check(&mut **sink).save_error.is_none()
        };
        let stop_logger = || {
            self.logger_handle.send(ActivityEvent::AgentStopped {
                reason: "clean shutdown".to_string(),
                uptime_secs,
            });
            self.logger_handle.shutdown();
            true
        };
        let tasks: Vec<(&str, &dyn Fn() -> bool)> =
            vec![("final check", &final_check), ("activity log", &stop_logger)];
        ShutdownCoordinator::new().execute(&tasks);

        if let Some(join) = self.logger_join.take() {
            let _ = join.join();
        }
        eprintln!("[FSE-DAEMON] shutdown complete (uptime={uptime_secs}s)");
    }
}

fn log_restore(logger: &ActivityLoggerHandle, path: &Path, outcome: &RestoreOutcome) {
    match outcome {
        RestoreOutcome::Missing => {
            eprintln!("[FSE-STATE] no state at {}, starting cold", path.display());
        }
        RestoreOutcome::Restored {
            records,
            total_count,
        } => {
            eprintln!(
                "[FSE-STATE] restored {records} records (n={total_count}) from {}",
                path.display()
            );
            logger.send(ActivityEvent::StateRestored {
                path: path.display().to_string(),
                records: *records,
                counter: *total_count,
            });
        }
        RestoreOutcome::Discarded { reason } => {
            eprintln!(
                "[FSE-STATE] ignoring unusable state at {}, starting cold: {reason}",
                path.display()
            );
            logger.send(ActivityEvent::StateDiscarded {
                path: path.display().to_string(),
                reason: reason.clone(),
            });
        }
    }
}

// ──────────────────── consumer thread ────────────────────

/// Drain watcher messages into the store until shutdown or disconnect.
///
/// On shutdown, messages already queued are still applied so the final
/// check sees them.
fn consumer_thread_main(
    rx: &Receiver<WatchMessage>,
    store: &AccessStore,
    logger: &ActivityLoggerHandle,
    signals: &SignalHandler,
) {
    loop {
        if signals.should_shutdown() {
            let pending = rx.len();
            for message in rx.try_iter().take(pending) {
                apply_message(store, logger, message);
            }
            return;
        }
        match rx.recv_timeout(CONSUMER_POLL) {
            Ok(message) => apply_message(store, logger, message),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                eprintln!("[FSE-WATCH] event source closed");
                return;
            }
        }
    }
}

fn apply_message(store: &AccessStore, logger: &ActivityLoggerHandle, message: WatchMessage) {
    match message {
        WatchMessage::Access(event) => apply_access(store, logger, &event),
        WatchMessage::Error(message) => {
            eprintln!("[FSE-WATCH] watcher error: {message}");
            logger.send(ActivityEvent::WatchError { message });
        }
    }
}

fn apply_access(store: &AccessStore, logger: &ActivityLoggerHandle, event: &AccessEvent) {
    match event.kind {
        AccessKind::Open => {
            if !store.platform().is_dir(&event.path) {
                store.open(&event.path);
            }
        }
        AccessKind::CloseWrite | AccessKind::CloseRead => {
            if let CloseOutcome::StatFailed(error) = store.close(&event.path) {
                eprintln!("[FSE-STORE] {error}");
                logger.send(ActivityEvent::StatFailed {
                    path: event.path.display().to_string(),
                    error_message: error.to_string(),
                });
            }
        }
    }
}
