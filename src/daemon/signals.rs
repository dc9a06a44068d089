//! SIGTERM/SIGINT handling and the ordered shutdown sequence.
//!
//! `signal-hook` sets an atomic flag; the check loop and the event consumer
//! poll it instead of blocking on signals.

#![allow(missing_docs)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use signal_hook::consts::{SIGINT, SIGTERM};

// ──────────────────── signal handler ────────────────────

/// Shared shutdown flag. Cloning shares the flag.
#[derive(Clone, Debug)]
pub struct SignalHandler {
    shutdown_flag: Arc<AtomicBool>,
}

impl SignalHandler {
    /// Register SIGTERM and SIGINT. Registration failures are logged, not fatal.
    pub fn new() -> Self {
        let handler = Self::detached();
        for (signal, name) in [(SIGTERM, "SIGTERM"), (SIGINT, "SIGINT")] {
            if let Err(e) = signal_hook::flag::register(signal, Arc::clone(&handler.shutdown_flag)) {
                eprintln!("[FSE-SIGNAL] failed to register {name}: {e}");
            }
        }
        handler
    }

    /// A handler not wired to any OS signal; only [`Self::request_shutdown`] trips it.
    pub fn detached() -> Self {
        Self {
            shutdown_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn should_shutdown(&self) -> bool {
        self.shutdown_flag.load(Ordering::Relaxed)
    }

    pub fn request_shutdown(&self) {
        self.shutdown_flag.store(true, Ordering::Relaxed);
    }

    /// Sleep up to `total`, waking early on shutdown. Returns `true` if shutdown was requested.
    pub fn sleep_unless_shutdown(&self, total: Duration, tick: Duration) -> bool {
        let deadline = Instant::now() + total;
        loop {
            if self.should_shutdown() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            std::thread::sleep(tick.min(deadline - now));
        }
    }
}

impl Default for SignalHandler {
    fn default() -> Self {
        Self::new()
    }
}

// ──────────────────── shutdown coordinator ────────────────────

/// Runs named shutdown tasks in order until done or out of time.
pub struct ShutdownCoordinator {
    pub timeout: Duration,
}

impl ShutdownCoordinator {
    /// 30-second budget.
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(30))
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// `true` when every task ran and reported success.
    pub fn execute(&self, shutdown_tasks: &[(&str, &dyn Fn() -> bool)]) -> bool {
        let start = Instant::now();
        let mut all_ok = true;

        for (name, task) in shutdown_tasks {
            if start.elapsed() > self.timeout {
                eprintln!("[FSE-SIGNAL] shutdown timeout reached, skipping {name} and later tasks");
                return false;
            }
            if task() {
                eprintln!("[FSE-SIGNAL] {name}: ok");
            } else {
                eprintln!("[FSE-SIGNAL] {name}: failed");
                all_ok = false;
            }
        }

        all_ok
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
