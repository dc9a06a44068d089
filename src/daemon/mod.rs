//! Daemon subsystem: main loop, event consumer and signal handling.

#[cfg(feature = "daemon")]
pub mod loop_main;
#[cfg(feature = "daemon")]
pub mod signals;
