//! Watch-list loading and the live event source.
//!
//! On Linux the source is a set of raw inotify watches (see
//! `inotify_source`); elsewhere it is notify's recommended watcher.

#![allow(missing_docs)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::{Receiver, Sender, TrySendError};

use super::events::WatchMessage;
use crate::core::errors::{AgentError, Result};

#[cfg(target_os = "linux")]
type EventSource = super::inotify_source::InotifySource;
#[cfg(not(target_os = "linux"))]
type EventSource = notify::RecommendedWatcher;

/// Default queue depth between the watcher callback and the consumer.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 4096;

/// Read the directories to watch: one per line, trimmed, blanks and `#`
/// comments skipped. An unreadable or empty list is an error.
pub fn read_watch_list(path: &Path) -> Result<Vec<PathBuf>> {
    let raw = fs::read_to_string(path).map_err(|error| AgentError::WatchList {
        path: path.to_path_buf(),
        details: error.to_string(),
    })?;
    let dirs = parse_watch_list(&raw);
    if dirs.is_empty() {
        return Err(AgentError::WatchList {
            path: path.to_path_buf(),
            details: "no directories listed".to_string(),
        });
    }
    Ok(dirs)
}

fn parse_watch_list(raw: &str) -> Vec<PathBuf> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(PathBuf::from)
        .collect()
}

/// Live watcher. Dropping it unregisters every directory and closes the channel.
pub struct FsWatcher {
    _source: EventSource,
    dirs: Vec<PathBuf>,
    dropped: Arc<AtomicU64>,
}

impl FsWatcher {
    /// Register every directory non-recursively and start forwarding events.
    pub fn start(dirs: &[PathBuf], capacity: usize) -> Result<(Self, Receiver<WatchMessage>)> {
        let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
        let dropped = Arc::new(AtomicU64::new(0));
        let forward = Forwarder {
            tx,
            dropped: Arc::clone(&dropped),
        };

        let source = start_source(dirs, forward)?;
        Ok((
            Self {
                _source: source,
                dirs: dirs.to_vec(),
                dropped,
            },
            rx,
        ))
    }

    #[must_use]
    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    /// Events discarded because the consumer fell behind.
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(target_os = "linux")]
fn start_source(dirs: &[PathBuf], forward: Forwarder) -> Result<EventSource> {
    EventSource::start(dirs, forward)
}

#[cfg(not(target_os = "linux"))]
fn start_source(dirs: &[PathBuf], forward: Forwarder) -> Result<EventSource> {
    use notify::{RecursiveMode, Watcher};

    use super::events::classify_notify_event;

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        match res {
            Ok(event) => {
                for access in classify_notify_event(&event) {
                    forward.send(WatchMessage::Access(access));
                }
            }
            Err(error) => forward.send(WatchMessage::Error(error.to_string())),
        }
    })?;

    for dir in dirs {
        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|error| AgentError::WatchRegistration {
                path: dir.clone(),
                details: error.to_string(),
            })?;
    }
    Ok(watcher)
}

/// Non-blocking hand-off into the bounded channel, counting what it drops.
pub(super) struct Forwarder {
    tx: Sender<WatchMessage>,
    dropped: Arc<AtomicU64>,
}

impl Forwarder {
    pub(super) fn send(&self, message: WatchMessage) {
        match self.tx.try_send(message) {
            Ok(()) | Err(TrySendError::Disconnected(_)) => {}
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}
