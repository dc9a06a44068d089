//! Linux event source on raw inotify watches.
//!
//! notify's inotify backend never subscribes to `IN_CLOSE_NOWRITE`, so a file
//! opened only for reading would report its open and never its close. The
//! watches here ask for exactly open, close-write and close-nowrite.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use inotify::{EventMask, Inotify, WatchDescriptor, WatchMask, Watches};

use super::events::{AccessEvent, WatchMessage, inotify_access_kind};
use super::fs_watcher::Forwarder;
use crate::core::errors::{AgentError, Result};

const ACCESS_MASK: WatchMask = WatchMask::OPEN
    .union(WatchMask::CLOSE_WRITE)
    .union(WatchMask::CLOSE_NOWRITE);

const READ_BUFFER_BYTES: usize = 64 * 1024;

/// Owns the registered watches; the read loop runs on `fse-watch`.
///
/// Dropping it removes every watch. The kernel answers each removal with
/// `IN_IGNORED`, which wakes the blocked read, and the loop exits once no
/// watch is left, closing the channel.
pub(super) struct InotifySource {
    watches: Watches,
    descriptors: Vec<WatchDescriptor>,
    stopping: Arc<AtomicBool>,
}

impl InotifySource {
    pub(super) fn start(dirs: &[PathBuf], forward: Forwarder) -> Result<Self> {
        let inotify = Inotify::init().map_err(|source| AgentError::Runtime {
            details: format!("inotify init failed: {source}"),
        })?;
        let mut watches = inotify.watches();

        let mut by_descriptor = HashMap::with_capacity(dirs.len());
        let mut descriptors = Vec::with_capacity(dirs.len());
        for dir in dirs {
            let wd = watches
                .add(dir, ACCESS_MASK)
                .map_err(|error| AgentError::WatchRegistration {
                    path: dir.clone(),
                    details: error.to_string(),
                })?;
            by_descriptor.insert(wd.clone(), dir.clone());
            descriptors.push(wd);
        }

        let stopping = Arc::new(AtomicBool::new(false));
        let loop_stopping = Arc::clone(&stopping);
        thread::Builder::new()
            .name("fse-watch".to_string())
            .spawn(move || read_loop(inotify, by_descriptor, &forward, &loop_stopping))
            .map_err(|source| AgentError::Runtime {
                details: format!("failed to spawn watch thread: {source}"),
            })?;

        Ok(Self {
            watches,
            descriptors,
            stopping,
        })
    }
}

impl Drop for InotifySource {
    fn drop(&mut self) {
        self.stopping.store(true, Ordering::Release);
        for wd in self.descriptors.drain(..) {
            // Already gone when the directory itself was removed.
            let _ = self.watches.remove(wd);
        }
    }
}

fn read_loop(
    mut inotify: Inotify,
    mut dirs: HashMap<WatchDescriptor, PathBuf>,
    forward: &Forwarder,
    stopping: &AtomicBool,
) {
    let mut buffer = vec![0_u8; READ_BUFFER_BYTES];
    while !dirs.is_empty() {
        let events = match inotify.read_events_blocking(&mut buffer) {
            Ok(events) => events,
            Err(error) if error.kind() == ErrorKind::Interrupted => continue,
            Err(error) => {
                forward.send(WatchMessage::Error(format!("inotify read failed: {error}")));
                return;
            }
        };

        for event in events {
            if event.mask.contains(EventMask::IGNORED) {
                dirs.remove(&event.wd);
                continue;
            }
            if stopping.load(Ordering::Acquire) {
                continue;
            }
            if event.mask.contains(EventMask::Q_OVERFLOW) {
                forward.send(WatchMessage::Error(
                    "inotify queue overflow, events lost".to_string(),
                ));
                continue;
            }
            let (Some(kind), Some(dir)) = (inotify_access_kind(event.mask), dirs.get(&event.wd))
            else {
                continue;
            };
            let path = event.name.map_or_else(|| dir.clone(), |name| dir.join(name));
            forward.send(WatchMessage::Access(AccessEvent::new(path, kind)));
        }
    }
}
