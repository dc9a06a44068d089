//! Filesystem access-event source: raw inotify on Linux, notify elsewhere.

pub mod events;
pub mod fs_watcher;
#[cfg(target_os = "linux")]
mod inotify_source;

pub use events::{AccessEvent, AccessKind, WatchMessage, classify_notify_event};
pub use fs_watcher::{DEFAULT_CHANNEL_CAPACITY, FsWatcher, read_watch_list};
