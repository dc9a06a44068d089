//! Access notifications as the aggregation engine sees them.

use std::path::PathBuf;

use notify::event::{AccessKind as NotifyAccess, AccessMode, EventKind};

/// The three notifications the engine reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    Open,
    CloseWrite,
    CloseRead,
}

impl AccessKind {
    #[must_use]
    pub fn is_close(self) -> bool {
        matches!(self, Self::CloseWrite | Self::CloseRead)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessEvent {
    pub path: PathBuf,
    pub kind: AccessKind,
}

impl AccessEvent {
    pub fn new(path: impl Into<PathBuf>, kind: AccessKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// Item carried from the watcher callback to the consumer thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchMessage {
    Access(AccessEvent),
    Error(String),
}

/// Map a backend event kind to an access kind; `None` for everything else.
#[must_use]
pub fn access_kind(kind: &EventKind) -> Option<AccessKind> {
    match kind {
        EventKind::Access(NotifyAccess::Open(_)) => Some(AccessKind::Open),
        EventKind::Access(NotifyAccess::Close(AccessMode::Write)) => Some(AccessKind::CloseWrite),
        EventKind::Access(NotifyAccess::Close(_)) => Some(AccessKind::CloseRead),
        _ => None,
    }
}

/// Map a raw inotify mask to an access kind; `None` for everything else.
#[cfg(target_os = "linux")]
#[must_use]
pub fn inotify_access_kind(mask: inotify::EventMask) -> Option<AccessKind> {
    use inotify::EventMask;

    if mask.contains(EventMask::OPEN) {
        Some(AccessKind::Open)
    } else if mask.contains(EventMask::CLOSE_WRITE) {
        Some(AccessKind::CloseWrite)
    } else if mask.contains(EventMask::CLOSE_NOWRITE) {
        Some(AccessKind::CloseRead)
    } else {
        None
    }
}

/// One access event per path named by a backend event.
pub fn classify_notify_event(event: &notify::Event) -> Vec<AccessEvent> {
    access_kind(&event.kind).map_or_else(Vec::new, |kind| {
        event
            .paths
            .iter()
            .map(|path| AccessEvent::new(path.clone(), kind))
            .collect()
    })
}
