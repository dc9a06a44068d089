//! FSE-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, AgentError>;

/// Top-level error type for the fsevents agent.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("[FSE-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[FSE-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[FSE-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[FSE-1004] watch list {path} is unusable: {details}")]
    WatchList { path: PathBuf, details: String },

    #[error("[FSE-1101] cannot watch {path}: {details}")]
    WatchRegistration { path: PathBuf, details: String },

    #[error("[FSE-2001] file stat failure for {path}: {details}")]
    FileStat { path: PathBuf, details: String },

    #[error("[FSE-2002] state file {path} is not valid: {details}")]
    StateParse { path: PathBuf, details: String },

    #[error("[FSE-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[FSE-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[FSE-3003] channel closed in component {component}")]
    ChannelClosed { component: &'static str },

    #[error("[FSE-3101] watcher failure: {details}")]
    Watch { details: String },

    #[error("[FSE-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl AgentError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "FSE-1001",
            Self::MissingConfig { .. } => "FSE-1002",
            Self::ConfigParse { .. } => "FSE-1003",
            Self::WatchList { .. } => "FSE-1004",
            Self::WatchRegistration { .. } => "FSE-1101",
            Self::FileStat { .. } => "FSE-2001",
            Self::StateParse { .. } => "FSE-2002",
            Self::Serialization { .. } => "FSE-2101",
            Self::Io { .. } => "FSE-3002",
            Self::ChannelClosed { .. } => "FSE-3003",
            Self::Watch { .. } => "FSE-3101",
            Self::Runtime { .. } => "FSE-3900",
        }
    }

    /// Whether retrying might resolve the failure.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Io { .. }
                | Self::ChannelClosed { .. }
                | Self::FileStat { .. }
                | Self::Watch { .. }
                | Self::Runtime { .. }
        )
    }

    /// Whether the agent must refuse to start when this error occurs during bootstrap.
    #[must_use]
    pub const fn is_fatal_at_startup(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfig { .. }
                | Self::MissingConfig { .. }
                | Self::ConfigParse { .. }
                | Self::WatchList { .. }
                | Self::WatchRegistration { .. }
        )
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<serde_json::Error> for AgentError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for AgentError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}

impl From<notify::Error> for AgentError {
    fn from(value: notify::Error) -> Self {
        Self::Watch {
            details: value.to_string(),
        }
    }
}
