//! Configuration system: optional TOML file + env var overrides + defaults.
//!
//! The environment names `WATCH_PATHS`, `FN_STATE_JSON`, `CACHE_BPS_THRESHOLD`
//! and `CHECK_FS` are the ones deployments of the agent already set; the
//! `FSE_*` names cover knobs that previously had no override.

#![allow(missing_docs)]

use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::errors::{AgentError, Result};

/// Multiplier applied to `CACHE_BPS_THRESHOLD`, which is given in megabytes/sec.
pub const BYTES_PER_MEGABYTE: f64 = 1_000_000.0;

/// Full agent configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub engine: EngineConfig,
    pub schedule: ScheduleConfig,
    pub paths: PathsConfig,
    pub persistence: PersistenceConfig,
}

/// Aggregation engine knobs, resolved once at startup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Accesses shorter than this are presumed cache-served.
    pub threshold_seconds: f64,
    /// Accesses faster than this are presumed cache-served.
    pub threshold_bytes_per_sec: f64,
    /// Number of completed paths kept in the latest window.
    pub max_files: usize,
    /// Evict never-closed records older than this many seconds (0 disables).
    pub stale_open_ttl_secs: u64,
}

/// Periodic check cadence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ScheduleConfig {
    pub check_interval_secs: u64,
}

/// Filesystem paths used by the agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub config_file: Option<PathBuf>,
    pub watch_list: PathBuf,
    pub state_file: PathBuf,
    pub activity_log: PathBuf,
}

/// How an unreadable state file is treated at startup.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RestorePolicy {
    /// Log the problem and start with zeroed statistics.
    #[default]
    Lenient,
    /// Refuse to start.
    Strict,
}

impl FromStr for RestorePolicy {
    type Err = String;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "lenient" => Ok(Self::Lenient),
            "strict" => Ok(Self::Strict),
            other => Err(format!("expected 'lenient' or 'strict', got {other:?}")),
        }
    }
}

impl fmt::Display for RestorePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lenient => f.write_str("lenient"),
            Self::Strict => f.write_str("strict"),
        }
    }
}

/// Persistence behaviour.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct PersistenceConfig {
    pub restore_policy: RestorePolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            threshold_seconds: 8.0,
            threshold_bytes_per_sec: 800.0 * BYTES_PER_MEGABYTE,
            max_files: 200,
            stale_open_ttl_secs: 0,
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: 300,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            config_file: None,
            watch_list: PathBuf::from("watch.cnf"),
            state_file: PathBuf::from("state.json"),
            activity_log: PathBuf::from("fsevents-activity.jsonl"),
        }
    }
}

impl Config {
    /// Load config from an optional TOML file, then apply env overrides.
    ///
    /// Without a path the defaults are used; an explicit path that does not
    /// exist is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut cfg = match path {
            Some(path) if path.exists() => {
                let raw = fs::read_to_string(path).map_err(|source| AgentError::io(path, source))?;
                let mut parsed: Self = toml::from_str(&raw)?;
                parsed.paths.config_file = Some(path.to_path_buf());
                parsed
            }
            Some(path) => {
                return Err(AgentError::MissingConfig {
                    path: path.to_path_buf(),
                });
            }
            None => Self::default(),
        };

        cfg.apply_env_overrides_from(env_var)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Deterministic hash of the effective config for logging.
    ///
    /// FNV-1a over the canonical JSON form, stable across processes.
    pub fn stable_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in canonical.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Ok(format!("{hash:016x}"))
    }

    fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("WATCH_PATHS") {
            self.paths.watch_list = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("FN_STATE_JSON") {
            self.paths.state_file = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("FSE_ACTIVITY_LOG") {
            self.paths.activity_log = PathBuf::from(raw);
        }

        if let Some(raw) = lookup("CACHE_BPS_THRESHOLD") {
            let megabytes = parse_env::<u64>("CACHE_BPS_THRESHOLD", &raw)?;
            #[allow(clippy::cast_precision_loss)]
            {
                self.engine.threshold_bytes_per_sec = megabytes as f64 * BYTES_PER_MEGABYTE;
            }
        }
        if let Some(raw) = lookup("FSE_THRESHOLD_SECONDS") {
            self.engine.threshold_seconds = parse_env("FSE_THRESHOLD_SECONDS", &raw)?;
        }
        if let Some(raw) = lookup("FSE_MAX_FILES") {
            self.engine.max_files = parse_env("FSE_MAX_FILES", &raw)?;
        }
        if let Some(raw) = lookup("FSE_STALE_OPEN_TTL_SECS") {
            self.engine.stale_open_ttl_secs = parse_env("FSE_STALE_OPEN_TTL_SECS", &raw)?;
        }

        if let Some(raw) = lookup("CHECK_FS") {
            self.schedule.check_interval_secs = parse_env("CHECK_FS", &raw)?;
        }

        if let Some(raw) = lookup("FSE_RESTORE_POLICY") {
            self.persistence.restore_policy = parse_env("FSE_RESTORE_POLICY", &raw)?;
        }

        Ok(())
    }

    fn validate(&self) -> Result<()> {
        for (name, val) in [
            ("engine.threshold_seconds", self.engine.threshold_seconds),
            (
                "engine.threshold_bytes_per_sec",
                self.engine.threshold_bytes_per_sec,
            ),
        ] {
            // Zero is allowed: it sends every access down the other branch.
            if !val.is_finite() || val < 0.0 {
                return Err(AgentError::InvalidConfig {
                    details: format!("{name} must be a non-negative number, got {val}"),
                });
            }
        }

        if self.engine.max_files == 0 {
            return Err(AgentError::InvalidConfig {
                details: "engine.max_files must be >= 1".to_string(),
            });
        }

        if self.schedule.check_interval_secs == 0 {
            return Err(AgentError::InvalidConfig {
                details: "schedule.check_interval_secs must be >= 1".to_string(),
            });
        }

        if self.paths.state_file.as_os_str().is_empty() {
            return Err(AgentError::InvalidConfig {
                details: "paths.state_file must not be empty".to_string(),
            });
        }

        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn parse_env<T>(name: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|error| AgentError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })
}

#[cfg(test)]
mod tests {
    use super::{AgentError, Config, RestorePolicy};
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(name, value)| ((*name).to_string(), (*value).to_string()))
            .collect()
    }

    fn apply(cfg: &mut Config, pairs: &[(&str, &str)]) -> Result<(), AgentError> {
        let overrides = vars(pairs);
        cfg.apply_env_overrides_from(|name| overrides.get(name).cloned())
    }

    #[test]
    fn default_config_is_valid() {
        let cfg = Config::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.paths.watch_list, PathBuf::from("watch.cnf"));
        assert_eq!(cfg.paths.state_file, PathBuf::from("state.json"));
        assert!((cfg.engine.threshold_seconds - 8.0).abs() < f64::EPSILON);
        assert_eq!(cfg.schedule.check_interval_secs, 300);
    }

    #[test]
    fn cache_threshold_env_is_scaled_from_megabytes() {
        let mut cfg = Config::default();
        apply(&mut cfg, &[("CACHE_BPS_THRESHOLD", "250")]).expect("override should parse");
        assert!((cfg.engine.threshold_bytes_per_sec - 250_000_000.0).abs() < 1e-6);
    }

    #[test]
    fn malformed_cache_threshold_is_a_parse_error() {
        let mut cfg = Config::default();
        let err = apply(&mut cfg, &[("CACHE_BPS_THRESHOLD", "fast")])
            .expect_err("non-numeric threshold must fail");
        match err {
            AgentError::ConfigParse { context, details } => {
                assert_eq!(context, "env");
                assert!(details.contains("CACHE_BPS_THRESHOLD"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn path_and_schedule_overrides_apply() {
        let mut cfg = Config::default();
        apply(
            &mut cfg,
            &[
                ("WATCH_PATHS", "/etc/fse/watch.cnf"),
                ("FN_STATE_JSON", "/var/lib/fse/state.json"),
                ("CHECK_FS", "60"),
                ("FSE_MAX_FILES", "50"),
                ("FSE_RESTORE_POLICY", "Strict"),
            ],
        )
        .expect("overrides should parse");

        assert_eq!(cfg.paths.watch_list, PathBuf::from("/etc/fse/watch.cnf"));
        assert_eq!(cfg.paths.state_file, PathBuf::from("/var/lib/fse/state.json"));
        assert_eq!(cfg.schedule.check_interval_secs, 60);
        assert_eq!(cfg.engine.max_files, 50);
        assert_eq!(cfg.persistence.restore_policy, RestorePolicy::Strict);
    }

    #[test]
    fn unknown_restore_policy_rejected() {
        let mut cfg = Config::default();
        let err = apply(&mut cfg, &[("FSE_RESTORE_POLICY", "sometimes")])
            .expect_err("unknown policy must fail");
        assert!(err.to_string().contains("FSE_RESTORE_POLICY"));
    }

    #[test]
    fn zero_max_files_rejected() {
        let mut cfg = Config::default();
        cfg.engine.max_files = 0;
        let err = cfg.validate().expect_err("expected max_files error");
        assert!(err.to_string().contains("max_files"));
    }

    #[test]
    fn negative_or_non_finite_thresholds_rejected() {
        let mut cfg = Config::default();
        cfg.engine.threshold_seconds = -1.0;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.engine.threshold_bytes_per_sec = f64::NAN;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_cache_threshold_is_accepted() {
        let mut cfg = Config::default();
        apply(&mut cfg, &[("CACHE_BPS_THRESHOLD", "0")]).expect("zero should parse");
        assert!(cfg.engine.threshold_bytes_per_sec.abs() < f64::EPSILON);
        cfg.validate().expect("zero threshold is valid");

        cfg.engine.threshold_seconds = 0.0;
        cfg.validate().expect("zero latency threshold is valid");
    }

    #[test]
    fn zero_check_interval_rejected() {
        let mut cfg = Config::default();
        cfg.schedule.check_interval_secs = 0;
        let err = cfg.validate().expect_err("expected interval error");
        assert!(err.to_string().contains("check_interval_secs"));
    }

    #[test]
    fn toml_sections_are_partial() {
        let parsed: Config = toml::from_str(
            r#"
            [engine]
            max_files = 25

            [persistence]
            restore_policy = "strict"
            "#,
        )
        .expect("partial toml should parse");
        assert_eq!(parsed.engine.max_files, 25);
        assert!((parsed.engine.threshold_seconds - 8.0).abs() < f64::EPSILON);
        assert_eq!(parsed.persistence.restore_policy, RestorePolicy::Strict);
        assert_eq!(parsed.schedule.check_interval_secs, 300);
    }

    #[test]
    fn load_returns_error_for_explicit_missing_path() {
        let err = Config::load(Some(Path::new("/nonexistent/fse/config.toml")))
            .expect_err("missing explicit config must fail");
        assert!(matches!(err, AgentError::MissingConfig { .. }));
    }

    #[test]
    fn stable_hash_tracks_changes() {
        let cfg = Config::default();
        let h1 = cfg.stable_hash().expect("hash");
        let h2 = cfg.stable_hash().expect("hash");
        assert_eq!(h1, h2);

        let mut modified = Config::default();
        modified.engine.max_files += 1;
        assert_ne!(h1, modified.stable_hash().expect("hash"));
    }
}
