//! Cache-versus-tape verdict from access timing and throughput.

use crate::core::config::EngineConfig;

/// Thresholds separating page-cache reads from reads that hit the media.
///
/// A read is presumed cache-served when it finished quickly *or* moved data
/// faster than the throughput threshold. Anything else counts as tape.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classifier {
    threshold_seconds: f64,
    threshold_bytes_per_sec: f64,
}

impl Classifier {
    #[must_use]
    pub fn new(threshold_seconds: f64, threshold_bytes_per_sec: f64) -> Self {
        Self {
            threshold_seconds,
            threshold_bytes_per_sec,
        }
    }

    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.threshold_seconds, config.threshold_bytes_per_sec)
    }

    #[must_use]
    pub fn is_from_cache(&self, elapsed_secs: f64, bytes_per_sec: f64) -> bool {
        elapsed_secs < self.threshold_seconds || bytes_per_sec > self.threshold_bytes_per_sec
    }

    #[must_use]
    pub fn is_tape(&self, elapsed_secs: f64, bytes_per_sec: f64) -> bool {
        !self.is_from_cache(elapsed_secs, bytes_per_sec)
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}
