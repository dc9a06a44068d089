//! Process-wide incremental latency counters.

/// Lifetime counters over every completed access.
///
/// Mutated only by the register's close step (and by restore, which replaces
/// the whole value). Readers get copies.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AggregateStats {
    total_count: u64,
    total_average: f64,
    tape_count: u64,
    tape_average: f64,
    cumulative_tape_bytes: u64,
    cumulative_tape_duration: f64,
}

impl AggregateStats {
    /// Rebuild counters from persisted values.
    #[must_use]
    pub(crate) fn from_parts(
        total_count: u64,
        total_average: f64,
        tape_count: u64,
        tape_average: f64,
        cumulative_tape_bytes: u64,
        cumulative_tape_duration: f64,
    ) -> Self {
        Self {
            total_count,
            total_average: sanitize(total_average),
            tape_count,
            tape_average: sanitize(tape_average),
            cumulative_tape_bytes,
            cumulative_tape_duration: sanitize(cumulative_tape_duration).max(0.0),
        }
    }

    /// Fold one completed access into the counters.
    pub(crate) fn record_completed(&mut self, elapsed_secs: f64, size_bytes: u64, is_tape: bool) {
        if is_tape {
            self.cumulative_tape_bytes = self.cumulative_tape_bytes.saturating_add(size_bytes);
            self.cumulative_tape_duration += elapsed_secs;
            self.tape_average = incremental_mean(self.tape_average, self.tape_count, elapsed_secs);
            self.tape_count += 1;
        }
        self.total_average = incremental_mean(self.total_average, self.total_count, elapsed_secs);
        self.total_count += 1;
    }

    #[must_use]
    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    #[must_use]
    pub fn total_average(&self) -> f64 {
        self.total_average
    }

    #[must_use]
    pub fn tape_count(&self) -> u64 {
        self.tape_count
    }

    #[must_use]
    pub fn tape_average(&self) -> f64 {
        self.tape_average
    }

    #[must_use]
    pub fn cumulative_tape_bytes(&self) -> u64 {
        self.cumulative_tape_bytes
    }

    #[must_use]
    pub fn cumulative_tape_duration(&self) -> f64 {
        self.cumulative_tape_duration
    }

    /// Overall tape throughput; 0 until some tape time has accumulated.
    #[must_use]
    pub fn bytes_per_sec_tape(&self) -> f64 {
        if self.cumulative_tape_duration > 0.0 {
            #[allow(clippy::cast_precision_loss)]
            let bytes = self.cumulative_tape_bytes as f64;
            bytes / self.cumulative_tape_duration
        } else {
            0.0
        }
    }
}

/// `(old * count + sample) / (count + 1)`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn incremental_mean(old_average: f64, old_count: u64, sample: f64) -> f64 {
    let n = old_count as f64;
    old_average.mul_add(n, sample) / (n + 1.0)
}

fn sanitize(value: f64) -> f64 {
    if value.is_finite() { value } else { 0.0 }
}
