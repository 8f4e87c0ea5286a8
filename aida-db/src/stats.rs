//! Sorted-sample percentile report and a throughput progress tracker.
//! Grounded on the teacher's `tracing::info!`-per-N-events logging idiom
//! (`core/store/src/archive/cold_storage.rs` logs every batch).

use std::time::Duration;

/// A percentile report over a set of timing samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PercentileReport {
    sorted: Vec<Duration>,
}

impl PercentileReport {
    /// Builds a report from unordered samples; sorts them once up front.
    pub fn new(mut samples: Vec<Duration>) -> Self {
        samples.sort();
        Self { sorted: samples }
    }

    pub fn len(&self) -> usize {
        self.sorted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sorted.is_empty()
    }

    /// Percentile `p` (0..=100): index `(n*p)/100`, clamped to `n-1`.
    /// Returns `None` for an empty sample set.
    pub fn percentile(&self, p: u64) -> Option<Duration> {
        let n = self.sorted.len();
        if n == 0 {
            return None;
        }
        let idx = ((n as u64 * p) / 100).min(n as u64 - 1) as usize;
        Some(self.sorted[idx])
    }
}

/// Exponential-moving-average throughput tracker (`alpha = 0.1`), emitting
/// a structured log line every `log_every` events.
pub struct ProgressTracker {
    alpha: f64,
    log_every: u64,
    events: u64,
    ema_seconds_per_event: Option<f64>,
}

impl ProgressTracker {
    pub fn new(log_every: u64) -> Self {
        Self { alpha: 0.1, log_every, events: 0, ema_seconds_per_event: None }
    }

    /// Records one event taking `elapsed`, updating the EMA and logging
    /// every `log_every` events.
    pub fn record(&mut self, elapsed: Duration) {
        let sample = elapsed.as_secs_f64();
        self.ema_seconds_per_event = Some(match self.ema_seconds_per_event {
            None => sample,
            Some(prev) => self.alpha * sample + (1.0 - self.alpha) * prev,
        });
        self.events += 1;
        if self.log_every > 0 && self.events % self.log_every == 0 {
            tracing::info!(
                events = self.events,
                throughput_per_sec = self.throughput_per_sec().unwrap_or(0.0),
                "progress"
            );
        }
    }

    pub fn throughput_per_sec(&self) -> Option<f64> {
        self.ema_seconds_per_event.filter(|s| *s > 0.0).map(|s| 1.0 / s)
    }

    pub fn events(&self) -> u64 {
        self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_clamps_to_last_index() {
        let report = PercentileReport::new(vec![
            Duration::from_millis(1),
            Duration::from_millis(2),
            Duration::from_millis(3),
            Duration::from_millis(4),
        ]);
        assert_eq!(report.percentile(100), Some(Duration::from_millis(4)));
        assert_eq!(report.percentile(0), Some(Duration::from_millis(1)));
    }

    #[test]
    fn percentile_on_empty_set_is_none() {
        let report = PercentileReport::new(vec![]);
        assert_eq!(report.percentile(50), None);
    }

    #[test]
    fn percentile_sorts_unordered_input() {
        let report = PercentileReport::new(vec![Duration::from_millis(9), Duration::from_millis(1)]);
        assert_eq!(report.percentile(0), Some(Duration::from_millis(1)));
        assert_eq!(report.percentile(99), Some(Duration::from_millis(9)));
    }

    #[test]
    fn progress_tracker_ema_converges_toward_recent_samples() {
        let mut tracker = ProgressTracker::new(0);
        for _ in 0..50 {
            tracker.record(Duration::from_millis(100));
        }
        let throughput = tracker.throughput_per_sec().unwrap();
        assert!((throughput - 10.0).abs() < 0.5, "throughput = {throughput}");
    }

    #[test]
    fn progress_tracker_counts_events() {
        let mut tracker = ProgressTracker::new(10);
        for _ in 0..25 {
            tracker.record(Duration::from_millis(1));
        }
        assert_eq!(tracker.events(), 25);
    }
}
