//! Consecutive-failure backoff for per-host crawl loops

use std::time::Duration;

/// Counts consecutive transient failures for one host.
///
/// When the count reaches `threshold`, [`record_failure`](Self::record_failure)
/// returns the pause the caller should sleep for and resets the count. Any
/// success resets it as well.
#[derive(Debug, Clone)]
pub struct FailureBackoff {
    threshold: u32,
    pause: Duration,
    consecutive: u32,
    pauses: u32,
}

impl FailureBackoff {
    pub fn new(threshold: u32, pause: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            pause,
            consecutive: 0,
            pauses: 0,
        }
    }

    pub fn record_success(&mut self) {
        self.consecutive = 0;
    }

    /// Register a failure; `Some(pause)` once the threshold is reached.
    pub fn record_failure(&mut self) -> Option<Duration> {
        self.consecutive += 1;
        if self.consecutive < self.threshold {
            return None;
        }
        self.consecutive = 0;
        self.pauses += 1;
        Some(self.pause)
    }

    /// Register a failure and sleep if the threshold was hit
    pub fn fail_and_wait(&mut self, label: &str) {
        if let Some(pause) = self.record_failure() {
            log::warn!(
                "{label}: {} consecutive failures, pausing {:.0}s",
                self.threshold,
                pause.as_secs_f64()
            );
            std::thread::sleep(pause);
        }
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }

    /// How many times the threshold was hit
    pub fn pauses(&self) -> u32 {
        self.pauses
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pause_at_threshold_then_reset() {
        let mut b = FailureBackoff::new(3, Duration::from_secs(5));
        assert_eq!(b.record_failure(), None);
        assert_eq!(b.record_failure(), None);
        assert_eq!(b.record_failure(), Some(Duration::from_secs(5)));
        assert_eq!(b.consecutive(), 0);
        assert_eq!(b.pauses(), 1);
    }

    #[test]
    fn success_resets_count() {
        let mut b = FailureBackoff::new(2, Duration::ZERO);
        assert_eq!(b.record_failure(), None);
        b.record_success();
        assert_eq!(b.record_failure(), None);
        assert_eq!(b.consecutive(), 1);
    }

    #[test]
    fn zero_threshold_treated_as_one() {
        let mut b = FailureBackoff::new(0, Duration::from_millis(1));
        assert!(b.record_failure().is_some());
    }
}
