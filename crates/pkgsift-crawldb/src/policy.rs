//! Rescheduling policy

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;

/// Crawl intervals and the policy version stamped on entries.
#[derive(Debug, Clone)]
pub struct SchedulePolicy {
    /// Interval after a successful crawl, before jitter.
    pub base_age: Duration,
    /// Interval after a transient failure. Shorter than `base_age`.
    pub failure_age: Duration,
    /// Jitter range as a percentage of `base_age`, applied both ways.
    pub jitter_percent: u32,
    /// Bump to force one unconditional fetch of every entry.
    pub version: u32,
}

impl Default for SchedulePolicy {
    fn default() -> Self {
        Self {
            base_age: Duration::from_secs(10 * 24 * 3600),
            failure_age: Duration::from_secs(24 * 3600),
            jitter_percent: 10,
            version: 1,
        }
    }
}

fn to_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or(chrono::Duration::MAX)
}

impl SchedulePolicy {
    /// `now + base_age ± jitter`, jitter uniform in `±jitter_percent` of `base_age`.
    pub fn next_after_success<R: Rng + ?Sized>(
        &self,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> DateTime<Utc> {
        let spread = f64::from(self.jitter_percent.min(100)) / 100.0;
        let factor = if spread > 0.0 {
            1.0 + rng.random_range(-spread..=spread)
        } else {
            1.0
        };
        let age = self.base_age.mul_f64(factor);
        now + to_chrono(age)
    }

    pub fn next_after_failure(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + to_chrono(self.failure_age)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn now() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn success_within_jitter_band() {
        let policy = SchedulePolicy::default();
        let mut rng = StdRng::seed_from_u64(7);
        let base = to_chrono(policy.base_age);
        let lo = now() + base * 9 / 10;
        let hi = now() + base * 11 / 10;
        let mut distinct = std::collections::HashSet::new();
        for _ in 0..200 {
            let t = policy.next_after_success(now(), &mut rng);
            assert!(t >= lo && t <= hi, "{t} outside [{lo}, {hi}]");
            distinct.insert(t);
        }
        assert!(distinct.len() > 100, "jitter should spread schedule times");
    }

    #[test]
    fn seeded_rng_is_reproducible() {
        let policy = SchedulePolicy::default();
        let a = policy.next_after_success(now(), &mut StdRng::seed_from_u64(1));
        let b = policy.next_after_success(now(), &mut StdRng::seed_from_u64(1));
        assert_eq!(a, b);
    }

    #[test]
    fn zero_jitter_is_exact() {
        let policy = SchedulePolicy {
            jitter_percent: 0,
            ..SchedulePolicy::default()
        };
        let t = policy.next_after_success(now(), &mut StdRng::seed_from_u64(1));
        assert_eq!(t, now() + to_chrono(policy.base_age));
    }

    #[test]
    fn failure_uses_failure_age() {
        let policy = SchedulePolicy::default();
        assert_eq!(
            policy.next_after_failure(now()),
            now() + chrono::Duration::hours(24)
        );
    }
}
