//! Progress math for observers and the throttle workers use to avoid
//! flooding the publisher.

use std::time::{Duration, Instant};

/// Snapshot of transfer progress for one job (console-friendly).
#[derive(Debug, Clone)]
pub struct ProgressStats {
    pub bytes_done: u64,
    pub total_bytes: Option<u64>,
    /// Seconds since the observer first saw the job active.
    pub elapsed_secs: f64,
}

impl ProgressStats {
    /// Transfer rate in bytes per second (0 if elapsed is 0).
    pub fn bytes_per_sec(&self) -> f64 {
        if self.elapsed_secs <= 0.0 {
            return 0.0;
        }
        self.bytes_done as f64 / self.elapsed_secs
    }

    /// Estimated seconds remaining (None if the total is unknown or nothing moved yet).
    pub fn eta_secs(&self) -> Option<f64> {
        let total = self.total_bytes?;
        let remaining = total.saturating_sub(self.bytes_done);
        if remaining == 0 {
            return Some(0.0);
        }
        let rate = self.bytes_per_sec();
        if rate <= 0.0 {
            return None;
        }
        Some(remaining as f64 / rate)
    }

    /// Fraction complete in [0.0, 1.0]; None while the total is unknown.
    pub fn fraction(&self) -> Option<f64> {
        match self.total_bytes {
            Some(0) => Some(1.0),
            Some(total) => Some((self.bytes_done as f64 / total as f64).min(1.0)),
            None => None,
        }
    }
}

/// Decides when a fetch should report progress: every `every_bytes` or every
/// `interval`, whichever comes first.
#[derive(Debug, Clone)]
pub struct ProgressThrottle {
    every_bytes: u64,
    interval: Duration,
    last_bytes: u64,
    last_at: Instant,
}

impl ProgressThrottle {
    pub fn new(every_bytes: u64, interval: Duration) -> Self {
        Self {
            every_bytes: every_bytes.max(1),
            interval,
            last_bytes: 0,
            last_at: Instant::now(),
        }
    }

    /// Restart counting from `bytes` (e.g. after a resumed offset).
    pub fn reset(&mut self, bytes: u64) {
        self.last_bytes = bytes;
        self.last_at = Instant::now();
    }

    /// True when `bytes` should be reported; records it as the last report.
    pub fn should_report(&mut self, bytes: u64) -> bool {
        self.should_report_at(bytes, Instant::now())
    }

    fn should_report_at(&mut self, bytes: u64, now: Instant) -> bool {
        let due = bytes.saturating_sub(self.last_bytes) >= self.every_bytes
            || now.duration_since(self.last_at) >= self.interval;
        if due {
            self.last_bytes = bytes;
            self.last_at = now;
        }
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_fraction_and_eta() {
        let s = ProgressStats {
            bytes_done: 50,
            total_bytes: Some(100),
            elapsed_secs: 5.0,
        };
        assert_eq!(s.fraction(), Some(0.5));
        assert!((s.bytes_per_sec() - 10.0).abs() < 1e-9);
        assert!((s.eta_secs().unwrap() - 5.0).abs() < 1e-9);

        let unknown = ProgressStats {
            bytes_done: 50,
            total_bytes: None,
            elapsed_secs: 5.0,
        };
        assert_eq!(unknown.fraction(), None);
        assert_eq!(unknown.eta_secs(), None);
    }

    #[test]
    fn throttle_reports_on_byte_threshold() {
        let mut t = ProgressThrottle::new(100, Duration::from_secs(3600));
        let now = Instant::now();
        assert!(!t.should_report_at(50, now));
        assert!(t.should_report_at(100, now));
        assert!(!t.should_report_at(150, now));
        assert!(t.should_report_at(200, now));
    }

    #[test]
    fn throttle_reports_on_interval() {
        let mut t = ProgressThrottle::new(u64::MAX, Duration::from_millis(10));
        let start = t.last_at;
        assert!(!t.should_report_at(1, start));
        assert!(t.should_report_at(2, start + Duration::from_millis(20)));
    }
}
