//! Loop pacing and throughput reporting.
//!
//! Every tool is a bounded loop with an optional fixed delay between
//! iterations. [`Pace`] owns the delay; [`Throughput`] turns a count and
//! an elapsed time into the summary line printed at the end of a run.

use std::fmt;
use std::time::{Duration, Instant};

/// Fixed delay awaited between loop iterations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pace {
    delay: Duration,
}

impl Pace {
    /// Creates a pace with the given delay.
    #[must_use]
    pub const fn new(delay: Duration) -> Self {
        Self { delay }
    }

    /// A pace that never sleeps.
    #[must_use]
    pub const fn unthrottled() -> Self {
        Self {
            delay: Duration::ZERO,
        }
    }

    /// Returns the configured delay.
    #[must_use]
    pub const fn delay(&self) -> Duration {
        self.delay
    }

    /// Sleeps for the configured delay. Returns immediately when zero.
    pub async fn wait(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

/// Completed operation count over a measured interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Throughput {
    /// Operations completed.
    pub count: u64,
    /// Wall-clock time spent.
    pub elapsed: Duration,
}

impl Throughput {
    /// Measures from `started` until now.
    #[must_use]
    pub fn since(count: u64, started: Instant) -> Self {
        Self {
            count,
            elapsed: started.elapsed(),
        }
    }

    /// Operations per second; zero when no time has elapsed.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.count as f64 / secs
    }
}

impl fmt::Display for Throughput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "in {:.2} seconds ({:.2} msgs/sec)",
            self.elapsed.as_secs_f64(),
            self.per_second()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn n_iterations_take_n_times_delay() {
        let pace = Pace::new(Duration::from_millis(100));
        let started = tokio::time::Instant::now();
        for _ in 0..5 {
            pace.wait().await;
        }
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(500));
        assert!(elapsed < Duration::from_millis(510));
    }

    #[tokio::test(start_paused = true)]
    async fn unthrottled_does_not_sleep() {
        let pace = Pace::unthrottled();
        let started = tokio::time::Instant::now();
        for _ in 0..1000 {
            pace.wait().await;
        }
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[test]
    fn per_second_divides_by_elapsed() {
        let t = Throughput {
            count: 500,
            elapsed: Duration::from_secs(2),
        };
        assert!((t.per_second() - 250.0).abs() < f64::EPSILON);
    }

    #[test]
    fn zero_elapsed_reports_zero_rate() {
        let t = Throughput {
            count: 10,
            elapsed: Duration::ZERO,
        };
        assert!(t.per_second().abs() < f64::EPSILON);
    }

    #[test]
    fn display_formats_two_decimals() {
        let t = Throughput {
            count: 3,
            elapsed: Duration::from_millis(1500),
        };
        assert_eq!(t.to_string(), "in 1.50 seconds (2.00 msgs/sec)");
    }
}
