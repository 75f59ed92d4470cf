/// Pacing for outbound API calls.
///
/// Every remote call in a run - FWC query, worksheet fetch, CMS upsert -
/// goes through one shared `RateLimiter` so the process as a whole stays
/// under third-party quota limits. Built on `std::time::Instant` (monotonic)
/// rather than the system clock, so an NTP adjustment mid-run cannot skew
/// the spacing.

use std::thread;
use std::time::{Duration, Instant};

pub struct RateLimiter {
    min_interval: Duration,
    last_call: Option<Instant>,
}

impl RateLimiter {
    /// `min_interval_secs <= 0` disables pacing entirely.
    pub fn new(min_interval_secs: f64) -> Self {
        let min_interval = if min_interval_secs > 0.0 {
            Duration::from_secs_f64(min_interval_secs)
        } else {
            Duration::ZERO
        };
        RateLimiter {
            min_interval,
            last_call: None,
        }
    }

    /// Blocks until at least `min_interval` has elapsed since the previous
    /// call, then records its own wake time. The first call never waits.
    pub fn wait_if_needed(&mut self) {
        if let Some(last) = self.last_call {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                thread::sleep(self.min_interval - elapsed);
            }
        }
        self.last_call = Some(Instant::now());
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
