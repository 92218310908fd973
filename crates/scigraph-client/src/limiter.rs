//! Rate limiting: token bucket and sliding window
//!
//! Two algorithms with different burst/smoothness trade-offs, selectable per
//! outbound endpoint. `try_acquire` never blocks; callers that are refused
//! admission degrade rather than queue unboundedly.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Admission control for one outbound endpoint.
pub struct RateLimiter {
    algorithm: Mutex<Algorithm>,
}

enum Algorithm {
    TokenBucket(TokenBucket),
    SlidingWindow(SlidingWindow),
}

struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_rate: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn refill(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }

    fn try_acquire(&mut self, now: Instant) -> bool {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

struct SlidingWindow {
    window: Duration,
    max_requests: usize,
    timestamps: VecDeque<Instant>,
}

impl SlidingWindow {
    fn try_acquire(&mut self, now: Instant) -> bool {
        while let Some(front) = self.timestamps.front() {
            if now.duration_since(*front) >= self.window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
        if self.timestamps.len() < self.max_requests {
            self.timestamps.push_back(now);
            true
        } else {
            false
        }
    }
}

impl RateLimiter {
    /// Token bucket: capacity `max_tokens`, refilling at `refill_rate`
    /// tokens per second. Admits bursts up to capacity.
    pub fn token_bucket(max_tokens: u64, refill_rate: f64) -> Self {
        let refill_rate = if refill_rate.is_finite() && refill_rate >= 0.0 {
            refill_rate
        } else {
            0.0
        };
        Self {
            algorithm: Mutex::new(Algorithm::TokenBucket(TokenBucket {
                capacity: max_tokens as f64,
                tokens: max_tokens as f64,
                refill_rate,
                last_refill: Instant::now(),
            })),
        }
    }

    /// Sliding window: at most `max_requests` admissions per `window`.
    pub fn sliding_window(max_requests: usize, window: Duration) -> Self {
        Self {
            algorithm: Mutex::new(Algorithm::SlidingWindow(SlidingWindow {
                window,
                max_requests,
                timestamps: VecDeque::with_capacity(max_requests),
            })),
        }
    }

    /// Returns true iff the call is admitted right now.
    pub fn try_acquire(&self) -> bool {
        let now = Instant::now();
        match &mut *self.algorithm.lock() {
            Algorithm::TokenBucket(bucket) => bucket.try_acquire(now),
            Algorithm::SlidingWindow(window) => window.try_acquire(now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_bucket_admits_burst_then_refuses() {
        let limiter = RateLimiter::token_bucket(3, 0.0);
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }

    #[test]
    fn token_bucket_refills_over_time() {
        let limiter = RateLimiter::token_bucket(1, 50.0);
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
        std::thread::sleep(Duration::from_millis(40));
        assert!(limiter.try_acquire());
    }

    #[test]
    fn sliding_window_caps_within_window() {
        let limiter = RateLimiter::sliding_window(2, Duration::from_millis(30));
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
        std::thread::sleep(Duration::from_millis(35));
        assert!(limiter.try_acquire());
    }

    #[test]
    fn nonsense_refill_rate_is_clamped() {
        let limiter = RateLimiter::token_bucket(1, f64::NAN);
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }
}
