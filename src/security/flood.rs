//! Flood protection.
//!
//! A token bucket per connection limits command and message rates; a
//! per-IP sliding window throttles connection attempts.

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Instant;

use parking_lot::Mutex;

/// Token bucket rate limiter.
///
/// Tokens are added at a fixed rate per second, each event costs one
/// token, and an empty bucket rejects the event.
pub struct TokenBucket {
    tokens: f32,
    last_check: Instant,
    rate: f32,
    capacity: f32,
}

impl TokenBucket {
    /// `rate` tokens per second with a burst capacity.
    pub fn new(rate: f32, capacity: f32) -> Self {
        Self {
            tokens: capacity,
            last_check: Instant::now(),
            rate,
            capacity,
        }
    }

    /// Whether an event is allowed (consumes a token).
    pub fn check(&mut self) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_check).as_secs_f32();
        self.last_check = now;

        self.tokens = (self.tokens + elapsed * self.rate).min(self.capacity);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Per-IP connection throttle: at most `limit` accepts per minute.
pub struct ConnectionThrottle {
    window: Mutex<HashMap<IpAddr, Vec<Instant>>>,
    limit: usize,
}

impl ConnectionThrottle {
    pub fn new(limit: u32) -> Self {
        Self {
            window: Mutex::new(HashMap::new()),
            limit: limit as usize,
        }
    }

    /// Record a connection attempt; returns whether it is allowed.
    pub fn allow(&self, ip: IpAddr) -> bool {
        let now = Instant::now();
        let mut window = self.window.lock();
        let attempts = window.entry(ip).or_default();
        attempts.retain(|t| now.duration_since(*t).as_secs() < 60);
        if attempts.len() >= self.limit {
            return false;
        }
        attempts.push(now);
        true
    }

    /// Drop stale per-IP entries.
    pub fn cleanup(&self) {
        let now = Instant::now();
        self.window
            .lock()
            .retain(|_, attempts| {
                attempts.retain(|t| now.duration_since(*t).as_secs() < 60);
                !attempts.is_empty()
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_initial_capacity() {
        let mut limiter = TokenBucket::new(10.0, 5.0);
        for _ in 0..5 {
            assert!(limiter.check());
        }
        assert!(!limiter.check());
    }

    #[test]
    fn bucket_replenishes() {
        let mut limiter = TokenBucket::new(10.0, 5.0);
        for _ in 0..5 {
            limiter.check();
        }
        assert!(!limiter.check());
        std::thread::sleep(std::time::Duration::from_millis(200));
        assert!(limiter.check());
    }

    #[test]
    fn throttle_limits_per_ip() {
        let throttle = ConnectionThrottle::new(3);
        let ip: IpAddr = "192.0.2.1".parse().unwrap();
        let other: IpAddr = "192.0.2.2".parse().unwrap();
        assert!(throttle.allow(ip));
        assert!(throttle.allow(ip));
        assert!(throttle.allow(ip));
        assert!(!throttle.allow(ip));
        assert!(throttle.allow(other));
    }
}
