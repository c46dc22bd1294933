use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::{debug, warn};

const CLEANUP_EVERY: u64 = 256;

struct Window {
    started: Instant,
    count: u32,
}

/// Fixed-window request counter per client address.
pub struct RateLimiter {
    name: &'static str,
    limit: u32,
    window: Duration,
    windows: DashMap<IpAddr, Window>,
    checks: AtomicU64,
}

impl RateLimiter {
    pub fn new(name: &'static str, limit: u32, window: Duration) -> Self {
        Self {
            name,
            limit,
            window,
            windows: DashMap::new(),
            checks: AtomicU64::new(0),
        }
    }

    pub fn per_minute(name: &'static str, limit: u32) -> Self {
        Self::new(name, limit, Duration::from_secs(60))
    }

    /// Counts one request from `client` and reports whether it may proceed.
    pub fn check(&self, client: IpAddr) -> bool {
        self.check_at(client, Instant::now())
    }

    fn check_at(&self, client: IpAddr, now: Instant) -> bool {
        let checks = self.checks.fetch_add(1, Ordering::Relaxed) + 1;
        if checks % CLEANUP_EVERY == 0 {
            self.purge_expired(now);
        }

        let mut entry = self.windows.entry(client).or_insert(Window {
            started: now,
            count: 0,
        });
        if now.duration_since(entry.started) >= self.window {
            entry.started = now;
            entry.count = 0;
        }
        if entry.count >= self.limit {
            warn!(limiter = self.name, %client, limit = self.limit, "rate limit exceeded");
            return false;
        }
        entry.count += 1;
        true
    }

    fn purge_expired(&self, now: Instant) {
        let before = self.windows.len();
        self.windows
            .retain(|_, w| now.duration_since(w.started) < self.window);
        debug!(limiter = self.name, removed = before - self.windows.len(), "purged rate limit windows");
    }
}
