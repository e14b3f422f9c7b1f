// ============================================
// File: crates/avalanche-transport/src/limiter.rs
// ============================================
//! # Connection Rate Limiter
//!
//! ## Creation Reason
//! Brute-force protection: an address that opens too many connections
//! inside one window is refused for a while.
//!
//! ## Main Functionality
//! - `RateLimitConfig`: window, attempt budget, block duration
//! - `RateLimiter`: `authenticate(ip)` gate plus a background sweeper
//!
//! ## State
//! ```text
//! recent:  ip -> attempts in current window   (cleared every window)
//! blocked: ip -> unblock instant              (expired entries pruned every window)
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - The increment goes through `DashMap::entry`, which holds the shard
//!   lock across read-increment-compare. Do not split it into get + insert:
//!   concurrent accepts would undercount
//! - Uses `tokio::time::Instant` so tests can run on paused time
//!
//! ## Last Modified
//! v0.1.0 - Initial rate limiter

use std::net::IpAddr;
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, trace, warn};

// ============================================
// RateLimitConfig
// ============================================

/// Rate limiter settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Length of one counting window.
    pub window: Duration,
    /// Attempts allowed per address per window.
    pub max_attempts: u32,
    /// How long an address stays blocked.
    pub block_duration: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60),
            max_attempts: 30,
            block_duration: Duration::from_secs(15 * 60),
        }
    }
}

// ============================================
// RateLimiter
// ============================================

/// Per-address connection rate limiter.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    recent: DashMap<IpAddr, u32>,
    blocked: DashMap<IpAddr, Instant>,
}

impl RateLimiter {
    /// Creates a limiter without a sweeper.
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            recent: DashMap::new(),
            blocked: DashMap::new(),
        }
    }

    /// Creates a limiter and starts its window sweeper.
    ///
    /// The sweeper stops when `shutdown` fires or the limiter is dropped.
    #[must_use]
    pub fn spawn(config: RateLimitConfig, shutdown: broadcast::Receiver<()>) -> Arc<Self> {
        let limiter = Arc::new(Self::new(config));
        tokio::spawn(Self::sweep_loop(Arc::downgrade(&limiter), config.window, shutdown));
        limiter
    }

    async fn sweep_loop(limiter: Weak<Self>, window: Duration, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = time::interval_at(Instant::now() + window, window);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = ticker.tick() => {
                    let Some(limiter) = limiter.upgrade() else { break };
                    limiter.sweep();
                }
            }
        }
        trace!("Rate limiter sweeper stopped");
    }

    /// Admits or rejects one connection attempt from `addr`.
    pub fn authenticate(&self, addr: IpAddr) -> bool {
        let now = Instant::now();

        let blocked_until = self.blocked.get(&addr).map(|entry| *entry);
        if let Some(until) = blocked_until {
            if now < until {
                trace!(%addr, "Rejected: address blocked");
                return false;
            }
            self.blocked.remove_if(&addr, |_, until| now >= *until);
        }

        let attempts = {
            let mut entry = self.recent.entry(addr).or_insert(0);
            *entry = entry.saturating_add(1);
            *entry
        };

        if attempts <= self.config.max_attempts {
            // A concurrent attempt may have blocked the address after our
            // first check and reset the counter we just bumped.
            return !self.is_blocked(addr);
        }

        self.blocked.insert(addr, now + self.config.block_duration);
        self.recent.remove(&addr);
        warn!(
            %addr,
            attempts,
            block_secs = self.config.block_duration.as_secs(),
            "Address blocked for exceeding connection rate"
        );
        false
    }

    /// Clears window counters and prunes expired blocks.
    pub fn sweep(&self) {
        let now = Instant::now();
        self.recent.clear();
        self.blocked.retain(|_, until| *until > now);
        trace!(blocked = self.blocked.len(), "Rate limiter window reset");
    }

    /// Unblocks every address.
    pub fn clear_blocked(&self) {
        let count = self.blocked.len();
        self.blocked.clear();
        debug!(count, "Block list cleared");
    }

    /// Returns `true` if `addr` is blocked right now.
    #[must_use]
    pub fn is_blocked(&self, addr: IpAddr) -> bool {
        self.blocked
            .get(&addr)
            .is_some_and(|until| Instant::now() < *until)
    }

    /// Number of entries in the block list (expired ones included until swept).
    #[must_use]
    pub fn blocked_count(&self) -> usize {
        self.blocked.len()
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &RateLimitConfig {
        &self.config
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    const ADDR: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7));

    #[tokio::test(start_paused = true)]
    async fn test_blocks_after_max_attempts_then_recovers() {
        let limiter = RateLimiter::new(RateLimitConfig::default());

        for attempt in 1..=30 {
            assert!(limiter.authenticate(ADDR), "attempt {attempt}");
        }
        assert!(!limiter.authenticate(ADDR), "31st attempt");
        assert!(limiter.is_blocked(ADDR));

        time::advance(Duration::from_secs(14 * 60)).await;
        assert!(!limiter.authenticate(ADDR), "still blocked");

        time::advance(Duration::from_secs(61)).await;
        assert!(limiter.authenticate(ADDR));
        assert!(!limiter.is_blocked(ADDR));
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_addresses_unaffected() {
        let limiter = RateLimiter::new(RateLimitConfig {
            max_attempts: 1,
            ..RateLimitConfig::default()
        });
        assert!(limiter.authenticate(ADDR));
        assert!(!limiter.authenticate(ADDR));
        assert!(limiter.authenticate(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 8))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_resets_window() {
        let (_tx, rx) = broadcast::channel(1);
        let limiter = RateLimiter::spawn(
            RateLimitConfig {
                max_attempts: 2,
                ..RateLimitConfig::default()
            },
            rx,
        );

        assert!(limiter.authenticate(ADDR));
        assert!(limiter.authenticate(ADDR));
        time::sleep(Duration::from_secs(61)).await;
        assert!(limiter.authenticate(ADDR), "window counters cleared");
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_prunes_expired_blocks() {
        let limiter = RateLimiter::new(RateLimitConfig {
            max_attempts: 0,
            block_duration: Duration::from_secs(10),
            ..RateLimitConfig::default()
        });
        assert!(!limiter.authenticate(ADDR));
        assert_eq!(limiter.blocked_count(), 1);

        time::advance(Duration::from_secs(11)).await;
        limiter.sweep();
        assert_eq!(limiter.blocked_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_blocked() {
        let limiter = RateLimiter::new(RateLimitConfig {
            max_attempts: 0,
            ..RateLimitConfig::default()
        });
        assert!(!limiter.authenticate(ADDR));
        limiter.clear_blocked();
        assert!(!limiter.is_blocked(ADDR));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_attempts_are_not_undercounted() {
        let limiter = Arc::new(RateLimiter::new(RateLimitConfig {
            max_attempts: 100,
            ..RateLimitConfig::default()
        }));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move {
                (0..25).filter(|_| limiter.authenticate(ADDR)).count()
            }));
        }
        let mut admitted = 0;
        for handle in handles {
            admitted += handle.await.unwrap();
        }
        assert_eq!(admitted, 100);
        assert!(limiter.is_blocked(ADDR));
    }
}
