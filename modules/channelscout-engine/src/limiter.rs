//! Process-wide pacing for all outbound network actions.
//!
//! One limiter instance is shared (Arc) by every capability client. Spacing
//! is reserved at grant time: the moment a permit is handed out, the next
//! global slot and the destination's next slot are pushed into the future,
//! so two consecutive permits can never violate the configured gaps no
//! matter how long the caller holds its permit.
//!
//! A throttling response (HTTP 429-equivalent) puts only that destination
//! into cooldown; other destinations keep flowing under the global gap.

use std::collections::HashMap;
use std::time::Duration;

use rand::Rng;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::{debug, warn};

use channelscout_common::{EngineConfig, ScoutError};

#[derive(Debug, Default)]
struct DestinationState {
    next_at: Option<Instant>,
    cooldown_until: Option<Instant>,
}

#[derive(Debug)]
struct LimiterState {
    next_global_at: Option<Instant>,
    destinations: HashMap<String, DestinationState>,
    shutdown: bool,
    total_permits: u64,
}

pub struct RateLimiter {
    state: Mutex<LimiterState>,
    wakeup: Notify,
    global_min: Duration,
    global_max: Duration,
    destination_spacing: Duration,
    cooldown: Duration,
}

impl RateLimiter {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            state: Mutex::new(LimiterState {
                next_global_at: None,
                destinations: HashMap::new(),
                shutdown: false,
                total_permits: 0,
            }),
            wakeup: Notify::new(),
            global_min: config.global_spacing_min,
            global_max: config.global_spacing_max,
            destination_spacing: config.destination_spacing,
            cooldown: config.throttle_cooldown,
        }
    }

    /// Wait for a permit to talk to `destination`. Blocks through global
    /// spacing, per-destination spacing, and any active cooldown; fails
    /// promptly once shutdown is requested.
    pub async fn acquire(&self, destination: &str) -> Result<RatePermit<'_>, ScoutError> {
        loop {
            let ready_at = {
                let mut guard = self.state.lock().await;
                if guard.shutdown {
                    return Err(ScoutError::Shutdown);
                }
                let now = Instant::now();
                let state = &mut *guard;
                let dest = state.destinations.entry(destination.to_string()).or_default();

                let mut ready = now;
                if let Some(at) = state.next_global_at {
                    ready = ready.max(at);
                }
                if let Some(at) = dest.next_at {
                    ready = ready.max(at);
                }
                if let Some(at) = dest.cooldown_until {
                    ready = ready.max(at);
                }

                if ready <= now {
                    state.next_global_at = Some(now + self.jittered_global_gap());
                    dest.next_at = Some(now + self.destination_spacing);
                    dest.cooldown_until = None;
                    state.total_permits += 1;
                    debug!(destination, permits = state.total_permits, "Permit granted");
                    return Ok(RatePermit {
                        limiter: self,
                        destination: destination.to_string(),
                    });
                }
                ready
            };

            tokio::select! {
                _ = tokio::time::sleep_until(ready_at) => {}
                _ = self.wakeup.notified() => {}
            }
        }
    }

    /// Make all pending and future acquisitions fail. Idempotent.
    pub async fn shutdown(&self) {
        let mut guard = self.state.lock().await;
        guard.shutdown = true;
        self.wakeup.notify_waiters();
    }

    pub async fn total_permits(&self) -> u64 {
        self.state.lock().await.total_permits
    }

    async fn mark_throttled(&self, destination: &str) {
        let mut guard = self.state.lock().await;
        let until = Instant::now() + self.cooldown;
        guard
            .destinations
            .entry(destination.to_string())
            .or_default()
            .cooldown_until = Some(until);
        warn!(
            destination,
            cooldown_secs = self.cooldown.as_secs(),
            "Destination throttled, cooling down"
        );
    }

    fn jittered_global_gap(&self) -> Duration {
        let span = self
            .global_max
            .saturating_sub(self.global_min)
            .as_millis() as u64;
        if span == 0 {
            return self.global_min;
        }
        self.global_min + Duration::from_millis(rand::rng().random_range(0..=span))
    }
}

/// Scoped permission for one outbound action. Spacing was already reserved
/// at grant time, so dropping the permit is free; the caller's only duty is
/// to report throttling responses.
pub struct RatePermit<'a> {
    limiter: &'a RateLimiter,
    destination: String,
}

impl RatePermit<'_> {
    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// The downstream call came back throttled; start the destination's
    /// cooldown. The caller re-acquires if it wants to retry.
    pub async fn report_throttled(&self) {
        self.limiter.mark_throttled(&self.destination).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn config(global: u64, per_dest: u64, cooldown: u64) -> EngineConfig {
        EngineConfig {
            global_spacing_min: Duration::from_secs(global),
            global_spacing_max: Duration::from_secs(global),
            destination_spacing: Duration::from_secs(per_dest),
            throttle_cooldown: Duration::from_secs(cooldown),
            ..EngineConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn consecutive_permits_respect_destination_spacing() {
        let limiter = RateLimiter::new(&config(1, 5, 60));

        let start = Instant::now();
        limiter.acquire("a.example").await.unwrap();
        limiter.acquire("a.example").await.unwrap();
        assert!(Instant::now() - start >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn global_spacing_applies_across_destinations() {
        let limiter = RateLimiter::new(&config(2, 5, 60));

        let start = Instant::now();
        limiter.acquire("a.example").await.unwrap();
        limiter.acquire("b.example").await.unwrap();
        let elapsed = Instant::now() - start;
        assert!(elapsed >= Duration::from_secs(2));
        assert!(elapsed < Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_blocks_only_the_throttled_destination() {
        let limiter = Arc::new(RateLimiter::new(&config(1, 1, 60)));

        let permit = limiter.acquire("d.example").await.unwrap();
        permit.report_throttled().await;
        drop(permit);

        // t=30s: d must still be blocked until t=60s; e flows normally.
        tokio::time::sleep(Duration::from_secs(29)).await;
        let start = Instant::now();
        limiter.acquire("e.example").await.unwrap();
        assert!(Instant::now() - start < Duration::from_secs(5));

        let start = Instant::now();
        limiter.acquire("d.example").await.unwrap();
        let waited = Instant::now() - start;
        // Granted no earlier than the original cooldown expiry.
        assert!(waited >= Duration::from_secs(25), "waited only {waited:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_fails_pending_acquisitions() {
        let limiter = Arc::new(RateLimiter::new(&config(1, 600, 600)));

        limiter.acquire("slow.example").await.unwrap();
        let pending = {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.acquire("slow.example").await.map(|_| ()) })
        };
        // Let the pending task park on its sleep before shutting down.
        tokio::time::sleep(Duration::from_millis(10)).await;
        limiter.shutdown().await;

        let result = pending.await.unwrap();
        assert!(matches!(result, Err(ScoutError::Shutdown)));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_fails_new_acquisitions() {
        let limiter = RateLimiter::new(&config(1, 1, 60));
        limiter.shutdown().await;
        assert!(matches!(
            limiter.acquire("a.example").await,
            Err(ScoutError::Shutdown)
        ));
    }
}
