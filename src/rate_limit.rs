//! Per-channel upstream rate limiting
//!
//! Two process-wide limiters: one for the balance/RPC channel and one for the
//! quote/execute channel. Every upstream call acquires its channel's limiter
//! first - no component talks to the upstream directly. A 429-class response
//! puts the channel into an extended cooldown before the next call.

use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use tokio::sync::Mutex;

use crate::logger::{self, LogTag};

/// Minimum delay between RPC channel calls
const RPC_MIN_INTERVAL_MS: u64 = 200;
/// Minimum delay between quote/execute channel calls
const SWAP_MIN_INTERVAL_MS: u64 = 500;
/// Extended cooldown applied to a channel after a 429 response
const RPC_RATE_LIMIT_COOLDOWN_SECS: u64 = 10;
const SWAP_RATE_LIMIT_COOLDOWN_SECS: u64 = 20;

#[derive(Debug, Default)]
struct LimiterState {
    last_call: Option<Instant>,
    cooldown_until: Option<Instant>,
}

#[derive(Debug)]
pub struct RateLimiter {
    name: &'static str,
    min_interval: Duration,
    rate_limit_cooldown: Duration,
    state: Mutex<LimiterState>,
}

impl RateLimiter {
    pub fn new(name: &'static str, min_interval: Duration, rate_limit_cooldown: Duration) -> Self {
        Self {
            name,
            min_interval,
            rate_limit_cooldown,
            state: Mutex::new(LimiterState::default()),
        }
    }

    /// Wait until this channel is allowed to make its next upstream call,
    /// then reserve the slot.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                let now = Instant::now();

                let mut until = now;
                if let Some(cooldown_until) = state.cooldown_until {
                    if cooldown_until > until {
                        until = cooldown_until;
                    }
                }
                if let Some(last_call) = state.last_call {
                    let next_allowed = last_call + self.min_interval;
                    if next_allowed > until {
                        until = next_allowed;
                    }
                }

                if until <= now {
                    state.last_call = Some(now);
                    state.cooldown_until = None;
                    None
                } else {
                    Some(until - now)
                }
            };

            match wait {
                None => return,
                Some(duration) => tokio::time::sleep(duration).await,
            }
        }
    }

    /// Record an upstream 429 - the next call on this channel waits out an
    /// extended cooldown instead of the normal interval.
    pub async fn record_429(&self) {
        let mut state = self.state.lock().await;
        let until = Instant::now() + self.rate_limit_cooldown;
        state.cooldown_until = Some(until);

        logger::warning(
            LogTag::Rpc,
            &format!(
                "{} channel rate limited - cooling down for {}s",
                self.name,
                self.rate_limit_cooldown.as_secs()
            ),
        );
    }

    /// Remaining cooldown on this channel, if any
    pub async fn cooldown_remaining(&self) -> Option<Duration> {
        let state = self.state.lock().await;
        state
            .cooldown_until
            .and_then(|until| until.checked_duration_since(Instant::now()))
    }
}

/// Balance/status channel limiter
pub static RPC_LIMITER: Lazy<RateLimiter> = Lazy::new(|| {
    RateLimiter::new(
        "rpc",
        Duration::from_millis(RPC_MIN_INTERVAL_MS),
        Duration::from_secs(RPC_RATE_LIMIT_COOLDOWN_SECS),
    )
});

/// Quote/execute channel limiter
pub static SWAP_LIMITER: Lazy<RateLimiter> = Lazy::new(|| {
    RateLimiter::new(
        "swap",
        Duration::from_millis(SWAP_MIN_INTERVAL_MS),
        Duration::from_secs(SWAP_RATE_LIMIT_COOLDOWN_SECS),
    )
});
