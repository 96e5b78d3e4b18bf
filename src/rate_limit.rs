use std::sync::{LazyLock, Mutex};
use std::time::{Duration, Instant};

use tracing::warn;

use crate::errors::{Error, Result};

/* ============================= CONFIG ============================= */

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub requests_per_minute: u32,
    pub burst_size: u32,
}

impl RateLimitConfig {
    pub const fn new(requests_per_minute: u32, burst_size: u32) -> Self {
        RateLimitConfig { requests_per_minute, burst_size }
    }
}

/* ============================= TOKEN BUCKET ============================= */

struct BucketState {
    tokens: f64,
    last_update: Instant,
}

/// Token-bucket rate limiter for external API calls.
///
/// Tokens refill at `requests_per_minute / 60` per second up to the burst
/// capacity. Refill is computed lazily from elapsed time on each call; there
/// is no background tick. The bucket starts full so short bursts are allowed
/// while the average rate holds over time.
pub struct TokenBucket {
    rate: f64,
    capacity: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    pub fn new(config: RateLimitConfig) -> Self {
        TokenBucket {
            rate: f64::from(config.requests_per_minute) / 60.0,
            capacity: f64::from(config.burst_size),
            state: Mutex::new(BucketState {
                tokens: f64::from(config.burst_size),
                last_update: Instant::now(),
            }),
        }
    }

    /// Acquire one token, waiting up to `timeout`.
    ///
    /// Sleeps in short slices so shutdown stays responsive. A zero timeout
    /// behaves exactly like `try_acquire`. Failure is a retryable error.
    pub async fn acquire(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;

        loop {
            let wait = {
                let mut state = self.state.lock().expect("rate limiter lock");
                self.refill(&mut state);

                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return Ok(());
                }

                Duration::from_secs_f64((1.0 - state.tokens) / self.rate)
            };

            if Instant::now() + wait > deadline {
                warn!(
                    timeout_secs = timeout.as_secs_f64(),
                    wait_secs = wait.as_secs_f64(),
                    "rate_limit_acquire_timeout"
                );
                return Err(Error::rate_limit(format!(
                    "timed out after {:.1}s waiting for rate limit token",
                    timeout.as_secs_f64()
                )));
            }

            tokio::time::sleep(wait.min(Duration::from_millis(100))).await;
        }
    }

    /// Take a token if one is available, without waiting.
    pub fn try_acquire(&self) -> bool {
        let mut state = self.state.lock().expect("rate limiter lock");
        self.refill(&mut state);
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Current token count (fractional). For monitoring and tests.
    pub fn available_tokens(&self) -> f64 {
        let mut state = self.state.lock().expect("rate limiter lock");
        self.refill(&mut state);
        state.tokens
    }

    /// Estimated wait until the next token is available.
    pub fn wait_time(&self) -> Duration {
        let mut state = self.state.lock().expect("rate limiter lock");
        self.refill(&mut state);
        if state.tokens >= 1.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64((1.0 - state.tokens) / self.rate)
        }
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_update).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.rate).min(self.capacity);
        state.last_update = now;
    }
}

/* ============================= ENDPOINT-CLASS SINGLETONS ============================= */

/// Monitor management endpoints: 50 requests/minute, burst 10.
pub static MANAGEMENT_LIMITER: LazyLock<TokenBucket> =
    LazyLock::new(|| TokenBucket::new(RateLimitConfig::new(50, 10)));

/// Monitor integration endpoints: 20 requests/minute, burst 5.
pub static INTEGRATION_LIMITER: LazyLock<TokenBucket> =
    LazyLock::new(|| TokenBucket::new(RateLimitConfig::new(20, 5)));

/// Inference endpoint: 30 requests/minute, burst 5.
pub static INFERENCE_LIMITER: LazyLock<TokenBucket> =
    LazyLock::new(|| TokenBucket::new(RateLimitConfig::new(30, 5)));

/// Repository host API: 60 requests/minute, burst 15.
pub static REPO_HOST_LIMITER: LazyLock<TokenBucket> =
    LazyLock::new(|| TokenBucket::new(RateLimitConfig::new(60, 15)));
