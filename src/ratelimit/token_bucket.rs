//! Outbound token bucket

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

struct BucketState {
    tokens: f64,
    capacity: f64,
    last_refill: Instant,
}

impl BucketState {
    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        let earned = elapsed.as_secs_f64() / 60.0 * self.capacity;
        self.tokens = (self.tokens + earned).min(self.capacity);
        self.last_refill = now;
    }

    fn per_token(&self) -> Duration {
        Duration::from_secs_f64(60.0 / self.capacity)
    }
}

/// Token bucket sized in requests per minute.
///
/// Starts full. Each waiter sleeps on its own; there is no fairness queue.
pub struct TokenBucket {
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Create a bucket allowing `per_minute` requests, clamped to at least 1
    pub fn new(per_minute: u32) -> Self {
        let capacity = per_minute.max(1) as f64;
        Self {
            state: Mutex::new(BucketState {
                tokens: capacity,
                capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Wait until a token is available, then take it
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                state.refill(Instant::now());
                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return;
                }
                let missing = 1.0 - state.tokens;
                state
                    .per_token()
                    .mul_f64(missing)
                    .max(Duration::from_millis(1))
            };
            tokio::time::sleep(wait).await;
        }
    }

    /// Take a token if one is available right now
    pub async fn try_acquire(&self) -> bool {
        let mut state = self.state.lock().await;
        state.refill(Instant::now());
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Change the rate. Stored tokens are clamped to the new capacity.
    pub async fn set_rate(&self, per_minute: u32) {
        let mut state = self.state.lock().await;
        state.refill(Instant::now());
        state.capacity = per_minute.max(1) as f64;
        state.tokens = state.tokens.min(state.capacity);
    }

    pub async fn rate(&self) -> u32 {
        self.state.lock().await.capacity as u32
    }

    pub async fn available(&self) -> f64 {
        let mut state = self.state.lock().await;
        state.refill(Instant::now());
        state.tokens
    }
}
