//! Token-bucket rate limiter matching the platform's documented ceiling.
//!
//! One bucket is owned by each REST source instance and shared between its
//! page and hydration requests within a single query execution; nothing is
//! shared across queries. When the bucket is empty, `acquire` suspends
//! until capacity refills instead of failing.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::SourceError;

pub struct TokenBucket {
    capacity: f64,
    window: Duration,
    state: Mutex<BucketState>,
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// `max_requests` per `window`, refilled continuously.
    pub fn new(max_requests: u32, window: Duration) -> Self {
        let capacity = f64::from(max_requests.max(1));
        Self {
            capacity,
            window,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Take one token, suspending while the bucket is empty.
    ///
    /// The wait is a cancellation point: a cancelled query stops here
    /// rather than queueing further upstream requests.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<(), SourceError> {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                self.refill(&mut state);
                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return Ok(());
                }
                // Time until one full token accrues.
                let deficit = 1.0 - state.tokens;
                self.window.div_f64(self.capacity).mul_f64(deficit)
            };

            tokio::select! {
                () = cancel.cancelled() => return Err(SourceError::Cancelled),
                () = tokio::time::sleep(wait) => {}
            }
        }
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill);
        let accrued = elapsed.as_secs_f64() / self.window.as_secs_f64() * self.capacity;
        state.tokens = (state.tokens + accrued).min(self.capacity);
        state.last_refill = now;
    }
}
