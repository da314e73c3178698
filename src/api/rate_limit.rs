use std::time::{Duration, Instant};

use tokio::sync::Mutex;

/// Token bucket shared by every request the client sends, retries included.
///
/// The bucket holds at most one second's worth of permits, so a burst after
/// an idle period never exceeds `permits_per_second`.
#[derive(Debug)]
pub struct RateLimiter {
    bucket: Mutex<TokenBucket>,
}

#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    max_tokens: f64,
    refill_rate: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(permits_per_second: f64) -> Self {
        let rate = permits_per_second.max(0.001);
        let max_tokens = rate.max(1.0);
        Self {
            tokens: max_tokens,
            max_tokens,
            refill_rate: rate,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.last_refill);
        self.tokens = (self.tokens + elapsed.as_secs_f64() * self.refill_rate).min(self.max_tokens);
        self.last_refill = now;
    }

    /// Take a permit, or report how long until one is available.
    fn try_acquire(&mut self, now: Instant) -> Result<(), Duration> {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            let needed = 1.0 - self.tokens;
            Err(Duration::from_secs_f64(needed / self.refill_rate))
        }
    }
}

impl RateLimiter {
    pub fn new(permits_per_second: f64) -> Self {
        Self {
            bucket: Mutex::new(TokenBucket::new(permits_per_second)),
        }
    }

    /// Wait until a permit is available and take it.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut bucket = self.bucket.lock().await;
                match bucket.try_acquire(Instant::now()) {
                    Ok(()) => return,
                    Err(wait) => wait,
                }
            };
            log::trace!("Rate limited locally, waiting {}ms for a permit", wait.as_millis());
            tokio::time::sleep(wait).await;
        }
    }
}
