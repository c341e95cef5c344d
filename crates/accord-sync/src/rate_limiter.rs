//! Fetch-call budgeting.
//!
//! When `SyncConfig.rate_limit_per_minute` is set, every connector fetch
//! acquires one token before going out. The bucket starts full so short
//! runs are unaffected; sustained runs settle at the configured rate.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

/// Token bucket with periodic refill.
pub struct TokenBucket {
    capacity: u64,
    refill_amount: u64,
    refill_interval: Duration,
    tokens: AtomicU64,
    last_refill: Mutex<Instant>,
}

impl TokenBucket {
    /// Create a bucket holding at most `capacity` tokens, adding
    /// `refill_amount` every `refill_interval`.
    #[must_use]
    pub fn new(capacity: u64, refill_amount: u64, refill_interval: Duration) -> Self {
        Self {
            capacity,
            refill_amount,
            refill_interval,
            tokens: AtomicU64::new(capacity),
            last_refill: Mutex::new(Instant::now()),
        }
    }

    /// Bucket sized for `calls` acquisitions per minute, refilled once a
    /// second.
    #[must_use]
    pub fn per_minute(calls: u64) -> Self {
        Self::new(calls, calls.div_ceil(60), Duration::from_secs(1))
    }

    /// Take one token without waiting. Returns false when the budget is
    /// exhausted.
    pub async fn try_acquire(&self) -> bool {
        self.try_acquire_many(1).await
    }

    /// Take `count` tokens without waiting.
    pub async fn try_acquire_many(&self, count: u64) -> bool {
        self.refill().await;

        loop {
            let current = self.tokens.load(Ordering::Relaxed);
            if current < count {
                return false;
            }
            if self
                .tokens
                .compare_exchange(
                    current,
                    current - count,
                    Ordering::SeqCst,
                    Ordering::Relaxed,
                )
                .is_ok()
            {
                return true;
            }
        }
    }

    /// Take one token, sleeping until the refill makes one available.
    pub async fn acquire(&self) {
        while !self.try_acquire().await {
            tokio::time::sleep(self.refill_interval / 10).await;
        }
    }

    /// Tokens currently available.
    #[must_use]
    pub fn available(&self) -> u64 {
        self.tokens.load(Ordering::Relaxed)
    }

    /// Check if the budget is exhausted right now.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.available() == 0
    }

    async fn refill(&self) {
        let mut last_refill = self.last_refill.lock().await;
        let elapsed = last_refill.elapsed();
        if elapsed < self.refill_interval {
            return;
        }

        let intervals = elapsed.as_secs_f64() / self.refill_interval.as_secs_f64();
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let earned = (intervals as u64).saturating_mul(self.refill_amount);
        if earned == 0 {
            return;
        }

        loop {
            let current = self.tokens.load(Ordering::Relaxed);
            let topped_up = current.saturating_add(earned).min(self.capacity);
            if self
                .tokens
                .compare_exchange(current, topped_up, Ordering::SeqCst, Ordering::Relaxed)
                .is_ok()
            {
                break;
            }
        }
        *last_refill = Instant::now();
    }
}

impl std::fmt::Debug for TokenBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBucket")
            .field("capacity", &self.capacity)
            .field("available", &self.available())
            .finish_non_exhaustive()
    }
}
