//! Shared call budget and pacing gate
//!
//! [`RateBudget`] enforces the rolling-window ceiling for one scheduler run.
//! [`PacingGate`] enforces the minimum spacing between two calls. Both are
//! safe to share across tasks: the counter is atomic and the window reset is
//! serialized behind a mutex.

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::utils::error::ClientError;

/// Point-in-time view of a budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetSnapshot {
    pub calls_made: u32,
    pub calls_remaining: u32,
    pub ceiling: u32,
    pub window_elapsed: Duration,
    pub window_remaining: Duration,
}

/// Rolling-window call ceiling for one run
#[derive(Debug)]
pub struct RateBudget {
    ceiling: u32,
    window: Duration,
    calls_made: AtomicU32,
    total_calls: AtomicU32,
    window_start: Mutex<Instant>,
}

impl RateBudget {
    pub fn new(ceiling: u32, window: Duration) -> Self {
        Self {
            ceiling,
            window,
            calls_made: AtomicU32::new(0),
            total_calls: AtomicU32::new(0),
            window_start: Mutex::new(Instant::now()),
        }
    }

    pub fn ceiling(&self) -> u32 {
        self.ceiling
    }

    /// Reserve one call
    ///
    /// Resets the counter only once the window has fully elapsed. Returns
    /// `BudgetExhausted` without side effects when the ceiling is reached.
    pub fn try_acquire(&self) -> Result<(), ClientError> {
        {
            let mut start = self.window_start.lock().unwrap_or_else(|e| e.into_inner());
            if start.elapsed() >= self.window {
                *start = Instant::now();
                self.calls_made.store(0, Ordering::SeqCst);
                tracing::debug!(window_secs = self.window.as_secs(), "Rate budget window reset");
            }
        }

        let acquired = self
            .calls_made
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |made| {
                (made < self.ceiling).then_some(made + 1)
            });

        match acquired {
            Ok(_) => {
                self.total_calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            Err(made) => Err(ClientError::BudgetExhausted {
                calls_made: made,
                ceiling: self.ceiling,
            }),
        }
    }

    /// True once the ceiling is reached within the current window
    pub fn is_exhausted(&self) -> bool {
        let snapshot = self.snapshot();
        snapshot.calls_remaining == 0 && snapshot.window_remaining > Duration::ZERO
    }

    /// Calls made in the current window
    pub fn calls_made(&self) -> u32 {
        self.calls_made.load(Ordering::SeqCst)
    }

    /// Calls made over the lifetime of the budget, across windows
    pub fn total_calls(&self) -> u32 {
        self.total_calls.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> BudgetSnapshot {
        let elapsed = self
            .window_start
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .elapsed();
        let calls_made = self.calls_made();
        BudgetSnapshot {
            calls_made,
            calls_remaining: self.ceiling.saturating_sub(calls_made),
            ceiling: self.ceiling,
            window_elapsed: elapsed,
            window_remaining: self.window.saturating_sub(elapsed),
        }
    }
}

/// Minimum spacing between two upstream calls
pub struct PacingGate {
    limiter: Option<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl PacingGate {
    /// Gate allowing one call per `min_interval`; zero disables pacing
    pub fn new(min_interval: Duration) -> Self {
        let limiter = Quota::with_period(min_interval).map(RateLimiter::direct);
        Self { limiter }
    }

    /// Wait until the next call is allowed
    pub async fn wait(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }
}

impl std::fmt::Debug for PacingGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacingGate")
            .field("enabled", &self.limiter.is_some())
            .finish()
    }
}
