//! Consecutive-failure circuit breaker.
//!
//! When the backend is down for minutes at a time, retrying each file
//! through its full backoff schedule just burns the batch. The breaker counts
//! file-level failures in a row; once the count reaches the threshold the
//! next [`CircuitBreaker::check`] blocks for one cooldown period, resets the
//! counter and lets processing continue.
//!
//! ```text
//!            failures >= threshold
//!   CLOSED ────────────────────────▶ OPEN
//!      ▲                               │
//!      └──── cooldown elapsed, ◀───────┘
//!            counter = 0
//! ```
//!
//! There is no terminal state. One breaker may be shared (`Arc`) by several
//! batch runs in the same process; the counter sits behind an async mutex
//! that is held for the whole cooldown, so at most one cooldown runs at a
//! time and callers queued behind it observe the reset counter.

use crate::clock::Sleeper;
use crate::progress::ProgressCallback;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Consecutive failed files that open the circuit.
pub const DEFAULT_FAILURE_THRESHOLD: usize = 5;

/// Pause applied when the circuit opens.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CircuitState {
    /// Normal operation.
    Closed,
    /// Threshold reached; the next check (or the one in progress) cools down.
    Open,
}

pub struct CircuitBreaker {
    consecutive_failures: Mutex<usize>,
    threshold: usize,
    cooldown: Duration,
    cooling: AtomicBool,
    sleeper: Arc<dyn Sleeper>,
}

impl CircuitBreaker {
    pub fn new(threshold: usize, cooldown: Duration, sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            consecutive_failures: Mutex::new(0),
            threshold: threshold.max(1),
            cooldown,
            cooling: AtomicBool::new(false),
            sleeper,
        }
    }

    /// Breaker with the default threshold (5) and cooldown (5 minutes).
    pub fn with_defaults(sleeper: Arc<dyn Sleeper>) -> Self {
        Self::new(DEFAULT_FAILURE_THRESHOLD, DEFAULT_COOLDOWN, sleeper)
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Call before each job. Cools down if the circuit is open.
    ///
    /// Returns `true` when this call performed a cooldown.
    pub async fn check(&self, progress: Option<&ProgressCallback>) -> bool {
        let mut failures = self.consecutive_failures.lock().await;
        if *failures < self.threshold {
            return false;
        }

        self.cooling.store(true, Ordering::SeqCst);
        warn!(
            "Circuit breaker: {} consecutive failures, pausing {}s to let the API recover",
            *failures,
            self.cooldown.as_secs()
        );
        if let Some(cb) = progress {
            cb.on_cooldown(*failures, self.cooldown);
        }

        self.sleeper.sleep(self.cooldown).await;

        *failures = 0;
        self.cooling.store(false, Ordering::SeqCst);
        info!("Circuit breaker: cooldown finished, resuming");
        true
    }

    /// A job succeeded; the failure streak is over.
    pub async fn record_success(&self) {
        *self.consecutive_failures.lock().await = 0;
    }

    /// A job failed after its retries.
    pub async fn record_failure(&self) {
        let mut failures = self.consecutive_failures.lock().await;
        *failures = failures.saturating_add(1);
    }

    pub async fn consecutive_failures(&self) -> usize {
        *self.consecutive_failures.lock().await
    }

    pub async fn state(&self) -> CircuitState {
        if self.cooling.load(Ordering::SeqCst) {
            return CircuitState::Open;
        }
        if *self.consecutive_failures.lock().await >= self.threshold {
            CircuitState::Open
        } else {
            CircuitState::Closed
        }
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("threshold", &self.threshold)
            .field("cooldown", &self.cooldown)
            .field("cooling", &self.cooling.load(Ordering::SeqCst))
            .finish()
    }
}
