//! Suspension points: backoff delays, circuit cooldowns and pacing.
//!
//! Every wait in the batch pipeline goes through a [`Sleeper`] so tests can
//! swap in [`RecordingSleeper`] and check the exact delays requested without
//! waiting for them.

use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;

/// Something that can suspend the current task for a duration.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Production sleeper backed by `tokio::time::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Records every requested duration and returns immediately.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    calls: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// All durations requested so far, in call order.
    pub fn calls(&self) -> Vec<Duration> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Number of durations requested that are at least `min` long.
    pub fn count_at_least(&self, min: Duration) -> usize {
        self.calls().into_iter().filter(|d| *d >= min).count()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(duration);
        }
        tokio::task::yield_now().await;
    }
}

/// Uniform jitter in `[0, 1)` seconds.
pub fn random_jitter() -> f64 {
    rand::random::<f64>()
}
