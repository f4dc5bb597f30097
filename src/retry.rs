//! Bounded retry with a fixed backoff schedule.
//!
//! HTTP 429 / 503 and "model is overloaded" answers from the extraction
//! backend are transient and frequent for large drawings. Each failed attempt
//! is classified with [`BackendError::is_retryable`]: transient errors wait
//! `schedule[attempt] + jitter` and try again, anything else returns at once
//! without spending the retry budget.
//!
//! With the defaults (7 retries, `[2, 4, 8, 16, 30, 60, 60]` s) a file that
//! never recovers costs about three minutes of waiting before it is reported
//! as failed.

use crate::clock::{random_jitter, Sleeper};
use crate::error::BackendError;
use crate::progress::ProgressCallback;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 7;

/// Backoff schedule in seconds, indexed by attempt. Attempts past the end
/// reuse the last entry.
pub const DEFAULT_DELAY_SCHEDULE_SECS: [u64; 7] = [2, 4, 8, 16, 30, 60, 60];

/// One failed attempt that is about to be retried.
#[derive(Debug, Clone, Copy)]
pub struct RetryAttempt<'a> {
    /// 0-based index of the attempt that failed.
    pub attempt: u32,
    pub max_attempts: u32,
    /// Delay (schedule entry plus jitter) before the next attempt.
    pub delay: Duration,
    pub error: &'a BackendError,
}

/// The operation failed for good; `error` is the last error it returned.
#[derive(Debug, Clone, Error)]
#[error("{error}")]
pub struct RetryFailure {
    #[source]
    pub error: BackendError,
    /// Attempts made, including the first.
    pub attempts: u32,
}

/// Retry policy shared by every extraction call of a batch.
#[derive(Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    schedule: Vec<Duration>,
    sleeper: Arc<dyn Sleeper>,
    jitter: fn() -> f64,
    progress: Option<ProgressCallback>,
}

impl RetryPolicy {
    /// Default retry budget and schedule, sleeping through `sleeper`.
    pub fn new(sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            schedule: DEFAULT_DELAY_SCHEDULE_SECS
                .iter()
                .map(|s| Duration::from_secs(*s))
                .collect(),
            sleeper,
            jitter: random_jitter,
            progress: None,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_schedule(mut self, schedule: Vec<Duration>) -> Self {
        self.schedule = schedule;
        self
    }

    /// Replace the jitter source. It must return values in `[0, 1)`.
    pub fn with_jitter(mut self, jitter: fn() -> f64) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_progress(mut self, progress: Option<ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Delay before the attempt following failed attempt `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self
            .schedule
            .get(attempt as usize)
            .or_else(|| self.schedule.last())
            .copied()
            .unwrap_or_default();
        let jitter = Duration::try_from_secs_f64((self.jitter)()).unwrap_or_default();
        base + jitter
    }

    /// Run `operation` until it succeeds, fails fatally, or the budget of
    /// `max_retries + 1` attempts is spent.
    ///
    /// `label` names the work in logs and progress events (usually the file
    /// stem).
    pub async fn execute<T, F, Fut>(&self, label: &str, mut operation: F) -> Result<T, RetryFailure>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BackendError>>,
    {
        let max_attempts = self.max_retries + 1;
        let mut attempt = 0u32;

        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        info!("{}: success after {} retry(ies)", label, attempt);
                    }
                    return Ok(value);
                }
                Err(error) => {
                    let retryable = error.is_retryable();
                    if !retryable || attempt >= self.max_retries {
                        warn!(
                            "{}: attempt {}/{} failed ({}): {}",
                            label,
                            attempt + 1,
                            max_attempts,
                            if retryable { "retries exhausted" } else { "not retryable" },
                            error
                        );
                        return Err(RetryFailure {
                            error,
                            attempts: attempt + 1,
                        });
                    }

                    let delay = self.delay_for(attempt);
                    warn!(
                        "{}: API error (attempt {}/{}), retrying in {:.1}s: {}",
                        label,
                        attempt + 1,
                        max_attempts,
                        delay.as_secs_f64(),
                        error
                    );
                    if let Some(ref cb) = self.progress {
                        cb.on_retry(
                            label,
                            &RetryAttempt {
                                attempt,
                                max_attempts,
                                delay,
                                error: &error,
                            },
                        );
                    }
                    self.sleeper.sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::RecordingSleeper;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    fn no_jitter() -> f64 {
        0.0
    }

    fn half_second() -> f64 {
        0.5
    }

    fn policy(sleeper: &Arc<RecordingSleeper>) -> RetryPolicy {
        RetryPolicy::new(sleeper.clone() as Arc<dyn Sleeper>).with_jitter(no_jitter)
    }

    /// Operation that replays `script` one entry per call.
    fn scripted(
        script: Vec<Result<u32, BackendError>>,
    ) -> (Arc<AtomicU32>, impl FnMut() -> std::future::Ready<Result<u32, BackendError>>) {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let script = Mutex::new(script.into_iter());
        let op = move || {
            counter.fetch_add(1, Ordering::SeqCst);
            let next = script
                .lock()
                .unwrap()
                .next()
                .unwrap_or_else(|| Err(BackendError::Api("script exhausted".into())));
            std::future::ready(next)
        };
        (calls, op)
    }

    #[tokio::test]
    async fn retryable_failures_then_success() {
        let sleeper = Arc::new(RecordingSleeper::new());
        let (calls, op) = scripted(vec![
            Err(BackendError::Api("429 Too Many Requests".into())),
            Err(BackendError::Api("503 Service Unavailable".into())),
            Err(BackendError::Api("model is overloaded".into())),
            Ok(42),
        ]);

        let value = policy(&sleeper).execute("drawing", op).await.unwrap();

        assert_eq!(value, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(
            sleeper.calls(),
            vec![
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(8)
            ]
        );
    }

    #[tokio::test]
    async fn fatal_error_returns_after_first_attempt() {
        let sleeper = Arc::new(RecordingSleeper::new());
        let (calls, op) = scripted(vec![
            Err(BackendError::Api("400 invalid argument".into())),
            Ok(1),
        ]);

        let failure = policy(&sleeper).execute("drawing", op).await.unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(failure.attempts, 1);
        assert_eq!(failure.error, BackendError::Api("400 invalid argument".into()));
        assert!(sleeper.calls().is_empty());
    }

    #[tokio::test]
    async fn exhausted_budget_preserves_last_error() {
        let sleeper = Arc::new(RecordingSleeper::new());
        let script = (0..10)
            .map(|i| Err(BackendError::Api(format!("503 attempt {i}"))))
            .collect();
        let (calls, op) = scripted(script);

        let failure = policy(&sleeper)
            .with_max_retries(3)
            .execute("drawing", op)
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(failure.attempts, 4);
        assert_eq!(failure.error, BackendError::Api("503 attempt 3".into()));
        assert_eq!(sleeper.calls().len(), 3);
    }

    #[tokio::test]
    async fn default_budget_is_eight_attempts() {
        let sleeper = Arc::new(RecordingSleeper::new());
        let script = (0..20).map(|_| Err(BackendError::Api("429".into()))).collect();
        let (calls, op) = scripted(script);

        let failure = policy(&sleeper).execute("drawing", op).await.unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 8);
        assert_eq!(failure.attempts, 8);
        let secs: Vec<u64> = sleeper.calls().iter().map(|d| d.as_secs()).collect();
        assert_eq!(secs, vec![2, 4, 8, 16, 30, 60, 60]);
    }

    #[test]
    fn delay_clamps_to_last_schedule_entry() {
        let p = RetryPolicy::new(Arc::new(RecordingSleeper::new())).with_jitter(no_jitter);
        assert_eq!(p.delay_for(0), Duration::from_secs(2));
        assert_eq!(p.delay_for(6), Duration::from_secs(60));
        assert_eq!(p.delay_for(25), Duration::from_secs(60));
    }

    #[test]
    fn jitter_is_added_to_schedule() {
        let p = RetryPolicy::new(Arc::new(RecordingSleeper::new())).with_jitter(half_second);
        assert_eq!(p.delay_for(1), Duration::from_millis(4500));
    }

    #[test]
    fn real_jitter_stays_below_one_second() {
        let p = RetryPolicy::new(Arc::new(RecordingSleeper::new()));
        for _ in 0..200 {
            let d = p.delay_for(0);
            assert!(d >= Duration::from_secs(2) && d < Duration::from_secs(3), "got {d:?}");
        }
    }
}
