//! Configuration types for batch extraction.
//!
//! Every knob of a batch run lives in [`BatchConfig`], built via
//! [`BatchConfigBuilder`]. Defaults reproduce the production setup: Gemini
//! 2.5 Pro at temperature 0, seven retries on the `[2, 4, 8, 16, 30, 60, 60]`
//! second schedule, a five-failure circuit breaker with a five-minute
//! cooldown and one second between files.

use crate::circuit::{DEFAULT_COOLDOWN, DEFAULT_FAILURE_THRESHOLD};
use crate::error::ExtractError;
use crate::progress::ProgressCallback;
use crate::retry::{DEFAULT_DELAY_SCHEDULE_SECS, DEFAULT_MAX_RETRIES};
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Default extraction model.
pub const DEFAULT_MODEL: &str = "gemini-2.5-pro";

/// Default provider name passed to `ProviderFactory`.
pub const DEFAULT_PROVIDER: &str = "gemini";

/// Customer label that asks the orchestrator to detect the customer.
pub const AUTO_CUSTOMER: &str = "auto";

/// Pause between two consecutive files.
pub const DEFAULT_PACING: Duration = Duration::from_secs(1);

/// Which customer configuration a batch is extracted with.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CustomerSelection {
    /// Ask the detector, using the first file of the batch.
    #[default]
    Auto,
    /// A fixed customer id (`base`, `elten`, `rademaker`, ...).
    Named(String),
}

impl CustomerSelection {
    /// `"auto"` (any case) or blank → [`CustomerSelection::Auto`].
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        if value.is_empty() || value.eq_ignore_ascii_case(AUTO_CUSTOMER) {
            CustomerSelection::Auto
        } else {
            CustomerSelection::Named(value.to_lowercase())
        }
    }
}

impl fmt::Display for CustomerSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CustomerSelection::Auto => f.write_str(AUTO_CUSTOMER),
            CustomerSelection::Named(id) => f.write_str(id),
        }
    }
}

/// Configuration for one batch run.
///
/// # Example
/// ```rust
/// use drawing_extract::BatchConfig;
///
/// let config = BatchConfig::builder()
///     .customer("elten")
///     .model("gemini-2.5-flash")
///     .max_retries(3)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_retries, 3);
/// ```
#[derive(Clone)]
pub struct BatchConfig {
    /// Customer for the whole batch. Default: auto-detect.
    pub customer: CustomerSelection,

    /// LLM model identifier. Default: `gemini-2.5-pro`.
    pub model: String,

    /// Provider name for `ProviderFactory`. Default: `gemini`.
    pub provider_name: String,

    /// Pre-constructed provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.0; extraction must be repeatable.
    pub temperature: f32,

    /// Output token cap per call. Default: 8192.
    pub max_tokens: usize,

    /// Retries after the first attempt on a transient error. Default: 7.
    pub max_retries: u32,

    /// Backoff before retry *n*, clamped to the last entry.
    pub delay_schedule: Vec<Duration>,

    /// Consecutive failed files that trigger a cooldown. Default: 5.
    pub failure_threshold: usize,

    /// Length of a circuit-breaker cooldown. Default: 300 s.
    pub cooldown: Duration,

    /// Pause between files. Default: 1 s.
    pub pacing: Duration,

    /// Where `PDF_XML_<folder>.xml` is written. Default: the batch folder.
    pub output_dir: Option<PathBuf>,

    /// Root of the customer YAML tree. Default: discovered from the cwd.
    pub config_root: Option<PathBuf>,

    /// Receives per-file events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            customer: CustomerSelection::Auto,
            model: DEFAULT_MODEL.to_string(),
            provider_name: DEFAULT_PROVIDER.to_string(),
            provider: None,
            temperature: 0.0,
            max_tokens: 8192,
            max_retries: DEFAULT_MAX_RETRIES,
            delay_schedule: DEFAULT_DELAY_SCHEDULE_SECS
                .iter()
                .map(|s| Duration::from_secs(*s))
                .collect(),
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            cooldown: DEFAULT_COOLDOWN,
            pacing: DEFAULT_PACING,
            output_dir: None,
            config_root: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for BatchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchConfig")
            .field("customer", &self.customer)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("delay_schedule", &self.delay_schedule)
            .field("failure_threshold", &self.failure_threshold)
            .field("cooldown", &self.cooldown)
            .field("pacing", &self.pacing)
            .field("output_dir", &self.output_dir)
            .field("config_root", &self.config_root)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn BatchProgressCallback>"),
            )
            .finish()
    }
}

impl BatchConfig {
    pub fn builder() -> BatchConfigBuilder {
        BatchConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`BatchConfig`].
#[derive(Debug)]
pub struct BatchConfigBuilder {
    config: BatchConfig,
}

impl BatchConfigBuilder {
    /// `"auto"` or a customer id.
    pub fn customer(mut self, customer: impl AsRef<str>) -> Self {
        self.config.customer = CustomerSelection::parse(customer.as_ref());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = name.into();
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn delay_schedule(mut self, schedule: Vec<Duration>) -> Self {
        self.config.delay_schedule = schedule;
        self
    }

    pub fn failure_threshold(mut self, n: usize) -> Self {
        self.config.failure_threshold = n;
        self
    }

    pub fn cooldown(mut self, cooldown: Duration) -> Self {
        self.config.cooldown = cooldown;
        self
    }

    pub fn pacing(mut self, pacing: Duration) -> Self {
        self.config.pacing = pacing;
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = Some(dir.into());
        self
    }

    pub fn config_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.config_root = Some(dir.into());
        self
    }

    pub fn progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.config.progress_callback = Some(callback);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<BatchConfig, ExtractError> {
        let c = &self.config;
        if c.model.trim().is_empty() {
            return Err(ExtractError::InvalidConfig("Model must not be empty".into()));
        }
        if c.provider.is_none() && c.provider_name.trim().is_empty() {
            return Err(ExtractError::InvalidConfig(
                "Either a provider or a provider name is required".into(),
            ));
        }
        if c.delay_schedule.is_empty() {
            return Err(ExtractError::InvalidConfig(
                "Delay schedule needs at least one entry".into(),
            ));
        }
        if c.failure_threshold == 0 {
            return Err(ExtractError::InvalidConfig(
                "Failure threshold must be ≥ 1".into(),
            ));
        }
        if c.max_tokens == 0 {
            return Err(ExtractError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        Ok(self.config)
    }
}
