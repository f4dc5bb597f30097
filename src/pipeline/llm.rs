//! Model interaction: the extraction and customer-detection contracts and
//! their `edgequake-llm` implementations.
//!
//! The orchestrator only sees the [`Extractor`] and [`CustomerDetector`]
//! traits. [`LlmExtractor`] and [`LlmCustomerDetector`] are the production
//! implementations; tests plug in scripted fakes.
//!
//! Neither implementation retries. Retry, backoff and the circuit breaker
//! belong to the orchestrator so every call is accounted for in one place.

use crate::config::BatchConfig;
use crate::customer::{find_config_root, load_customer_config, CustomerConfig, BASE_CUSTOMER};
use crate::error::{BackendError, ExtractError};
use crate::output::{Confidence, CustomerDetection, ExtractedItem};
use crate::pipeline::encode::encode_pdf;
use crate::pipeline::input::SourceDocument;
use crate::pipeline::postprocess::{finish_items, parse_items};
use crate::prompts::{
    assembly_prompt, full_extraction_prompt, CUSTOMER_DETECTION_PROMPT, EXTRACTION_SYSTEM_PROMPT,
};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, warn};

/// What the model is asked to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionMode {
    /// Holes, tolerances, material, surface treatment and BOM references.
    Full,
    /// Assembly re-read: material, surface treatment and BOM references only.
    Restricted,
}

/// One extraction call: a document plus the settings it is extracted with.
#[derive(Debug, Clone, Copy)]
pub struct ExtractionJob<'a> {
    pub document: &'a SourceDocument,
    pub customer_id: &'a str,
    pub model: &'a str,
    pub mode: ExtractionMode,
}

impl ExtractionJob<'_> {
    pub fn is_restricted(&self) -> bool {
        self.mode == ExtractionMode::Restricted
    }
}

/// Extracts the items of one drawing.
///
/// On success every returned item is complete; the list may be empty when
/// the model found nothing. Errors carry the backend's message so
/// [`BackendError::is_retryable`] can classify them.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, job: &ExtractionJob<'_>) -> Result<Vec<ExtractedItem>, BackendError>;
}

/// Guesses the customer a drawing belongs to.
#[async_trait]
pub trait CustomerDetector: Send + Sync {
    async fn detect(&self, document: &SourceDocument) -> Result<CustomerDetection, BackendError>;
}

/// Instantiate a named provider with the given model.
fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, ExtractError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        ExtractError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!(
                "Set GEMINI_API_KEY (or VITE_GEMINI_API_KEY) for Gemini, or the \
                 matching key for another provider.\nError: {e}"
            ),
        }
    })
}

/// Pre-built provider if the config has one, else provider name + model.
pub fn resolve_provider(config: &BatchConfig) -> Result<Arc<dyn LLMProvider>, ExtractError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }
    create_provider(&config.provider_name, &config.model)
}

fn completion_options(temperature: f32, max_tokens: usize) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(temperature),
        max_tokens: Some(max_tokens),
        ..Default::default()
    }
}

/// Production [`Extractor`] backed by an `edgequake-llm` provider.
pub struct LlmExtractor {
    provider: Arc<dyn LLMProvider>,
    config_root: PathBuf,
    temperature: f32,
    max_tokens: usize,
    customers: Mutex<HashMap<String, Arc<CustomerConfig>>>,
}

impl LlmExtractor {
    pub fn new(provider: Arc<dyn LLMProvider>, config_root: PathBuf) -> Self {
        let defaults = BatchConfig::default();
        Self {
            provider,
            config_root,
            temperature: defaults.temperature,
            max_tokens: defaults.max_tokens,
            customers: Mutex::new(HashMap::new()),
        }
    }

    /// Config root and sampling settings taken from `config`.
    pub fn from_config(provider: Arc<dyn LLMProvider>, config: &BatchConfig) -> Self {
        let root = config.config_root.clone().unwrap_or_else(find_config_root);
        let mut extractor = Self::new(provider, root);
        extractor.temperature = config.temperature;
        extractor.max_tokens = config.max_tokens;
        extractor
    }

    /// Merged customer config, loaded once per customer id.
    fn customer_config(&self, customer_id: &str) -> Result<Arc<CustomerConfig>, BackendError> {
        if let Ok(cache) = self.customers.lock() {
            if let Some(cfg) = cache.get(customer_id) {
                return Ok(Arc::clone(cfg));
            }
        }

        let cfg = Arc::new(
            load_customer_config(&self.config_root, customer_id)
                .map_err(|e| BackendError::Config(e.to_string()))?,
        );
        if let Ok(mut cache) = self.customers.lock() {
            cache.insert(customer_id.to_string(), Arc::clone(&cfg));
        }
        Ok(cfg)
    }

    fn build_prompt(&self, job: &ExtractionJob<'_>) -> Result<String, BackendError> {
        let cfg = self.customer_config(job.customer_id)?;
        Ok(match job.mode {
            ExtractionMode::Full => full_extraction_prompt(job.customer_id, &cfg),
            ExtractionMode::Restricted => assembly_prompt(job.customer_id, &cfg),
        })
    }
}

#[async_trait]
impl Extractor for LlmExtractor {
    async fn extract(&self, job: &ExtractionJob<'_>) -> Result<Vec<ExtractedItem>, BackendError> {
        let start = Instant::now();
        let prompt = self.build_prompt(job)?;
        debug!(
            "{}: {:?} prompt, {} chars, customer '{}'",
            job.document.stem,
            job.mode,
            prompt.len(),
            job.customer_id
        );

        let messages = vec![
            ChatMessage::system(EXTRACTION_SYSTEM_PROMPT),
            ChatMessage::user_with_images(prompt, vec![encode_pdf(&job.document.bytes)]),
        ];
        let options = completion_options(self.temperature, self.max_tokens);

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| BackendError::Api(e.to_string()))?;

        debug!(
            "{}: {} input tokens, {} output tokens, {:?}",
            job.document.stem,
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );

        let mut items = parse_items(&response.content)?;
        finish_items(
            &mut items,
            &job.document.stem,
            job.customer_id,
            job.is_restricted(),
        );
        Ok(items)
    }
}

/// Map the model's one-word answer to a customer.
pub fn classify_customer_reply(reply: &str) -> CustomerDetection {
    let text = reply.trim().to_uppercase();
    if text.contains("ELTEN") {
        CustomerDetection {
            customer_id: "elten".into(),
            confidence: Confidence::High,
            reason: "Detected \"ELTEN\" in BOM table".into(),
        }
    } else if text.contains("RADEMAKER") {
        CustomerDetection {
            customer_id: "rademaker".into(),
            confidence: Confidence::High,
            reason: "Detected \"RADEMAKER\" in BOM table".into(),
        }
    } else if text.contains("UNKNOWN") || text.is_empty() {
        CustomerDetection::base_fallback(
            "No customer name found in BOM table - using base configuration",
        )
    } else {
        CustomerDetection {
            customer_id: BASE_CUSTOMER.into(),
            confidence: Confidence::Medium,
            reason: format!(
                "Found customer name \"{text}\" but no specific config - using base configuration"
            ),
        }
    }
}

/// Production [`CustomerDetector`]. Backend failures fall back to the base
/// customer at low confidence instead of erroring.
pub struct LlmCustomerDetector {
    provider: Arc<dyn LLMProvider>,
}

impl LlmCustomerDetector {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl CustomerDetector for LlmCustomerDetector {
    async fn detect(&self, document: &SourceDocument) -> Result<CustomerDetection, BackendError> {
        let messages = vec![ChatMessage::user_with_images(
            CUSTOMER_DETECTION_PROMPT,
            vec![encode_pdf(&document.bytes)],
        )];
        let options = completion_options(0.0, 64);

        match self.provider.chat(&messages, Some(&options)).await {
            Ok(response) => Ok(classify_customer_reply(&response.content)),
            Err(e) => {
                warn!("Customer detection failed for {}: {}", document.stem, e);
                Ok(CustomerDetection::base_fallback(format!("Vision API error: {e}")))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_options_carry_settings() {
        let opts = completion_options(0.0, 8192);
        assert_eq!(opts.temperature, Some(0.0));
        assert_eq!(opts.max_tokens, Some(8192));
    }

    #[test]
    fn known_customers_are_high_confidence() {
        let d = classify_customer_reply("elten\n");
        assert_eq!(d.customer_id, "elten");
        assert_eq!(d.confidence, Confidence::High);

        let d = classify_customer_reply("RADEMAKER");
        assert_eq!(d.customer_id, "rademaker");
        assert_eq!(d.confidence, Confidence::High);
    }

    #[test]
    fn unknown_falls_back_to_base_low() {
        let d = classify_customer_reply("UNKNOWN");
        assert_eq!(d.customer_id, "base");
        assert_eq!(d.confidence, Confidence::Low);
    }

    #[test]
    fn other_names_fall_back_to_base_medium() {
        let d = classify_customer_reply("Acme");
        assert_eq!(d.customer_id, "base");
        assert_eq!(d.confidence, Confidence::Medium);
        assert!(d.reason.contains("ACME"));
    }

    #[test]
    fn restricted_job_flag() {
        let doc = SourceDocument::from_bytes("/tmp/a.pdf", b"%PDF".to_vec());
        let job = ExtractionJob {
            document: &doc,
            customer_id: "base",
            model: "gemini-2.5-pro",
            mode: ExtractionMode::Restricted,
        };
        assert!(job.is_restricted());
    }
}
