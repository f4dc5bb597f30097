//! Batch orchestration: the entry points of the library.
//!
//! One batch is one customer order: a folder of drawings processed together.
//!
//! ```text
//! START ─▶ DETECTING_CUSTOMER ─▶ PROCESSING_FILES ─▶ DETECTING_ASSEMBLY
//!          (auto only)           (sequential)              │
//!                                                          ▼
//!                              DONE ◀── MERGING_ASSEMBLY (optional)
//! ```
//!
//! Files are processed strictly one at a time in file-name order. Every file
//! goes through the [`CircuitBreaker`] check and a [`RetryPolicy`]-wrapped
//! extraction call; one file's failure is recorded and the batch moves on.
//! A file that cannot be read or is not a PDF counts as a failed file too.
//! Only an empty input set, a path that does not exist or a customer-detection
//! error abort the batch.

use crate::assembly::{apply_restricted_extraction, detect_assembly};
use crate::circuit::CircuitBreaker;
use crate::clock::{Sleeper, TokioSleeper};
use crate::config::{BatchConfig, CustomerSelection};
use crate::error::{ExtractError, FileError};
use crate::output::{BatchOutput, BatchResult, CustomerDetection};
use crate::pipeline::input::{self, InputFile, SourceDocument};
use crate::pipeline::llm::{
    resolve_provider, CustomerDetector, ExtractionJob, ExtractionMode, Extractor,
    LlmCustomerDetector, LlmExtractor,
};
use crate::progress::ProgressCallback;
use crate::retry::RetryPolicy;
use crate::xml;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Drives one or more batches through injected collaborators.
///
/// The circuit breaker is shared through an `Arc`; hand the same breaker to
/// several orchestrators with [`BatchOrchestrator::with_breaker`] when
/// batches run concurrently against one backend.
pub struct BatchOrchestrator {
    extractor: Arc<dyn Extractor>,
    detector: Arc<dyn CustomerDetector>,
    breaker: Arc<CircuitBreaker>,
    retry: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    customer: CustomerSelection,
    model: String,
    pacing: Duration,
    output_dir: Option<PathBuf>,
    progress: Option<ProgressCallback>,
}

impl BatchOrchestrator {
    /// Orchestrator that waits on the tokio clock.
    pub fn new(
        extractor: Arc<dyn Extractor>,
        detector: Arc<dyn CustomerDetector>,
        config: &BatchConfig,
    ) -> Self {
        Self::with_sleeper(extractor, detector, config, Arc::new(TokioSleeper))
    }

    /// Orchestrator whose backoff, cooldown and pacing all go through
    /// `sleeper`.
    pub fn with_sleeper(
        extractor: Arc<dyn Extractor>,
        detector: Arc<dyn CustomerDetector>,
        config: &BatchConfig,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        let retry = RetryPolicy::new(Arc::clone(&sleeper))
            .with_max_retries(config.max_retries)
            .with_schedule(config.delay_schedule.clone())
            .with_progress(config.progress_callback.clone());
        let breaker = Arc::new(CircuitBreaker::new(
            config.failure_threshold,
            config.cooldown,
            Arc::clone(&sleeper),
        ));

        Self {
            extractor,
            detector,
            breaker,
            retry,
            sleeper,
            customer: config.customer.clone(),
            model: config.model.clone(),
            pacing: config.pacing,
            output_dir: config.output_dir.clone(),
            progress: config.progress_callback.clone(),
        }
    }

    /// Share an existing circuit breaker.
    pub fn with_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = breaker;
        self
    }

    /// Replace the backoff jitter source (values in `[0, 1)`).
    pub fn with_jitter(mut self, jitter: fn() -> f64) -> Self {
        self.retry = self.retry.with_jitter(jitter);
        self
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Load `paths`, run them as one batch and write the XML.
    ///
    /// Files that cannot be read are reported as failed files; the XML is
    /// written for the rest.
    pub async fn extract_paths(&self, paths: &[PathBuf]) -> Result<BatchOutput, ExtractError> {
        let inputs = input::load_documents(paths).await?;
        let result = self.run_inputs(&inputs).await?;
        let xml_path = write_output(&result, &input::batch_folder(paths), self.output_dir.as_deref())?;
        Ok(BatchOutput { result, xml_path })
    }

    /// [`extract_paths`](Self::extract_paths) over every `*.pdf` in `folder`.
    pub async fn extract_folder(&self, folder: &Path) -> Result<BatchOutput, ExtractError> {
        let paths = input::collect_folder(folder)?;
        self.extract_paths(&paths).await
    }

    /// Run one batch over `docs`, which must already be in file-name order.
    pub async fn run(&self, docs: &[SourceDocument]) -> Result<BatchResult, ExtractError> {
        let entries: Vec<Result<&SourceDocument, &FileError>> = docs.iter().map(Ok).collect();
        self.run_entries(&entries).await
    }

    /// Run one batch over loaded inputs in file-name order. Unreadable
    /// entries are counted as failed files without a backend call.
    pub async fn run_inputs(&self, inputs: &[InputFile]) -> Result<BatchResult, ExtractError> {
        let entries: Vec<Result<&SourceDocument, &FileError>> =
            inputs.iter().map(Result::as_ref).collect();
        self.run_entries(&entries).await
    }

    async fn run_entries(
        &self,
        entries: &[Result<&SourceDocument, &FileError>],
    ) -> Result<BatchResult, ExtractError> {
        if entries.is_empty() {
            return Err(ExtractError::NoInputFiles {
                path: PathBuf::from("."),
            });
        }
        let docs: Vec<&SourceDocument> = entries.iter().copied().filter_map(Result::ok).collect();
        let total = entries.len();
        let start = Instant::now();

        info!("Starting batch: {} file(s), model {}", total, self.model);
        if let Some(ref cb) = self.progress {
            cb.on_batch_start(total);
        }

        // ── DETECTING_CUSTOMER ───────────────────────────────────────────
        let customer = self.resolve_customer(docs.first().copied()).await?;
        info!(
            "Customer: {} (confidence {}): {}",
            customer.customer_id, customer.confidence, customer.reason
        );
        if let Some(ref cb) = self.progress {
            cb.on_customer(&customer);
        }

        // ── PROCESSING_FILES ─────────────────────────────────────────────
        let mut result = BatchResult {
            customer: Some(customer.clone()),
            ..Default::default()
        };
        let mut called_backend = false;
        for (index, entry) in entries.iter().enumerate() {
            match entry {
                Ok(doc) => {
                    if called_backend {
                        self.sleeper.sleep(self.pacing).await;
                    }
                    called_backend = true;
                    self.process_file(index, total, doc, &customer.customer_id, &mut result)
                        .await;
                }
                Err(failure) => self.record_failure(index, total, (*failure).clone(), &mut result),
            }
        }

        // ── DETECTING_ASSEMBLY ───────────────────────────────────────────
        result.assembly = detect_assembly(&result.items);
        if let Some(ref id) = result.assembly {
            info!("Assembly drawing: {}", id);
            if let Some(ref cb) = self.progress {
                cb.on_assembly(id);
            }
        }

        // ── MERGING_ASSEMBLY ─────────────────────────────────────────────
        if let Some(id) = result.assembly.clone() {
            if total > 1 {
                self.merge_assembly(&docs, &id, &customer.customer_id, &mut result)
                    .await;
            }
        }

        info!(
            "Batch complete: {} succeeded, {} failed in {:.1}s",
            result.succeeded,
            result.failed,
            start.elapsed().as_secs_f64()
        );
        if let Some(ref cb) = self.progress {
            cb.on_batch_complete(result.succeeded, result.failed);
        }
        Ok(result)
    }

    async fn resolve_customer(
        &self,
        first: Option<&SourceDocument>,
    ) -> Result<CustomerDetection, ExtractError> {
        match self.customer {
            CustomerSelection::Named(ref id) => Ok(CustomerDetection::provided(id.clone())),
            CustomerSelection::Auto => {
                let Some(first) = first else {
                    warn!("No readable drawing to detect the customer from, using base");
                    return Ok(CustomerDetection::base_fallback("no readable drawing in the batch"));
                };
                debug!("Auto-detecting customer from {}", first.stem);
                self.detector
                    .detect(first)
                    .await
                    .map_err(ExtractError::CustomerDetection)
            }
        }
    }

    async fn process_file(
        &self,
        index: usize,
        total: usize,
        doc: &SourceDocument,
        customer_id: &str,
        result: &mut BatchResult,
    ) {
        self.breaker.check(self.progress.as_ref()).await;

        info!("[{}/{}] Extracting {}", index + 1, total, doc.stem);
        if let Some(ref cb) = self.progress {
            cb.on_file_start(index, total, &doc.stem);
        }

        let job = ExtractionJob {
            document: doc,
            customer_id,
            model: &self.model,
            mode: ExtractionMode::Full,
        };
        let job_ref = &job;
        let extractor = &self.extractor;
        let outcome = self
            .retry
            .execute(&doc.stem, move || extractor.extract(job_ref))
            .await;

        let failure = match outcome {
            Ok(items) if items.is_empty() => {
                // The backend answered; only the drawing came up empty.
                self.breaker.record_success().await;
                FileError::Empty {
                    file: doc.stem.clone(),
                }
            }
            Ok(items) => {
                self.breaker.record_success().await;
                debug!("{}: {} item(s)", doc.stem, items.len());
                result.items.extend(items);
                result.succeeded += 1;
                if let Some(ref cb) = self.progress {
                    cb.on_file_complete(index, total, &doc.stem);
                }
                return;
            }
            Err(failure) => {
                self.breaker.record_failure().await;
                FileError::ExtractionFailed {
                    file: doc.stem.clone(),
                    attempts: failure.attempts,
                    detail: failure.error.to_string(),
                }
            }
        };
        self.record_failure(index, total, failure, result);
    }

    fn record_failure(&self, index: usize, total: usize, failure: FileError, result: &mut BatchResult) {
        warn!("[{}/{}] {}", index + 1, total, failure);
        if let Some(ref cb) = self.progress {
            cb.on_file_error(index, total, failure.file(), &failure.to_string());
        }
        result.failed += 1;
        result.failures.push(failure);
    }

    /// Re-read the assembly drawing in restricted mode and fold its surface
    /// treatment and BOM into the batch. Never fails the batch.
    async fn merge_assembly(
        &self,
        docs: &[&SourceDocument],
        assembly_id: &str,
        customer_id: &str,
        result: &mut BatchResult,
    ) {
        let Some(doc) = docs.iter().copied().find(|d| d.stem == assembly_id) else {
            warn!("Assembly {}: no source document, skipping merge", assembly_id);
            return;
        };

        info!("Assembly {}: restricted re-extraction", assembly_id);
        let job = ExtractionJob {
            document: doc,
            customer_id,
            model: &self.model,
            mode: ExtractionMode::Restricted,
        };
        let job_ref = &job;
        let extractor = &self.extractor;
        let label = format!("{assembly_id} (assembly)");

        match self
            .retry
            .execute(&label, move || extractor.extract(job_ref))
            .await
        {
            Ok(items) => match items.first() {
                Some(restricted) => {
                    let updated =
                        apply_restricted_extraction(&mut result.items, assembly_id, restricted);
                    debug!("Assembly {}: merged into {} item(s)", assembly_id, updated);
                }
                None => warn!("Assembly {}: re-extraction returned no items", assembly_id),
            },
            Err(failure) => {
                warn!(
                    "Assembly {}: re-extraction failed after {} attempt(s), keeping batch result: {}",
                    assembly_id, failure.attempts, failure
                );
            }
        }
    }
}

/// Serialize `result` and write `PDF_XML_<folder>.xml`.
///
/// The file goes to `output_dir` when given, else into `batch_folder`.
pub fn write_output(
    result: &BatchResult,
    batch_folder: &Path,
    output_dir: Option<&Path>,
) -> Result<PathBuf, ExtractError> {
    let named_folder = std::fs::canonicalize(batch_folder).unwrap_or_else(|_| batch_folder.to_path_buf());
    let file_name = xml::output_file_name(&named_folder);
    let dir = output_dir.unwrap_or(batch_folder);
    xml::write_atomic(dir, &file_name, &xml::serialize(result))
}

/// Extract an explicit list of PDFs as one batch and write its XML.
///
/// The paths are sorted by file name first. The XML is named after the
/// folder of the first file.
///
/// # Errors
/// Fatal only: empty list, missing input path, provider not configured,
/// customer detection failure, output not writable. Per-file failures,
/// including files that are not PDFs, end up in [`BatchResult::failures`].
pub async fn extract_batch(paths: &[PathBuf], config: &BatchConfig) -> Result<BatchOutput, ExtractError> {
    input::ensure_inputs(paths)?;
    let provider = resolve_provider(config)?;

    let extractor = LlmExtractor::from_config(Arc::clone(&provider), config);
    let detector = LlmCustomerDetector::new(provider);
    BatchOrchestrator::new(Arc::new(extractor), Arc::new(detector), config)
        .extract_paths(paths)
        .await
}

/// Extract every `*.pdf` in `folder` as one batch.
pub async fn extract_folder(folder: impl AsRef<Path>, config: &BatchConfig) -> Result<BatchOutput, ExtractError> {
    let paths = input::collect_folder(folder.as_ref())?;
    extract_batch(&paths, config).await
}
