//! # drawing-extract
//!
//! Extract manufacturing data (holes, toleranced lengths, material, surface
//! treatment, BOM references) from technical-drawing PDFs with a multimodal
//! LLM, and write one XML order file per batch.
//!
//! ## Batch Overview
//!
//! ```text
//! folder of PDFs (one customer order)
//!  │
//!  ├─ 1. Input      list *.pdf, sort by file name, check %PDF, read
//!  ├─ 2. Customer   "auto" → ask the model who the drawing belongs to
//!  ├─ 3. Extract    one call per file, sequential, paced 1 s apart,
//!  │                retried on 503/429/overloaded, circuit breaker on outages
//!  ├─ 4. Assembly   find the drawing whose BOM lists the others
//!  ├─ 5. Merge      re-read the assembly's BOM + title block, fill gaps
//!  └─ 6. Output     PDF_XML_<folder>.xml with operator warnings
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use drawing_extract::{extract_folder, BatchConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Gemini key from GEMINI_API_KEY
//!     let config = BatchConfig::builder().customer("auto").build()?;
//!     let output = extract_folder("orders/20260412", &config).await?;
//!     eprintln!(
//!         "{} ok, {} failed, assembly {:?} → {}",
//!         output.result.succeeded,
//!         output.result.failed,
//!         output.result.assembly,
//!         output.xml_path.display()
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf-extract` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod assembly;
pub mod batch;
pub mod circuit;
pub mod clock;
pub mod config;
pub mod customer;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod retry;
pub mod warnings;
pub mod xml;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use assembly::{apply_restricted_extraction, detect_assembly};
pub use batch::{extract_batch, extract_folder, write_output, BatchOrchestrator};
pub use circuit::{CircuitBreaker, CircuitState};
pub use clock::{RecordingSleeper, Sleeper, TokioSleeper};
pub use config::{BatchConfig, BatchConfigBuilder, CustomerSelection};
pub use error::{BackendError, ExtractError, FileError};
pub use output::{
    BatchOutput, BatchResult, Confidence, CustomerDetection, ExtractedItem, Hole, ToleratedLength,
};
pub use pipeline::input::SourceDocument;
pub use pipeline::llm::{
    CustomerDetector, ExtractionJob, ExtractionMode, Extractor, LlmCustomerDetector, LlmExtractor,
};
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
pub use retry::{RetryAttempt, RetryFailure, RetryPolicy};
