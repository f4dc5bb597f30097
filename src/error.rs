//! Error types for the drawing-extract library.
//!
//! Three error types reflect three distinct failure scopes:
//!
//! * [`ExtractError`] (**fatal**): the batch cannot proceed at all (no input
//!   files, a path that does not exist, provider not configured, customer
//!   detection failed). Returned as `Err(ExtractError)` from the top-level
//!   entry points. [`ExtractError::NotAPdf`] and [`ExtractError::ReadFailed`]
//!   come from loading a single document; inside a batch they are downgraded
//!   to [`FileError::Unreadable`].
//!
//! * [`BackendError`]: a single call to the extraction backend failed.
//!   Carries enough text for [`BackendError::is_retryable`] to tell overload
//!   and rate-limit responses apart from everything else.
//!
//! * [`FileError`] (**non-fatal**): one file in the batch could not be
//!   extracted. Stored inside [`crate::output::BatchResult::failures`] so the
//!   rest of the batch still produces XML.

use std::path::PathBuf;
use thiserror::Error;

/// Substrings that mark a backend error as transient.
///
/// Providers do not agree on a structured status code, so classification
/// keys off the rendered message: HTTP 503, HTTP 429 and Gemini's textual
/// "overloaded" marker.
pub const RETRYABLE_MARKERS: [&str; 3] = ["503", "429", "overloaded"];

/// All fatal errors returned by the drawing-extract library.
#[derive(Debug, Error)]
pub enum ExtractError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The batch contained no PDF files.
    #[error("No PDF files found in '{path}'")]
    NoInputFiles { path: PathBuf },

    /// Input file or folder was not found at the given path.
    #[error("Input not found: '{path}'\nCheck the path exists and is readable.")]
    InputNotFound { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// Reading an input file failed.
    #[error("Failed to read '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Backend errors ────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Customer auto-detection failed in a way the detector could not absorb.
    #[error("Customer auto-detection failed: {0}")]
    CustomerDetection(#[source] BackendError),

    // ── Customer configuration ────────────────────────────────────────────
    /// A customer YAML file exists but could not be parsed.
    #[error("Invalid customer configuration '{path}': {detail}")]
    CustomerConfig { path: PathBuf, detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output XML file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failure of one call to the extraction backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    /// The provider returned an error (HTTP status, quota, safety block, ...).
    #[error("{0}")]
    Api(String),

    /// The provider answered with an empty body.
    #[error("Empty response from model")]
    EmptyResponse,

    /// The body was not the JSON document the schema asks for.
    #[error("Invalid JSON response from model: {0}")]
    InvalidResponse(String),

    /// The customer configuration needed to build the prompt could not be
    /// loaded.
    #[error("Customer configuration unavailable: {0}")]
    Config(String),
}

impl BackendError {
    /// `true` when the error looks like overload or rate limiting and the
    /// call may succeed if repeated after a pause.
    pub fn is_retryable(&self) -> bool {
        let message = self.to_string();
        RETRYABLE_MARKERS.iter().any(|m| message.contains(m))
    }
}

/// A non-fatal error for a single file of the batch.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum FileError {
    /// Extraction failed after retries, or with a fatal backend error.
    #[error("{file}: extraction failed after {attempts} attempt(s): {detail}")]
    ExtractionFailed {
        file: String,
        attempts: u32,
        detail: String,
    },

    /// The backend succeeded but returned no items.
    #[error("{file}: model returned no items")]
    Empty { file: String },

    /// The file could not be read or is not a PDF; no backend call was made.
    #[error("{file}: unreadable input: {detail}")]
    Unreadable { file: String, detail: String },
}

impl FileError {
    /// Name of the file this error belongs to.
    pub fn file(&self) -> &str {
        match self {
            FileError::ExtractionFailed { file, .. }
            | FileError::Empty { file }
            | FileError::Unreadable { file, .. } => file,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overload_messages_are_retryable() {
        assert!(BackendError::Api("503 Service Unavailable".into()).is_retryable());
        assert!(BackendError::Api("HTTP 429: quota exceeded".into()).is_retryable());
        assert!(BackendError::Api("The model is overloaded. Please try again later.".into())
            .is_retryable());
    }

    #[test]
    fn other_messages_are_fatal() {
        assert!(!BackendError::Api("400 Bad Request: invalid argument".into()).is_retryable());
        assert!(!BackendError::Api("API key not valid".into()).is_retryable());
        assert!(!BackendError::EmptyResponse.is_retryable());
        assert!(!BackendError::InvalidResponse("expected value at line 1".into()).is_retryable());
    }

    #[test]
    fn classification_is_case_sensitive() {
        // "Overloaded" with a capital O is not the marker the backend emits.
        assert!(!BackendError::Api("Overloaded".into()).is_retryable());
    }

    #[test]
    fn file_error_display() {
        let e = FileError::ExtractionFailed {
            file: "10009081".into(),
            attempts: 8,
            detail: "503 overloaded".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("10009081"), "got: {msg}");
        assert!(msg.contains("8 attempt"), "got: {msg}");
        assert_eq!(e.file(), "10009081");
    }

    #[test]
    fn unreadable_display_names_the_file() {
        let e = FileError::Unreadable {
            file: "b-bad".into(),
            detail: "File is not a valid PDF".into(),
        };
        assert_eq!(e.file(), "b-bad");
        assert!(e.to_string().starts_with("b-bad: unreadable input"), "got: {e}");
    }

    #[test]
    fn no_input_display() {
        let e = ExtractError::NoInputFiles {
            path: PathBuf::from("/orders/20260001"),
        };
        assert!(e.to_string().contains("20260001"));
    }
}
