//! Per-document stages.
//!
//! ```text
//! input ──▶ encode ──▶ llm ──▶ postprocess
//! (paths)   (base64)   (model)  (JSON → items)
//! ```
//!
//! 1. [`input`]  - list, sort, validate and read the batch's PDFs
//! 2. [`encode`] - base64-wrap a PDF as an inline `application/pdf` part
//! 3. [`llm`]    - the extraction and customer-detection contracts and their
//!    provider-backed implementations; the only stage with network I/O
//! 4. [`postprocess`] - parse the JSON reply, stamp part numbers, fix
//!    surface treatments

pub mod encode;
pub mod input;
pub mod llm;
pub mod postprocess;
