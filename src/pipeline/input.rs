//! Input resolution: turn a folder or a list of paths into the ordered set
//! of PDF documents a batch works on.
//!
//! Files are sorted by file name, which fixes both the processing order and
//! the order of `<Item>` elements in the XML. Each file is checked for the
//! `%PDF` magic bytes and read once; the bytes are reused for customer
//! detection, extraction and the assembly re-extraction. A file that cannot
//! be read or is not a PDF stays in the batch as a failed entry.

use crate::error::{ExtractError, FileError};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// One entry of a batch: the loaded drawing, or why it could not be loaded.
pub type InputFile = Result<SourceDocument, FileError>;

/// One input drawing, read into memory.
#[derive(Clone)]
pub struct SourceDocument {
    pub path: PathBuf,
    /// File name without extension; becomes the item's part number.
    pub stem: String,
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for SourceDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceDocument")
            .field("path", &self.path)
            .field("stem", &self.stem)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

impl SourceDocument {
    /// Build a document from bytes already in memory.
    pub fn from_bytes(path: impl Into<PathBuf>, bytes: Vec<u8>) -> Self {
        let path = path.into();
        let stem = file_stem(&path);
        Self { path, stem, bytes }
    }
}

/// File stem as a `String`; lossy for non-UTF-8 names.
pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn is_pdf_path(path: &Path) -> bool {
    path.extension()
        .map(|e| e.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}

/// Sort paths by file name (then full path, for duplicates across folders).
pub fn sort_by_file_name(paths: &mut [PathBuf]) {
    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()).then_with(|| a.cmp(b)));
}

/// All `*.pdf` files directly inside `folder`, sorted by file name.
pub fn collect_folder(folder: &Path) -> Result<Vec<PathBuf>, ExtractError> {
    if !folder.is_dir() {
        return Err(ExtractError::InputNotFound {
            path: folder.to_path_buf(),
        });
    }

    let entries = std::fs::read_dir(folder).map_err(|e| ExtractError::ReadFailed {
        path: folder.to_path_buf(),
        source: e,
    })?;

    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ExtractError::ReadFailed {
            path: folder.to_path_buf(),
            source: e,
        })?;
        let path = entry.path();
        if path.is_file() && is_pdf_path(&path) {
            paths.push(path);
        }
    }

    if paths.is_empty() {
        return Err(ExtractError::NoInputFiles {
            path: folder.to_path_buf(),
        });
    }

    sort_by_file_name(&mut paths);
    debug!("Found {} PDF(s) in {}", paths.len(), folder.display());
    Ok(paths)
}

/// Read and validate one PDF.
pub async fn load_document(path: &Path) -> Result<SourceDocument, ExtractError> {
    if !path.exists() {
        return Err(ExtractError::InputNotFound {
            path: path.to_path_buf(),
        });
    }

    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| ExtractError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

    if !bytes.starts_with(PDF_MAGIC) {
        let mut magic = [0u8; 4];
        let n = bytes.len().min(4);
        magic[..n].copy_from_slice(&bytes[..n]);
        return Err(ExtractError::NotAPdf {
            path: path.to_path_buf(),
            magic,
        });
    }

    debug!("Loaded {} ({} bytes)", path.display(), bytes.len());
    Ok(SourceDocument::from_bytes(path, bytes))
}

/// Reject an empty path list or a path that does not exist.
///
/// These are the only input problems that stop a batch before it starts.
pub fn ensure_inputs(paths: &[PathBuf]) -> Result<(), ExtractError> {
    if paths.is_empty() {
        return Err(ExtractError::NoInputFiles {
            path: PathBuf::from("."),
        });
    }
    if let Some(missing) = paths.iter().find(|p| !p.exists()) {
        return Err(ExtractError::InputNotFound {
            path: missing.clone(),
        });
    }
    Ok(())
}

/// Sort `paths` by file name and load every document.
///
/// An empty list or a missing path is fatal. A file that cannot be read or
/// fails the magic-byte check becomes a [`FileError::Unreadable`] entry.
pub async fn load_documents(paths: &[PathBuf]) -> Result<Vec<InputFile>, ExtractError> {
    ensure_inputs(paths)?;

    let mut sorted = paths.to_vec();
    sort_by_file_name(&mut sorted);

    let mut inputs = Vec::with_capacity(sorted.len());
    for path in &sorted {
        let input = load_document(path).await.map_err(|e| {
            warn!("Skipping {}: {}", path.display(), e);
            FileError::Unreadable {
                file: file_stem(path),
                detail: e.to_string(),
            }
        });
        inputs.push(input);
    }
    Ok(inputs)
}

/// Folder the batch came from: the parent of the first path in file-name
/// order.
pub fn batch_folder(paths: &[PathBuf]) -> PathBuf {
    paths
        .iter()
        .min_by(|a, b| a.file_name().cmp(&b.file_name()).then_with(|| a.cmp(b)))
        .and_then(|p| p.parent())
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}
