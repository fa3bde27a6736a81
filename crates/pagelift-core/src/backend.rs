use std::path::Path;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("failed to open document: {0}")]
    OpenError(String),
    #[error("failed to extract text: {0}")]
    ExtractionError(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Trait for paginated rendering backends.
///
/// Implementors provide the low-level page parsing step and run inside the
/// worker binary, never in the orchestrator process. The only implementation
/// shipped is [`pagelift_render_mupdf`], kept in its own crate so the AGPL
/// mupdf dependency stays isolated from the host-side code paths.
pub trait RenderBackend: Send + Sync {
    /// Open a document for page-by-page extraction.
    fn open(&self, path: &Path) -> Result<Box<dyn RenderedDocument>, BackendError>;
}

/// An opened document, queried one page at a time.
pub trait RenderedDocument {
    fn page_count(&self) -> Result<u64, BackendError>;

    /// Extract the text of one page (zero-based index).
    fn page_text(&self, index: u64) -> Result<String, BackendError>;
}
