//! Input classification: which strategy handles a given document.

use crate::{Document, ErrorKind, ExtractionError};

/// Handling strategy for a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handling {
    /// Read to completion synchronously, no worker involved.
    PlainText,
    /// Handed to a spawned rendering worker.
    Delegated,
    /// Rejected before any worker is spawned.
    Unsupported,
}

const DELEGATED_MIMES: &[&str] = &["application/pdf", "application/x-pdf"];

pub fn classify(document: &Document) -> Handling {
    // Strip mime parameters ("text/plain; charset=utf-8") before matching.
    let mime = document
        .mime_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();

    if mime.starts_with("text/") {
        Handling::PlainText
    } else if DELEGATED_MIMES.contains(&mime.as_str()) {
        Handling::Delegated
    } else {
        Handling::Unsupported
    }
}

/// Resolve a document URI to a local filesystem path.
pub fn local_path(uri: &str) -> &str {
    uri.strip_prefix("file://").unwrap_or(uri)
}

/// Synchronous full read for the plain-text path.
pub fn read_plain(document: &Document) -> Result<String, ExtractionError> {
    std::fs::read_to_string(local_path(&document.uri)).map_err(|e| {
        ExtractionError::new(
            ErrorKind::ReadFailure,
            format!("failed to read {}: {e}", document.name),
        )
    })
}
