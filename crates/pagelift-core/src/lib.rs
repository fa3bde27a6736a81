use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use thiserror::Error;

pub mod accumulate;
pub mod backend;
pub mod classify;
pub mod config_file;
pub mod mock;
pub mod orchestrator;
pub mod session;
pub mod source;
pub mod timeout;
pub mod worker;

// Re-export for convenience
pub use accumulate::ResultAccumulator;
pub use classify::{RawFailure, classify};
pub use orchestrator::{Orchestrator, SessionHandle};
pub use session::{ProgressSnapshot, SessionState};
pub use timeout::TimeoutGuard;
pub use worker::{ProcessSpawner, SpawnError, WorkerLink, WorkerSpawner};

/// Immutable descriptor of a document a caller wants text from.
///
/// Created when the caller selects input; never mutated by this crate.
#[derive(Debug, Clone)]
pub struct Document {
    pub uri: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub name: String,
}

/// Identifier of one extraction session, unique within this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl SessionId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// Tuning knobs for one extraction run. Both are required; the observed
/// deployments vary them, so no default is baked into orchestration logic.
#[derive(Debug, Clone, Copy)]
pub struct ExtractOptions {
    /// Preparation-phase deadline: time allowed between worker spawn and the
    /// first page-count report.
    pub timeout: Duration,
    /// Pages the worker accumulates before flushing a partial-text message.
    pub batch_size: u32,
}

/// Closed failure taxonomy surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    UnsupportedFormat,
    ReadFailure,
    SandboxCrash,
    ProtocolViolation,
    PageExtractionFailure,
    PreparationTimeout,
    Cancelled,
    PrematureFinalize,
    AlreadyInProgress,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::UnsupportedFormat => "unsupported format",
            ErrorKind::ReadFailure => "read failure",
            ErrorKind::SandboxCrash => "sandbox crash",
            ErrorKind::ProtocolViolation => "protocol violation",
            ErrorKind::PageExtractionFailure => "page extraction failure",
            ErrorKind::PreparationTimeout => "preparation timeout",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::PrematureFinalize => "premature finalize",
            ErrorKind::AlreadyInProgress => "already in progress",
        };
        f.write_str(name)
    }
}

/// A classified extraction failure: kind, human message, and the page at
/// which it occurred when that is known.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct ExtractionError {
    pub kind: ErrorKind,
    pub message: String,
    pub page: Option<u64>,
}

impl ExtractionError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            page: None,
        }
    }

    pub fn at_page(mut self, page: u64) -> Self {
        self.page = Some(page);
        self
    }
}

/// Events delivered to the caller over a [`SessionHandle`].
#[derive(Debug, Clone)]
pub enum ExtractionEvent {
    /// The session entered Preparing and a worker is being spawned.
    Started { session_id: SessionId },
    Progress { current: u64, total: u64 },
    Completed { text: String },
    Failed { error: ExtractionError },
    Cancelled,
}
