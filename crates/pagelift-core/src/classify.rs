//! Total mapping from raw failure paths into the closed error taxonomy.

use pagelift_protocol::ProtocolError;

use crate::worker::SpawnError;
use crate::{ErrorKind, ExtractionError};

/// A raw failure observed somewhere in the pipeline, before classification.
#[derive(Debug)]
pub enum RawFailure {
    /// The worker could not be launched or handed its request.
    Spawn(SpawnError),
    /// The worker's message stream ended before a final chunk arrived.
    StreamEnded,
    /// An inbound payload failed to decode.
    Decode(ProtocolError),
    /// The worker reported an error message. `page` is the last page the
    /// session saw progress for, if any.
    WorkerReported { message: String, page: Option<u64> },
    /// The preparation watchdog fired.
    TimeoutElapsed,
    /// The caller cancelled the session.
    CancelRequested,
    /// A direct document read failed.
    Read(std::io::Error),
    /// Anything else. Mapped to a generic sandbox crash rather than
    /// propagating an opaque error.
    Other(String),
}

/// Classify a raw failure. Total: every input maps to exactly one kind.
pub fn classify(raw: RawFailure) -> ExtractionError {
    match raw {
        RawFailure::Spawn(e) => ExtractionError::new(
            ErrorKind::SandboxCrash,
            format!("worker failed to start: {e}"),
        ),
        RawFailure::StreamEnded => ExtractionError::new(
            ErrorKind::SandboxCrash,
            "worker exited before delivering a final result",
        ),
        RawFailure::Decode(e) => {
            ExtractionError::new(ErrorKind::ProtocolViolation, e.to_string())
        }
        RawFailure::WorkerReported { message, page } => match page {
            // Failure after extraction began: attribute it to the page.
            Some(page) => {
                ExtractionError::new(ErrorKind::PageExtractionFailure, message).at_page(page)
            }
            // Failure before any page was produced: the input could not be read.
            None => ExtractionError::new(ErrorKind::ReadFailure, message),
        },
        RawFailure::TimeoutElapsed => ExtractionError::new(
            ErrorKind::PreparationTimeout,
            "worker reported no page count before the deadline",
        ),
        RawFailure::CancelRequested => {
            ExtractionError::new(ErrorKind::Cancelled, "extraction cancelled by caller")
        }
        RawFailure::Read(e) => ExtractionError::new(ErrorKind::ReadFailure, e.to_string()),
        RawFailure::Other(message) => ExtractionError::new(ErrorKind::SandboxCrash, message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_raw_path_maps_to_one_kind() {
        let cases = [
            (
                classify(RawFailure::Spawn(SpawnError::Launch("enoent".into()))),
                ErrorKind::SandboxCrash,
            ),
            (classify(RawFailure::StreamEnded), ErrorKind::SandboxCrash),
            (
                classify(RawFailure::Decode(ProtocolError::UnknownTag("x".into()))),
                ErrorKind::ProtocolViolation,
            ),
            (
                classify(RawFailure::TimeoutElapsed),
                ErrorKind::PreparationTimeout,
            ),
            (classify(RawFailure::CancelRequested), ErrorKind::Cancelled),
            (
                classify(RawFailure::Read(std::io::Error::other("disk"))),
                ErrorKind::ReadFailure,
            ),
            (
                classify(RawFailure::Other("mystery".into())),
                ErrorKind::SandboxCrash,
            ),
        ];
        for (error, kind) in cases {
            assert_eq!(error.kind, kind);
        }
    }

    #[test]
    fn worker_report_with_page_is_page_failure() {
        let error = classify(RawFailure::WorkerReported {
            message: "render failed".into(),
            page: Some(7),
        });
        assert_eq!(error.kind, ErrorKind::PageExtractionFailure);
        assert_eq!(error.page, Some(7));
    }

    #[test]
    fn worker_report_before_any_page_is_read_failure() {
        let error = classify(RawFailure::WorkerReported {
            message: "cannot open document".into(),
            page: None,
        });
        assert_eq!(error.kind, ErrorKind::ReadFailure);
        assert_eq!(error.page, None);
    }
}
