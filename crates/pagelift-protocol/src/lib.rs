//! Wire protocol crossing the orchestrator/worker boundary.
//!
//! One JSON object per line in each direction. Every inbound payload is
//! parsed exactly once, here, into the closed [`WorkerMessage`] set; a
//! payload with an unknown tag or a malformed field set is a
//! [`ProtocolError`], never a panic and never silently ignored. Outbound
//! requests are versioned by their `type`/`version` fields so worker and
//! orchestrator can evolve independently.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Protocol version spoken by this orchestrator. Bump on any schema change.
pub const PROTOCOL_VERSION: u32 = 1;

const KNOWN_TAGS: &[&str] = &[
    "pageCount",
    "progress",
    "partialText",
    "fullText",
    "error",
    "ready",
];

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("unknown message tag: {0}")]
    UnknownTag(String),
    #[error("malformed message: {0}")]
    Malformed(String),
    #[error("invalid field: {0}")]
    InvalidField(String),
}

/// A message emitted by the rendering worker.
///
/// `totalPages`, once reported, is fixed for the session; the orchestrator
/// enforces that, while this crate enforces per-message field validity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WorkerMessage {
    #[serde(rename_all = "camelCase")]
    PageCount { total_pages: u64 },
    #[serde(rename_all = "camelCase")]
    Progress { current_page: u64, total_pages: u64 },
    #[serde(rename_all = "camelCase")]
    PartialText { text: String, is_final: bool },
    FullText { text: String },
    Error { error: String },
    Ready,
}

/// Decode one raw payload into a validated [`WorkerMessage`].
pub fn decode(raw: &str) -> Result<WorkerMessage, ProtocolError> {
    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

    let tag = value
        .get("type")
        .and_then(|t| t.as_str())
        .ok_or_else(|| ProtocolError::Malformed("missing type tag".into()))?;
    if !KNOWN_TAGS.contains(&tag) {
        return Err(ProtocolError::UnknownTag(tag.to_string()));
    }

    let message: WorkerMessage =
        serde_json::from_value(value).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
    validate(&message)?;
    Ok(message)
}

/// Field-level validation beyond what serde can express.
fn validate(message: &WorkerMessage) -> Result<(), ProtocolError> {
    match *message {
        WorkerMessage::PageCount { total_pages } if total_pages == 0 => Err(
            ProtocolError::InvalidField("totalPages must be positive".into()),
        ),
        WorkerMessage::Progress {
            current_page,
            total_pages,
        } => {
            if current_page == 0 || total_pages == 0 {
                return Err(ProtocolError::InvalidField(
                    "page numbers must be positive".into(),
                ));
            }
            if current_page > total_pages {
                return Err(ProtocolError::InvalidField(format!(
                    "currentPage {current_page} exceeds totalPages {total_pages}"
                )));
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

impl WorkerMessage {
    /// Serialize to one wire line (no trailing newline).
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Malformed(e.to_string()))
    }
}

/// The request handed to a freshly spawned worker, one JSON object on its
/// stdin. Document bytes travel base64-encoded so the transport stays
/// line-oriented.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename = "extract", rename_all = "camelCase")]
pub struct ExtractRequest {
    pub version: u32,
    /// Base64-encoded document bytes.
    pub data: String,
    /// Pages accumulated before the worker flushes a partial-text message.
    pub batch_size: u32,
}

impl ExtractRequest {
    pub fn new(document_bytes: &[u8], batch_size: u32) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            data: BASE64.encode(document_bytes),
            batch_size,
        }
    }

    /// Serialize to one wire line (no trailing newline).
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Malformed(e.to_string()))
    }

    /// Parse and validate a request on the worker side.
    pub fn decode(raw: &str) -> Result<Self, ProtocolError> {
        let request: Self =
            serde_json::from_str(raw).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
        if request.batch_size == 0 {
            return Err(ProtocolError::InvalidField(
                "batchSize must be positive".into(),
            ));
        }
        Ok(request)
    }

    /// Decode the embedded document payload.
    pub fn document_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        BASE64
            .decode(&self.data)
            .map_err(|e| ProtocolError::InvalidField(format!("data is not valid base64: {e}")))
    }
}
