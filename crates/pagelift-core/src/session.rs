//! Per-session bookkeeping: state machine fields and their invariants.

use std::sync::Mutex;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::{Document, ErrorKind, SessionId};

/// Lifecycle states of an extraction session. Transitions are
/// unidirectional; no terminal state re-enters a non-terminal one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Preparing,
    Extracting,
    Finalizing,
    Completed,
    Failed(ErrorKind),
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Failed(_) | SessionState::Cancelled
        )
    }
}

/// Caller-visible snapshot of a session's progress.
#[derive(Debug, Clone, Copy)]
pub struct ProgressSnapshot {
    pub state: SessionState,
    pub current_page: u64,
    pub total_pages: Option<u64>,
    pub started_at: Instant,
    pub last_message_at: Instant,
}

struct Fields {
    state: SessionState,
    current_page: u64,
    total_pages: Option<u64>,
    started_at: Instant,
    last_message_at: Instant,
}

/// Shared record for one live session. Mutated only by inbound protocol
/// messages and the orchestrator's own transitions; the driver task applies
/// one message at a time, so updates never interleave within a session.
pub struct SessionRecord {
    pub id: SessionId,
    pub document: Document,
    pub cancel: CancellationToken,
    fields: Mutex<Fields>,
}

impl SessionRecord {
    pub fn new(id: SessionId, document: Document) -> Self {
        let now = Instant::now();
        Self {
            id,
            document,
            cancel: CancellationToken::new(),
            fields: Mutex::new(Fields {
                state: SessionState::Idle,
                current_page: 0,
                total_pages: None,
                started_at: now,
                last_message_at: now,
            }),
        }
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let fields = self.fields.lock().unwrap_or_else(|e| e.into_inner());
        ProgressSnapshot {
            state: fields.state,
            current_page: fields.current_page,
            total_pages: fields.total_pages,
            started_at: fields.started_at,
            last_message_at: fields.last_message_at,
        }
    }

    pub fn state(&self) -> SessionState {
        self.fields.lock().unwrap_or_else(|e| e.into_inner()).state
    }

    /// Advance the state machine. Returns `false` (and leaves the state
    /// untouched) if the session is already terminal.
    pub fn transition(&self, next: SessionState) -> bool {
        let mut fields = self.fields.lock().unwrap_or_else(|e| e.into_inner());
        if fields.state.is_terminal() {
            tracing::debug!(
                session = %self.id,
                from = ?fields.state,
                to = ?next,
                "transition after terminal state ignored"
            );
            return false;
        }
        tracing::debug!(session = %self.id, from = ?fields.state, to = ?next, "state transition");
        fields.state = next;
        true
    }

    /// Record the page total. First report wins and is immutable for the
    /// session; a conflicting later report is rejected.
    pub fn set_total_pages(&self, total: u64) -> Result<SetTotal, u64> {
        let mut fields = self.fields.lock().unwrap_or_else(|e| e.into_inner());
        match fields.total_pages {
            None => {
                fields.total_pages = Some(total);
                Ok(SetTotal::First)
            }
            Some(existing) if existing == total => Ok(SetTotal::Repeat),
            Some(existing) => Err(existing),
        }
    }

    /// Advance `current_page`, keeping it monotonically non-decreasing.
    /// Returns `false` for an out-of-order (stale) update.
    pub fn advance_page(&self, page: u64) -> bool {
        let mut fields = self.fields.lock().unwrap_or_else(|e| e.into_inner());
        if page < fields.current_page {
            return false;
        }
        fields.current_page = page;
        true
    }

    pub fn current_page(&self) -> u64 {
        self.fields
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .current_page
    }

    /// Stamp receipt of an accepted message.
    pub fn touch(&self) {
        self.fields
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last_message_at = Instant::now();
    }
}

/// Outcome of recording a page total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetTotal {
    /// First report: the preparation phase is over.
    First,
    /// Repeat of the already-known total; harmless.
    Repeat,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> SessionRecord {
        SessionRecord::new(
            SessionId::next(),
            Document {
                uri: "file:///tmp/a.pdf".into(),
                mime_type: "application/pdf".into(),
                size_bytes: 10,
                name: "a.pdf".into(),
            },
        )
    }

    #[test]
    fn total_pages_is_immutable_once_set() {
        let record = record();
        assert_eq!(record.set_total_pages(10), Ok(SetTotal::First));
        assert_eq!(record.set_total_pages(10), Ok(SetTotal::Repeat));
        assert_eq!(record.set_total_pages(12), Err(10));
        assert_eq!(record.snapshot().total_pages, Some(10));
    }

    #[test]
    fn current_page_never_decreases() {
        let record = record();
        assert!(record.advance_page(3));
        assert!(record.advance_page(3));
        assert!(!record.advance_page(2));
        assert_eq!(record.current_page(), 3);
        assert!(record.advance_page(4));
        assert_eq!(record.current_page(), 4);
    }

    #[test]
    fn terminal_states_are_final() {
        let record = record();
        assert!(record.transition(SessionState::Preparing));
        assert!(record.transition(SessionState::Extracting));
        assert!(record.transition(SessionState::Cancelled));
        assert!(!record.transition(SessionState::Extracting));
        assert!(!record.transition(SessionState::Failed(ErrorKind::SandboxCrash)));
        assert_eq!(record.state(), SessionState::Cancelled);
    }
}
