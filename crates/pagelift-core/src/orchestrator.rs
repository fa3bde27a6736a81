//! Session state machine driver.
//!
//! One driver task per delegated session applies inbound worker messages
//! one at a time, fully updating session state before accepting the next,
//! so no two messages for the same session ever interleave. Plain-text
//! documents never reach a driver: they are read and completed inside
//! `start`.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::mpsc;

use pagelift_protocol::{ExtractRequest, WorkerMessage};

use crate::classify::{RawFailure, classify};
use crate::session::{ProgressSnapshot, SessionRecord, SessionState, SetTotal};
use crate::source::{self, Handling};
use crate::timeout::TimeoutGuard;
use crate::worker::WorkerSpawner;
use crate::{
    Document, ErrorKind, ExtractOptions, ExtractionError, ExtractionEvent, ResultAccumulator,
    SessionId,
};

/// Caller's view of one extraction session.
///
/// `start` returns immediately; progress, completion, and failure arrive as
/// [`ExtractionEvent`]s on `events`. [`join`](Self::join) drains them down
/// to the terminal result for callers that only want the text.
#[derive(Debug)]
pub struct SessionHandle {
    pub session_id: SessionId,
    pub events: mpsc::UnboundedReceiver<ExtractionEvent>,
}

impl SessionHandle {
    pub async fn join(mut self) -> Result<String, ExtractionError> {
        while let Some(event) = self.events.recv().await {
            match event {
                ExtractionEvent::Completed { text } => return Ok(text),
                ExtractionEvent::Failed { error } => return Err(error),
                ExtractionEvent::Cancelled => return Err(classify(RawFailure::CancelRequested)),
                ExtractionEvent::Started { .. } | ExtractionEvent::Progress { .. } => {}
            }
        }
        Err(classify(RawFailure::Other(
            "event stream ended without a terminal event".into(),
        )))
    }
}

/// Outcome of applying one decoded message.
enum Step {
    Continue,
    Finished(String),
    Fail(ExtractionError),
}

/// Terminal outcome of a driver run.
enum Outcome {
    Completed(String),
    Failed(ExtractionError),
    Cancelled,
}

pub struct Orchestrator {
    spawner: Arc<dyn WorkerSpawner>,
    sessions: DashMap<SessionId, Arc<SessionRecord>>,
    /// Document URI -> live session, enforcing single-flight per document.
    active: DashMap<String, SessionId>,
}

impl Orchestrator {
    pub fn new(spawner: Arc<dyn WorkerSpawner>) -> Self {
        Self {
            spawner,
            sessions: DashMap::new(),
            active: DashMap::new(),
        }
    }

    /// Begin extracting `document`.
    ///
    /// Plain-text documents are read synchronously and the handle resolves
    /// immediately. Binary documents are handed to a spawned worker; must be
    /// called within a tokio runtime. Fails fast, before any worker exists,
    /// on unsupported formats, unreadable input, and single-flight conflicts.
    pub fn start(
        self: &Arc<Self>,
        document: Document,
        options: ExtractOptions,
    ) -> Result<SessionHandle, ExtractionError> {
        match source::classify(&document) {
            Handling::Unsupported => Err(ExtractionError::new(
                ErrorKind::UnsupportedFormat,
                format!("no handler for mime type {:?}", document.mime_type),
            )),
            Handling::PlainText => {
                let text = source::read_plain(&document)?;
                let session_id = SessionId::next();
                tracing::info!(
                    %session_id,
                    name = %document.name,
                    bytes = text.len(),
                    "plain text document read directly"
                );
                let (tx, events) = mpsc::unbounded_channel();
                let _ = tx.send(ExtractionEvent::Completed { text });
                Ok(SessionHandle { session_id, events })
            }
            Handling::Delegated => self.start_delegated(document, options),
        }
    }

    fn start_delegated(
        self: &Arc<Self>,
        document: Document,
        options: ExtractOptions,
    ) -> Result<SessionHandle, ExtractionError> {
        let session_id = SessionId::next();

        // Single-flight: at most one non-terminal session per document URI.
        match self.active.entry(document.uri.clone()) {
            Entry::Occupied(mut occupied) => {
                let live = self
                    .sessions
                    .get(occupied.get())
                    .is_some_and(|r| !r.state().is_terminal());
                if live {
                    return Err(ExtractionError::new(
                        ErrorKind::AlreadyInProgress,
                        format!("an extraction for {} is already running", document.name),
                    ));
                }
                occupied.insert(session_id);
            }
            Entry::Vacant(vacant) => {
                vacant.insert(session_id);
            }
        }

        let bytes = match std::fs::read(source::local_path(&document.uri)) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.active
                    .remove_if(&document.uri, |_, id| *id == session_id);
                return Err(classify(RawFailure::Read(e)));
            }
        };

        let record = Arc::new(SessionRecord::new(session_id, document));
        record.transition(SessionState::Preparing);
        self.sessions.insert(session_id, Arc::clone(&record));

        let (tx, events) = mpsc::unbounded_channel();
        let _ = tx.send(ExtractionEvent::Started { session_id });

        let request = ExtractRequest::new(&bytes, options.batch_size);
        tracing::info!(
            %session_id,
            name = %record.document.name,
            bytes = bytes.len(),
            batch_size = options.batch_size,
            "delegating to rendering worker"
        );

        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.drive(record, request, options, tx).await;
        });

        Ok(SessionHandle { session_id, events })
    }

    /// Cooperative cancellation. Messages racing past the flip are dropped,
    /// never treated as errors. A no-op for unknown or terminal sessions.
    pub fn cancel(&self, session_id: SessionId) {
        if let Some(record) = self.sessions.get(&session_id) {
            tracing::info!(%session_id, "cancel requested");
            record.cancel.cancel();
        }
    }

    /// Progress snapshot, or `None` once the session reached a terminal
    /// state (or never existed).
    pub fn progress(&self, session_id: SessionId) -> Option<ProgressSnapshot> {
        self.sessions.get(&session_id).map(|r| r.snapshot())
    }

    async fn drive(
        self: Arc<Self>,
        record: Arc<SessionRecord>,
        request: ExtractRequest,
        options: ExtractOptions,
        events: mpsc::UnboundedSender<ExtractionEvent>,
    ) {
        // The watchdog covers the whole preparation phase, spawn and
        // handshake included: a worker that launches but never accepts its
        // request times out the same way as one that never reports a page
        // count. Dropping the unresolved spawn future tears the child down.
        let guard = TimeoutGuard::arm(record.id, options.timeout);

        let mut link = tokio::select! {
            biased;
            _ = record.cancel.cancelled() => {
                self.finish(&record, Outcome::Cancelled, &events);
                return;
            }
            _ = guard.fired() => {
                self.finish(
                    &record,
                    Outcome::Failed(classify(RawFailure::TimeoutElapsed)),
                    &events,
                );
                return;
            }
            spawned = self.spawner.spawn(request) => match spawned {
                Ok(link) => link,
                Err(e) => {
                    guard.disarm();
                    self.finish(&record, Outcome::Failed(classify(RawFailure::Spawn(e))), &events);
                    return;
                }
            }
        };

        let mut accumulator = ResultAccumulator::new();
        let mut preparing = true;

        let outcome = loop {
            tokio::select! {
                // Cancellation wins races against already-buffered messages.
                biased;
                _ = record.cancel.cancelled() => break Outcome::Cancelled,
                _ = guard.fired(), if preparing => {
                    break Outcome::Failed(classify(RawFailure::TimeoutElapsed));
                }
                raw = link.recv() => {
                    let Some(raw) = raw else {
                        break Outcome::Failed(classify(RawFailure::StreamEnded));
                    };
                    let message = match pagelift_protocol::decode(&raw) {
                        Ok(message) => message,
                        Err(e) => break Outcome::Failed(classify(RawFailure::Decode(e))),
                    };
                    match self.apply(&record, message, &mut accumulator, &events, &mut preparing, &guard) {
                        Step::Continue => {}
                        Step::Finished(text) => break Outcome::Completed(text),
                        Step::Fail(error) => break Outcome::Failed(error),
                    }
                }
            }
        };

        guard.disarm();
        link.teardown();
        self.finish(&record, outcome, &events);
    }

    /// Apply one decoded message to the session.
    fn apply(
        &self,
        record: &SessionRecord,
        message: WorkerMessage,
        accumulator: &mut ResultAccumulator,
        events: &mpsc::UnboundedSender<ExtractionEvent>,
        preparing: &mut bool,
        guard: &TimeoutGuard,
    ) -> Step {
        record.touch();
        match message {
            WorkerMessage::Ready => {
                tracing::debug!(session = %record.id, "worker ready");
                Step::Continue
            }
            WorkerMessage::PageCount { total_pages } => {
                match record.set_total_pages(total_pages) {
                    Ok(SetTotal::First) => {
                        leave_preparing(record, preparing, guard);
                        let _ = events.send(ExtractionEvent::Progress {
                            current: record.current_page(),
                            total: total_pages,
                        });
                        Step::Continue
                    }
                    Ok(SetTotal::Repeat) => {
                        tracing::warn!(session = %record.id, total_pages, "duplicate page count ignored");
                        Step::Continue
                    }
                    Err(existing) => Step::Fail(ExtractionError::new(
                        ErrorKind::ProtocolViolation,
                        format!("page total changed from {existing} to {total_pages}"),
                    )),
                }
            }
            WorkerMessage::Progress {
                current_page,
                total_pages,
            } => {
                match record.set_total_pages(total_pages) {
                    Ok(SetTotal::First) => leave_preparing(record, preparing, guard),
                    Ok(SetTotal::Repeat) => {}
                    Err(existing) => {
                        return Step::Fail(ExtractionError::new(
                            ErrorKind::ProtocolViolation,
                            format!("page total changed from {existing} to {total_pages}"),
                        ));
                    }
                }
                if !record.advance_page(current_page) {
                    // Self-consistent but stale; recoverable per policy.
                    tracing::warn!(
                        session = %record.id,
                        current_page,
                        "out-of-order progress update ignored"
                    );
                    return Step::Continue;
                }
                let _ = events.send(ExtractionEvent::Progress {
                    current: current_page,
                    total: total_pages,
                });
                Step::Continue
            }
            WorkerMessage::PartialText { text, is_final } => {
                self.absorb_chunk(record, accumulator, text, is_final, *preparing)
            }
            WorkerMessage::FullText { text } => {
                self.absorb_chunk(record, accumulator, text, true, *preparing)
            }
            WorkerMessage::Error { error } => {
                let page = match record.current_page() {
                    0 => None,
                    page => Some(page),
                };
                Step::Fail(classify(RawFailure::WorkerReported {
                    message: error,
                    page,
                }))
            }
        }
    }

    fn absorb_chunk(
        &self,
        record: &SessionRecord,
        accumulator: &mut ResultAccumulator,
        text: String,
        is_final: bool,
        preparing: bool,
    ) -> Step {
        if preparing {
            return Step::Fail(ExtractionError::new(
                ErrorKind::ProtocolViolation,
                "text chunk received before page count",
            ));
        }
        accumulator.absorb(text, is_final);
        if !is_final {
            return Step::Continue;
        }
        record.transition(SessionState::Finalizing);
        match accumulator.finalize() {
            Ok(text) => Step::Finished(text),
            Err(error) => Step::Fail(error),
        }
    }

    /// Apply the terminal transition, notify the caller, and drop the
    /// session from both indexes.
    fn finish(
        &self,
        record: &SessionRecord,
        outcome: Outcome,
        events: &mpsc::UnboundedSender<ExtractionEvent>,
    ) {
        match outcome {
            Outcome::Completed(text) => {
                if record.transition(SessionState::Completed) {
                    tracing::info!(
                        session = %record.id,
                        pages = record.snapshot().total_pages,
                        bytes = text.len(),
                        "extraction complete"
                    );
                    let _ = events.send(ExtractionEvent::Completed { text });
                }
            }
            Outcome::Failed(error) => {
                if record.transition(SessionState::Failed(error.kind)) {
                    tracing::warn!(
                        session = %record.id,
                        kind = %error.kind,
                        error = %error.message,
                        page = error.page,
                        "extraction failed"
                    );
                    let _ = events.send(ExtractionEvent::Failed { error });
                }
            }
            Outcome::Cancelled => {
                if record.transition(SessionState::Cancelled) {
                    tracing::info!(session = %record.id, "extraction cancelled");
                    let _ = events.send(ExtractionEvent::Cancelled);
                }
            }
        }

        self.active
            .remove_if(&record.document.uri, |_, id| *id == record.id);
        self.sessions.remove(&record.id);
    }
}

fn leave_preparing(record: &SessionRecord, preparing: &mut bool, guard: &TimeoutGuard) {
    *preparing = false;
    guard.disarm();
    record.transition(SessionState::Extracting);
}
