//! The sandboxed-worker boundary: the host owns spawn/kill lifecycle, the
//! worker owns parsing. Only serialized protocol messages cross.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::Stdio;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use pagelift_protocol::ExtractRequest;

#[derive(Error, Debug)]
pub enum SpawnError {
    #[error("failed to launch worker: {0}")]
    Launch(String),
    #[error("worker stdio unavailable: {0}")]
    Stdio(String),
    #[error("failed to deliver extract request: {0}")]
    Handshake(String),
}

/// One-way message link from a running worker back to the orchestrator.
///
/// Raw NDJSON lines arrive in emission order (FIFO per session); decoding
/// happens at the orchestrator's single decode point. Dropping the link
/// tears the worker down.
pub struct WorkerLink {
    messages: mpsc::Receiver<String>,
    teardown: CancellationToken,
}

impl WorkerLink {
    pub fn new(messages: mpsc::Receiver<String>, teardown: CancellationToken) -> Self {
        Self { messages, teardown }
    }

    /// Next raw line, or `None` once the worker's stream ends.
    pub async fn recv(&mut self) -> Option<String> {
        self.messages.recv().await
    }

    /// Kill the worker. Messages already buffered are discarded unread.
    pub fn teardown(&self) {
        self.teardown.cancel();
    }
}

impl Drop for WorkerLink {
    fn drop(&mut self) {
        self.teardown.cancel();
    }
}

/// Capability interface for launching rendering workers.
pub trait WorkerSpawner: Send + Sync {
    /// Spawn a worker, hand it `request`, and return the message link.
    fn spawn<'a>(
        &'a self,
        request: ExtractRequest,
    ) -> Pin<Box<dyn Future<Output = Result<WorkerLink, SpawnError>> + Send + 'a>>;
}

/// Spawns the worker as a child process speaking the protocol over stdio.
pub struct ProcessSpawner {
    worker_path: PathBuf,
}

impl ProcessSpawner {
    pub fn new(worker_path: PathBuf) -> Self {
        Self { worker_path }
    }
}

impl WorkerSpawner for ProcessSpawner {
    fn spawn<'a>(
        &'a self,
        request: ExtractRequest,
    ) -> Pin<Box<dyn Future<Output = Result<WorkerLink, SpawnError>> + Send + 'a>> {
        Box::pin(async move {
            let mut child = Command::new(&self.worker_path)
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn()
                .map_err(|e| SpawnError::Launch(e.to_string()))?;

            let mut stdin = child
                .stdin
                .take()
                .ok_or_else(|| SpawnError::Stdio("no stdin handle".into()))?;
            let stdout = child
                .stdout
                .take()
                .ok_or_else(|| SpawnError::Stdio("no stdout handle".into()))?;
            let stderr = child
                .stderr
                .take()
                .ok_or_else(|| SpawnError::Stdio("no stderr handle".into()))?;

            let line = request
                .encode()
                .map_err(|e| SpawnError::Handshake(e.to_string()))?;
            stdin
                .write_all(line.as_bytes())
                .await
                .map_err(|e| SpawnError::Handshake(e.to_string()))?;
            stdin
                .write_all(b"\n")
                .await
                .map_err(|e| SpawnError::Handshake(e.to_string()))?;
            // Close stdin so the worker sees EOF after the request.
            drop(stdin);

            // Worker diagnostics surface through tracing, not the protocol.
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(target: "pagelift::worker", "{line}");
                }
            });

            let teardown = CancellationToken::new();
            let pump_teardown = teardown.clone();
            let (tx, rx) = mpsc::channel(32);

            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                loop {
                    tokio::select! {
                        _ = pump_teardown.cancelled() => {
                            let _ = child.start_kill();
                            break;
                        }
                        next = lines.next_line() => match next {
                            Ok(Some(line)) => {
                                if tx.send(line).await.is_err() {
                                    let _ = child.start_kill();
                                    break;
                                }
                            }
                            Ok(None) | Err(_) => break,
                        }
                    }
                }
                // Reap the child so it never lingers as a zombie.
                let _ = child.wait().await;
            });

            Ok(WorkerLink::new(rx, teardown))
        })
    }
}
