//! Mock worker spawner for testing.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use pagelift_protocol::ExtractRequest;

use crate::worker::{SpawnError, WorkerLink, WorkerSpawner};

/// One scripted step of a mock worker's behavior.
#[derive(Clone, Debug)]
pub enum MockEvent {
    /// Emit one raw line on the message stream.
    Line(String),
    /// Sleep before the next step.
    Delay(Duration),
    /// Close the stream early, as a crashing worker would.
    Close,
    /// Stay alive emitting nothing until torn down.
    Hold,
}

/// A hand-rolled [`WorkerSpawner`] that replays a scripted event sequence
/// instead of launching a process. Each `spawn` call replays the same
/// script; calls are counted via [`call_count`](MockSpawner::call_count).
pub struct MockSpawner {
    script: Vec<MockEvent>,
    stall_spawn: bool,
    call_count: AtomicUsize,
}

impl MockSpawner {
    pub fn new(script: Vec<MockEvent>) -> Self {
        Self {
            script,
            stall_spawn: false,
            call_count: AtomicUsize::new(0),
        }
    }

    /// A spawner whose launch never completes, as when a child process
    /// starts but never reads its request.
    pub fn unresponsive() -> Self {
        Self {
            script: Vec::new(),
            stall_spawn: true,
            call_count: AtomicUsize::new(0),
        }
    }

    /// Number of workers spawned so far.
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

impl WorkerSpawner for MockSpawner {
    fn spawn<'a>(
        &'a self,
        _request: ExtractRequest,
    ) -> Pin<Box<dyn Future<Output = Result<WorkerLink, SpawnError>> + Send + 'a>> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        if self.stall_spawn {
            return Box::pin(std::future::pending());
        }
        let script = self.script.clone();
        Box::pin(async move {
            let teardown = CancellationToken::new();
            let task_teardown = teardown.clone();
            let (tx, rx) = mpsc::channel(32);

            tokio::spawn(async move {
                // The script runs to completion regardless of teardown, like
                // a worker that keeps writing until the pipe goes away. Lines
                // sent after the host hangs up are silently lost.
                for event in script {
                    match event {
                        MockEvent::Line(line) => {
                            if tx.send(line).await.is_err() {
                                return;
                            }
                        }
                        MockEvent::Delay(duration) => {
                            tokio::time::sleep(duration).await;
                        }
                        MockEvent::Close => return,
                        MockEvent::Hold => {
                            task_teardown.cancelled().await;
                            return;
                        }
                    }
                }
                // Script exhausted: stream closes like a clean worker exit.
            });

            Ok(WorkerLink::new(rx, teardown))
        })
    }
}
