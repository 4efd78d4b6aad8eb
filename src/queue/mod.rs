//! Append/remove operation queue
//!
//! The append surface behind the decoder accepts exactly one mutation at
//! a time. This queue is the only component allowed to talk to it: byte
//! appends and range removes are accepted from callers immediately,
//! dispatched FIFO by a single worker task, and resolved through one-shot
//! completions in submission order.
//!
//! The queue never retries. A quota-exceeded append resolves its
//! completion with the classified error and it is up to the recovery
//! layer to schedule an eviction before anything is re-submitted.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::errors::{ErrorCause, PlayerError, PlayerResult, classify};
use crate::models::TrackKind;

/// Failure reported by the append surface for a single operation.
#[derive(Debug, Clone, Error)]
pub enum SurfaceError {
    /// The surface is out of room; the payload was not appended.
    #[error("append surface quota exceeded: {0}")]
    QuotaExceeded(String),
    #[error("append failed: {0}")]
    Append(String),
    #[error("remove failed: {0}")]
    Remove(String),
}

impl SurfaceError {
    fn classify(self) -> PlayerError {
        match self {
            SurfaceError::QuotaExceeded(message) => classify(ErrorCause::Append {
                quota_exceeded: true,
                message,
            }),
            SurfaceError::Append(message) => classify(ErrorCause::Append {
                quota_exceeded: false,
                message,
            }),
            SurfaceError::Remove(message) => classify(ErrorCause::Remove { message }),
        }
    }
}

/// The byte-accepting component behind the decoder.
///
/// `append`/`remove` must resolve only once the surface has finished the
/// mutation (the "update finished" signal); while a call is pending the
/// surface reports `is_updating() == true` and must not be submitted to.
#[async_trait]
pub trait AppendSurface: Send + Sync {
    fn is_updating(&self) -> bool;

    /// Append media bytes, applying `timestamp_offset` first when given.
    async fn append(
        &self,
        track: TrackKind,
        data: Bytes,
        timestamp_offset: Option<f64>,
    ) -> Result<(), SurfaceError>;

    /// Remove buffered media in `[start, end)` seconds.
    async fn remove(&self, track: TrackKind, start: f64, end: f64) -> Result<(), SurfaceError>;

    /// Abort the in-progress mutation, if any. Only called when idle.
    fn abort(&self);

    /// Release the underlying handle. Called exactly once, on teardown.
    fn release(&self);
}

/// A queued mutation plus its completion.
enum BufferOperation {
    Append {
        track: TrackKind,
        data: Bytes,
        timestamp_offset: Option<f64>,
        completion: oneshot::Sender<PlayerResult<()>>,
    },
    Remove {
        track: TrackKind,
        start: f64,
        end: f64,
        completion: oneshot::Sender<PlayerResult<()>>,
    },
}

impl BufferOperation {
    fn reject(self, error: PlayerError) {
        let completion = match self {
            BufferOperation::Append { completion, .. } => completion,
            BufferOperation::Remove { completion, .. } => completion,
        };
        let _ = completion.send(Err(error));
    }
}

/// Caller-side handle to one queued operation's outcome.
pub struct CompletionHandle {
    rx: oneshot::Receiver<PlayerResult<()>>,
}

impl CompletionHandle {
    /// Wait for the operation to finish. A dropped queue resolves as
    /// destroyed rather than hanging.
    pub async fn wait(self) -> PlayerResult<()> {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(PlayerError::destroyed()),
        }
    }
}

/// Per-session serialization point for one append surface.
pub struct OperationQueue {
    tx: mpsc::UnboundedSender<BufferOperation>,
    cancel: CancellationToken,
}

impl OperationQueue {
    /// Spawn the worker for `surface`. Requires a tokio runtime.
    pub fn new(surface: Arc<dyn AppendSurface>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        tokio::spawn(run_worker(rx, surface, cancel.clone()));
        Self { tx, cancel }
    }

    pub fn append(
        &self,
        track: TrackKind,
        data: Bytes,
        timestamp_offset: Option<f64>,
    ) -> CompletionHandle {
        let (completion, rx) = oneshot::channel();
        self.submit(
            BufferOperation::Append {
                track,
                data,
                timestamp_offset,
                completion,
            },
        );
        CompletionHandle { rx }
    }

    pub fn remove(&self, track: TrackKind, start: f64, end: f64) -> CompletionHandle {
        let (completion, rx) = oneshot::channel();
        self.submit(BufferOperation::Remove {
            track,
            start,
            end,
            completion,
        });
        CompletionHandle { rx }
    }

    fn submit(&self, op: BufferOperation) {
        if self.cancel.is_cancelled() {
            op.reject(PlayerError::destroyed());
            return;
        }
        if let Err(send_err) = self.tx.send(op) {
            send_err.0.reject(PlayerError::destroyed());
        }
    }

    /// Reject everything pending and tear the surface down. Idempotent.
    pub fn destroy(&self) {
        self.cancel.cancel();
    }

    pub fn is_destroyed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for OperationQueue {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_worker(
    mut rx: mpsc::UnboundedReceiver<BufferOperation>,
    surface: Arc<dyn AppendSurface>,
    cancel: CancellationToken,
) {
    'main: loop {
        let op = tokio::select! {
            _ = cancel.cancelled() => break 'main,
            op = rx.recv() => match op {
                Some(op) => op,
                None => break 'main,
            },
        };

        // Never submit while the surface reports an update in progress;
        // it can still be settling from attach or an external abort.
        while surface.is_updating() {
            tokio::select! {
                _ = cancel.cancelled() => {
                    op.reject(PlayerError::destroyed());
                    break 'main;
                }
                _ = tokio::time::sleep(Duration::from_millis(2)) => {}
            }
        }

        match op {
            BufferOperation::Append {
                track,
                data,
                timestamp_offset,
                completion,
            } => {
                trace!(
                    target = "player.queue",
                    ?track,
                    bytes = data.len(),
                    "dispatch append"
                );
                let result = tokio::select! {
                    _ = cancel.cancelled() => {
                        let _ = completion.send(Err(PlayerError::destroyed()));
                        break 'main;
                    }
                    r = surface.append(track, data, timestamp_offset) => r,
                };
                let _ = completion.send(result.map_err(SurfaceError::classify));
            }
            BufferOperation::Remove {
                track,
                start,
                end,
                completion,
            } => {
                trace!(target = "player.queue", ?track, start, end, "dispatch remove");
                let result = tokio::select! {
                    _ = cancel.cancelled() => {
                        let _ = completion.send(Err(PlayerError::destroyed()));
                        break 'main;
                    }
                    r = surface.remove(track, start, end) => r,
                };
                let _ = completion.send(result.map_err(SurfaceError::classify));
            }
        }
    }

    // Reject everything still queued, then tear down the surface.
    rx.close();
    while let Ok(op) = rx.try_recv() {
        op.reject(PlayerError::destroyed());
    }
    if !surface.is_updating() {
        surface.abort();
    }
    surface.release();
    debug!(target = "player.queue", "operation queue torn down");
}
