//! Dedicated writer task: the write reliability layer.
//!
//! Frames are queued on an unbounded mpsc channel and written by a single
//! task, one at a time and in FIFO order. A failed write is retried with the
//! identical frame after a fixed delay, forever; the only visible effect is
//! the [`WriteStatus`] published on a watch channel.
//!
//! # Architecture
//!
//! ```text
//! Client    ─┐
//! Handler 1 ─┼─► mpsc::UnboundedSender<QueuedFrame> ─► Writer Task ─► Transport::write
//! Handler N ─┘                                             ▲
//!                               current characteristic ────┘ (watch)
//! ```
//!
//! Each queued frame carries the session token that was current when it was
//! sent. Cancelling that token (explicit disconnect) stops its retry loop
//! and discards it, along with every other frame queued under that session.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{LinkError, Result};
use crate::protocol::Frame;
use crate::retry::Retry;
use crate::transport::Transport;

/// Outcome of the most recent write, as seen by observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteStatus {
    /// Nothing written yet.
    #[default]
    Idle,
    /// First attempt of a frame in progress.
    Sending,
    /// The current frame has failed `failures` times and will be retried.
    Retrying {
        /// Failed attempts so far.
        failures: u32,
    },
    /// The last frame was written after `retries` retries.
    Delivered {
        /// Retries needed (0 if the first attempt succeeded).
        retries: u32,
    },
}

impl WriteStatus {
    /// True while a frame is failing.
    pub fn is_retrying(self) -> bool {
        matches!(self, WriteStatus::Retrying { .. })
    }
}

/// A frame waiting in the writer queue.
#[derive(Debug)]
pub struct QueuedFrame {
    /// Bytes to write.
    pub frame: Frame,
    /// Session the frame was queued under.
    pub session: CancellationToken,
}

/// The session wanted by the client.
///
/// `generation` grows by one per connect request. The token is cancelled
/// while no connection is wanted.
#[derive(Debug)]
pub(crate) struct Session {
    pub token: CancellationToken,
    pub generation: u64,
}

/// Shared slot holding the current session.
pub(crate) type SessionSlot = Arc<Mutex<Session>>;

/// Create a slot in the disconnected (cancelled) state, generation 0.
pub(crate) fn new_session_slot() -> SessionSlot {
    let token = CancellationToken::new();
    token.cancel();
    Arc::new(Mutex::new(Session {
        token,
        generation: 0,
    }))
}

/// Lock the session slot.
pub(crate) fn lock_session(slot: &SessionSlot) -> MutexGuard<'_, Session> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Read the current session token.
pub(crate) fn current_session(slot: &SessionSlot) -> CancellationToken {
    lock_session(slot).token.clone()
}

/// Handle for queueing frames to the writer task.
///
/// This is cheaply cloneable and can be moved into handlers.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::UnboundedSender<QueuedFrame>,
    pending: Arc<AtomicUsize>,
    session: SessionSlot,
    status: watch::Receiver<WriteStatus>,
}

impl WriterHandle {
    /// Queue a frame for writing.
    ///
    /// Never blocks, so it is safe to call from a handler.
    ///
    /// # Errors
    ///
    /// - `NotConnected` if no connection is active or being attempted.
    /// - `ConnectionClosed` if the writer task is gone.
    pub fn send(&self, frame: Frame) -> Result<()> {
        let session = current_session(&self.session);
        if session.is_cancelled() {
            return Err(LinkError::NotConnected);
        }

        self.pending.fetch_add(1, Ordering::AcqRel);
        self.tx
            .send(QueuedFrame { frame, session })
            .map_err(|_| {
                self.pending.fetch_sub(1, Ordering::Release);
                LinkError::ConnectionClosed
            })
    }

    /// Frames queued or in flight.
    #[inline]
    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Latest write status.
    pub fn status(&self) -> WriteStatus {
        *self.status.borrow()
    }

    /// Subscribe to write status changes.
    pub fn watch_status(&self) -> watch::Receiver<WriteStatus> {
        self.status.clone()
    }
}

impl std::fmt::Debug for WriterHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriterHandle")
            .field("pending", &self.pending_count())
            .field("status", &self.status())
            .finish()
    }
}

/// Spawn the writer task and return a handle for queueing frames.
///
/// # Arguments
///
/// * `transport` - Transport used for every write
/// * `link` - Current characteristic, `None` while the link is down
/// * `session` - Slot holding the current session token
/// * `retry_delay` - Fixed delay between attempts of one frame
/// * `shutdown` - Stops the task
pub(crate) fn spawn_writer_task<T: Transport>(
    transport: Arc<T>,
    link: watch::Receiver<Option<T::Characteristic>>,
    session: SessionSlot,
    retry_delay: Duration,
    shutdown: CancellationToken,
) -> (WriterHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let (status_tx, status_rx) = watch::channel(WriteStatus::Idle);
    let pending = Arc::new(AtomicUsize::new(0));

    let handle = WriterHandle {
        tx,
        pending: pending.clone(),
        session,
        status: status_rx,
    };

    let task = tokio::spawn(writer_loop(
        rx,
        transport,
        link,
        status_tx,
        pending,
        retry_delay,
        shutdown,
    ));

    (handle, task)
}

/// Main writer loop - takes one frame at a time and writes it until it is
/// delivered or its session is cancelled.
async fn writer_loop<T: Transport>(
    mut rx: mpsc::UnboundedReceiver<QueuedFrame>,
    transport: Arc<T>,
    link: watch::Receiver<Option<T::Characteristic>>,
    status: watch::Sender<WriteStatus>,
    pending: Arc<AtomicUsize>,
    retry_delay: Duration,
    shutdown: CancellationToken,
) {
    loop {
        let queued = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            queued = rx.recv() => match queued {
                Some(q) => q,
                None => break,
            },
        };

        deliver(&*transport, &link, &status, queued, retry_delay).await;
        pending.fetch_sub(1, Ordering::Release);
    }
    tracing::debug!("Writer task stopped");
}

/// Write one frame, retrying until success or cancellation.
async fn deliver<T: Transport>(
    transport: &T,
    link: &watch::Receiver<Option<T::Characteristic>>,
    status: &watch::Sender<WriteStatus>,
    queued: QueuedFrame,
    retry_delay: Duration,
) {
    let QueuedFrame { frame, session } = queued;
    if session.is_cancelled() {
        tracing::debug!("Discarding {} queued before disconnect", frame);
        return;
    }

    status.send_replace(WriteStatus::Sending);
    let frame_ref = &frame;
    let mut failures: u32 = 0;

    let result = Retry::new(retry_delay)
        .with_cancel(session)
        .run(
            |_| async move {
                let characteristic = link.borrow().clone().ok_or(LinkError::NotConnected)?;
                tracing::trace!("tx: {}", frame_ref);
                transport.write(&characteristic, frame_ref.as_bytes()).await
            },
            |attempt, e| {
                failures = attempt;
                match e {
                    LinkError::NotConnected => tracing::debug!(
                        "Write of {} waiting for the link (attempt {})",
                        frame_ref,
                        attempt
                    ),
                    _ => tracing::warn!(
                        "Write of {} failed (attempt {}): {}, retrying",
                        frame_ref,
                        attempt,
                        e
                    ),
                }
                status.send_replace(WriteStatus::Retrying { failures: attempt });
            },
        )
        .await;

    match result {
        Ok(()) => {
            if failures > 0 {
                tracing::info!("Wrote {} after {} retries", frame, failures);
            }
            status.send_replace(WriteStatus::Delivered { retries: failures });
        }
        Err(e) => {
            tracing::debug!("Dropping {}: {}", frame, e);
            status.send_replace(WriteStatus::Idle);
        }
    }
}
