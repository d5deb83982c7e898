//! Connection supervisor: the lifecycle state machine.
//!
//! One supervisor task runs per connect request. It owns the session and
//! the receive buffer, and loops:
//!
//! 1. establish the link (open, resolve the characteristic, subscribe),
//!    retrying every failed stage after the reconnect delay;
//! 2. publish the characteristic to the writer and pump notifications
//!    through framer, codec and dispatch;
//! 3. on link loss, wait the reconnect delay and start over.
//!
//! Cancelling the session token ends the loop at the next suspension point,
//! closes the session and leaves the state `Disconnected`.
//!
//! A supervisor only publishes state and characteristic while its generation
//! is the current one in the session slot. When it exits it records its
//! generation as finished; `connect` waits for that before starting the next
//! supervisor, so at most one runs at a time.

use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::ConnectionState;
use crate::codec::MessageCodec;
use crate::config::LinkConfig;
use crate::error::Result;
use crate::handler::HandlerRegistry;
use crate::protocol::FrameBuffer;
use crate::retry::Retry;
use crate::transport::{Notifications, Transport};
use crate::writer::{lock_session, SessionSlot};

/// State shared between the client, the supervisor and the writer.
pub(crate) struct Shared<T: Transport> {
    pub transport: Arc<T>,
    pub config: LinkConfig,
    pub registry: Arc<HandlerRegistry>,
    pub state: watch::Sender<ConnectionState>,
    pub link: watch::Sender<Option<T::Characteristic>>,
    pub session: SessionSlot,
    /// Highest generation whose connection attempt has fully ended.
    pub finished: watch::Sender<u64>,
    pub shutdown: CancellationToken,
}

impl<T: Transport> Shared<T> {
    /// Publish a state change. Repeated states are not re-announced.
    pub fn set_state(&self, next: ConnectionState) {
        let mut previous = next;
        let changed = self.state.send_if_modified(|state| {
            previous = *state;
            if *state == next {
                false
            } else {
                *state = next;
                true
            }
        });
        if changed {
            tracing::info!("Connection state: {} -> {}", previous, next);
        }
    }

    /// Publish a state change on behalf of `generation`.
    ///
    /// Ignored once a newer connect request owns the slot.
    pub fn set_state_for(&self, generation: u64, next: ConnectionState) {
        let slot = lock_session(&self.session);
        if slot.generation == generation {
            self.set_state(next);
        }
    }

    /// Publish the characteristic on behalf of `generation`.
    fn set_link_for(&self, generation: u64, link: Option<T::Characteristic>) {
        let slot = lock_session(&self.session);
        if slot.generation == generation {
            self.link.send_replace(link);
        }
    }

    /// End the connection attempt of `generation`.
    ///
    /// Clears the characteristic, reports `Disconnected` if the generation
    /// is still current, and wakes anyone waiting for it to finish.
    pub fn finish(&self, generation: u64) {
        {
            let slot = lock_session(&self.session);
            if slot.generation == generation {
                slot.token.cancel();
                self.link.send_replace(None);
                self.set_state(ConnectionState::Disconnected);
            }
        }
        self.finished.send_modify(|finished| *finished = (*finished).max(generation));
    }

    /// Wait until the attempt of `generation` has ended.
    pub async fn wait_finished(&self, generation: u64) {
        let mut finished = self.finished.subscribe();
        let _ = finished.wait_for(|f| *f >= generation).await;
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Feed one notification chunk through framer, codec and dispatch.
    fn handle_chunk(&self, framer: &mut FrameBuffer, chunk: &[u8]) {
        for frame in framer.push(chunk) {
            match MessageCodec::decode(&frame) {
                Ok(message) => {
                    self.registry.dispatch_message(&message);
                }
                Err(e) => tracing::debug!("Dropping frame {}: {}", frame, e),
            }
        }
    }
}

/// Why the pump stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PumpExit {
    /// The device went away.
    Lost,
    /// Explicit disconnect or shutdown.
    Cancelled,
}

/// Marks the generation finished when the supervisor ends, panics included.
struct FinishGuard<T: Transport> {
    shared: Arc<Shared<T>>,
    generation: u64,
}

impl<T: Transport> Drop for FinishGuard<T> {
    fn drop(&mut self) {
        self.shared.finish(self.generation);
    }
}

/// An established link.
struct Established<T: Transport> {
    session: T::Session,
    characteristic: T::Characteristic,
    notifications: Notifications,
}

/// Run the connection state machine for `device` until `token` is cancelled.
pub(crate) async fn run<T: Transport>(
    shared: Arc<Shared<T>>,
    device: T::Device,
    token: CancellationToken,
    generation: u64,
) {
    let _finish = FinishGuard {
        shared: shared.clone(),
        generation,
    };
    let shared = &*shared;
    let device = &device;
    let retry = Retry::new(shared.config.reconnect_delay()).with_cancel(token.clone());

    loop {
        let established = retry
            .run(
                |_| async move { establish(shared, device, generation).await },
                |attempt, e| {
                    tracing::warn!(
                        "Connecting to {:?} failed (attempt {}): {}",
                        device,
                        attempt,
                        e
                    );
                    shared.set_state_for(generation, ConnectionState::Reconnecting);
                },
            )
            .await;

        let Ok(link) = established else {
            break;
        };
        if token.is_cancelled() {
            close(shared, link.session).await;
            break;
        }

        shared.set_link_for(generation, Some(link.characteristic));
        shared.set_state_for(generation, ConnectionState::Connected);

        let exit = pump(shared, &link.session, link.notifications, &token).await;
        shared.set_link_for(generation, None);
        close(shared, link.session).await;

        match exit {
            PumpExit::Cancelled => break,
            PumpExit::Lost => {
                tracing::warn!("Device {:?} disconnected, reconnecting", device);
                shared.set_state_for(generation, ConnectionState::Reconnecting);
                if retry.pause().await.is_err() {
                    break;
                }
            }
        }
    }
}

/// One pass through Connecting, Discovering and Subscribing.
///
/// A session opened here is closed again if a later stage fails.
async fn establish<T: Transport>(
    shared: &Shared<T>,
    device: &T::Device,
    generation: u64,
) -> Result<Established<T>> {
    shared.set_state_for(generation, ConnectionState::Connecting);
    let session = shared.transport.open(device).await?;

    match subscribe(shared, &session, generation).await {
        Ok((characteristic, notifications)) => Ok(Established {
            session,
            characteristic,
            notifications,
        }),
        Err(e) => {
            close(shared, session).await;
            Err(e)
        }
    }
}

async fn subscribe<T: Transport>(
    shared: &Shared<T>,
    session: &T::Session,
    generation: u64,
) -> Result<(T::Characteristic, Notifications)> {
    shared.set_state_for(generation, ConnectionState::Discovering);
    let characteristic = shared
        .transport
        .characteristic(
            session,
            shared.config.service_uuid,
            shared.config.characteristic_uuid,
        )
        .await?;

    shared.set_state_for(generation, ConnectionState::Subscribing);
    let notifications = shared.transport.subscribe(&characteristic).await?;
    Ok((characteristic, notifications))
}

/// Deliver notifications until the link is lost or the token is cancelled.
async fn pump<T: Transport>(
    shared: &Shared<T>,
    session: &T::Session,
    mut notifications: Notifications,
    token: &CancellationToken,
) -> PumpExit {
    let mut framer = FrameBuffer::with_max_frame_len(shared.config.max_frame_len);
    let lost = shared.transport.disconnected(session);
    tokio::pin!(lost);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => return PumpExit::Cancelled,
            _ = &mut lost => return PumpExit::Lost,
            chunk = notifications.recv() => match chunk {
                Some(chunk) => shared.handle_chunk(&mut framer, &chunk),
                None => return PumpExit::Lost,
            },
        }
    }
}

async fn close<T: Transport>(shared: &Shared<T>, session: T::Session) {
    if let Err(e) = shared.transport.close(session).await {
        tracing::warn!("Closing session failed: {}", e);
    }
}
