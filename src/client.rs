//! Client builder and public connection surface.
//!
//! The [`ClientBuilder`] provides a fluent API for configuring the link and
//! registering handlers. The [`Client`] owns the lifecycle:
//! 1. `connect` discovers the device and spawns the supervisor task
//! 2. the supervisor opens the session, resolves the characteristic and
//!    subscribes, reconnecting on its own whenever the link drops
//! 3. decoded values are dispatched to the registered handlers
//! 4. commands are queued to the writer task and retried until written
//!
//! # Example
//!
//! ```
//! use shadelink::device::{adjustment, status, Parameter};
//! use shadelink::transport::MemoryTransport;
//! use shadelink::{Client, Command, ConnectionState, MessageType};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> shadelink::Result<()> {
//! let transport = MemoryTransport::new().with_device("Shade");
//!
//! let client = Client::builder(transport.clone())
//!     .device_name("Shade")
//!     .handle(MessageType::Status, status::VERSION, |v| println!("firmware {:x}", v))
//!     .handle(MessageType::Adjustment, adjustment::POSITION_UP, |raw| {
//!         println!("up position {}", Parameter::PositionUp.logical(raw));
//!     })
//!     .build();
//!
//! client.connect(None).await?;
//! client.wait_for_state(ConnectionState::Connected).await?;
//!
//! client.send_parameter(Parameter::PositionUp, 5)?;
//! client.send_command(Command::Save)?;
//!
//! client.disconnect().await;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::codec::{Command, MessageCodec};
use crate::config::LinkConfig;
use crate::connection::supervisor::{self, Shared};
use crate::connection::ConnectionState;
use crate::device::Parameter;
use crate::error::{LinkError, Result};
use crate::handler::{Handler, HandlerRegistry};
use crate::protocol::{Frame, MessageType, Tag};
use crate::transport::Transport;
use crate::writer::{
    lock_session, new_session_slot, spawn_writer_task, WriteStatus, WriterHandle,
};

/// Builder for configuring and creating a [`Client`].
pub struct ClientBuilder<T: Transport> {
    transport: T,
    config: LinkConfig,
    registry: HandlerRegistry,
}

impl<T: Transport> ClientBuilder<T> {
    /// Create a builder with the default configuration.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            config: LinkConfig::default(),
            registry: HandlerRegistry::new(),
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: LinkConfig) -> Self {
        self.config = config;
        self
    }

    /// Default device name used by `connect(None)`.
    pub fn device_name(mut self, name: &str) -> Self {
        self.config.device_name = Some(name.to_string());
        self
    }

    /// Service UUID to resolve.
    pub fn service_uuid(mut self, uuid: uuid::Uuid) -> Self {
        self.config.service_uuid = uuid;
        self
    }

    /// Characteristic UUID to resolve.
    pub fn characteristic_uuid(mut self, uuid: uuid::Uuid) -> Self {
        self.config.characteristic_uuid = uuid;
        self
    }

    /// Set the delay between connection attempts.
    ///
    /// Default: 500 ms
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.config.reconnect_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Set the delay between write attempts.
    ///
    /// Default: 100 ms
    pub fn write_retry_delay(mut self, delay: Duration) -> Self {
        self.config.write_retry_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Set the receive buffer bound.
    ///
    /// Default: 256 bytes
    pub fn max_frame_len(mut self, len: usize) -> Self {
        self.config.max_frame_len = len;
        self
    }

    /// Register a value handler.
    pub fn handle<F>(self, kind: MessageType, tag: Tag, handler: F) -> Self
    where
        F: Fn(i64) + Send + Sync + 'static,
    {
        self.registry.register(kind, tag, handler);
        self
    }

    /// Build the client and spawn its writer task.
    ///
    /// Must be called within a Tokio runtime.
    pub fn build(self) -> Client<T> {
        Client::start(self.transport, self.config, self.registry)
    }
}

/// A link to one device.
///
/// Dropping the client cancels the supervisor and writer tasks.
pub struct Client<T: Transport> {
    shared: Arc<Shared<T>>,
    writer: WriterHandle,
    _writer_task: JoinHandle<()>,
}

impl<T: Transport> Client<T> {
    /// Create a new client builder.
    pub fn builder(transport: T) -> ClientBuilder<T> {
        ClientBuilder::new(transport)
    }

    fn start(transport: T, config: LinkConfig, registry: HandlerRegistry) -> Self {
        let transport = Arc::new(transport);
        let shutdown = CancellationToken::new();
        let session = new_session_slot();
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (link, link_rx) = watch::channel(None);
        let (finished, _) = watch::channel(0);

        let (writer, writer_task) = spawn_writer_task(
            transport.clone(),
            link_rx,
            session.clone(),
            config.write_retry_delay(),
            shutdown.clone(),
        );

        let shared = Arc::new(Shared {
            transport,
            config,
            registry: Arc::new(registry),
            state,
            link,
            session,
            finished,
            shutdown,
        });

        Client {
            shared,
            writer,
            _writer_task: writer_task,
        }
    }

    /// Connect to a device, optionally by name.
    ///
    /// Discovers the device, then hands it to a supervisor task that keeps
    /// the link up until [`disconnect`](Self::disconnect). Returns once the
    /// supervisor is running; use [`wait_for_state`](Self::wait_for_state)
    /// to wait for `Connected`.
    ///
    /// A request while a connection is active or being attempted is ignored.
    /// A request while a previous connection is still closing waits for it
    /// to finish first.
    ///
    /// # Errors
    ///
    /// - `DeviceNotFound` / `TransportUnavailable` from discovery; the state
    ///   returns to `Disconnected`.
    /// - `Cancelled` if `disconnect` was called during discovery.
    pub async fn connect(&self, name: Option<&str>) -> Result<()> {
        let (token, generation) = loop {
            let closing = {
                let mut slot = lock_session(&self.shared.session);
                if !slot.token.is_cancelled() {
                    tracing::debug!("Connect ignored: link is {}", self.shared.state());
                    return Ok(());
                }
                if *self.shared.finished.borrow() >= slot.generation {
                    let token = self.shared.shutdown.child_token();
                    slot.token = token.clone();
                    slot.generation += 1;
                    self.shared.set_state(ConnectionState::Connecting);
                    break (token, slot.generation);
                }
                slot.generation
            };

            tracing::debug!("Waiting for connection {} to close", closing);
            self.shared.wait_finished(closing).await;
        };

        let name = name.or(self.shared.config.device_name.as_deref());
        let discovered = self
            .shared
            .transport
            .discover(self.shared.config.service_uuid, name)
            .await;

        let device = match discovered {
            Ok(device) if !token.is_cancelled() => device,
            Ok(_) => {
                self.shared.finish(generation);
                return Err(LinkError::Cancelled);
            }
            Err(e) => {
                tracing::warn!("Discovery failed: {}", e);
                self.shared.finish(generation);
                return Err(e);
            }
        };

        tracing::info!("Found device {:?}", device);
        tokio::spawn(supervisor::run(
            self.shared.clone(),
            device,
            token,
            generation,
        ));
        Ok(())
    }

    /// Disconnect and wait until the connection has fully closed.
    ///
    /// Stops reconnect attempts and discards queued writes.
    pub async fn disconnect(&self) {
        let generation = {
            let slot = lock_session(&self.shared.session);
            slot.token.cancel();
            slot.generation
        };
        self.shared.wait_finished(generation).await;
    }

    /// Register a value handler; replaces any previous one for the pair.
    pub fn register<F>(&self, kind: MessageType, tag: Tag, handler: F) -> bool
    where
        F: Fn(i64) + Send + Sync + 'static,
    {
        self.shared.registry.register(kind, tag, handler)
    }

    /// Register a shared handler.
    pub fn register_handler(
        &self,
        kind: MessageType,
        tag: Tag,
        handler: Arc<dyn Handler>,
    ) -> bool {
        self.shared.registry.register_arc(kind, tag, handler)
    }

    /// Remove a value handler.
    pub fn unregister(&self, kind: MessageType, tag: Tag) -> bool {
        self.shared.registry.unregister(kind, tag)
    }

    /// The handler registry.
    pub fn registry(&self) -> &HandlerRegistry {
        &self.shared.registry
    }

    /// Queue an adjustment: `#A<tag>:<hex2>` with checksum.
    pub fn send_adjustment(&self, tag: Tag, value: u8) -> Result<()> {
        self.send_frame(MessageCodec::encode(tag, value))
    }

    /// Queue a parameter change from its logical value.
    pub fn send_parameter(&self, parameter: Parameter, logical: i64) -> Result<()> {
        self.send_frame(MessageCodec::encode_parameter(parameter, logical))
    }

    /// Queue a fixed command.
    pub fn send_command(&self, command: Command) -> Result<()> {
        self.send_frame(command.frame())
    }

    /// Queue a fixed command by name (`save`, `revert`, `manual`, `auto`,
    /// `up`, `down`).
    pub fn send_fixed_command(&self, name: &str) -> Result<()> {
        self.send_command(name.parse()?)
    }

    /// Queue a prebuilt frame.
    pub fn send_frame(&self, frame: Frame) -> Result<()> {
        self.writer.send(frame)
    }

    /// Handle for queueing frames, e.g. from inside a handler.
    pub fn writer(&self) -> WriterHandle {
        self.writer.clone()
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Subscribe to connection state changes.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Wait until the connection reaches `target`.
    pub async fn wait_for_state(&self, target: ConnectionState) -> Result<()> {
        let mut state = self.shared.state.subscribe();
        state
            .wait_for(|s| *s == target)
            .await
            .map(|_| ())
            .map_err(|_| LinkError::ConnectionClosed)
    }

    /// Latest write status.
    pub fn write_status(&self) -> WriteStatus {
        self.writer.status()
    }

    /// Frames queued or in flight.
    pub fn pending_writes(&self) -> usize {
        self.writer.pending_count()
    }

    /// Active configuration.
    pub fn config(&self) -> &LinkConfig {
        &self.shared.config
    }

    /// The transport.
    pub fn transport(&self) -> &T {
        &self.shared.transport
    }
}

impl<T: Transport> Drop for Client<T> {
    fn drop(&mut self) {
        self.shared.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryTransport;

    #[test]
    fn test_builder_configuration() {
        let builder = Client::builder(MemoryTransport::new())
            .device_name("Shade")
            .reconnect_delay(Duration::from_secs(2))
            .write_retry_delay(Duration::from_millis(250))
            .max_frame_len(64);

        assert_eq!(builder.config.device_name.as_deref(), Some("Shade"));
        assert_eq!(builder.config.reconnect_delay(), Duration::from_secs(2));
        assert_eq!(builder.config.write_retry_delay(), Duration::from_millis(250));
        assert_eq!(builder.config.max_frame_len, 64);
    }

    #[test]
    fn test_builder_handlers() {
        let builder = Client::builder(MemoryTransport::new())
            .handle(MessageType::Status, Tag::from_static("v"), |_| {})
            .handle(MessageType::Monitoring, Tag::from_static("pw"), |_| {});

        assert!(builder
            .registry
            .is_registered(MessageType::Status, Tag::from_static("v")));
        assert_eq!(builder.registry.len(MessageType::Monitoring), 1);
    }

    #[test]
    fn test_builder_config_replaces_defaults() {
        let config = LinkConfig {
            reconnect_delay_ms: 10,
            ..LinkConfig::default()
        };
        let builder = Client::builder(MemoryTransport::new()).config(config.clone());
        assert_eq!(builder.config, config);
    }

    #[tokio::test]
    async fn test_new_client_is_disconnected() {
        let client = Client::builder(MemoryTransport::new()).build();
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert_eq!(client.write_status(), WriteStatus::Idle);
        assert!(matches!(
            client.send_command(Command::Save),
            Err(LinkError::NotConnected)
        ));
        assert!(matches!(
            client.send_fixed_command("reboot"),
            Err(LinkError::UnknownCommand(_))
        ));
    }

    #[tokio::test]
    async fn test_disconnect_when_idle_returns() {
        let client = Client::builder(MemoryTransport::new()).build();
        client.disconnect().await;
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }
}
