//! # shadelink
//!
//! Client driver for the text-framed control protocol of motorized shade
//! positioners, spoken over a Bluetooth LE notify/write characteristic.
//!
//! ## Architecture
//!
//! - **Receive path**: notification chunks → [`FrameBuffer`] → CRC-8 check →
//!   [`MessageCodec`] → per-type dispatch tables → registered handlers
//! - **Send path**: commands → [`MessageCodec`] / [`Command`] → writer task
//!   (one write in flight, fixed-delay retry) → transport
//! - **Lifecycle**: a supervisor task drives [`ConnectionState`] and
//!   reconnects on its own after link loss
//!
//! The radio sits behind the [`Transport`](transport::Transport) trait;
//! `BleTransport` (feature `ble`) talks to real hardware and
//! [`MemoryTransport`](transport::MemoryTransport) scripts a peer in memory.
//!
//! ## Example
//!
//! ```ignore
//! use shadelink::device::{status, FirmwareVersion};
//! use shadelink::transport::BleTransport;
//! use shadelink::{Client, ConnectionState, MessageType};
//!
//! #[tokio::main]
//! async fn main() -> shadelink::Result<()> {
//!     let client = Client::builder(BleTransport::new().await?)
//!         .handle(MessageType::Status, status::VERSION, |raw| {
//!             println!("firmware {}", FirmwareVersion::from_raw(raw));
//!         })
//!         .build();
//!
//!     client.connect(Some("Shade")).await?;
//!     client.wait_for_state(ConnectionState::Connected).await?;
//!     client.send_fixed_command("manual")?;
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod config;
pub mod connection;
pub mod device;
pub mod error;
pub mod handler;
pub mod protocol;
pub mod retry;
pub mod transport;
pub mod writer;

mod client;

pub use client::{Client, ClientBuilder};
pub use codec::{Command, DecodedMessage, Field, MessageCodec};
pub use config::LinkConfig;
pub use connection::ConnectionState;
pub use error::{LinkError, Result};
pub use protocol::{Frame, FrameBuffer, MessageType, Tag};
pub use writer::{WriteStatus, WriterHandle};
