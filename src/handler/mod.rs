//! Handler module - routing decoded values to observers.
//!
//! Provides:
//! - [`Handler`] - callback invoked with one decoded value
//! - [`DispatchTable`] - tag to handler mapping for one message type
//! - [`HandlerRegistry`] - one table per message type, shared with the
//!   connection task
//!
//! # Example
//!
//! ```
//! use shadelink::device::status;
//! use shadelink::handler::HandlerRegistry;
//! use shadelink::protocol::MessageType;
//!
//! let registry = HandlerRegistry::new();
//!
//! // Register a status handler
//! registry.register(MessageType::Status, status::VERSION, |value| {
//!     println!("firmware {:x}", value);
//! });
//!
//! // Optional sections may register later, or go away again
//! registry.unregister(MessageType::Status, status::VERSION);
//! ```

mod registry;

pub use registry::{DispatchTable, Handler, HandlerRegistry};
