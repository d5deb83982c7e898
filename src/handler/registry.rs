//! Handler registry for dispatching decoded values by message type and tag.
//!
//! Each message type owns a [`DispatchTable`] mapping tags to handlers.
//! Registration is last-wins per tag; values for tags with no handler are
//! ignored. Handlers may be added or removed at any time, including from
//! inside another handler.
//!
//! # Example
//!
//! ```
//! use std::sync::atomic::{AtomicI64, Ordering};
//! use std::sync::Arc;
//!
//! use shadelink::handler::HandlerRegistry;
//! use shadelink::protocol::{MessageType, Tag};
//!
//! let registry = HandlerRegistry::new();
//! let seen = Arc::new(AtomicI64::new(0));
//!
//! let sink = seen.clone();
//! registry.register(MessageType::Status, Tag::from_static("v"), move |value| {
//!     sink.store(value, Ordering::SeqCst);
//! });
//!
//! assert!(registry.dispatch(MessageType::Status, Tag::from_static("v"), 0x23));
//! assert!(!registry.dispatch(MessageType::Status, Tag::from_static("x"), 1));
//! assert_eq!(seen.load(Ordering::SeqCst), 0x23);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use crate::codec::DecodedMessage;
use crate::protocol::{MessageType, Tag};

/// Trait for value handlers.
///
/// Handlers run on the connection task and must return promptly. Sending a
/// command from a handler is fine; the write is queued.
pub trait Handler: Send + Sync + 'static {
    /// Handle one decoded value.
    fn call(&self, value: i64);
}

impl<F> Handler for F
where
    F: Fn(i64) + Send + Sync + 'static,
{
    fn call(&self, value: i64) {
        self(value)
    }
}

/// Tag to handler mapping for one message type.
#[derive(Default, Clone)]
pub struct DispatchTable {
    handlers: HashMap<Tag, Arc<dyn Handler>>,
}

impl DispatchTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a handler, returning the one it replaced.
    pub fn insert(&mut self, tag: Tag, handler: Arc<dyn Handler>) -> Option<Arc<dyn Handler>> {
        self.handlers.insert(tag, handler)
    }

    /// Remove the handler for `tag`.
    pub fn remove(&mut self, tag: Tag) -> Option<Arc<dyn Handler>> {
        self.handlers.remove(&tag)
    }

    /// Handler currently registered for `tag`.
    pub fn get(&self, tag: Tag) -> Option<Arc<dyn Handler>> {
        self.handlers.get(&tag).cloned()
    }

    /// Check whether `tag` has a handler.
    pub fn contains(&self, tag: Tag) -> bool {
        self.handlers.contains_key(&tag)
    }

    /// Registered tags, in no particular order.
    pub fn tags(&self) -> impl Iterator<Item = Tag> + '_ {
        self.handlers.keys().copied()
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Check if no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for DispatchTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.handlers.keys()).finish()
    }
}

/// Registry holding one dispatch table per message type.
///
/// Shared between the client and the connection task behind an `Arc`.
#[derive(Default)]
pub struct HandlerRegistry {
    tables: RwLock<[DispatchTable; 3]>,
}

impl HandlerRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `tag` in the table of `kind`.
    ///
    /// Replaces any previous handler for the same pair. Returns `true` if a
    /// handler was replaced.
    pub fn register<F>(&self, kind: MessageType, tag: Tag, handler: F) -> bool
    where
        F: Fn(i64) + Send + Sync + 'static,
    {
        self.register_arc(kind, tag, Arc::new(handler))
    }

    /// Register a shared handler, or a type implementing [`Handler`] directly.
    pub fn register_arc(&self, kind: MessageType, tag: Tag, handler: Arc<dyn Handler>) -> bool {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        tables[kind.index()].insert(tag, handler).is_some()
    }

    /// Remove the handler for `tag`. Returns `true` if one was registered.
    pub fn unregister(&self, kind: MessageType, tag: Tag) -> bool {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        tables[kind.index()].remove(tag).is_some()
    }

    /// Check whether a handler is registered for the pair.
    pub fn is_registered(&self, kind: MessageType, tag: Tag) -> bool {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)[kind.index()].contains(tag)
    }

    /// Get the handler registered for the pair.
    pub fn get_handler(&self, kind: MessageType, tag: Tag) -> Option<Arc<dyn Handler>> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)[kind.index()].get(tag)
    }

    /// Snapshot of the table for `kind`.
    pub fn table(&self, kind: MessageType) -> DispatchTable {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)[kind.index()].clone()
    }

    /// Number of handlers registered for `kind`.
    pub fn len(&self, kind: MessageType) -> usize {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)[kind.index()].len()
    }

    /// Invoke the handler for one value.
    ///
    /// Returns `false` when no handler is registered; that is not an error.
    /// The lock is released before the handler runs.
    pub fn dispatch(&self, kind: MessageType, tag: Tag, value: i64) -> bool {
        match self.get_handler(kind, tag) {
            Some(handler) => {
                handler.call(value);
                true
            }
            None => {
                tracing::trace!("No {} handler for tag {}", kind, tag);
                false
            }
        }
    }

    /// Dispatch every field of a decoded message in wire order.
    ///
    /// Returns the number of handlers invoked.
    pub fn dispatch_message(&self, message: &DecodedMessage) -> usize {
        message
            .fields
            .iter()
            .filter(|field| self.dispatch(message.kind, field.tag, field.value))
            .count()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        let mut map = f.debug_map();
        for kind in MessageType::ALL {
            map.entry(&kind, &tables[kind.index()]);
        }
        map.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Field;
    use std::sync::Mutex;

    fn tag(s: &'static str) -> Tag {
        Tag::from_static(s)
    }

    type Log = Arc<Mutex<Vec<(&'static str, i64)>>>;
    type BoxedFn = Box<dyn Fn(i64) + Send + Sync>;

    fn recorder() -> (Log, impl Fn(&'static str) -> BoxedFn) {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        let make = move |name: &'static str| -> BoxedFn {
            let sink = sink.clone();
            Box::new(move |value: i64| sink.lock().unwrap().push((name, value)))
        };
        (log, make)
    }

    #[test]
    fn test_register_and_dispatch() {
        let registry = HandlerRegistry::new();
        let (log, make) = recorder();

        assert!(!registry.register(MessageType::Status, tag("v"), make("v")));
        assert!(registry.is_registered(MessageType::Status, tag("v")));
        assert!(!registry.is_registered(MessageType::Adjustment, tag("v")));

        assert!(registry.dispatch(MessageType::Status, tag("v"), 7));
        assert_eq!(*log.lock().unwrap(), vec![("v", 7)]);
    }

    #[test]
    fn test_unregistered_tag_is_ignored() {
        let registry = HandlerRegistry::new();
        let (log, make) = recorder();
        registry.register(MessageType::Status, tag("v"), make("v"));

        assert!(!registry.dispatch(MessageType::Status, tag("zz"), 1));
        assert!(!registry.dispatch(MessageType::Monitoring, tag("v"), 1));
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_reregister_replaces() {
        let registry = HandlerRegistry::new();
        let (log, make) = recorder();

        registry.register(MessageType::Adjustment, tag("u"), make("first"));
        assert!(registry.register(MessageType::Adjustment, tag("u"), make("second")));
        assert_eq!(registry.len(MessageType::Adjustment), 1);

        registry.dispatch(MessageType::Adjustment, tag("u"), 0x85);
        assert_eq!(*log.lock().unwrap(), vec![("second", 0x85)]);
    }

    #[test]
    fn test_unregister() {
        let registry = HandlerRegistry::new();
        let (log, make) = recorder();
        registry.register(MessageType::Monitoring, tag("pw"), make("pw"));

        assert!(registry.unregister(MessageType::Monitoring, tag("pw")));
        assert!(!registry.unregister(MessageType::Monitoring, tag("pw")));
        assert!(!registry.dispatch(MessageType::Monitoring, tag("pw"), 12000));
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_dispatch_message_in_wire_order() {
        let registry = HandlerRegistry::new();
        let (log, make) = recorder();
        registry.register(MessageType::Status, tag("t"), make("t"));
        registry.register(MessageType::Status, tag("v"), make("v"));

        let message = DecodedMessage {
            kind: MessageType::Status,
            fields: vec![
                Field {
                    tag: tag("v"),
                    value: 0x23,
                },
                Field {
                    tag: tag("x"),
                    value: 9,
                },
                Field {
                    tag: tag("t"),
                    value: 1,
                },
            ],
        };

        assert_eq!(registry.dispatch_message(&message), 2);
        assert_eq!(*log.lock().unwrap(), vec![("v", 0x23), ("t", 1)]);
    }

    #[test]
    fn test_handler_may_register_during_dispatch() {
        let registry = Arc::new(HandlerRegistry::new());
        let (log, make) = recorder();

        let inner = registry.clone();
        let late = Mutex::new(Some(make("late")));
        registry.register(MessageType::Status, tag("v"), move |_: i64| {
            if let Some(handler) = late.lock().unwrap().take() {
                inner.register(MessageType::Status, tag("t"), handler);
            }
        });

        registry.dispatch(MessageType::Status, tag("v"), 1);
        assert!(registry.dispatch(MessageType::Status, tag("t"), 2));
        assert_eq!(*log.lock().unwrap(), vec![("late", 2)]);
    }

    #[test]
    fn test_table_snapshot() {
        let registry = HandlerRegistry::new();
        registry.register(MessageType::Monitoring, tag("pw"), |_| {});
        registry.register(MessageType::Monitoring, tag("ac"), |_| {});

        let table = registry.table(MessageType::Monitoring);
        let mut tags: Vec<_> = table.tags().map(|t| t.to_string()).collect();
        tags.sort();
        assert_eq!(tags, vec!["ac", "pw"]);
        assert!(registry.table(MessageType::Status).is_empty());
    }
}
