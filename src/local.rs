//! In-process publish/subscribe bus.
//!
//! The network bus bridges between a [`LocalBus`] and a channel: it consumes
//! the trait, not a concrete type, so hosts with an existing event bus can
//! adapt theirs. [`MemoryBus`] is the crate's own implementation — a typed
//! handler table good enough for most hosts and for tests.
//!
//! Messages travel as `Arc<dyn NetMessage>`: every subscriber of a type sees
//! the same instance.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::message::{NetMessage, Payload};

/// Subscription handle returned by [`LocalBus::subscribe`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerToken {
    id: u64,
    ty: TypeId,
}

/// Handler invoked for every published message of the subscribed type.
pub type MessageHandler = Box<dyn Fn(Arc<dyn NetMessage>) + Send + Sync>;

/// A local publish/subscribe bus keyed by concrete message type.
pub trait LocalBus: Send + Sync {
    /// Register a handler for messages of type `ty`.
    fn subscribe(&self, ty: TypeId, handler: MessageHandler) -> HandlerToken;

    /// Remove a previously registered handler.
    fn unsubscribe(&self, token: &HandlerToken);

    /// Deliver a message to every handler subscribed to its runtime type.
    fn publish(&self, msg: Arc<dyn NetMessage>);
}

/// In-process [`LocalBus`] implementation.
pub struct MemoryBus {
    handlers: RwLock<HashMap<TypeId, Vec<(u64, Arc<MessageHandler>)>>>,
    next_id: AtomicU64,
}

impl MemoryBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Typed convenience wrapper over [`LocalBus::subscribe`].
    pub fn subscribe_to<T, F>(&self, handler: F) -> HandlerToken
    where
        T: NetMessage,
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.subscribe(
            TypeId::of::<T>(),
            Box::new(move |msg| {
                if let Some(typed) = (*msg).as_any().downcast_ref::<T>() {
                    handler(typed);
                }
            }),
        )
    }

    /// Number of handlers currently registered for a type.
    pub fn handler_count(&self, ty: TypeId) -> usize {
        self.handlers
            .read()
            .expect("memory bus poisoned")
            .get(&ty)
            .map_or(0, Vec::len)
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalBus for MemoryBus {
    fn subscribe(&self, ty: TypeId, handler: MessageHandler) -> HandlerToken {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.handlers
            .write()
            .expect("memory bus poisoned")
            .entry(ty)
            .or_default()
            .push((id, Arc::new(handler)));
        HandlerToken { id, ty }
    }

    fn unsubscribe(&self, token: &HandlerToken) {
        let mut handlers = self.handlers.write().expect("memory bus poisoned");
        if let Some(list) = handlers.get_mut(&token.ty) {
            list.retain(|(id, _)| *id != token.id);
        }
    }

    fn publish(&self, msg: Arc<dyn NetMessage>) {
        let ty = (*msg).as_any().type_id();
        // Snapshot so handlers can (un)subscribe reentrantly.
        let snapshot: Vec<Arc<MessageHandler>> = {
            let handlers = self.handlers.read().expect("memory bus poisoned");
            match handlers.get(&ty) {
                Some(list) => list.iter().map(|(_, h)| h.clone()).collect(),
                None => return,
            }
        };
        for handler in snapshot {
            (*handler)(msg.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Provenance;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Tick {
        n: u32,
        origin: Provenance,
    }

    impl NetMessage for Tick {
        fn provenance(&self) -> &Provenance {
            &self.origin
        }
        fn provenance_mut(&mut self) -> &mut Provenance {
            &mut self.origin
        }
    }

    #[derive(Default)]
    struct Other {
        origin: Provenance,
    }

    impl NetMessage for Other {
        fn provenance(&self) -> &Provenance {
            &self.origin
        }
        fn provenance_mut(&mut self) -> &mut Provenance {
            &mut self.origin
        }
    }

    #[test]
    fn test_publish_reaches_typed_subscriber() {
        let bus = MemoryBus::new();
        let seen = Arc::new(AtomicUsize::new(0));

        let seen_clone = seen.clone();
        bus.subscribe_to::<Tick, _>(move |msg| {
            seen_clone.fetch_add(msg.n as usize, Ordering::SeqCst);
        });

        bus.publish(Arc::new(Tick {
            n: 5,
            origin: Provenance::default(),
        }));
        assert_eq!(seen.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_publish_does_not_cross_types() {
        let bus = MemoryBus::new();
        let seen = Arc::new(AtomicUsize::new(0));

        let seen_clone = seen.clone();
        bus.subscribe_to::<Tick, _>(move |_| {
            seen_clone.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(Arc::new(Other::default()));
        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let bus = MemoryBus::new();
        let seen = Arc::new(AtomicUsize::new(0));

        let seen_clone = seen.clone();
        let token = bus.subscribe_to::<Tick, _>(move |_| {
            seen_clone.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(Arc::new(Tick::default()));
        bus.unsubscribe(&token);
        bus.publish(Arc::new(Tick::default()));

        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(bus.handler_count(TypeId::of::<Tick>()), 0);
    }

    #[test]
    fn test_all_subscribers_see_the_same_instance() {
        let bus = MemoryBus::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let f = first.clone();
        bus.subscribe_to::<Tick, _>(move |msg| {
            f.store(msg.n as usize, Ordering::SeqCst);
        });
        let s = second.clone();
        bus.subscribe_to::<Tick, _>(move |msg| {
            s.store(msg.n as usize, Ordering::SeqCst);
        });

        bus.publish(Arc::new(Tick {
            n: 42,
            origin: Provenance::default(),
        }));
        assert_eq!(first.load(Ordering::SeqCst), 42);
        assert_eq!(second.load(Ordering::SeqCst), 42);
    }
}
