//! The network bus: local pub/sub mirrored over an abstract channel.
//!
//! [`NetworkBus`] binds a codec factory and a [`LocalBus`] to a [`Channel`]:
//!
//! - every type registered as a message gets a local subscription that
//!   serializes-and-sends on publish, unless the instance just arrived from
//!   the network (echo suppression) or the type is blacklisted for output
//! - inbound blobs are decoded by their leading wire identifier and published
//!   to local subscribers, unless the type is blacklisted for input
//! - inbound requests are routed to a typed request handler that answers
//!   through a [`RequestTicket`]
//! - [`send_rpc`](NetworkBus::send_rpc) performs an outbound request/response
//!   exchange with optional cancellation
//!
//! The bus is reactive: it runs on whatever task context the channel and the
//! local publishers use, and spawns only when the serialization-delay valve
//! forces an await on buffer acquisition. Runtime failures are logged and
//! degrade to dropped messages; they never tear the process down.

mod ticket;

pub use ticket::RequestTicket;

use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;

use crate::channel::{CancelSignal, Channel, ChannelEvents, ChannelStatus, ReplyTicket};
use crate::error::{Result, WirebusError};
use crate::local::{HandlerToken, LocalBus};
use crate::message::{NetMessage, Payload};
use crate::serializer::{CodecRegistry, SerializerFactory};
use crate::BinaryBlob;

type RequestHandler = Arc<dyn Fn(Box<dyn NetMessage>, RequestTicket) + Send + Sync>;

/// Bridges a local publish/subscribe bus onto an abstract network channel.
pub struct NetworkBus {
    name: String,
    local: Arc<dyn LocalBus>,
    registry: Arc<CodecRegistry>,
    this: Weak<NetworkBus>,
    channel: RwLock<Option<Arc<dyn Channel>>>,
    tokens: Mutex<Vec<HandlerToken>>,
    request_handlers: RwLock<HashMap<TypeId, RequestHandler>>,
    incoming_blacklist: RwLock<HashSet<TypeId>>,
    outgoing_blacklist: RwLock<HashSet<TypeId>>,
    max_serialize_delay: RwLock<Option<Duration>>,
}

impl core::fmt::Debug for NetworkBus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("NetworkBus")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl NetworkBus {
    /// Create a bus and subscribe it to every registered message type.
    ///
    /// Builds all registered codecs eagerly; a broken registration fails here,
    /// at startup, rather than at first use.
    pub fn new(
        name: impl Into<String>,
        local: Arc<dyn LocalBus>,
        registry: Arc<CodecRegistry>,
    ) -> Result<Arc<Self>> {
        registry.warm_up()?;

        let name = name.into();
        let bus = Arc::new_cyclic(|weak: &Weak<NetworkBus>| {
            let mut tokens = Vec::new();
            for hook in registry.message_hooks() {
                tracing::debug!(bus = %name, message_type = hook.type_name, "message registered");
                let weak = weak.clone();
                tokens.push(local.subscribe(
                    hook.type_id,
                    Box::new(move |msg| {
                        if let Some(bus) = weak.upgrade() {
                            bus.on_local_message(msg);
                        }
                    }),
                ));
            }
            Self {
                name,
                local: local.clone(),
                registry: registry.clone(),
                this: weak.clone(),
                channel: RwLock::new(None),
                tokens: Mutex::new(tokens),
                request_handlers: RwLock::new(HashMap::new()),
                incoming_blacklist: RwLock::new(HashSet::new()),
                outgoing_blacklist: RwLock::new(HashSet::new()),
                max_serialize_delay: RwLock::new(None),
            }
        });
        Ok(bus)
    }

    /// Name used in log lines.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// True when a channel is attached and reports itself open.
    pub fn active(&self) -> bool {
        self.channel
            .read()
            .expect("bus channel slot poisoned")
            .as_ref()
            .is_some_and(|c| c.status() == ChannelStatus::Open)
    }

    /// Attach a channel, detaching and unwiring any previous one first.
    pub fn attach(self: &Arc<Self>, channel: Arc<dyn Channel>) {
        let previous = {
            let mut slot = self.channel.write().expect("bus channel slot poisoned");
            slot.replace(channel.clone())
        };
        if let Some(prev) = previous {
            prev.unbind();
        }
        channel.bind(self.clone());
        tracing::info!(bus = %self.name, channel = channel.name(), "bus attached to channel");
    }

    /// Detach from the current channel, unwiring the inbound callbacks first.
    ///
    /// Attaching hands the channel an `Arc` of this bus, so call this (or
    /// drop the channel) when tearing down; otherwise the pair keeps each
    /// other alive.
    pub fn detach(&self) {
        let previous = self
            .channel
            .write()
            .expect("bus channel slot poisoned")
            .take();
        if let Some(prev) = previous {
            prev.unbind();
            tracing::info!(bus = %self.name, channel = prev.name(), "bus detached from channel");
        }
    }

    /// Drop inbound messages of type `T` without dispatching them.
    pub fn blacklist_incoming<T: NetMessage>(&self) {
        self.incoming_blacklist
            .write()
            .expect("blacklist poisoned")
            .insert(TypeId::of::<T>());
    }

    /// Never transmit locally published messages of type `T`.
    pub fn blacklist_outgoing<T: NetMessage>(&self) {
        self.outgoing_blacklist
            .write()
            .expect("blacklist poisoned")
            .insert(TypeId::of::<T>());
    }

    /// Bound the wait for an outbound buffer. `None` (the default) fails fast
    /// when the pool is exhausted instead of waiting.
    pub fn set_max_serialize_delay(&self, delay: Option<Duration>) {
        *self
            .max_serialize_delay
            .write()
            .expect("serialize delay poisoned") = delay;
    }

    /// Register the handler invoked when a request of type `T` arrives.
    ///
    /// The handler must eventually fulfill the ticket; dropping it abandons
    /// the exchange and the peer's await runs into its own timeout.
    pub fn set_request_handler<T, F>(&self, handler: F)
    where
        T: NetMessage,
        F: Fn(Box<T>, RequestTicket) + Send + Sync + 'static,
    {
        let erased: RequestHandler = Arc::new(move |msg, ticket| {
            match msg.into_any().downcast::<T>() {
                Ok(typed) => handler(typed, ticket),
                Err(_) => {
                    tracing::error!("request handler received a mismatched message type");
                }
            }
        });
        self.request_handlers
            .write()
            .expect("request handlers poisoned")
            .insert(TypeId::of::<T>(), erased);
    }

    /// Send a request and await the decoded reply.
    pub async fn send_rpc(&self, msg: &dyn NetMessage) -> Result<Box<dyn NetMessage>> {
        self.send_rpc_inner(msg, None).await
    }

    /// Send a request with a cancellation signal; firing (or dropping) the
    /// sender side aborts the exchange with `Cancelled`.
    pub async fn send_rpc_with_cancel(
        &self,
        msg: &dyn NetMessage,
        cancel: CancelSignal,
    ) -> Result<Box<dyn NetMessage>> {
        self.send_rpc_inner(msg, Some(cancel)).await
    }

    async fn send_rpc_inner(
        &self,
        msg: &dyn NetMessage,
        cancel: Option<CancelSignal>,
    ) -> Result<Box<dyn NetMessage>> {
        let channel = self.attached()?;
        let blob = self.serialize_on(&channel, msg).await?;
        // Blob ownership transfers to the channel here; on failure the
        // channel's drop path releases it back to its pool.
        let mut reply = channel.send_request(blob, cancel).await?;
        self.decode(&mut reply)
    }

    fn attached(&self) -> Result<Arc<dyn Channel>> {
        self.channel
            .read()
            .expect("bus channel slot poisoned")
            .clone()
            .ok_or(WirebusError::NotAttached)
    }

    /// Serialize `msg` into a channel-provided blob: `[wire id][fields]`.
    pub(crate) async fn serialize(&self, msg: &dyn NetMessage) -> Result<BinaryBlob> {
        let channel = self.attached()?;
        self.serialize_on(&channel, msg).await
    }

    async fn serialize_on(
        &self,
        channel: &Arc<dyn Channel>,
        msg: &dyn NetMessage,
    ) -> Result<BinaryBlob> {
        let ty = msg.as_any().type_id();
        let codec = self
            .registry
            .get_by_type(ty)
            .ok_or_else(|| WirebusError::Encode("message type is not registered".to_string()))?;

        let delay = *self
            .max_serialize_delay
            .read()
            .expect("serialize delay poisoned");
        let mut blob = match delay {
            None => channel.create_blob(codec.size_hint() + 4)?,
            Some(deadline) => {
                channel
                    .create_blob_within(codec.size_hint() + 4, deadline)
                    .await?
            }
        };

        blob.add_u32(codec.wire_id());
        codec.encode(msg.as_any(), &mut blob, self.registry.as_ref())?;
        Ok(blob)
    }

    fn decode(&self, blob: &mut BinaryBlob) -> Result<Box<dyn NetMessage>> {
        let id = blob.read_u32()?;
        let codec = self
            .registry
            .get_by_id(id)
            .ok_or(WirebusError::UnknownWireId(id))?;
        let payload = codec.decode(blob, self.registry.as_ref())?;
        let hook = self.registry.hook(codec.type_id()).ok_or_else(|| {
            WirebusError::Decode(format!(
                "`{}` decodes but is not registered as a message type",
                codec.type_name()
            ))
        })?;
        (hook.into_net)(payload).ok_or_else(|| {
            WirebusError::Decode(format!(
                "decoded payload did not match message type `{}`",
                codec.type_name()
            ))
        })
    }

    fn is_blacklisted_incoming(&self, ty: TypeId) -> bool {
        self.incoming_blacklist
            .read()
            .expect("blacklist poisoned")
            .contains(&ty)
    }

    fn on_local_message(&self, msg: Arc<dyn NetMessage>) {
        if !self.active() {
            return;
        }
        if !msg.is_local() {
            // Just decoded off the network; echoing it back would loop.
            return;
        }
        let ty = (*msg).as_any().type_id();
        if self
            .outgoing_blacklist
            .read()
            .expect("blacklist poisoned")
            .contains(&ty)
        {
            tracing::debug!(bus = %self.name, "outgoing message blacklisted, not transmitting");
            return;
        }
        let Ok(channel) = self.attached() else {
            return;
        };

        let delay = *self
            .max_serialize_delay
            .read()
            .expect("serialize delay poisoned");
        match delay {
            None => {
                // Fast path: stay on the publisher's context.
                if let Err(e) = self.transmit(&channel, msg.as_ref()) {
                    tracing::error!(bus = %self.name, error = %e, "failed to transmit local message");
                }
            }
            Some(_) => {
                let Some(bus) = self.this.upgrade() else {
                    return;
                };
                tokio::spawn(async move {
                    match bus.serialize_on(&channel, msg.as_ref()).await {
                        Ok(blob) => channel.send(blob),
                        Err(e) => {
                            tracing::error!(bus = %bus.name, error = %e, "failed to transmit local message");
                        }
                    }
                });
            }
        }
    }

    fn transmit(&self, channel: &Arc<dyn Channel>, msg: &dyn NetMessage) -> Result<()> {
        let ty = msg.as_any().type_id();
        let codec = self
            .registry
            .get_by_type(ty)
            .ok_or_else(|| WirebusError::Encode("message type is not registered".to_string()))?;
        let mut blob = channel.create_blob(codec.size_hint() + 4)?;
        blob.add_u32(codec.wire_id());
        codec.encode(msg.as_any(), &mut blob, self.registry.as_ref())?;
        tracing::debug!(bus = %self.name, message_type = codec.type_name(), "dispatching message to network");
        channel.send(blob);
        Ok(())
    }
}

impl ChannelEvents for NetworkBus {
    fn on_blob(&self, mut blob: BinaryBlob) {
        let msg = match self.decode(&mut blob) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::error!(bus = %self.name, error = %e, "failed to decode inbound message");
                return;
            }
        };
        let ty = (*msg).as_any().type_id();
        if self.is_blacklisted_incoming(ty) {
            tracing::warn!(bus = %self.name, "inbound message blacklisted, dropping");
            return;
        }
        tracing::debug!(bus = %self.name, "dispatching inbound message to local bus");
        self.local.publish(Arc::from(msg));
    }

    fn on_request(&self, mut blob: BinaryBlob, ticket: Box<dyn ReplyTicket>) {
        let msg = match self.decode(&mut blob) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::error!(bus = %self.name, error = %e, "failed to decode inbound request");
                return;
            }
        };
        let ty = (*msg).as_any().type_id();
        if self.is_blacklisted_incoming(ty) {
            tracing::warn!(bus = %self.name, "inbound request blacklisted, dropping");
            return;
        }
        let handler = self
            .request_handlers
            .read()
            .expect("request handlers poisoned")
            .get(&ty)
            .cloned();
        let Some(handler) = handler else {
            let err = WirebusError::MissingRequestHandler(
                self.registry
                    .hook(ty)
                    .map(|h| h.type_name)
                    .unwrap_or("unknown"),
            );
            tracing::error!(bus = %self.name, error = %err, "abandoning request");
            return;
        };
        let Some(bus) = self.this.upgrade() else {
            return;
        };
        (*handler)(msg, RequestTicket::new(bus, ticket));
    }
}

impl Drop for NetworkBus {
    fn drop(&mut self) {
        self.detach();
        let tokens = std::mem::take(&mut *self.tokens.lock().expect("token list poisoned"));
        for token in &tokens {
            self.local.unsubscribe(token);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::MemoryBus;
    use crate::message::Provenance;
    use crate::serializer::MessageDescriptor;

    #[derive(Default)]
    struct Note {
        text: String,
        origin: Provenance,
    }

    impl NetMessage for Note {
        fn provenance(&self) -> &Provenance {
            &self.origin
        }
        fn provenance_mut(&mut self) -> &mut Provenance {
            &mut self.origin
        }
    }

    fn registry_with_note() -> Arc<CodecRegistry> {
        let registry = CodecRegistry::new();
        registry
            .register_message::<Note>(
                MessageDescriptor::builder::<Note>()
                    .scalar("text", |m: &Note| m.text.clone(), |m, v| m.text = v)
                    .build(),
            )
            .unwrap();
        Arc::new(registry)
    }

    #[test]
    fn test_new_subscribes_message_types() {
        let local = Arc::new(MemoryBus::new());
        let bus = NetworkBus::new("test", local.clone(), registry_with_note()).unwrap();

        assert_eq!(local.handler_count(TypeId::of::<Note>()), 1);
        drop(bus);
        assert_eq!(local.handler_count(TypeId::of::<Note>()), 0);
    }

    #[test]
    fn test_detached_bus_is_inactive_and_publish_is_a_no_op() {
        let local = Arc::new(MemoryBus::new());
        let bus = NetworkBus::new("test", local.clone(), registry_with_note()).unwrap();

        assert!(!bus.active());
        // Nothing attached: publishing must not panic or error.
        local.publish(Arc::new(Note::default()));
    }

    #[tokio::test]
    async fn test_rpc_without_channel_fails_not_attached() {
        let local = Arc::new(MemoryBus::new());
        let bus = NetworkBus::new("test", local, registry_with_note()).unwrap();

        let err = bus.send_rpc(&Note::default()).await.unwrap_err();
        assert!(matches!(err, WirebusError::NotAttached));
    }

    #[test]
    fn test_broken_registration_fails_at_startup() {
        struct NoCodec;

        #[derive(Default)]
        struct Bad {
            origin: Provenance,
        }
        impl NetMessage for Bad {
            fn provenance(&self) -> &Provenance {
                &self.origin
            }
            fn provenance_mut(&mut self) -> &mut Provenance {
                &mut self.origin
            }
        }

        let registry = CodecRegistry::new();
        registry
            .register_message::<Bad>(
                MessageDescriptor::builder::<Bad>()
                    .scalar(
                        "broken",
                        |_m: &Bad| Arc::new(NoCodec),
                        |_m, _v: Arc<NoCodec>| {},
                    )
                    .build(),
            )
            .unwrap();

        let err = NetworkBus::new("test", Arc::new(MemoryBus::new()), Arc::new(registry))
            .unwrap_err();
        assert!(matches!(err, WirebusError::Config { .. }));
    }
}
