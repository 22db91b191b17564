//! Loopback demo - one bus wired to a channel that hands everything back.
//!
//! Shows the full path without a real transport:
//! - a locally published message is serialized, "sent", delivered back as an
//!   inbound blob, and dispatched to a local subscriber marked as remote
//! - an RPC request is routed to the bus's own request handler and the
//!   fulfilled ticket becomes the RPC reply
//!
//! Run with: `cargo run --example loopback`

use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::oneshot;
use wirebus::{
    BinaryBlob, BlobPool, BoxFuture, CancelSignal, Channel, ChannelEvents, ChannelStatus,
    CodecRegistry, LocalBus, MemoryBus, MessageDescriptor, NetMessage, NetworkBus, Payload,
    Provenance, ReplyTicket, Result, WirebusError,
};

#[derive(Default)]
struct Greet {
    who: String,
    origin: Provenance,
}

impl NetMessage for Greet {
    fn provenance(&self) -> &Provenance {
        &self.origin
    }
    fn provenance_mut(&mut self) -> &mut Provenance {
        &mut self.origin
    }
}

#[derive(Default)]
struct Greeting {
    text: String,
    origin: Provenance,
}

impl NetMessage for Greeting {
    fn provenance(&self) -> &Provenance {
        &self.origin
    }
    fn provenance_mut(&mut self) -> &mut Provenance {
        &mut self.origin
    }
}

/// A channel that delivers its own output back as input.
struct Loopback {
    pool: BlobPool,
    events: RwLock<Option<Arc<dyn ChannelEvents>>>,
}

impl Loopback {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            pool: BlobPool::new(8, 256),
            events: RwLock::new(None),
        })
    }
}

struct LoopTicket {
    tx: oneshot::Sender<BinaryBlob>,
}

impl ReplyTicket for LoopTicket {
    fn fulfill(self: Box<Self>, blob: BinaryBlob) -> BoxFuture<'static, Result<()>> {
        Box::pin(async move {
            self.tx
                .send(blob)
                .map_err(|_| WirebusError::Channel("reply receiver dropped".to_string()))
        })
    }
}

impl Channel for Loopback {
    fn name(&self) -> &str {
        "loopback"
    }

    fn status(&self) -> ChannelStatus {
        ChannelStatus::Open
    }

    fn create_blob(&self, _size_hint: usize) -> Result<BinaryBlob> {
        self.pool.acquire()
    }

    fn create_blob_within(
        &self,
        _size_hint: usize,
        deadline: Duration,
    ) -> BoxFuture<'_, Result<BinaryBlob>> {
        Box::pin(self.pool.acquire_within(deadline))
    }

    fn send(&self, blob: BinaryBlob) {
        // The written blob's read cursor still sits at the first byte, so it
        // can go straight back in as inbound data.
        if let Some(events) = self.events.read().unwrap().clone() {
            events.on_blob(blob);
        }
    }

    fn send_request(
        &self,
        blob: BinaryBlob,
        cancel: Option<CancelSignal>,
    ) -> BoxFuture<'_, Result<BinaryBlob>> {
        let (tx, rx) = oneshot::channel();
        if let Some(events) = self.events.read().unwrap().clone() {
            events.on_request(blob, Box::new(LoopTicket { tx }));
        }
        Box::pin(async move {
            match cancel {
                Some(signal) => tokio::select! {
                    reply = rx => reply.map_err(|_| WirebusError::Channel("no reply".to_string())),
                    _ = signal => Err(WirebusError::Cancelled),
                },
                None => rx
                    .await
                    .map_err(|_| WirebusError::Channel("no reply".to_string())),
            }
        })
    }

    fn bind(&self, events: Arc<dyn ChannelEvents>) {
        *self.events.write().unwrap() = Some(events);
    }

    fn unbind(&self) {
        *self.events.write().unwrap() = None;
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let registry = CodecRegistry::new();
    registry.register_message::<Greet>(
        MessageDescriptor::builder::<Greet>()
            .size_hint(32)
            .scalar("who", |m: &Greet| m.who.clone(), |m, v| m.who = v)
            .build(),
    )?;
    registry.register_message::<Greeting>(
        MessageDescriptor::builder::<Greeting>()
            .size_hint(48)
            .scalar("text", |m: &Greeting| m.text.clone(), |m, v| m.text = v)
            .build(),
    )?;

    let local = Arc::new(MemoryBus::new());
    let bus = NetworkBus::new("loopback-demo", local.clone(), Arc::new(registry))?;
    bus.attach(Loopback::new());

    local.subscribe_to::<Greet, _>(|msg| {
        println!(
            "subscriber saw Greet {{ who: {:?} }} (local: {})",
            msg.who,
            msg.is_local()
        );
    });

    bus.set_request_handler::<Greet, _>(|greet, ticket| {
        let reply = Greeting {
            text: format!("hello, {}!", greet.who),
            origin: Provenance::default(),
        };
        tokio::spawn(async move {
            if let Err(e) = ticket.fulfill(&reply).await {
                eprintln!("reply failed: {e}");
            }
        });
    });

    // Publish locally: the loopback hands it straight back and the
    // subscriber sees the decoded copy marked as remote.
    local.publish(Arc::new(Greet {
        who: "world".to_string(),
        origin: Provenance::default(),
    }));

    // Request/response against our own handler.
    let reply = bus
        .send_rpc(&Greet {
            who: "rpc".to_string(),
            origin: Provenance::default(),
        })
        .await?;
    let greeting = (*reply).as_any().downcast_ref::<Greeting>().unwrap();
    println!("rpc reply: {:?}", greeting.text);

    bus.detach();
    Ok(())
}
