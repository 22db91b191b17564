//! # wirebus
//!
//! Binary message serialization engine paired with a pub/sub-to-network
//! bridge: in-process event types, registered declaratively, are mirrored
//! over a wire protocol and usable for request/response exchanges — with no
//! hand-written per-message codec code.
//!
//! ## Architecture
//!
//! - **Serialization engine** ([`serializer`]): per-type codecs built once
//!   from explicit field descriptors, a stable 32-bit wire identifier per
//!   logical name, and a primitive converter registry with a closed boxed
//!   union for "any value" fields.
//! - **Bus** ([`bus`]): routes inbound blobs to local subscribers by wire
//!   identifier, suppresses network echo via a provenance flag, enforces
//!   per-type blacklists, and correlates outbound RPC requests with replies.
//! - **Buffers** ([`blob`]): pooled growable blobs with a read/write cursor,
//!   leased per operation and released on drop.
//!
//! The physical transport is consumed behind the [`Channel`] trait; the local
//! event fan-out behind [`LocalBus`] (with [`MemoryBus`] as the in-process
//! implementation).
//!
//! ## Example
//!
//! ```
//! use wirebus::{MessageDescriptor, NetMessage, Provenance, CodecRegistry};
//!
//! #[derive(Default)]
//! struct Ping {
//!     count: i32,
//!     tag: String,
//!     origin: Provenance,
//! }
//!
//! impl NetMessage for Ping {
//!     fn provenance(&self) -> &Provenance { &self.origin }
//!     fn provenance_mut(&mut self) -> &mut Provenance { &mut self.origin }
//! }
//!
//! let registry = CodecRegistry::new();
//! registry.register_message::<Ping>(
//!     MessageDescriptor::builder::<Ping>()
//!         .size_hint(16)
//!         .scalar("count", |m: &Ping| m.count, |m, v| m.count = v)
//!         .scalar("tag", |m: &Ping| m.tag.clone(), |m, v| m.tag = v)
//!         .build(),
//! ).unwrap();
//! registry.warm_up().unwrap();
//! ```

pub mod blob;
pub mod bus;
pub mod channel;
pub mod error;
pub mod local;
pub mod message;
pub mod serializer;

pub use blob::{BinaryBlob, BlobPool};
pub use bus::{NetworkBus, RequestTicket};
pub use channel::{BoxFuture, CancelSignal, Channel, ChannelEvents, ChannelStatus, ReplyTicket};
pub use error::{Result, WirebusError};
pub use local::{HandlerToken, LocalBus, MemoryBus, MessageHandler};
pub use message::{NetMessage, Payload, Provenance};
pub use serializer::{
    wire_id, Codec, CodecRegistry, CompositeFactory, ConverterRegistry, DescriptorBuilder,
    MessageDescriptor, RawKind, RawValue, SerializerFactory, TickDuration, Timestamp,
};
