//! The serialization engine.
//!
//! Given a declaratively registered type, the engine produces a deterministic
//! binary encoding and a stable numeric wire identifier, with no per-message
//! codec code:
//!
//! - [`ConverterRegistry`] — primitive writer/reader pairs, typed and boxed
//! - [`MessageDescriptor`] / [`DescriptorBuilder`] — per-type field table
//! - [`Codec`] — the ordered field-codec list built from a descriptor
//! - [`CodecRegistry`] / [`CompositeFactory`] — memoizing factories
//! - [`wire_id`] — logical name to 32-bit identifier
//!
//! # Example
//!
//! ```
//! use wirebus::{CodecRegistry, MessageDescriptor, SerializerFactory, BinaryBlob, wire_id};
//! use std::any::TypeId;
//!
//! #[derive(Default, Clone, PartialEq, Debug)]
//! struct Ping {
//!     count: i32,
//!     tag: String,
//! }
//!
//! let registry = CodecRegistry::new();
//! registry
//!     .register_value(
//!         MessageDescriptor::builder::<Ping>()
//!             .scalar("count", |m: &Ping| m.count, |m, v| m.count = v)
//!             .scalar("tag", |m: &Ping| m.tag.clone(), |m, v| m.tag = v)
//!             .build(),
//!     )
//!     .unwrap();
//! registry.warm_up().unwrap();
//!
//! let codec = registry.get_by_type(TypeId::of::<Ping>()).unwrap();
//! assert_eq!(codec.wire_id(), wire_id("Ping"));
//!
//! let ping = Ping { count: 7, tag: "x".into() };
//! let mut blob = BinaryBlob::with_capacity(32);
//! codec.encode(&ping, &mut blob, &registry).unwrap();
//! let back = codec.decode(&mut blob, &registry).unwrap();
//! assert_eq!(*back.downcast_ref::<Ping>().unwrap(), ping);
//! ```

mod codec;
mod convert;
mod descriptor;
mod factory;
mod field;
mod raw;
mod wire_id;

pub use codec::Codec;
pub use convert::{BoxedConverter, Converter, ConverterRegistry};
pub use descriptor::{DescriptorBuilder, FieldDescriptor, MessageDescriptor};
pub use factory::{CodecRegistry, CompositeFactory, SerializerFactory};
pub(crate) use factory::MessageHook;
pub use field::MAX_COLLECTION_LEN;
pub use raw::{RawKind, RawValue, TickDuration, Timestamp, TICKS_PER_SECOND};
pub use wire_id::{murmur3_32, wire_id, WIRE_ID_SEED};
