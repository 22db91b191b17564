//! Field codec strategies.
//!
//! A [`FieldCodec`] encodes/decodes exactly one field of an owning instance.
//! Each constructor below fixes one wire shape:
//!
//! - primitive: the registered converter's body, nothing else
//! - nested: the declared type's field sequence, no identifier
//! - polymorphic: `[u32 wire id | 0 = null][concrete field sequence]`
//! - list/map: `[u16 count+1 | 0 = null][element encodings]`
//! - raw: `[u16 tag+1 | 0 = null][boxed value]`
//! - raw array: `[u16 count+1 | 0 = null][count x (u16 tag+1)(boxed value)]`
//!
//! The count+1 / tag+1 conventions reserve `0` for "null reference", which is
//! what lets decode distinguish an absent collection from an empty one without
//! a separate presence flag.

use std::any::Any;
use std::sync::Arc;

use super::codec::Codec;
use super::convert::{Converter, ConverterRegistry};
use super::descriptor::{
    ListGet, ListSet, MapGet, MapSet, PolyGet, PolySet, RawArrayGet, RawArraySet, RawGet, RawSet,
    ScalarGet, ScalarSet,
};
use super::factory::SerializerFactory;
use crate::blob::BinaryBlob;
use crate::error::{Result, WirebusError};
use crate::message::Payload;

/// Highest element count a collection field can carry (`u16::MAX - 1`,
/// because the stored value is count+1).
pub const MAX_COLLECTION_LEN: usize = u16::MAX as usize - 1;

type EncodeFn =
    Box<dyn Fn(&dyn Any, &mut BinaryBlob, &dyn SerializerFactory) -> Result<()> + Send + Sync>;
type DecodeFn =
    Box<dyn Fn(&mut dyn Any, &mut BinaryBlob, &dyn SerializerFactory) -> Result<()> + Send + Sync>;

/// Strategy object for one field of a message type.
pub(crate) struct FieldCodec {
    encode: EncodeFn,
    decode: DecodeFn,
}

impl FieldCodec {
    pub(crate) fn encode(
        &self,
        owner: &dyn Any,
        blob: &mut BinaryBlob,
        resolver: &dyn SerializerFactory,
    ) -> Result<()> {
        (self.encode)(owner, blob, resolver)
    }

    pub(crate) fn decode(
        &self,
        owner: &mut dyn Any,
        blob: &mut BinaryBlob,
        resolver: &dyn SerializerFactory,
    ) -> Result<()> {
        (self.decode)(owner, blob, resolver)
    }
}

/// Codec for one collection element or dictionary key/value slot.
#[derive(Clone)]
pub(crate) enum ElementCodec {
    Primitive(Arc<Converter>),
    Nested(Arc<Codec>),
}

impl ElementCodec {
    fn encode(
        &self,
        value: &dyn Any,
        blob: &mut BinaryBlob,
        resolver: &dyn SerializerFactory,
    ) -> Result<()> {
        match self {
            Self::Primitive(conv) => conv.write_any(blob, value),
            Self::Nested(codec) => codec.encode(value, blob, resolver),
        }
    }

    fn decode(
        &self,
        blob: &mut BinaryBlob,
        resolver: &dyn SerializerFactory,
    ) -> Result<Box<dyn Any + Send>> {
        match self {
            Self::Primitive(conv) => conv.read_any(blob),
            Self::Nested(codec) => Ok(codec.decode(blob, resolver)?.into_any()),
        }
    }
}

fn collection_len(len: usize, what: &str) -> Result<u16> {
    if len > MAX_COLLECTION_LEN {
        return Err(WirebusError::Encode(format!(
            "{what} holds {len} elements, wire limit is {MAX_COLLECTION_LEN}"
        )));
    }
    Ok(len as u16 + 1)
}

pub(crate) fn primitive(get: ScalarGet, set: ScalarSet, conv: Arc<Converter>) -> FieldCodec {
    let read = conv.clone();
    FieldCodec {
        encode: Box::new(move |owner, blob, _| {
            let value = (*get)(owner);
            conv.write_any(blob, &*value)
        }),
        decode: Box::new(move |owner, blob, _| {
            let value = read.read_any(blob)?;
            (*set)(owner, value)
        }),
    }
}

pub(crate) fn nested(get: ScalarGet, set: ScalarSet, codec: Arc<Codec>) -> FieldCodec {
    let read = codec.clone();
    FieldCodec {
        encode: Box::new(move |owner, blob, resolver| {
            let value = (*get)(owner);
            codec.encode(&*value, blob, resolver)
        }),
        decode: Box::new(move |owner, blob, resolver| {
            let value = read.decode(blob, resolver)?;
            (*set)(owner, value.into_any())
        }),
    }
}

pub(crate) fn polymorphic(name: String, get: PolyGet, set: PolySet) -> FieldCodec {
    let field = name;
    FieldCodec {
        encode: Box::new(move |owner, blob, resolver| {
            match (*get)(owner) {
                None => blob.add_u32(0),
                Some(value) => {
                    let ty = value.as_any().type_id();
                    match resolver.get_by_type(ty) {
                        Some(codec) => {
                            blob.add_u32(codec.wire_id());
                            codec.encode(value.as_any(), blob, resolver)?;
                        }
                        None => {
                            // Unregistered runtime type degrades to null, the
                            // stream stays well-formed.
                            tracing::warn!(
                                field = %field,
                                "no codec for runtime type of polymorphic value, encoding null"
                            );
                            blob.add_u32(0);
                        }
                    }
                }
            }
            Ok(())
        }),
        decode: Box::new(move |owner, blob, resolver| {
            let id = blob.read_u32()?;
            if id == 0 {
                return (*set)(owner, None);
            }
            let codec = resolver
                .get_by_id(id)
                .ok_or(WirebusError::UnknownWireId(id))?;
            let value = codec.decode(blob, resolver)?;
            (*set)(owner, Some(value))
        }),
    }
}

pub(crate) fn list(name: String, get: ListGet, set: ListSet, elem: ElementCodec) -> FieldCodec {
    let field = name;
    let read = elem.clone();
    FieldCodec {
        encode: Box::new(move |owner, blob, resolver| {
            match (*get)(owner) {
                None => blob.add_u16(0),
                Some(items) => {
                    blob.add_u16(collection_len(items.len(), &field)?);
                    for item in &items {
                        elem.encode(&**item, blob, resolver)?;
                    }
                }
            }
            Ok(())
        }),
        decode: Box::new(move |owner, blob, resolver| {
            let raw_count = blob.read_u16()?;
            if raw_count == 0 {
                return (*set)(owner, None);
            }
            let count = raw_count as usize - 1;
            let mut items = Vec::with_capacity(count);
            for _ in 0..count {
                items.push(read.decode(blob, resolver)?);
            }
            (*set)(owner, Some(items))
        }),
    }
}

pub(crate) fn map(
    name: String,
    get: MapGet,
    set: MapSet,
    key: ElementCodec,
    value: ElementCodec,
) -> FieldCodec {
    let field = name;
    let (key_read, value_read) = (key.clone(), value.clone());
    FieldCodec {
        encode: Box::new(move |owner, blob, resolver| {
            match (*get)(owner) {
                None => blob.add_u16(0),
                Some(entries) => {
                    blob.add_u16(collection_len(entries.len(), &field)?);
                    for (k, v) in &entries {
                        key.encode(&**k, blob, resolver)?;
                        value.encode(&**v, blob, resolver)?;
                    }
                }
            }
            Ok(())
        }),
        decode: Box::new(move |owner, blob, resolver| {
            let raw_count = blob.read_u16()?;
            if raw_count == 0 {
                return (*set)(owner, None);
            }
            let count = raw_count as usize - 1;
            let mut entries = Vec::with_capacity(count);
            for _ in 0..count {
                let k = key_read.decode(blob, resolver)?;
                let v = value_read.decode(blob, resolver)?;
                entries.push((k, v));
            }
            (*set)(owner, Some(entries))
        }),
    }
}

pub(crate) fn raw(
    get: RawGet,
    set: RawSet,
    converters: Arc<ConverterRegistry>,
) -> FieldCodec {
    let readers = converters.clone();
    FieldCodec {
        encode: Box::new(move |owner, blob, _| {
            match (*get)(owner) {
                None => blob.add_u16(0),
                Some(value) => {
                    let kind = value.kind();
                    let tag = converters
                        .tag_of(kind)
                        .ok_or(WirebusError::UnsupportedRawKind(kind.name()))?;
                    let entry = converters
                        .boxed(tag)
                        .ok_or(WirebusError::UnsupportedRawKind(kind.name()))?;
                    blob.add_u16(tag + 1);
                    entry.write(blob, &value)?;
                }
            }
            Ok(())
        }),
        decode: Box::new(move |owner, blob, _| {
            let stored = blob.read_u16()?;
            if stored == 0 {
                return (*set)(owner, None);
            }
            let tag = stored - 1;
            let entry = readers
                .boxed(tag)
                .ok_or_else(|| WirebusError::Decode(format!("unknown raw tag {tag}")))?;
            (*set)(owner, Some(entry.read(blob)?))
        }),
    }
}

pub(crate) fn raw_array(
    name: String,
    get: RawArrayGet,
    set: RawArraySet,
    converters: Arc<ConverterRegistry>,
) -> FieldCodec {
    let field = name;
    let readers = converters.clone();
    FieldCodec {
        encode: Box::new(move |owner, blob, _| {
            match (*get)(owner) {
                None => blob.add_u16(0),
                Some(items) => {
                    blob.add_u16(collection_len(items.len(), &field)?);
                    for value in &items {
                        let kind = value.kind();
                        let tag = converters
                            .tag_of(kind)
                            .ok_or(WirebusError::UnsupportedRawKind(kind.name()))?;
                        let entry = converters
                            .boxed(tag)
                            .ok_or(WirebusError::UnsupportedRawKind(kind.name()))?;
                        blob.add_u16(tag + 1);
                        entry.write(blob, value)?;
                    }
                }
            }
            Ok(())
        }),
        decode: Box::new(move |owner, blob, _| {
            let raw_count = blob.read_u16()?;
            if raw_count == 0 {
                return (*set)(owner, None);
            }
            let count = raw_count as usize - 1;
            let mut items = Vec::with_capacity(count);
            for _ in 0..count {
                let stored = blob.read_u16()?;
                let tag = stored.checked_sub(1).ok_or_else(|| {
                    WirebusError::Decode("null element inside a raw array".to_string())
                })?;
                let entry = readers
                    .boxed(tag)
                    .ok_or_else(|| WirebusError::Decode(format!("unknown raw tag {tag}")))?;
                items.push(entry.read(blob)?);
            }
            (*set)(owner, Some(items))
        }),
    }
}
