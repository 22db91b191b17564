//! Per-type codec and the codec construction algorithm.
//!
//! A [`Codec`] serializes one concrete type by running an ordered list of
//! field codecs that was assembled once, when the type's descriptor was first
//! built. Field order is lexicographic by logical field name — both peers
//! derive the same order from the same names, so the wire carries a flat value
//! sequence with no field tags.
//!
//! Shape classification happens here, per field:
//!
//! 1. dictionary → key/value element codecs, resolved recursively
//! 2. collection → one element codec, resolved recursively
//! 3. raw scalar / raw array → bound to the converter registry's boxed table
//! 4. scalar with a registered converter → primitive
//! 5. scalar with a registered descriptor → nested message codec
//! 6. anything else → configuration error naming the owning type and field
//!
//! Construction failures are configuration errors: they surface at
//! registration/warm-up, never during steady-state traffic.

use std::any::{Any, TypeId};
use std::sync::Arc;

use super::convert::ConverterRegistry;
use super::descriptor::{ConstructFn, FieldKind, MessageDescriptor};
use super::factory::{CodecRegistry, SerializerFactory};
use super::field::{self, ElementCodec, FieldCodec};
use super::wire_id::wire_id;
use crate::blob::BinaryBlob;
use crate::error::{Result, WirebusError};
use crate::message::Payload;

/// Immutable codec for one registered type.
pub struct Codec {
    type_id: TypeId,
    type_name: &'static str,
    logical_name: String,
    wire_id: u32,
    size_hint: usize,
    construct: ConstructFn,
    fields: Vec<FieldCodec>,
}

impl Codec {
    /// Build a codec from a descriptor, resolving nested codecs through
    /// `factory`.
    pub(crate) fn build(
        descriptor: &MessageDescriptor,
        converters: &Arc<ConverterRegistry>,
        factory: &CodecRegistry,
    ) -> Result<Self> {
        let mut ordered: Vec<&super::descriptor::FieldDescriptor> =
            descriptor.fields().iter().collect();
        ordered.sort_by(|a, b| a.name.cmp(&b.name));

        let mut fields = Vec::with_capacity(ordered.len());
        for fd in ordered {
            let name = fd.name.clone();
            let codec = match &fd.kind {
                FieldKind::Map {
                    key,
                    key_name,
                    value,
                    value_name,
                    get,
                    set,
                } => {
                    let key_codec = resolve_element(descriptor, &name, *key, key_name, converters, factory)?;
                    let value_codec =
                        resolve_element(descriptor, &name, *value, value_name, converters, factory)?;
                    field::map(name, get.clone(), set.clone(), key_codec, value_codec)
                }
                FieldKind::List {
                    elem,
                    elem_name,
                    get,
                    set,
                } => {
                    let elem_codec =
                        resolve_element(descriptor, &name, *elem, elem_name, converters, factory)?;
                    field::list(name, get.clone(), set.clone(), elem_codec)
                }
                FieldKind::Raw { get, set } => {
                    field::raw(get.clone(), set.clone(), converters.clone())
                }
                FieldKind::RawArray { get, set } => {
                    field::raw_array(name, get.clone(), set.clone(), converters.clone())
                }
                FieldKind::Scalar { ty, ty_name, get, set } => {
                    match resolve_element(descriptor, &name, *ty, ty_name, converters, factory)? {
                        ElementCodec::Primitive(conv) => {
                            field::primitive(get.clone(), set.clone(), conv)
                        }
                        ElementCodec::Nested(codec) => {
                            field::nested(get.clone(), set.clone(), codec)
                        }
                    }
                }
                FieldKind::Polymorphic { get, set } => {
                    field::polymorphic(name, get.clone(), set.clone())
                }
            };
            fields.push(codec);
        }

        Ok(Self {
            type_id: descriptor.type_id(),
            type_name: descriptor.type_name(),
            logical_name: descriptor.logical_name().to_string(),
            wire_id: wire_id(descriptor.logical_name()),
            size_hint: descriptor.size_hint(),
            construct: descriptor.construct().clone(),
            fields,
        })
    }

    /// `TypeId` of the type this codec serializes.
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Bare Rust name of the serialized type.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Logical name the wire identifier derives from.
    pub fn logical_name(&self) -> &str {
        &self.logical_name
    }

    /// The 32-bit on-wire identifier of the serialized type.
    pub fn wire_id(&self) -> u32 {
        self.wire_id
    }

    /// Buffer pre-sizing hint in bytes (0 = unknown).
    pub fn size_hint(&self) -> usize {
        self.size_hint
    }

    /// Encode `value` (which must be of this codec's type) into `blob`.
    ///
    /// Writes the field sequence only; the caller owns the leading wire
    /// identifier of the envelope.
    pub fn encode(
        &self,
        value: &dyn Any,
        blob: &mut BinaryBlob,
        resolver: &dyn SerializerFactory,
    ) -> Result<()> {
        for fc in &self.fields {
            fc.encode(value, blob, resolver)?;
        }
        Ok(())
    }

    /// Decode a fresh instance from `blob`.
    pub fn decode(
        &self,
        blob: &mut BinaryBlob,
        resolver: &dyn SerializerFactory,
    ) -> Result<Box<dyn Payload>> {
        let mut value = (*self.construct)();
        for fc in &self.fields {
            fc.decode((*value).as_any_mut(), blob, resolver)?;
        }
        Ok(value)
    }
}

fn resolve_element(
    owner: &MessageDescriptor,
    fname: &str,
    ty: TypeId,
    ty_name: &str,
    converters: &Arc<ConverterRegistry>,
    factory: &CodecRegistry,
) -> Result<ElementCodec> {
    if let Some(conv) = converters.lookup(ty) {
        return Ok(ElementCodec::Primitive(conv));
    }
    match factory.build(ty)? {
        Some(codec) => Ok(ElementCodec::Nested(codec)),
        None => Err(WirebusError::Config {
            type_name: owner.type_name(),
            field: fname.to_string(),
            reason: format!(
                "`{ty_name}` is neither a registered primitive converter nor a registered type"
            ),
        }),
    }
}
