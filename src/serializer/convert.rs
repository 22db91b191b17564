//! Primitive converter registry.
//!
//! Maps each supported primitive type to a writer/reader pair. Entries are
//! stored type-erased so a field codec can drive them through `&dyn Any`, and
//! every entry receives a compact `u16` tag in registration order. The tags are
//! only consumed by the raw-boxed field codecs, which use the registry's boxed
//! table to self-describe a value's concrete kind on the wire.
//!
//! Registering a scalar automatically derives the matching homogeneous
//! `Vec<T>` converter (plain `u16` count prefix plus elements), so
//! list-of-primitive works for every registered scalar, including ones added
//! after construction.
//!
//! Late registrations become visible to codecs built afterwards; codecs built
//! earlier keep the converter handles they captured.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::raw::{self, RawKind, RawValue, TickDuration, Timestamp};
use crate::blob::BinaryBlob;
use crate::error::{Result, WirebusError};

type WriteFn = Box<dyn Fn(&mut BinaryBlob, &dyn Any) -> Result<()> + Send + Sync>;
type ReadFn = Box<dyn Fn(&mut BinaryBlob) -> Result<Box<dyn Any + Send>> + Send + Sync>;

/// A registered primitive converter: type-erased writer/reader plus its tag.
pub struct Converter {
    tag: u16,
    type_name: &'static str,
    write: WriteFn,
    read: ReadFn,
}

impl Converter {
    /// Tag assigned at registration, used by raw-boxed encodings.
    pub fn tag(&self) -> u16 {
        self.tag
    }

    /// Name of the converted type, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Write a value that must be of the registered type.
    pub fn write_any(&self, blob: &mut BinaryBlob, value: &dyn Any) -> Result<()> {
        (self.write)(blob, value)
    }

    /// Read a value of the registered type.
    pub fn read_any(&self, blob: &mut BinaryBlob) -> Result<Box<dyn Any + Send>> {
        (self.read)(blob)
    }
}

/// Boxed converter handle for one raw-value kind.
///
/// Obtained from [`ConverterRegistry::boxed`]; (de)serializes a [`RawValue`]
/// when only its wire tag is known.
#[derive(Clone, Copy)]
pub struct BoxedConverter {
    kind: RawKind,
}

impl BoxedConverter {
    /// The raw-value kind this entry handles.
    pub fn kind(&self) -> RawKind {
        self.kind
    }

    /// Write the value's body. The value must match this entry's kind.
    pub fn write(&self, blob: &mut BinaryBlob, value: &RawValue) -> Result<()> {
        if value.kind() != self.kind {
            return Err(WirebusError::UnsupportedRawKind(value.kind().name()));
        }
        raw::write_value(blob, value);
        Ok(())
    }

    /// Read a value body of this entry's kind.
    pub fn read(&self, blob: &mut BinaryBlob) -> Result<RawValue> {
        raw::read_value(self.kind, blob)
    }
}

struct Inner {
    by_type: HashMap<TypeId, Arc<Converter>>,
    next_tag: u16,
    tag_kinds: HashMap<u16, RawKind>,
    kind_tags: HashMap<RawKind, u16>,
}

/// Registry of primitive converters, typed and boxed facets.
pub struct ConverterRegistry {
    inner: RwLock<Inner>,
}

impl ConverterRegistry {
    /// Create a registry pre-populated with the built-in primitive set:
    /// fixed-width integers, `f32`, `String`, [`TickDuration`], [`Timestamp`],
    /// and the derived `Vec<T>` of each.
    pub fn with_builtins() -> Self {
        let registry = Self {
            inner: RwLock::new(Inner {
                by_type: HashMap::new(),
                next_tag: 0,
                tag_kinds: HashMap::new(),
                kind_tags: HashMap::new(),
            }),
        };

        registry.register_pair(
            Some((RawKind::U8, RawKind::U8List)),
            |b, v: &u8| b.add_u8(*v),
            |b| b.read_u8(),
        );
        registry.register_pair(
            Some((RawKind::I8, RawKind::I8List)),
            |b, v: &i8| b.add_i8(*v),
            |b| b.read_i8(),
        );
        registry.register_pair(
            Some((RawKind::U16, RawKind::U16List)),
            |b, v: &u16| b.add_u16(*v),
            |b| b.read_u16(),
        );
        registry.register_pair(
            Some((RawKind::I16, RawKind::I16List)),
            |b, v: &i16| b.add_i16(*v),
            |b| b.read_i16(),
        );
        registry.register_pair(
            Some((RawKind::U32, RawKind::U32List)),
            |b, v: &u32| b.add_u32(*v),
            |b| b.read_u32(),
        );
        registry.register_pair(
            Some((RawKind::I32, RawKind::I32List)),
            |b, v: &i32| b.add_i32(*v),
            |b| b.read_i32(),
        );
        registry.register_pair(
            Some((RawKind::U64, RawKind::U64List)),
            |b, v: &u64| b.add_u64(*v),
            |b| b.read_u64(),
        );
        registry.register_pair(
            Some((RawKind::I64, RawKind::I64List)),
            |b, v: &i64| b.add_i64(*v),
            |b| b.read_i64(),
        );
        registry.register_pair(
            Some((RawKind::F32, RawKind::F32List)),
            |b, v: &f32| b.add_f32(*v),
            |b| b.read_f32(),
        );
        registry.register_pair(
            Some((RawKind::Str, RawKind::StrList)),
            |b, v: &String| b.add_string(v),
            |b| b.read_string(),
        );
        registry.register_pair(
            Some((RawKind::Duration, RawKind::DurationList)),
            |b, v: &TickDuration| b.add_i64(v.ticks()),
            |b| Ok(TickDuration::from_ticks(b.read_i64()?)),
        );
        registry.register_pair(
            Some((RawKind::Timestamp, RawKind::TimestampList)),
            |b, v: &Timestamp| b.add_i64(v.ticks()),
            |b| Ok(Timestamp::from_ticks(b.read_i64()?)),
        );

        registry
    }

    /// Register a converter for `T` (and derive `Vec<T>` alongside it).
    ///
    /// Codecs built after this call can use `T` as a primitive field type;
    /// codecs built earlier are unaffected.
    pub fn register<T, W, R>(&self, write: W, read: R)
    where
        T: Any + Send + Clone,
        W: Fn(&mut BinaryBlob, &T) + Send + Sync + 'static,
        R: Fn(&mut BinaryBlob) -> Result<T> + Send + Sync + 'static,
    {
        self.register_pair::<T, W, R>(None, write, read);
    }

    fn register_pair<T, W, R>(&self, kinds: Option<(RawKind, RawKind)>, write: W, read: R)
    where
        T: Any + Send + Clone,
        W: Fn(&mut BinaryBlob, &T) + Send + Sync + 'static,
        R: Fn(&mut BinaryBlob) -> Result<T> + Send + Sync + 'static,
    {
        let write = Arc::new(write);
        let read = Arc::new(read);
        let type_name = std::any::type_name::<T>();

        let scalar_write: WriteFn = {
            let write = write.clone();
            Box::new(move |blob, value| {
                let v = value.downcast_ref::<T>().ok_or_else(|| {
                    WirebusError::Encode(format!("converter for `{type_name}` fed a foreign value"))
                })?;
                (*write)(blob, v);
                Ok(())
            })
        };
        let scalar_read: ReadFn = {
            let read = read.clone();
            Box::new(move |blob| Ok(Box::new((*read)(blob)?) as Box<dyn Any + Send>))
        };

        // Derived homogeneous list: u16 count prefix plus element bodies.
        let list_write: WriteFn = Box::new(move |blob, value| {
            let items = value.downcast_ref::<Vec<T>>().ok_or_else(|| {
                WirebusError::Encode(format!("converter for `Vec<{type_name}>` fed a foreign value"))
            })?;
            blob.add_u16(items.len() as u16);
            for v in items {
                (*write)(blob, v);
            }
            Ok(())
        });
        let list_read: ReadFn = Box::new(move |blob| {
            let count = blob.read_u16()? as usize;
            let mut items = Vec::with_capacity(count);
            for _ in 0..count {
                items.push((*read)(blob)?);
            }
            Ok(Box::new(items) as Box<dyn Any + Send>)
        });

        let mut inner = self.inner.write().expect("converter registry poisoned");
        let scalar_tag = inner.next_tag;
        let list_tag = scalar_tag + 1;
        inner.next_tag += 2;

        inner.by_type.insert(
            TypeId::of::<T>(),
            Arc::new(Converter {
                tag: scalar_tag,
                type_name,
                write: scalar_write,
                read: scalar_read,
            }),
        );
        inner.by_type.insert(
            TypeId::of::<Vec<T>>(),
            Arc::new(Converter {
                tag: list_tag,
                type_name: std::any::type_name::<Vec<T>>(),
                write: list_write,
                read: list_read,
            }),
        );

        if let Some((scalar_kind, list_kind)) = kinds {
            inner.tag_kinds.insert(scalar_tag, scalar_kind);
            inner.tag_kinds.insert(list_tag, list_kind);
            inner.kind_tags.insert(scalar_kind, scalar_tag);
            inner.kind_tags.insert(list_kind, list_tag);
        }
    }

    /// Look up the typed converter for `T`'s `TypeId`.
    pub fn lookup(&self, ty: TypeId) -> Option<Arc<Converter>> {
        self.inner
            .read()
            .expect("converter registry poisoned")
            .by_type
            .get(&ty)
            .cloned()
    }

    /// Look up the boxed converter for a wire tag.
    ///
    /// Only built-in entries have one; custom converters registered later are
    /// invisible to the raw-boxed path by design.
    pub fn boxed(&self, tag: u16) -> Option<BoxedConverter> {
        self.inner
            .read()
            .expect("converter registry poisoned")
            .tag_kinds
            .get(&tag)
            .map(|&kind| BoxedConverter { kind })
    }

    /// The wire tag for a raw-value kind.
    pub fn tag_of(&self, kind: RawKind) -> Option<u16> {
        self.inner
            .read()
            .expect("converter registry poisoned")
            .kind_tags
            .get(&kind)
            .copied()
    }

}

impl Default for ConverterRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_scalar_round_trip() {
        let registry = ConverterRegistry::with_builtins();
        let conv = registry.lookup(TypeId::of::<i32>()).unwrap();

        let mut blob = BinaryBlob::with_capacity(16);
        conv.write_any(&mut blob, &42_i32).unwrap();
        let back = conv.read_any(&mut blob).unwrap();
        assert_eq!(*back.downcast::<i32>().unwrap(), 42);
    }

    #[test]
    fn test_builtin_list_round_trip() {
        let registry = ConverterRegistry::with_builtins();
        let conv = registry.lookup(TypeId::of::<Vec<String>>()).unwrap();

        let values = vec!["a".to_string(), String::new(), "c".to_string()];
        let mut blob = BinaryBlob::with_capacity(64);
        conv.write_any(&mut blob, &values).unwrap();
        let back = conv.read_any(&mut blob).unwrap();
        assert_eq!(*back.downcast::<Vec<String>>().unwrap(), values);
    }

    #[test]
    fn test_type_mismatch_is_an_error() {
        let registry = ConverterRegistry::with_builtins();
        let conv = registry.lookup(TypeId::of::<i32>()).unwrap();

        let mut blob = BinaryBlob::with_capacity(16);
        let err = conv.write_any(&mut blob, &"nope").unwrap_err();
        assert!(matches!(err, WirebusError::Encode(_)));
    }

    #[test]
    fn test_boxed_table_covers_builtins() {
        let registry = ConverterRegistry::with_builtins();

        let tag = registry.tag_of(RawKind::Str).unwrap();
        let entry = registry.boxed(tag).unwrap();
        assert_eq!(entry.kind(), RawKind::Str);

        let mut blob = BinaryBlob::with_capacity(16);
        entry
            .write(&mut blob, &RawValue::Str("x".to_string()))
            .unwrap();
        assert_eq!(entry.read(&mut blob).unwrap(), RawValue::Str("x".into()));
    }

    #[test]
    fn test_boxed_rejects_kind_mismatch() {
        let registry = ConverterRegistry::with_builtins();
        let tag = registry.tag_of(RawKind::I32).unwrap();
        let entry = registry.boxed(tag).unwrap();

        let mut blob = BinaryBlob::with_capacity(16);
        let err = entry.write(&mut blob, &RawValue::Str("x".into())).unwrap_err();
        assert!(matches!(err, WirebusError::UnsupportedRawKind(_)));
    }

    #[test]
    fn test_custom_converter_registration() {
        #[derive(Clone, PartialEq, Debug)]
        struct Rgb(u8, u8, u8);

        let registry = ConverterRegistry::with_builtins();
        registry.register::<Rgb, _, _>(
            |b, v| {
                b.add_u8(v.0);
                b.add_u8(v.1);
                b.add_u8(v.2);
            },
            |b| Ok(Rgb(b.read_u8()?, b.read_u8()?, b.read_u8()?)),
        );

        let conv = registry.lookup(TypeId::of::<Rgb>()).unwrap();
        let mut blob = BinaryBlob::with_capacity(8);
        conv.write_any(&mut blob, &Rgb(1, 2, 3)).unwrap();
        assert_eq!(
            *conv.read_any(&mut blob).unwrap().downcast::<Rgb>().unwrap(),
            Rgb(1, 2, 3)
        );

        // Derived list comes along for free.
        assert!(registry.lookup(TypeId::of::<Vec<Rgb>>()).is_some());
        // But raw-boxed stays closed.
        assert!(registry.boxed(conv.tag()).is_none());
    }

    #[test]
    fn test_tags_are_stable_registration_order() {
        let a = ConverterRegistry::with_builtins();
        let b = ConverterRegistry::with_builtins();
        for ty in [TypeId::of::<u8>(), TypeId::of::<String>(), TypeId::of::<Vec<i64>>()] {
            assert_eq!(a.lookup(ty).unwrap().tag(), b.lookup(ty).unwrap().tag());
        }
    }
}
