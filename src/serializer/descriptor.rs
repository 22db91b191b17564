//! Message type descriptors.
//!
//! A [`MessageDescriptor`] is the declarative registration record the codec
//! builder consumes: logical name, size hint, and one entry per serializable
//! field with its declared shape and an accessor pair. Descriptors are built
//! once through the typed [`DescriptorBuilder`] and immutable afterwards.
//!
//! Field names are ordering keys only — they never reach the wire. The codec
//! sorts fields lexicographically by name, so the same names must be declared
//! on both peers for the flat value sequence to line up.
//!
//! # Example
//!
//! ```
//! use wirebus::MessageDescriptor;
//!
//! #[derive(Default)]
//! struct Ping {
//!     count: i32,
//!     tag: String,
//! }
//!
//! let descriptor = MessageDescriptor::builder::<Ping>()
//!     .size_hint(16)
//!     .scalar("count", |m: &Ping| m.count, |m, v| m.count = v)
//!     .scalar("tag", |m: &Ping| m.tag.clone(), |m, v| m.tag = v)
//!     .build();
//! assert_eq!(descriptor.logical_name(), "Ping");
//! ```

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::Arc;

use super::raw::RawValue;
use crate::error::{Result, WirebusError};
use crate::message::Payload;

pub(crate) type ConstructFn = Arc<dyn Fn() -> Box<dyn Payload> + Send + Sync>;

pub(crate) type ScalarGet = Arc<dyn Fn(&dyn Any) -> Box<dyn Any + Send> + Send + Sync>;
pub(crate) type ScalarSet =
    Arc<dyn Fn(&mut dyn Any, Box<dyn Any + Send>) -> Result<()> + Send + Sync>;
pub(crate) type PolyGet =
    Arc<dyn for<'a> Fn(&'a dyn Any) -> Option<&'a dyn Payload> + Send + Sync>;
pub(crate) type PolySet =
    Arc<dyn Fn(&mut dyn Any, Option<Box<dyn Payload>>) -> Result<()> + Send + Sync>;
pub(crate) type ListGet =
    Arc<dyn Fn(&dyn Any) -> Option<Vec<Box<dyn Any + Send>>> + Send + Sync>;
pub(crate) type ListSet =
    Arc<dyn Fn(&mut dyn Any, Option<Vec<Box<dyn Any + Send>>>) -> Result<()> + Send + Sync>;
type Pair = (Box<dyn Any + Send>, Box<dyn Any + Send>);
pub(crate) type MapGet = Arc<dyn Fn(&dyn Any) -> Option<Vec<Pair>> + Send + Sync>;
pub(crate) type MapSet = Arc<dyn Fn(&mut dyn Any, Option<Vec<Pair>>) -> Result<()> + Send + Sync>;
pub(crate) type RawGet = Arc<dyn Fn(&dyn Any) -> Option<RawValue> + Send + Sync>;
pub(crate) type RawSet = Arc<dyn Fn(&mut dyn Any, Option<RawValue>) -> Result<()> + Send + Sync>;
pub(crate) type RawArrayGet = Arc<dyn Fn(&dyn Any) -> Option<Vec<RawValue>> + Send + Sync>;
pub(crate) type RawArraySet =
    Arc<dyn Fn(&mut dyn Any, Option<Vec<RawValue>>) -> Result<()> + Send + Sync>;

/// Declared shape of one field, with its type-erased accessor pair.
pub(crate) enum FieldKind {
    /// Primitive or nested message type; resolved when the codec is built.
    Scalar {
        ty: TypeId,
        ty_name: &'static str,
        get: ScalarGet,
        set: ScalarSet,
    },
    /// Nested field whose codec is re-resolved from the runtime value.
    Polymorphic { get: PolyGet, set: PolySet },
    /// Homogeneous collection of a recursively resolved element type.
    List {
        elem: TypeId,
        elem_name: &'static str,
        get: ListGet,
        set: ListSet,
    },
    /// Dictionary with recursively resolved key and value types.
    Map {
        key: TypeId,
        key_name: &'static str,
        value: TypeId,
        value_name: &'static str,
        get: MapGet,
        set: MapSet,
    },
    /// Boxed any-value scalar.
    Raw { get: RawGet, set: RawSet },
    /// Array of boxed any-values.
    RawArray { get: RawArrayGet, set: RawArraySet },
}

/// One serializable field: ordering name plus declared shape.
pub struct FieldDescriptor {
    pub(crate) name: String,
    pub(crate) kind: FieldKind,
}

impl FieldDescriptor {
    /// The logical field name (ordering key).
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Immutable registration record for one message or value type.
pub struct MessageDescriptor {
    type_id: TypeId,
    type_name: &'static str,
    logical_name: String,
    size_hint: usize,
    construct: ConstructFn,
    fields: Vec<FieldDescriptor>,
}

impl MessageDescriptor {
    /// Start building a descriptor for `M`.
    ///
    /// The logical name defaults to the bare type name; override it with
    /// [`DescriptorBuilder::logical_name`] when wire identity must not follow
    /// the Rust name.
    pub fn builder<M: Any + Send + Default>() -> DescriptorBuilder<M> {
        DescriptorBuilder {
            logical_name: None,
            size_hint: 0,
            fields: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// `TypeId` of the described type.
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Bare Rust name of the described type.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Logical name the wire identifier is derived from.
    pub fn logical_name(&self) -> &str {
        &self.logical_name
    }

    /// Pre-sizing hint for outbound buffers, in bytes (0 = unknown).
    pub fn size_hint(&self) -> usize {
        self.size_hint
    }

    /// Declared fields, in declaration order.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub(crate) fn construct(&self) -> &ConstructFn {
        &self.construct
    }
}

/// Strip the module path (and nothing else) off a type name.
pub(crate) fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    full.rsplit("::").next().unwrap_or(full)
}

fn owner_ref<M: Any>(owner: &dyn Any) -> &M {
    owner
        .downcast_ref::<M>()
        .expect("field accessor invoked with a foreign owner type")
}

fn owner_mut<M: Any>(owner: &mut dyn Any) -> &mut M {
    owner
        .downcast_mut::<M>()
        .expect("field accessor invoked with a foreign owner type")
}

fn element_mismatch<T>() -> WirebusError {
    WirebusError::Decode(format!(
        "decoded element is not a `{}`",
        short_type_name::<T>()
    ))
}

/// Typed builder assembling the erased accessor table for `M`.
pub struct DescriptorBuilder<M> {
    logical_name: Option<String>,
    size_hint: usize,
    fields: Vec<FieldDescriptor>,
    _marker: PhantomData<fn(M)>,
}

impl<M: Any + Send + Default> DescriptorBuilder<M> {
    /// Override the logical name (defaults to the bare type name).
    pub fn logical_name(mut self, name: impl Into<String>) -> Self {
        self.logical_name = Some(name.into());
        self
    }

    /// Set the buffer pre-sizing hint in bytes.
    pub fn size_hint(mut self, bytes: usize) -> Self {
        self.size_hint = bytes;
        self
    }

    /// Declare a scalar field: a registered primitive or a nested registered
    /// type, decided when the codec is built.
    pub fn scalar<T, G, S>(mut self, name: &str, get: G, set: S) -> Self
    where
        T: Any + Send + Clone,
        G: Fn(&M) -> T + Send + Sync + 'static,
        S: Fn(&mut M, T) + Send + Sync + 'static,
    {
        let getter: ScalarGet = Arc::new(move |owner| Box::new(get(owner_ref::<M>(owner))));
        let setter: ScalarSet = Arc::new(move |owner, value| {
            let v = value.downcast::<T>().map_err(|_| element_mismatch::<T>())?;
            set(owner_mut::<M>(owner), *v);
            Ok(())
        });
        self.fields.push(FieldDescriptor {
            name: name.to_string(),
            kind: FieldKind::Scalar {
                ty: TypeId::of::<T>(),
                ty_name: short_type_name::<T>(),
                get: getter,
                set: setter,
            },
        });
        self
    }

    /// Declare a polymorphic nested field: the codec is re-resolved from the
    /// runtime value on every encode, and a leading wire identifier selects
    /// the concrete codec on decode.
    pub fn polymorphic<G, S>(mut self, name: &str, get: G, set: S) -> Self
    where
        G: for<'a> Fn(&'a M) -> Option<&'a dyn Payload> + Send + Sync + 'static,
        S: Fn(&mut M, Option<Box<dyn Payload>>) + Send + Sync + 'static,
    {
        let getter: PolyGet = Arc::new(move |owner: &dyn Any| get(owner_ref::<M>(owner)));
        let setter: PolySet = Arc::new(move |owner, value| {
            set(owner_mut::<M>(owner), value);
            Ok(())
        });
        self.fields.push(FieldDescriptor {
            name: name.to_string(),
            kind: FieldKind::Polymorphic {
                get: getter,
                set: setter,
            },
        });
        self
    }

    /// Declare a homogeneous collection field. `None` and empty are distinct
    /// on the wire (count+1 convention).
    pub fn list<T, G, S>(mut self, name: &str, get: G, set: S) -> Self
    where
        T: Any + Send + Clone,
        G: Fn(&M) -> Option<Vec<T>> + Send + Sync + 'static,
        S: Fn(&mut M, Option<Vec<T>>) + Send + Sync + 'static,
    {
        let getter: ListGet = Arc::new(move |owner| {
            get(owner_ref::<M>(owner)).map(|items| {
                items
                    .into_iter()
                    .map(|e| Box::new(e) as Box<dyn Any + Send>)
                    .collect()
            })
        });
        let setter: ListSet = Arc::new(move |owner, items| {
            let rebuilt = match items {
                None => None,
                Some(erased) => {
                    let mut out = Vec::with_capacity(erased.len());
                    for e in erased {
                        out.push(*e.downcast::<T>().map_err(|_| element_mismatch::<T>())?);
                    }
                    Some(out)
                }
            };
            set(owner_mut::<M>(owner), rebuilt);
            Ok(())
        });
        self.fields.push(FieldDescriptor {
            name: name.to_string(),
            kind: FieldKind::List {
                elem: TypeId::of::<T>(),
                elem_name: short_type_name::<T>(),
                get: getter,
                set: setter,
            },
        });
        self
    }

    /// Declare a dictionary field. `None` and empty are distinct on the wire
    /// (count+1 convention); entries encode as alternating key/value.
    pub fn map<K, V, G, S>(mut self, name: &str, get: G, set: S) -> Self
    where
        K: Any + Send + Clone + Eq + Hash,
        V: Any + Send + Clone,
        G: Fn(&M) -> Option<HashMap<K, V>> + Send + Sync + 'static,
        S: Fn(&mut M, Option<HashMap<K, V>>) + Send + Sync + 'static,
    {
        let getter: MapGet = Arc::new(move |owner| {
            get(owner_ref::<M>(owner)).map(|entries| {
                entries
                    .into_iter()
                    .map(|(k, v)| {
                        (
                            Box::new(k) as Box<dyn Any + Send>,
                            Box::new(v) as Box<dyn Any + Send>,
                        )
                    })
                    .collect()
            })
        });
        let setter: MapSet = Arc::new(move |owner, entries| {
            let rebuilt = match entries {
                None => None,
                Some(erased) => {
                    let mut out = HashMap::with_capacity(erased.len());
                    for (k, v) in erased {
                        let k = *k.downcast::<K>().map_err(|_| element_mismatch::<K>())?;
                        let v = *v.downcast::<V>().map_err(|_| element_mismatch::<V>())?;
                        out.insert(k, v);
                    }
                    Some(out)
                }
            };
            set(owner_mut::<M>(owner), rebuilt);
            Ok(())
        });
        self.fields.push(FieldDescriptor {
            name: name.to_string(),
            kind: FieldKind::Map {
                key: TypeId::of::<K>(),
                key_name: short_type_name::<K>(),
                value: TypeId::of::<V>(),
                value_name: short_type_name::<V>(),
                get: getter,
                set: setter,
            },
        });
        self
    }

    /// Declare a boxed any-value field.
    pub fn raw<G, S>(mut self, name: &str, get: G, set: S) -> Self
    where
        G: Fn(&M) -> Option<RawValue> + Send + Sync + 'static,
        S: Fn(&mut M, Option<RawValue>) + Send + Sync + 'static,
    {
        let getter: RawGet = Arc::new(move |owner| get(owner_ref::<M>(owner)));
        let setter: RawSet = Arc::new(move |owner, value| {
            set(owner_mut::<M>(owner), value);
            Ok(())
        });
        self.fields.push(FieldDescriptor {
            name: name.to_string(),
            kind: FieldKind::Raw {
                get: getter,
                set: setter,
            },
        });
        self
    }

    /// Declare an array-of-any-values field; elements may be heterogeneous.
    pub fn raw_array<G, S>(mut self, name: &str, get: G, set: S) -> Self
    where
        G: Fn(&M) -> Option<Vec<RawValue>> + Send + Sync + 'static,
        S: Fn(&mut M, Option<Vec<RawValue>>) + Send + Sync + 'static,
    {
        let getter: RawArrayGet = Arc::new(move |owner| get(owner_ref::<M>(owner)));
        let setter: RawArraySet = Arc::new(move |owner, value| {
            set(owner_mut::<M>(owner), value);
            Ok(())
        });
        self.fields.push(FieldDescriptor {
            name: name.to_string(),
            kind: FieldKind::RawArray {
                get: getter,
                set: setter,
            },
        });
        self
    }

    /// Finish the descriptor.
    pub fn build(self) -> MessageDescriptor {
        MessageDescriptor {
            type_id: TypeId::of::<M>(),
            type_name: short_type_name::<M>(),
            logical_name: self
                .logical_name
                .unwrap_or_else(|| short_type_name::<M>().to_string()),
            size_hint: self.size_hint,
            construct: Arc::new(|| Box::new(M::default())),
            fields: self.fields,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default, Clone)]
    struct Thing {
        number: i32,
        label: String,
    }

    #[test]
    fn test_logical_name_defaults_to_bare_type_name() {
        let d = MessageDescriptor::builder::<Thing>().build();
        assert_eq!(d.logical_name(), "Thing");
        assert_eq!(d.type_name(), "Thing");
        assert_eq!(d.type_id(), TypeId::of::<Thing>());
    }

    #[test]
    fn test_logical_name_override() {
        let d = MessageDescriptor::builder::<Thing>()
            .logical_name("LegacyThing")
            .build();
        assert_eq!(d.logical_name(), "LegacyThing");
        assert_eq!(d.type_name(), "Thing");
    }

    #[test]
    fn test_scalar_accessors_round_trip() {
        let d = MessageDescriptor::builder::<Thing>()
            .scalar("number", |m: &Thing| m.number, |m, v| m.number = v)
            .build();

        let FieldKind::Scalar { get, set, .. } = &d.fields()[0].kind else {
            panic!("expected scalar field");
        };

        let mut thing = Thing {
            number: 9,
            label: String::new(),
        };
        let value = (**get)(&thing);
        assert_eq!(*value.downcast_ref::<i32>().unwrap(), 9);

        (**set)(&mut thing, Box::new(5_i32)).unwrap();
        assert_eq!(thing.number, 5);

        let err = (**set)(&mut thing, Box::new("wrong")).unwrap_err();
        assert!(matches!(err, WirebusError::Decode(_)));
    }

    #[test]
    fn test_construct_uses_default() {
        let d = MessageDescriptor::builder::<Thing>().build();
        let fresh = (**d.construct())();
        assert_eq!(fresh.downcast_ref::<Thing>().unwrap().number, 0);
    }

    #[test]
    fn test_fields_keep_declaration_order() {
        let d = MessageDescriptor::builder::<Thing>()
            .scalar("number", |m: &Thing| m.number, |m, v| m.number = v)
            .scalar("label", |m: &Thing| m.label.clone(), |m, v| m.label = v)
            .build();
        let names: Vec<_> = d.fields().iter().map(|f| f.name()).collect();
        assert_eq!(names, ["number", "label"]);
    }
}
