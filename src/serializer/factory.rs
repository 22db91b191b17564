//! Codec factories.
//!
//! [`CodecRegistry`] owns the descriptor table and the memoized codec caches:
//! one codec instance per type for the registry's lifetime, with the
//! identifier cache as its exact inverse. First-time builds race safely —
//! losers of the insert race discard their instance and adopt the winner's.
//!
//! [`CompositeFactory`] chains several factories and answers every lookup
//! with the first non-empty result, which lets a generated/static factory sit
//! in front of an ad-hoc one without rebuilding either.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::codec::Codec;
use super::convert::ConverterRegistry;
use super::descriptor::MessageDescriptor;
use super::wire_id::wire_id;
use crate::error::{Result, WirebusError};
use crate::message::{NetMessage, Payload};

/// Lookup-and-build surface shared by plain and composite factories.
pub trait SerializerFactory: Send + Sync {
    /// Codec for a type, without building (composite precedence relies on
    /// this never having side effects).
    fn get_by_type(&self, ty: TypeId) -> Option<Arc<Codec>>;

    /// Codec for a wire identifier, without building.
    fn get_by_id(&self, id: u32) -> Option<Arc<Codec>>;

    /// Construct-or-fetch the codec for a type.
    ///
    /// `Ok(None)` means the factory has no registration for the type;
    /// `Err` means the registration exists but its configuration is broken.
    fn build(&self, ty: TypeId) -> Result<Option<Arc<Codec>>>;
}

/// Bus-facing registration record of a network message type.
pub(crate) struct MessageHook {
    pub(crate) type_id: TypeId,
    pub(crate) type_name: &'static str,
    /// Downcast a decoded payload into the concrete message, marking it as
    /// having arrived from the network.
    pub(crate) into_net:
        Box<dyn Fn(Box<dyn Payload>) -> Option<Box<dyn NetMessage>> + Send + Sync>,
}

struct Inner {
    descriptors: HashMap<TypeId, Arc<MessageDescriptor>>,
    /// Wire id -> logical name, for collision detection at registration time.
    names: HashMap<u32, String>,
    by_type: HashMap<TypeId, Arc<Codec>>,
    by_id: HashMap<u32, Arc<Codec>>,
    hooks: HashMap<TypeId, Arc<MessageHook>>,
}

/// The default codec factory: descriptor table + memoized codec caches.
pub struct CodecRegistry {
    converters: Arc<ConverterRegistry>,
    inner: RwLock<Inner>,
}

impl CodecRegistry {
    /// Create a registry with the built-in primitive converter set.
    pub fn new() -> Self {
        Self::with_converters(Arc::new(ConverterRegistry::with_builtins()))
    }

    /// Create a registry around an existing converter registry.
    pub fn with_converters(converters: Arc<ConverterRegistry>) -> Self {
        Self {
            converters,
            inner: RwLock::new(Inner {
                descriptors: HashMap::new(),
                names: HashMap::new(),
                by_type: HashMap::new(),
                by_id: HashMap::new(),
                hooks: HashMap::new(),
            }),
        }
    }

    /// The converter registry codecs built here resolve primitives against.
    pub fn converters(&self) -> &Arc<ConverterRegistry> {
        &self.converters
    }

    /// Register a plain value type: usable as a nested/collection element but
    /// invisible to the bus.
    pub fn register_value(&self, descriptor: MessageDescriptor) -> Result<()> {
        self.insert_descriptor(descriptor, None)
    }

    /// Register a network message type. The bus subscribes to every type
    /// registered through this call.
    pub fn register_message<T: NetMessage>(&self, descriptor: MessageDescriptor) -> Result<()> {
        if descriptor.type_id() != TypeId::of::<T>() {
            return Err(WirebusError::Config {
                type_name: descriptor.type_name(),
                field: String::new(),
                reason: "descriptor registered under a different type parameter".to_string(),
            });
        }
        let hook = MessageHook {
            type_id: descriptor.type_id(),
            type_name: descriptor.type_name(),
            into_net: Box::new(|payload| {
                let mut msg: Box<T> = payload.downcast::<T>().ok()?;
                msg.provenance_mut().mark_remote();
                Some(msg)
            }),
        };
        self.insert_descriptor(descriptor, Some(hook))
    }

    fn insert_descriptor(
        &self,
        descriptor: MessageDescriptor,
        hook: Option<MessageHook>,
    ) -> Result<()> {
        let id = wire_id(descriptor.logical_name());
        let mut inner = self.inner.write().expect("codec registry poisoned");

        if inner.descriptors.contains_key(&descriptor.type_id())
            || inner.by_type.contains_key(&descriptor.type_id())
        {
            return Err(WirebusError::AlreadyRegistered(descriptor.type_name()));
        }
        if let Some(existing) = inner.names.get(&id) {
            if existing != descriptor.logical_name() {
                return Err(WirebusError::DuplicateWireId {
                    name: descriptor.logical_name().to_string(),
                    id,
                });
            }
            return Err(WirebusError::AlreadyRegistered(descriptor.type_name()));
        }

        inner.names.insert(id, descriptor.logical_name().to_string());
        if let Some(hook) = hook {
            inner.hooks.insert(descriptor.type_id(), Arc::new(hook));
        }
        inner
            .descriptors
            .insert(descriptor.type_id(), Arc::new(descriptor));
        Ok(())
    }

    /// Install a pre-built codec, bypassing descriptor-driven construction.
    ///
    /// Mirrors the custom-serializer override of classic factories: lookups
    /// for the codec's type and identifier answer with this instance.
    pub fn set_custom_codec(&self, codec: Arc<Codec>) -> Result<()> {
        let mut inner = self.inner.write().expect("codec registry poisoned");
        if inner.by_type.contains_key(&codec.type_id())
            || inner.descriptors.contains_key(&codec.type_id())
        {
            return Err(WirebusError::AlreadyRegistered(codec.type_name()));
        }
        if inner.names.contains_key(&codec.wire_id()) {
            return Err(WirebusError::DuplicateWireId {
                name: codec.logical_name().to_string(),
                id: codec.wire_id(),
            });
        }
        inner
            .names
            .insert(codec.wire_id(), codec.logical_name().to_string());
        inner.by_id.insert(codec.wire_id(), codec.clone());
        inner.by_type.insert(codec.type_id(), codec);
        Ok(())
    }

    /// Eagerly build every registered descriptor so configuration errors
    /// surface now instead of at first use.
    pub fn warm_up(&self) -> Result<()> {
        let types: Vec<TypeId> = {
            let inner = self.inner.read().expect("codec registry poisoned");
            inner.descriptors.keys().copied().collect()
        };
        for ty in types {
            self.build(ty)?;
        }
        Ok(())
    }

    /// Types registered as network messages (in no particular order).
    pub(crate) fn message_hooks(&self) -> Vec<Arc<MessageHook>> {
        self.inner
            .read()
            .expect("codec registry poisoned")
            .hooks
            .values()
            .cloned()
            .collect()
    }

    pub(crate) fn hook(&self, ty: TypeId) -> Option<Arc<MessageHook>> {
        self.inner
            .read()
            .expect("codec registry poisoned")
            .hooks
            .get(&ty)
            .cloned()
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SerializerFactory for CodecRegistry {
    fn get_by_type(&self, ty: TypeId) -> Option<Arc<Codec>> {
        self.inner
            .read()
            .expect("codec registry poisoned")
            .by_type
            .get(&ty)
            .cloned()
    }

    fn get_by_id(&self, id: u32) -> Option<Arc<Codec>> {
        self.inner
            .read()
            .expect("codec registry poisoned")
            .by_id
            .get(&id)
            .cloned()
    }

    fn build(&self, ty: TypeId) -> Result<Option<Arc<Codec>>> {
        if let Some(codec) = self.get_by_type(ty) {
            return Ok(Some(codec));
        }

        let descriptor = {
            let inner = self.inner.read().expect("codec registry poisoned");
            inner.descriptors.get(&ty).cloned()
        };
        let Some(descriptor) = descriptor else {
            return Ok(None);
        };

        // No lock held while building: nested fields recurse into this
        // factory for their own codecs.
        let codec = Codec::build(&descriptor, &self.converters, self)?;

        let mut inner = self.inner.write().expect("codec registry poisoned");
        if let Some(winner) = inner.by_type.get(&ty) {
            // Another builder finished first; one codec identity per type.
            return Ok(Some(winner.clone()));
        }
        let codec = Arc::new(codec);
        inner.by_type.insert(ty, codec.clone());
        inner.by_id.insert(codec.wire_id(), codec.clone());
        Ok(Some(codec))
    }
}

/// Ordered chain of factories; first non-empty answer wins.
pub struct CompositeFactory {
    factories: Vec<Arc<dyn SerializerFactory>>,
}

impl CompositeFactory {
    /// Create an empty chain.
    pub fn new() -> Self {
        Self {
            factories: Vec::new(),
        }
    }

    /// Append a factory; earlier entries take precedence.
    pub fn add_factory(mut self, factory: Arc<dyn SerializerFactory>) -> Self {
        self.factories.push(factory);
        self
    }
}

impl Default for CompositeFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl SerializerFactory for CompositeFactory {
    fn get_by_type(&self, ty: TypeId) -> Option<Arc<Codec>> {
        self.factories.iter().find_map(|f| f.get_by_type(ty))
    }

    fn get_by_id(&self, id: u32) -> Option<Arc<Codec>> {
        self.factories.iter().find_map(|f| f.get_by_id(id))
    }

    fn build(&self, ty: TypeId) -> Result<Option<Arc<Codec>>> {
        for factory in &self.factories {
            if let Some(codec) = factory.build(ty)? {
                return Ok(Some(codec));
            }
        }
        Ok(None)
    }
}
