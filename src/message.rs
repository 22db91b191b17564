//! Message identity traits.
//!
//! The codec layer moves values around as [`Payload`] trait objects: anything
//! `Any + Send` qualifies through the blanket implementation, so plain value
//! structs participate in nested, list, and dictionary fields without extra
//! ceremony.
//!
//! Types that travel over the network bus additionally implement
//! [`NetMessage`], which exposes the local/remote provenance flag the bus uses
//! to suppress echoing freshly received messages back onto the wire. The flag
//! lives in a [`Provenance`] field that is embedded in the message struct but
//! never registered as a serializable field.
//!
//! # Example
//!
//! ```
//! use wirebus::{NetMessage, Provenance};
//!
//! #[derive(Default)]
//! struct Ping {
//!     count: i32,
//!     tag: String,
//!     origin: Provenance,
//! }
//!
//! impl NetMessage for Ping {
//!     fn provenance(&self) -> &Provenance {
//!         &self.origin
//!     }
//!     fn provenance_mut(&mut self) -> &mut Provenance {
//!         &mut self.origin
//!     }
//! }
//! ```

use std::any::Any;

/// Object-safe access to the concrete value behind a codec-produced object.
///
/// Blanket-implemented for every `Any + Send` type; used as the currency of
/// [`Codec::decode`](crate::serializer::Codec::decode) and polymorphic fields.
///
/// The blanket impl also covers `Box<dyn …>`/`Arc<dyn …>` themselves, so call
/// `as_any` through a reborrow (`(*boxed).as_any()`) when holding a smart
/// pointer — calling it on the pointer directly would answer for the pointer
/// type, not the value inside.
pub trait Payload: Any + Send {
    /// Borrow the value as `Any` for downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Mutably borrow the value as `Any`.
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Convert the boxed value into a boxed `Any`.
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send>;
}

impl<T: Any + Send> Payload for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }
}

impl dyn Payload {
    /// Borrow the payload as a concrete type.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.as_any().downcast_ref()
    }

    /// Take ownership of the payload as a concrete type.
    ///
    /// Returns the original box unchanged when the type does not match.
    pub fn downcast<T: Any>(self: Box<Self>) -> std::result::Result<Box<T>, Box<dyn Any + Send>> {
        self.into_any().downcast()
    }
}

/// Local/remote provenance of a message instance.
///
/// Freshly constructed messages are local; the bus flips the flag on every
/// instance it decodes from the network before republishing it, so the
/// outbound handler can tell the two apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Provenance {
    local: bool,
}

impl Provenance {
    /// True when the message originated in this process.
    #[inline]
    pub fn is_local(&self) -> bool {
        self.local
    }

    /// Flag the message as having arrived from the network.
    #[inline]
    pub fn mark_remote(&mut self) {
        self.local = false;
    }
}

impl Default for Provenance {
    fn default() -> Self {
        // Anything not decoded off the wire counts as local.
        Self { local: true }
    }
}

/// A message eligible for network transport.
///
/// Implementors embed a [`Provenance`] field (excluded from their descriptor)
/// and surface it through the two accessors.
pub trait NetMessage: Payload + Sync {
    /// Provenance flag of this instance.
    fn provenance(&self) -> &Provenance;

    /// Mutable provenance flag, used by the bus after decoding.
    fn provenance_mut(&mut self) -> &mut Provenance;

    /// Convenience shorthand for `provenance().is_local()`.
    fn is_local(&self) -> bool {
        self.provenance().is_local()
    }
}

impl core::fmt::Debug for dyn NetMessage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("dyn NetMessage")
            .field("local", &self.is_local())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Sample {
        value: u32,
        origin: Provenance,
    }

    impl NetMessage for Sample {
        fn provenance(&self) -> &Provenance {
            &self.origin
        }
        fn provenance_mut(&mut self) -> &mut Provenance {
            &mut self.origin
        }
    }

    #[test]
    fn test_provenance_defaults_to_local() {
        let msg = Sample::default();
        assert!(msg.is_local());
    }

    #[test]
    fn test_mark_remote() {
        let mut msg = Sample::default();
        msg.provenance_mut().mark_remote();
        assert!(!msg.is_local());
    }

    #[test]
    fn test_payload_downcast_ref() {
        let msg = Sample {
            value: 7,
            origin: Provenance::default(),
        };
        let payload: &dyn Payload = &msg;
        assert_eq!(payload.downcast_ref::<Sample>().unwrap().value, 7);
        assert!(payload.downcast_ref::<String>().is_none());
    }

    #[test]
    fn test_payload_downcast_boxed() {
        let boxed: Box<dyn Payload> = Box::new(Sample {
            value: 9,
            origin: Provenance::default(),
        });
        let back = boxed.downcast::<Sample>().unwrap();
        assert_eq!(back.value, 9);
    }
}
