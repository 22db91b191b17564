//! Error types for wirebus.

use thiserror::Error;

/// Main error type for all wirebus operations.
#[derive(Debug, Error)]
pub enum WirebusError {
    /// A field's declared shape could not be resolved to any codec strategy.
    ///
    /// Raised while building a codec, never during steady-state traffic.
    #[error("failed to set up codec for `{type_name}`, field `{field}`: {reason}")]
    Config {
        /// Owning type whose codec construction failed.
        type_name: &'static str,
        /// Field that could not be resolved.
        field: String,
        /// What went wrong.
        reason: String,
    },

    /// Two distinct logical names hash to the same wire identifier.
    #[error("wire identifier collision: `{name}` also hashes to {id:#010x}")]
    DuplicateWireId {
        /// Logical name that collided with an already registered one.
        name: String,
        /// The shared 32-bit identifier.
        id: u32,
    },

    /// Inbound blob carries a wire identifier no registered codec matches.
    #[error("no codec registered for wire identifier {0:#010x}")]
    UnknownWireId(u32),

    /// A raw-boxed field held a value outside the closed primitive union.
    #[error("raw value kind `{0}` has no boxed converter")]
    UnsupportedRawKind(&'static str),

    /// A read ran past the end of the blob.
    #[error("blob exhausted: needed {needed} more byte(s), {available} available")]
    BlobExhausted {
        /// Bytes the read required.
        needed: usize,
        /// Bytes left before the end of the blob.
        available: usize,
    },

    /// The buffer pool had no free blob and the caller did not wait.
    #[error("buffer pool exhausted")]
    PoolExhausted,

    /// Waiting for a pooled blob exceeded the allowed delay.
    #[error("buffer acquisition timed out")]
    AcquireTimeout,

    /// An RPC exchange was cancelled by its cancellation signal.
    #[error("operation cancelled")]
    Cancelled,

    /// A request arrived for a type with no registered request handler.
    #[error("no request handler registered for message type `{0}`")]
    MissingRequestHandler(&'static str),

    /// A network operation was attempted with no channel attached.
    #[error("bus is not attached to a channel")]
    NotAttached,

    /// A type or codec was registered twice.
    #[error("type `{0}` is already registered")]
    AlreadyRegistered(&'static str),

    /// The channel reported a transport-level failure.
    #[error("channel error: {0}")]
    Channel(String),

    /// A value could not be written in the requested wire shape.
    #[error("encode error: {0}")]
    Encode(String),

    /// Decoded bytes did not match the expected shape.
    #[error("decode error: {0}")]
    Decode(String),
}

/// Result type alias using WirebusError.
pub type Result<T> = std::result::Result<T, WirebusError>;
