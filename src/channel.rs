//! Abstract transport surface consumed by the bus.
//!
//! The bus never opens sockets or frames bytes itself; it drives a
//! [`Channel`] and reacts to the callbacks the channel delivers through
//! [`ChannelEvents`]. Implementations own buffer creation (usually backed by
//! a [`BlobPool`](crate::blob::BlobPool)), framing, flow control, and the
//! request/response plumbing behind [`Channel::send_request`].
//!
//! Async trait methods return [`BoxFuture`]s so the traits stay object-safe.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;

use crate::blob::BinaryBlob;
use crate::error::Result;

/// Boxed future for object-safe async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Cancellation signal for RPC exchanges: fire it (or drop the sender) to
/// abort the wait.
pub type CancelSignal = oneshot::Receiver<()>;

/// Reported transport state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
    /// The channel can carry traffic.
    Open,
    /// The channel is connecting, draining, or gone.
    Closed,
}

/// One-shot reply path for an inbound request/response exchange.
///
/// Consuming `fulfill` makes a second reply unrepresentable.
pub trait ReplyTicket: Send {
    /// Hand the serialized reply back to the peer.
    fn fulfill(self: Box<Self>, blob: BinaryBlob) -> BoxFuture<'static, Result<()>>;
}

/// Callbacks a channel delivers to its bound consumer.
pub trait ChannelEvents: Send + Sync {
    /// A complete inbound blob arrived outside any exchange.
    fn on_blob(&self, blob: BinaryBlob);

    /// A complete inbound blob arrived as a request; the ticket delivers the
    /// reply.
    fn on_request(&self, blob: BinaryBlob, ticket: Box<dyn ReplyTicket>);
}

/// An abstract bidirectional message channel.
pub trait Channel: Send + Sync {
    /// Name for log lines.
    fn name(&self) -> &str;

    /// Current transport state.
    fn status(&self) -> ChannelStatus;

    /// Lease an outbound buffer sized for `size_hint` bytes of payload,
    /// without waiting.
    fn create_blob(&self, size_hint: usize) -> Result<BinaryBlob>;

    /// Lease an outbound buffer, waiting up to `deadline` for pool capacity.
    fn create_blob_within(
        &self,
        size_hint: usize,
        deadline: Duration,
    ) -> BoxFuture<'_, Result<BinaryBlob>>;

    /// Send a blob, fire-and-forget. Ownership of the blob transfers here.
    fn send(&self, blob: BinaryBlob);

    /// Perform a request/response exchange.
    ///
    /// Ownership of the request blob transfers at the call. The future
    /// resolves with the peer's reply blob, or `Cancelled` when the signal
    /// fires first.
    fn send_request(
        &self,
        blob: BinaryBlob,
        cancel: Option<CancelSignal>,
    ) -> BoxFuture<'_, Result<BinaryBlob>>;

    /// Wire the inbound callbacks. Replaces any previous binding.
    fn bind(&self, events: Arc<dyn ChannelEvents>);

    /// Unwire the inbound callbacks.
    fn unbind(&self);
}
