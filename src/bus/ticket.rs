//! Reply tickets for inbound request/response exchanges.

use std::sync::Arc;

use super::NetworkBus;
use crate::channel::ReplyTicket;
use crate::error::Result;
use crate::message::NetMessage;

/// A pending inbound request.
///
/// Handed to the registered request handler together with the decoded
/// request; the handler delivers exactly one reply through [`fulfill`], which
/// consumes the ticket. The reply is serialized with the bus's codec factory
/// and handed back to the channel's reply path.
///
/// [`fulfill`]: RequestTicket::fulfill
pub struct RequestTicket {
    bus: Arc<NetworkBus>,
    inner: Box<dyn ReplyTicket>,
}

impl RequestTicket {
    pub(crate) fn new(bus: Arc<NetworkBus>, inner: Box<dyn ReplyTicket>) -> Self {
        Self { bus, inner }
    }

    /// Serialize `reply` and deliver it to the requesting peer.
    pub async fn fulfill(self, reply: &dyn NetMessage) -> Result<()> {
        let blob = self.bus.serialize(reply).await?;
        self.inner.fulfill(blob).await
    }
}
