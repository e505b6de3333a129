use tokio::sync::mpsc;

use super::error::PeerError;
use super::message::Message;

/// One established, not yet wrapped, wire session.
///
/// A session is a duplex of typed [`Message`]s. Transports produce sessions by
/// decoding frames into the inbound channel and encoding the outbound one;
/// [`WireSession::pair`] connects two in-process endpoints directly.
/// Dropping a session (or its outbound half) is how the remote side observes
/// closure.
#[derive(Debug)]
pub struct WireSession {
    outbound: mpsc::UnboundedSender<Message>,
    inbound: mpsc::UnboundedReceiver<Message>,
    extensions: Vec<String>,
}

impl WireSession {
    pub fn new(
        outbound: mpsc::UnboundedSender<Message>,
        inbound: mpsc::UnboundedReceiver<Message>,
    ) -> Self {
        Self {
            outbound,
            inbound,
            extensions: Vec::new(),
        }
    }

    /// Two sessions wired back to back.
    pub fn pair() -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();
        (Self::new(a_tx, a_rx), Self::new(b_tx, b_rx))
    }

    /// Records that an extension has attached itself. Names are announced to
    /// the remote in our handshake.
    pub fn use_extension(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.extensions.contains(&name) {
            self.extensions.push(name);
        }
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    pub fn send(&self, message: Message) -> Result<(), PeerError> {
        self.outbound
            .send(message)
            .map_err(|_| PeerError::SessionClosed)
    }

    /// Next inbound message, or `None` once the remote has gone away.
    pub async fn recv(&mut self) -> Option<Message> {
        self.inbound.recv().await
    }

    pub(crate) fn into_parts(
        self,
    ) -> (
        mpsc::UnboundedSender<Message>,
        mpsc::UnboundedReceiver<Message>,
        Vec<String>,
    ) {
        (self.outbound, self.inbound, self.extensions)
    }
}
