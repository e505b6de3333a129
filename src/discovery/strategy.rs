use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use super::error::DiscoveryError;
use crate::peer::WireSession;

/// A session established by a strategy, tagged with the key it was found
/// under.
#[derive(Debug)]
pub struct FoundPeer {
    pub session: WireSession,
    pub discovery_key: Bytes,
}

type KeyFilter = Arc<dyn Fn(&[u8]) -> bool + Send + Sync>;

/// Where a strategy hands found sessions, plus which discovery keys the
/// owner is searching. A strategy shared by several owners routes each
/// session to a sink that wants its key.
#[derive(Clone)]
pub struct FoundSink {
    tx: mpsc::UnboundedSender<FoundPeer>,
    filter: Option<KeyFilter>,
}

impl FoundSink {
    /// A sink that accepts every key.
    pub fn new(tx: mpsc::UnboundedSender<FoundPeer>) -> Self {
        Self { tx, filter: None }
    }

    /// A sink that only accepts keys for which `filter` returns true.
    pub fn filtered(
        tx: mpsc::UnboundedSender<FoundPeer>,
        filter: impl Fn(&[u8]) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            tx,
            filter: Some(Arc::new(filter)),
        }
    }

    pub fn wants(&self, discovery_key: &[u8]) -> bool {
        !self.is_closed() && self.filter.as_ref().map_or(true, |filter| filter(discovery_key))
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Hands `peer` over; gives it back if the receiver is gone.
    pub fn send(&self, peer: FoundPeer) -> Result<(), FoundPeer> {
        self.tx.send(peer).map_err(|e| e.0)
    }
}

impl fmt::Debug for FoundSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FoundSink")
            .field("closed", &self.is_closed())
            .field("filtered", &self.filter.is_some())
            .finish()
    }
}

/// A discovery backend.
///
/// New transports are added by implementing this trait; the swarm layer only
/// ever calls these four methods.
#[async_trait]
pub trait PeerStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// Registers where found sessions go. May be called more than once; each
    /// session then goes to one sink that [wants](FoundSink::wants) its key.
    fn attach(&self, sink: FoundSink);

    async fn start_discovery(&self, discovery_key: &[u8]) -> Result<(), DiscoveryError>;

    /// Returns once the strategy has stopped looking for `discovery_key`.
    async fn stop_discovery(&self, discovery_key: &[u8]) -> Result<(), DiscoveryError>;
}
