use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use bytes::Bytes;
use dashmap::DashMap;
use futures::future::join_all;
use parking_lot::RwLock;
use tokio::sync::{broadcast, mpsc, OnceCell};
use tracing::{debug, info, trace, warn};

use super::error::SwarmError;
use super::selector::{PeerSelector, PieceHolder};
use crate::constants::{DEFAULT_EVENT_CAPACITY, SHA1, SHA256};
use crate::crypto::{CryptoError, HashService};
use crate::discovery::{DiscoveryError, FoundPeer, FoundSink, PeerStrategy};
use crate::metainfo::{SignedMetainfo, SwarmId};
use crate::peer::{
    Bitfield, Block, BlockRequest, Peer, PeerError, PeerEvent, PeerId, WireExtension,
};
use crate::piece::PieceManager;

/// Identifies one registered peer session within a [`PeerManager`].
///
/// Ids are never reused, so an id seen in an event stays unambiguous after
/// the session has closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub(crate) u64);

impl SessionId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Events fanned in from every live peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerManagerEvent {
    PeerConnected(SessionId),
    /// Sent once per session, after it has left the live set.
    PeerClosed(SessionId),
    GotPiece { session: SessionId, block: Block },
    GotBitfield { session: SessionId, bitfield: Bitfield },
    GotRequest { session: SessionId, request: BlockRequest },
    GotHave { session: SessionId, piece: u32 },
}

/// Configures a [`PeerManager`].
pub struct PeerManagerBuilder {
    hashes: Arc<HashService>,
    strategies: Vec<Arc<dyn PeerStrategy>>,
    extensions: Vec<Arc<dyn WireExtension>>,
    selector: Arc<dyn PeerSelector>,
    metainfo: Option<SignedMetainfo>,
    event_capacity: usize,
}

impl PeerManagerBuilder {
    pub fn strategy(mut self, strategy: Arc<dyn PeerStrategy>) -> Self {
        self.strategies.push(strategy);
        self
    }

    pub fn extension(mut self, extension: Arc<dyn WireExtension>) -> Self {
        self.extensions.push(extension);
        self
    }

    /// Replaces the default [`PieceHolder`] policy.
    pub fn selector(mut self, selector: Arc<dyn PeerSelector>) -> Self {
        self.selector = selector;
        self
    }

    /// Descriptor handed to extensions for each new session.
    pub fn metainfo(mut self, metainfo: SignedMetainfo) -> Self {
        self.metainfo = Some(metainfo);
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    pub fn hashes(&self) -> &Arc<HashService> {
        &self.hashes
    }

    /// Builds the manager and attaches it to every strategy.
    ///
    /// Must be called from within a tokio runtime. Fails with
    /// [`SwarmError::NoDiscoveryStrategy`] when no strategy was registered,
    /// and with an unsupported-algorithm error when the hash service cannot
    /// derive peer ids (SHA-1) or discovery keys (SHA-256).
    pub fn build(self, pieces: Arc<PieceManager>) -> Result<Arc<PeerManager>, SwarmError> {
        if self.strategies.is_empty() {
            return Err(SwarmError::NoDiscoveryStrategy);
        }
        for algorithm in [SHA1, SHA256] {
            if !self.hashes.supports(algorithm) {
                return Err(CryptoError::UnsupportedAlgorithm(algorithm.to_string()).into());
            }
        }

        let (events, _) = broadcast::channel(self.event_capacity);
        let searches = Arc::new(DashMap::new());
        let manager = Arc::new(PeerManager {
            hashes: self.hashes,
            pieces,
            strategies: self.strategies,
            extensions: self.extensions,
            selector: self.selector,
            metainfo: RwLock::new(self.metainfo.map(Arc::new)),
            local_id: OnceCell::new(),
            searches: Arc::clone(&searches),
            peers: RwLock::new(BTreeMap::new()),
            next_session: AtomicU64::new(0),
            events,
        });

        let (found_tx, found_rx) = mpsc::unbounded_channel();
        let sink = FoundSink::filtered(found_tx, move |key| searches.contains_key(key));
        for strategy in &manager.strategies {
            strategy.attach(sink.clone());
        }
        tokio::spawn(found_loop(Arc::downgrade(&manager), found_rx));

        debug!(
            strategies = manager.strategies.len(),
            extensions = manager.extensions.len(),
            selector = manager.selector.name(),
            "peer manager ready"
        );
        Ok(manager)
    }
}

async fn found_loop(manager: Weak<PeerManager>, mut found: mpsc::UnboundedReceiver<FoundPeer>) {
    while let Some(peer) = found.recv().await {
        let Some(manager) = manager.upgrade() else {
            break;
        };
        if let Err(e) = manager.on_found(peer).await {
            warn!(error = %e, "failed to set up discovered peer");
        }
    }
}

/// The live set of peer sessions for one swarm.
///
/// Discovery strategies hand sessions in; each gets every registered
/// [`WireExtension`], the process peer id and a [`Peer`] wrapper, then joins
/// the live set. Events from all peers are fanned into one broadcast stream
/// (see [`subscribe`](Self::subscribe)). A peer leaves the live set exactly
/// once, when its session closes.
pub struct PeerManager {
    hashes: Arc<HashService>,
    pieces: Arc<PieceManager>,
    strategies: Vec<Arc<dyn PeerStrategy>>,
    extensions: Vec<Arc<dyn WireExtension>>,
    selector: Arc<dyn PeerSelector>,
    metainfo: RwLock<Option<Arc<SignedMetainfo>>>,
    local_id: OnceCell<PeerId>,
    searches: Arc<DashMap<Bytes, SwarmId>>,
    peers: RwLock<BTreeMap<SessionId, Arc<Peer>>>,
    next_session: AtomicU64,
    events: broadcast::Sender<PeerManagerEvent>,
}

impl PeerManager {
    pub fn builder(hashes: Arc<HashService>) -> PeerManagerBuilder {
        PeerManagerBuilder {
            hashes,
            strategies: Vec::new(),
            extensions: Vec::new(),
            selector: Arc::new(PieceHolder),
            metainfo: None,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PeerManagerEvent> {
        self.events.subscribe()
    }

    pub fn pieces(&self) -> &Arc<PieceManager> {
        &self.pieces
    }

    pub fn hashes(&self) -> &Arc<HashService> {
        &self.hashes
    }

    pub fn metainfo(&self) -> Option<Arc<SignedMetainfo>> {
        self.metainfo.read().clone()
    }

    /// Descriptor handed to extensions from now on.
    pub fn set_metainfo(&self, metainfo: SignedMetainfo) {
        *self.metainfo.write() = Some(Arc::new(metainfo));
    }

    /// Our peer id, derived on first use and fixed afterwards.
    pub async fn local_peer_id(&self) -> Result<PeerId, SwarmError> {
        let id = self
            .local_id
            .get_or_try_init(|| PeerId::generate(&self.hashes))
            .await?;
        Ok(*id)
    }

    async fn discovery_key(&self, swarm: &SwarmId) -> Result<Bytes, SwarmError> {
        Ok(self.hashes.hash(swarm.as_bytes(), SHA256).await?)
    }

    /// Starts discovery for `swarm` on every strategy concurrently.
    ///
    /// All strategies are started even if some fail; the first failure is
    /// returned.
    pub async fn search(&self, swarm: &SwarmId) -> Result<(), SwarmError> {
        let key = self.discovery_key(swarm).await?;
        self.searches.insert(key.clone(), swarm.clone());
        info!(%swarm, strategies = self.strategies.len(), "starting discovery");

        let results = join_all(
            self.strategies
                .iter()
                .map(|strategy| strategy.start_discovery(&key)),
        )
        .await;
        self.first_failure("start", results)
    }

    /// Stops discovery for `swarm` on every strategy and waits for all of
    /// them. Sessions found for it afterwards are dropped.
    pub async fn stop_discovery(&self, swarm: &SwarmId) -> Result<(), SwarmError> {
        let key = self.discovery_key(swarm).await?;
        self.searches.remove(&key);

        let results = join_all(
            self.strategies
                .iter()
                .map(|strategy| strategy.stop_discovery(&key)),
        )
        .await;
        info!(%swarm, "stopped discovery");
        self.first_failure("stop", results)
    }

    fn first_failure(
        &self,
        action: &str,
        results: Vec<Result<(), DiscoveryError>>,
    ) -> Result<(), SwarmError> {
        let mut first = None;
        for (strategy, result) in self.strategies.iter().zip(results) {
            if let Err(e) = result {
                warn!(strategy = strategy.name(), action, error = %e, "discovery call failed");
                first.get_or_insert(e);
            }
        }
        first.map_or(Ok(()), |e| Err(e.into()))
    }

    async fn on_found(self: &Arc<Self>, found: FoundPeer) -> Result<(), SwarmError> {
        let Some(swarm) = self
            .searches
            .get(&found.discovery_key)
            .map(|entry| entry.value().clone())
        else {
            debug!("dropping session for an inactive search");
            return Ok(());
        };

        let mut session = found.session;
        let metainfo = self.metainfo();
        for extension in &self.extensions {
            extension.attach(&mut session, &swarm, metainfo.as_deref());
        }

        let local_id = self.local_peer_id().await?;
        let pieces = Arc::clone(&self.pieces);
        let (peer, events) = Peer::spawn(session, local_id, Arc::new(move || pieces.bitfield()));
        self.register(peer, events);
        Ok(())
    }

    /// Adds `peer` to the live set and starts forwarding its events.
    fn register(self: &Arc<Self>, peer: Arc<Peer>, events: mpsc::UnboundedReceiver<PeerEvent>) {
        let session = SessionId(self.next_session.fetch_add(1, Ordering::Relaxed));
        self.peers.write().insert(session, peer);
        info!(%session, peers = self.peer_count(), "peer connected");
        self.emit(PeerManagerEvent::PeerConnected(session));

        tokio::spawn(forward_events(Arc::downgrade(self), session, events));
    }

    fn remove(&self, session: SessionId) {
        if self.peers.write().remove(&session).is_some() {
            info!(%session, peers = self.peer_count(), "peer closed");
            self.emit(PeerManagerEvent::PeerClosed(session));
        }
    }

    fn emit(&self, event: PeerManagerEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Live peers in session order.
    pub fn peers(&self) -> Vec<(SessionId, Arc<Peer>)> {
        self.peers
            .read()
            .iter()
            .filter(|(_, peer)| !peer.is_closed())
            .map(|(id, peer)| (*id, Arc::clone(peer)))
            .collect()
    }

    pub fn peer(&self, session: SessionId) -> Option<Arc<Peer>> {
        self.peers
            .read()
            .get(&session)
            .filter(|peer| !peer.is_closed())
            .cloned()
    }

    pub fn peer_count(&self) -> usize {
        self.peers
            .read()
            .values()
            .filter(|peer| !peer.is_closed())
            .count()
    }

    /// Applies `action` to every live peer, skipping peers whose session
    /// closed. Returns how many peers took it.
    fn broadcast(&self, action: &'static str, f: impl Fn(&Peer) -> Result<(), PeerError>) -> usize {
        let mut delivered = 0;
        for (session, peer) in self.peers() {
            match f(&peer) {
                Ok(()) => delivered += 1,
                Err(e) => debug!(%session, action, error = %e, "skipping peer"),
            }
        }
        trace!(action, delivered, "broadcast");
        delivered
    }

    pub fn set_uninterested(&self) -> usize {
        self.broadcast("not_interested", Peer::set_uninterested)
    }

    pub fn have(&self, piece: u32) -> usize {
        self.broadcast("have", |peer| peer.have(piece))
    }

    pub fn cancel(&self, request: BlockRequest) -> usize {
        self.broadcast("cancel", |peer| peer.cancel(request))
    }

    pub fn broadcast_bitfield(&self, bitfield: &Bitfield) -> usize {
        self.broadcast("bitfield", |peer| peer.send_bitfield(bitfield))
    }

    /// First live peer whose bitfield has `piece` set.
    pub fn peer_that_has_piece(&self, piece: u32) -> Option<(SessionId, Arc<Peer>)> {
        self.peers()
            .into_iter()
            .find(|(_, peer)| peer.has_piece(piece as usize))
    }

    /// Sends `request` to the peer picked by the configured selector.
    /// Nothing is retried.
    pub fn request_piece(&self, request: BlockRequest) -> Result<SessionId, SwarmError> {
        let peers = self.peers();
        let (session, peer) = self
            .selector
            .select(&peers, request.piece)
            .and_then(|index| peers.get(index))
            .ok_or(SwarmError::NoPeerAvailable(request.piece))?;

        peer.request(request)?;
        trace!(%session, ?request, "requested block");
        Ok(*session)
    }

    /// Closes every live session.
    pub fn close_all(&self) {
        for (_, peer) in self.peers() {
            peer.close();
        }
    }
}

async fn forward_events(
    manager: Weak<PeerManager>,
    session: SessionId,
    mut events: mpsc::UnboundedReceiver<PeerEvent>,
) {
    while let Some(event) = events.recv().await {
        let Some(manager) = manager.upgrade() else {
            return;
        };
        let event = match event {
            PeerEvent::Closed => break,
            PeerEvent::Piece(block) => PeerManagerEvent::GotPiece { session, block },
            PeerEvent::Bitfield(bitfield) => PeerManagerEvent::GotBitfield { session, bitfield },
            PeerEvent::Request(request) => PeerManagerEvent::GotRequest { session, request },
            PeerEvent::Have(piece) => PeerManagerEvent::GotHave { session, piece },
        };
        manager.emit(event);
    }

    if let Some(manager) = manager.upgrade() {
        manager.remove(session);
    }
}

impl Drop for PeerManager {
    fn drop(&mut self) {
        self.close_all();
    }
}

impl fmt::Debug for PeerManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerManager")
            .field("strategies", &self.strategies.len())
            .field("extensions", &self.extensions.len())
            .field("selector", &self.selector.name())
            .field("peers", &self.peer_count())
            .finish_non_exhaustive()
    }
}
