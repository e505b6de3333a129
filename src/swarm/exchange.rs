use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use super::error::SwarmError;
use super::manager::{PeerManager, PeerManagerBuilder, PeerManagerEvent, SessionId};
use super::store::PieceStore;
use crate::crypto::HashService;
use crate::metainfo::{Info, SignedMetainfo, SwarmId};
use crate::peer::{Block, BlockRequest};
use crate::piece::{PieceError, PieceManager};

struct Exchange {
    metainfo: Arc<SignedMetainfo>,
    pieces: Arc<PieceManager>,
    manager: Arc<PeerManager>,
    store: Arc<dyn PieceStore>,
    hashes: Arc<HashService>,
}

impl Exchange {
    fn info(&self) -> &Info {
        &self.metainfo.info
    }

    async fn handle(&self, event: PeerManagerEvent) -> Result<(), SwarmError> {
        match event {
            PeerManagerEvent::GotRequest { session, request } => self.serve(session, request).await,
            PeerManagerEvent::GotPiece { session, block } => self.receive(session, block).await,
            PeerManagerEvent::GotBitfield { session, .. } | PeerManagerEvent::GotHave { session, .. } => {
                self.update_interest(session);
                Ok(())
            }
            PeerManagerEvent::PeerConnected(_) | PeerManagerEvent::PeerClosed(_) => Ok(()),
        }
    }

    async fn serve(&self, session: SessionId, request: BlockRequest) -> Result<(), SwarmError> {
        if !self.pieces.has_piece(request.piece as usize) {
            debug!(%session, piece = request.piece, "request for a piece we lack");
            return Ok(());
        }
        let Some(peer) = self.manager.peer(session) else {
            return Ok(());
        };
        match self.store.read_block(&request).await? {
            Some(data) => {
                peer.send_piece(Block::new(request.piece, request.offset, data))?;
                trace!(%session, ?request, "served block");
            }
            None => warn!(%session, ?request, "held piece missing from store"),
        }
        Ok(())
    }

    async fn receive(&self, session: SessionId, block: Block) -> Result<(), SwarmError> {
        let piece = block.piece;
        let Some(size) = self.info().piece_size(piece) else {
            debug!(%session, piece, "block for unknown piece");
            return Ok(());
        };
        if self.pieces.has_piece(piece as usize) {
            trace!(%session, piece, "block for a piece we already hold");
            return Ok(());
        }

        self.store.write_block(&block).await?;
        if !self.store.has_piece(piece, size).await? {
            return Ok(());
        }
        let Some(data) = self.store.read_piece(piece, size).await? else {
            return Ok(());
        };

        match self
            .pieces
            .verify_and_complete(piece as usize, &data, self.info(), &self.hashes)
            .await
        {
            Ok(true) => {
                let told = self.manager.have(piece);
                debug!(piece, peers = told, "announced piece");
                if self.pieces.is_complete() {
                    self.manager.set_uninterested();
                }
            }
            Ok(false) => {}
            Err(PieceError::HashMismatch(_)) => {
                warn!(%session, piece, "discarding piece that failed verification");
                self.store.discard_piece(piece).await?;
            }
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    fn update_interest(&self, session: SessionId) {
        let Some(peer) = self.manager.peer(session) else {
            return;
        };
        let Some(remote) = peer.bitfield() else {
            return;
        };
        let wanted = !remote.wanted_by(&self.pieces.bitfield()).is_empty();
        let result = match (wanted, peer.am_interested()) {
            (true, false) => peer.set_interested(),
            (false, true) => peer.set_uninterested(),
            _ => Ok(()),
        };
        if let Err(e) = result {
            debug!(%session, error = %e, "could not update interest");
        }
    }

    async fn run(self: Arc<Self>, mut events: tokio::sync::broadcast::Receiver<PeerManagerEvent>) {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Err(e) = self.handle(event).await {
                        warn!(error = %e, "failed to handle peer event");
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "swarm fell behind peer events");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }
}

/// Piece exchange for one signed torrent.
///
/// Ties a [`PieceManager`], a [`PeerManager`] and a [`PieceStore`] together:
/// requests for pieces we hold are served from the store, received blocks
/// are written to it, and a piece that is complete and matches its declared
/// hash is marked held and announced to every live peer with `have`.
///
/// Requests are only issued on demand ([`request_piece`](Self::request_piece),
/// [`request_missing`](Self::request_missing)) and never retried.
pub struct Swarm {
    exchange: Arc<Exchange>,
    task: JoinHandle<()>,
}

impl Swarm {
    /// Checks what `store` already holds, builds the peer manager from
    /// `builder` and starts discovery for the metainfo's swarm.
    pub async fn start(
        metainfo: SignedMetainfo,
        store: Arc<dyn PieceStore>,
        builder: PeerManagerBuilder,
    ) -> Result<Self, SwarmError> {
        let hashes = Arc::clone(builder.hashes());
        let info = &metainfo.info;
        let pieces = Arc::new(PieceManager::new(info.piece_count()));

        for index in 0..info.piece_count() as u32 {
            let Some(size) = info.piece_size(index) else {
                continue;
            };
            let Some(data) = store.read_piece(index, size).await? else {
                continue;
            };
            match pieces
                .verify_and_complete(index as usize, &data, info, &hashes)
                .await
            {
                Ok(_) => {}
                Err(PieceError::HashMismatch(_)) => {
                    debug!(piece = index, "stored piece failed verification");
                    store.discard_piece(index).await?;
                }
                Err(e) => return Err(e.into()),
            }
        }

        let swarm_id = metainfo.swarm_id();
        info!(
            swarm = %swarm_id,
            name = %info.name,
            have = pieces.bitfield().count(),
            total = info.piece_count(),
            "starting swarm"
        );

        let manager = builder.metainfo(metainfo.clone()).build(Arc::clone(&pieces))?;
        let events = manager.subscribe();
        let exchange = Arc::new(Exchange {
            metainfo: Arc::new(metainfo),
            pieces,
            manager,
            store,
            hashes,
        });
        let task = tokio::spawn(Arc::clone(&exchange).run(events));

        let swarm = Self { exchange, task };
        swarm.exchange.manager.search(&swarm_id).await?;
        Ok(swarm)
    }

    pub fn swarm_id(&self) -> SwarmId {
        self.exchange.metainfo.swarm_id()
    }

    pub fn metainfo(&self) -> &SignedMetainfo {
        &self.exchange.metainfo
    }

    pub fn pieces(&self) -> &Arc<PieceManager> {
        &self.exchange.pieces
    }

    pub fn manager(&self) -> &Arc<PeerManager> {
        &self.exchange.manager
    }

    pub fn store(&self) -> &Arc<dyn PieceStore> {
        &self.exchange.store
    }

    /// Requests every block of `piece`. Returns the number of requests sent,
    /// zero if the piece is already held.
    pub fn request_piece(&self, piece: u32) -> Result<usize, SwarmError> {
        let size = self
            .exchange
            .info()
            .piece_size(piece)
            .ok_or(PieceError::IndexOutOfRange {
                index: piece as usize,
                count: self.exchange.pieces.piece_count(),
            })?;
        if self.exchange.pieces.has_piece(piece as usize) {
            return Ok(0);
        }

        let blocks = BlockRequest::split_piece(piece, size);
        for request in &blocks {
            self.exchange.manager.request_piece(*request)?;
        }
        Ok(blocks.len())
    }

    /// Requests every missing piece some peer can serve. Pieces nobody has
    /// are skipped.
    pub fn request_missing(&self) -> Result<usize, SwarmError> {
        let mut sent = 0;
        for piece in self.exchange.pieces.missing_pieces() {
            match self.request_piece(piece as u32) {
                Ok(n) => sent += n,
                Err(SwarmError::NoPeerAvailable(piece)) => {
                    trace!(piece, "no peer for piece");
                }
                Err(e) => return Err(e),
            }
        }
        debug!(requests = sent, "requested missing pieces");
        Ok(sent)
    }

    /// Stops discovery, closes every session and ends the exchange loop.
    pub async fn stop(&self) -> Result<(), SwarmError> {
        let result = self.exchange.manager.stop_discovery(&self.swarm_id()).await;
        self.exchange.manager.close_all();
        self.task.abort();
        info!(swarm = %self.swarm_id(), "swarm stopped");
        result
    }
}

impl Drop for Swarm {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl std::fmt::Debug for Swarm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Swarm")
            .field("swarm", &self.swarm_id())
            .field("have", &self.exchange.pieces.bitfield().count())
            .field("peers", &self.exchange.manager.peer_count())
            .finish()
    }
}
