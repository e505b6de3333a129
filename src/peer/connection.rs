use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, Notify};
use tracing::{debug, trace};

use super::bitfield::Bitfield;
use super::block::{Block, BlockRequest};
use super::error::PeerError;
use super::message::Message;
use super::peer_id::PeerId;
use super::session::WireSession;

/// Supplies the local bitfield whenever a remote asks what we have.
pub type BitfieldSource = Arc<dyn Fn() -> Bitfield + Send + Sync>;

/// Lifecycle of a peer session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    /// Our handshake is out, the remote's has not arrived.
    Connecting,
    /// Handshakes exchanged.
    Active,
    /// Terminal. A closed peer is never reused.
    Closed,
}

/// Inbound protocol events surfaced by a [`Peer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    Piece(Block),
    Bitfield(Bitfield),
    Request(BlockRequest),
    Have(u32),
    /// Sent exactly once, after the peer has been marked closed.
    Closed,
}

/// One live wire session and the remote side's protocol state.
///
/// A reader task owns the inbound half of the session and forwards events on
/// the channel returned by [`Peer::spawn`]. Outbound actions write straight to
/// the session and fail with [`PeerError::SessionClosed`] once the peer is
/// closed.
pub struct Peer {
    local_id: PeerId,
    piece_count: usize,
    extensions: Vec<String>,
    remote_id: Mutex<Option<PeerId>>,
    remote_extensions: Mutex<Vec<String>>,
    bitfield: RwLock<Option<Bitfield>>,
    state: RwLock<PeerState>,
    outbound: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    am_interested: AtomicBool,
    peer_interested: AtomicBool,
    shutdown: Notify,
}

impl Peer {
    /// Wraps `session`, sends our handshake and starts the reader task.
    ///
    /// `bitfield_source` is consulted every time the remote handshake
    /// arrives; its length fixes the piece count for this session.
    pub fn spawn(
        session: WireSession,
        local_id: PeerId,
        bitfield_source: BitfieldSource,
    ) -> (Arc<Peer>, mpsc::UnboundedReceiver<PeerEvent>) {
        let (outbound, inbound, extensions) = session.into_parts();
        let piece_count = bitfield_source().len();

        let peer = Arc::new(Peer {
            local_id,
            piece_count,
            extensions: extensions.clone(),
            remote_id: Mutex::new(None),
            remote_extensions: Mutex::new(Vec::new()),
            bitfield: RwLock::new(None),
            state: RwLock::new(PeerState::Connecting),
            outbound: Mutex::new(Some(outbound)),
            am_interested: AtomicBool::new(false),
            peer_interested: AtomicBool::new(false),
            shutdown: Notify::new(),
        });

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        if let Err(e) = peer.send(Message::Handshake {
            peer_id: local_id,
            extensions,
        }) {
            debug!(error = %e, "remote gone before handshake");
        }

        tokio::spawn(Arc::clone(&peer).run(inbound, events_tx, bitfield_source));
        (peer, events_rx)
    }

    async fn run(
        self: Arc<Self>,
        mut inbound: mpsc::UnboundedReceiver<Message>,
        events: mpsc::UnboundedSender<PeerEvent>,
        bitfield_source: BitfieldSource,
    ) {
        loop {
            tokio::select! {
                _ = self.shutdown.notified() => break,
                message = inbound.recv() => match message {
                    Some(message) => self.handle(message, &events, &bitfield_source),
                    None => break,
                },
            }
        }

        self.mark_closed();
        debug!(peer = ?self.remote_id(), "peer session closed");
        let _ = events.send(PeerEvent::Closed);
    }

    fn handle(
        &self,
        message: Message,
        events: &mpsc::UnboundedSender<PeerEvent>,
        bitfield_source: &BitfieldSource,
    ) {
        trace!(kind = message.kind(), peer = ?self.remote_id(), "received");

        let event = match message {
            Message::Handshake {
                peer_id,
                extensions,
            } => {
                *self.remote_id.lock() = Some(peer_id);
                *self.remote_extensions.lock() = extensions;
                {
                    let mut state = self.state.write();
                    if *state == PeerState::Connecting {
                        *state = PeerState::Active;
                    }
                }
                if let Err(e) = self.send_bitfield(&bitfield_source()) {
                    debug!(error = %e, "could not answer handshake");
                }
                None
            }
            Message::Interested => {
                self.peer_interested.store(true, Ordering::Release);
                None
            }
            Message::NotInterested => {
                self.peer_interested.store(false, Ordering::Release);
                None
            }
            Message::Have { piece } => {
                let mut bitfield = self.bitfield.write();
                let bitfield = bitfield.get_or_insert_with(|| Bitfield::new(self.piece_count));
                if (piece as usize) < bitfield.len() {
                    bitfield.set(piece as usize);
                    Some(PeerEvent::Have(piece))
                } else {
                    debug!(piece, "ignoring have for unknown piece");
                    None
                }
            }
            Message::Bitfield(remote) => {
                let remote = Bitfield::from_bytes(remote.as_bytes(), self.piece_count);
                *self.bitfield.write() = Some(remote.clone());
                Some(PeerEvent::Bitfield(remote))
            }
            Message::Request(request) => Some(PeerEvent::Request(request)),
            Message::Piece(block) => Some(PeerEvent::Piece(block)),
            Message::Cancel(request) => {
                trace!(?request, "remote cancelled request");
                None
            }
        };

        if let Some(event) = event {
            let _ = events.send(event);
        }
    }

    fn mark_closed(&self) {
        *self.state.write() = PeerState::Closed;
        self.outbound.lock().take();
    }

    fn send(&self, message: Message) -> Result<(), PeerError> {
        let outbound = self.outbound.lock();
        let tx = outbound.as_ref().ok_or(PeerError::SessionClosed)?;
        tx.send(message).map_err(|_| PeerError::SessionClosed)
    }

    pub fn request(&self, request: BlockRequest) -> Result<(), PeerError> {
        self.send(Message::Request(request))
    }

    pub fn cancel(&self, request: BlockRequest) -> Result<(), PeerError> {
        self.send(Message::Cancel(request))
    }

    pub fn have(&self, piece: u32) -> Result<(), PeerError> {
        self.send(Message::Have { piece })
    }

    pub fn send_bitfield(&self, bitfield: &Bitfield) -> Result<(), PeerError> {
        self.send(Message::Bitfield(bitfield.clone()))
    }

    pub fn send_piece(&self, block: Block) -> Result<(), PeerError> {
        self.send(Message::Piece(block))
    }

    pub fn set_interested(&self) -> Result<(), PeerError> {
        self.send(Message::Interested)?;
        self.am_interested.store(true, Ordering::Release);
        Ok(())
    }

    pub fn set_uninterested(&self) -> Result<(), PeerError> {
        self.send(Message::NotInterested)?;
        self.am_interested.store(false, Ordering::Release);
        Ok(())
    }

    /// Ends the session. The remote observes closure and a
    /// [`PeerEvent::Closed`] follows on the event channel.
    pub fn close(&self) {
        self.mark_closed();
        self.shutdown.notify_one();
    }

    pub fn state(&self) -> PeerState {
        *self.state.read()
    }

    pub fn is_closed(&self) -> bool {
        self.state() == PeerState::Closed
    }

    pub fn local_id(&self) -> PeerId {
        self.local_id
    }

    /// The remote's id, known once its handshake has arrived.
    pub fn remote_id(&self) -> Option<PeerId> {
        *self.remote_id.lock()
    }

    /// Extensions attached on our side of the session.
    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    pub fn remote_extensions(&self) -> Vec<String> {
        self.remote_extensions.lock().clone()
    }

    /// Snapshot of the remote bitfield; `None` until a bitfield or have
    /// message has arrived.
    pub fn bitfield(&self) -> Option<Bitfield> {
        self.bitfield.read().clone()
    }

    pub fn has_piece(&self, index: usize) -> bool {
        self.bitfield
            .read()
            .as_ref()
            .is_some_and(|bf| bf.has(index))
    }

    /// True when a remote bitfield exists and covers `index`, whether or not
    /// the bit is set.
    pub fn knows_piece(&self, index: usize) -> bool {
        self.bitfield
            .read()
            .as_ref()
            .is_some_and(|bf| index < bf.len())
    }

    pub fn am_interested(&self) -> bool {
        self.am_interested.load(Ordering::Acquire)
    }

    pub fn peer_interested(&self) -> bool {
        self.peer_interested.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for Peer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Peer")
            .field("local_id", &self.local_id)
            .field("remote_id", &self.remote_id())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
