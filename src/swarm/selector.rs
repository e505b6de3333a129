use std::sync::Arc;

use super::manager::SessionId;
use crate::peer::Peer;

/// Chooses which live peer a block request goes to.
///
/// `select` returns an index into `peers`, which holds the live set in
/// session order at the time of the request.
pub trait PeerSelector: Send + Sync {
    fn name(&self) -> &str;

    fn select(&self, peers: &[(SessionId, Arc<Peer>)], piece: u32) -> Option<usize>;
}

/// First peer whose bitfield has the piece. The default.
#[derive(Debug, Clone, Copy, Default)]
pub struct PieceHolder;

impl PeerSelector for PieceHolder {
    fn name(&self) -> &str {
        "piece-holder"
    }

    fn select(&self, peers: &[(SessionId, Arc<Peer>)], piece: u32) -> Option<usize> {
        peers
            .iter()
            .position(|(_, peer)| !peer.is_closed() && peer.has_piece(piece as usize))
    }
}

/// First peer with any bitfield covering the piece, whether or not it holds
/// it.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnyKnownBitfield;

impl PeerSelector for AnyKnownBitfield {
    fn name(&self) -> &str {
        "any-known-bitfield"
    }

    fn select(&self, peers: &[(SessionId, Arc<Peer>)], piece: u32) -> Option<usize> {
        peers
            .iter()
            .position(|(_, peer)| !peer.is_closed() && peer.knows_piece(piece as usize))
    }
}
