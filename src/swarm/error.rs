use thiserror::Error;

use crate::crypto::CryptoError;
use crate::dht::DhtError;
use crate::discovery::DiscoveryError;
use crate::metainfo::MetainfoError;
use crate::peer::PeerError;
use crate::piece::PieceError;

/// Errors from a [`PieceStore`](super::PieceStore) backend.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("block out of range: piece {piece} offset {offset} length {length}")]
    OutOfRange { piece: u32, offset: u32, length: u32 },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum SwarmError {
    /// A swarm with no way to find peers is a configuration error.
    #[error("no peer discovery strategy registered")]
    NoDiscoveryStrategy,

    #[error("no peer available for piece {0}")]
    NoPeerAvailable(u32),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error(transparent)]
    Peer(#[from] PeerError),

    #[error(transparent)]
    Piece(#[from] PieceError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Metainfo(#[from] MetainfoError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Dht(#[from] DhtError),
}
