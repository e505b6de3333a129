use super::bitfield::Bitfield;
use super::block::{Block, BlockRequest};
use super::peer_id::PeerId;

/// A decoded peer wire message.
///
/// Byte-level framing belongs to the transport that feeds a
/// [`WireSession`](super::WireSession); the core only sees typed messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// First message on every session. Receiving the remote handshake is the
    /// signal to advertise our bitfield.
    Handshake {
        peer_id: PeerId,
        /// Names of the wire extensions attached on the sending side.
        extensions: Vec<String>,
    },
    Interested,
    NotInterested,
    Have {
        piece: u32,
    },
    Bitfield(Bitfield),
    Request(BlockRequest),
    Cancel(BlockRequest),
    Piece(Block),
}

impl Message {
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Handshake { .. } => "handshake",
            Message::Interested => "interested",
            Message::NotInterested => "not_interested",
            Message::Have { .. } => "have",
            Message::Bitfield(_) => "bitfield",
            Message::Request(_) => "request",
            Message::Cancel(_) => "cancel",
            Message::Piece(_) => "piece",
        }
    }
}
