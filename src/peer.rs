//! Peer sessions.
//!
//! A [`WireSession`] is an established duplex of typed [`Message`]s produced
//! by a discovery transport. [`Peer::spawn`] wraps one session: it announces
//! our handshake, answers the remote handshake with the local [`Bitfield`],
//! mirrors the remote bitfield from `bitfield` and `have` messages, and
//! forwards inbound traffic as [`PeerEvent`]s on a channel owned by the
//! caller. [`WireExtension`]s get a chance to attach to each session before it
//! is wrapped.

mod bitfield;
mod block;
mod connection;
mod error;
mod extension;
mod message;
mod peer_id;
mod session;

pub use bitfield::Bitfield;
pub use block::{Block, BlockRequest};
pub use connection::{BitfieldSource, Peer, PeerEvent, PeerState};
pub use error::PeerError;
pub use extension::WireExtension;
pub use message::Message;
pub use peer_id::PeerId;
pub use session::WireSession;

#[cfg(test)]
mod tests;
