//! Local piece possession.
//!
//! [`PieceManager`] owns the local [`Bitfield`](crate::peer::Bitfield) of one
//! swarm. Every peer reads it to answer handshakes; the only writer is piece
//! completion.

mod error;
mod manager;

pub use error::PieceError;
pub use manager::PieceManager;

#[cfg(test)]
mod tests;
