use bytes::Bytes;

use crate::constants::BLOCK_SIZE;

/// A sub-range of a piece, as requested over the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockRequest {
    pub piece: u32,
    pub offset: u32,
    pub length: u32,
}

impl BlockRequest {
    pub fn new(piece: u32, offset: u32, length: u32) -> Self {
        Self {
            piece,
            offset,
            length,
        }
    }

    /// Splits a piece of `piece_size` bytes into [`BLOCK_SIZE`] requests.
    /// The final block may be short.
    pub fn split_piece(piece: u32, piece_size: u64) -> Vec<BlockRequest> {
        let count = piece_size.div_ceil(BLOCK_SIZE as u64);
        (0..count)
            .map(|i| {
                let offset = i * BLOCK_SIZE as u64;
                let length = (piece_size - offset).min(BLOCK_SIZE as u64);
                BlockRequest::new(piece, offset as u32, length as u32)
            })
            .collect()
    }
}

/// Piece data received from, or sent to, a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub piece: u32,
    pub offset: u32,
    pub data: Bytes,
}

impl Block {
    pub fn new(piece: u32, offset: u32, data: impl Into<Bytes>) -> Self {
        Self {
            piece,
            offset,
            data: data.into(),
        }
    }

    /// The request this block answers.
    pub fn request(&self) -> BlockRequest {
        BlockRequest::new(self.piece, self.offset, self.data.len() as u32)
    }
}
