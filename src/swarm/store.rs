use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use dashmap::DashMap;

use super::error::StoreError;
use crate::peer::{Block, BlockRequest};

/// Where piece data lives.
///
/// The swarm writes every received block here, reads a piece back once it
/// may be complete, and serves block requests from it. Verification is the
/// swarm's job; a store only keeps bytes.
#[async_trait]
pub trait PieceStore: Send + Sync {
    async fn write_block(&self, block: &Block) -> Result<(), StoreError>;

    /// The requested range, or `None` if it has not been written yet.
    async fn read_block(&self, request: &BlockRequest) -> Result<Option<Bytes>, StoreError>;

    /// The first `size` bytes of `piece`, or `None` while any of them is
    /// missing.
    async fn read_piece(&self, piece: u32, size: u64) -> Result<Option<Bytes>, StoreError>;

    /// Drops everything written for `piece`.
    async fn discard_piece(&self, piece: u32) -> Result<(), StoreError>;

    /// Whether the first `size` bytes of `piece` are all written.
    async fn has_piece(&self, piece: u32, size: u64) -> Result<bool, StoreError> {
        Ok(self.read_piece(piece, size).await?.is_some())
    }
}

/// Blocks kept in memory, keyed by piece and offset.
#[derive(Debug, Default)]
pub struct MemoryStore {
    pieces: DashMap<u32, BTreeMap<u32, Bytes>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store already holding `data`, split into pieces of `piece_length`.
    pub fn from_content(data: &[u8], piece_length: u64) -> Self {
        let store = Self::new();
        if piece_length == 0 {
            return store;
        }
        for (index, chunk) in data.chunks(piece_length as usize).enumerate() {
            let mut blocks = BTreeMap::new();
            blocks.insert(0, Bytes::copy_from_slice(chunk));
            store.pieces.insert(index as u32, blocks);
        }
        store
    }

    /// Number of pieces with at least one block written.
    pub fn len(&self) -> usize {
        self.pieces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }

    /// Length of the gap-free prefix written for `piece`.
    fn covered(&self, piece: u32) -> usize {
        let Some(blocks) = self.pieces.get(&piece) else {
            return 0;
        };
        let mut end = 0;
        for (&offset, data) in blocks.iter() {
            let offset = offset as usize;
            if offset > end {
                break;
            }
            end = end.max(offset + data.len());
        }
        end
    }

    /// The first `len` bytes of `piece` if written without gaps.
    fn contiguous(&self, piece: u32, len: usize) -> Option<Bytes> {
        let blocks = self.pieces.get(&piece)?;
        let mut buf = BytesMut::with_capacity(len);
        for (&offset, data) in blocks.iter() {
            let offset = offset as usize;
            if offset > buf.len() || buf.len() >= len {
                break;
            }
            let skip = buf.len() - offset;
            if skip < data.len() {
                buf.extend_from_slice(&data[skip..]);
            }
        }
        if buf.len() < len {
            return None;
        }
        buf.truncate(len);
        Some(buf.freeze())
    }
}

#[async_trait]
impl PieceStore for MemoryStore {
    async fn write_block(&self, block: &Block) -> Result<(), StoreError> {
        self.pieces
            .entry(block.piece)
            .or_default()
            .insert(block.offset, block.data.clone());
        Ok(())
    }

    async fn read_block(&self, request: &BlockRequest) -> Result<Option<Bytes>, StoreError> {
        let end = request.offset as usize + request.length as usize;
        Ok(self
            .contiguous(request.piece, end)
            .map(|data| data.slice(request.offset as usize..)))
    }

    async fn read_piece(&self, piece: u32, size: u64) -> Result<Option<Bytes>, StoreError> {
        Ok(self.contiguous(piece, size as usize))
    }

    async fn discard_piece(&self, piece: u32) -> Result<(), StoreError> {
        self.pieces.remove(&piece);
        Ok(())
    }

    async fn has_piece(&self, piece: u32, size: u64) -> Result<bool, StoreError> {
        Ok(self.covered(piece) >= size as usize)
    }
}
