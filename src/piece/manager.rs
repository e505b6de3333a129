use parking_lot::RwLock;
use tracing::{debug, info};

use super::error::PieceError;
use crate::crypto::HashService;
use crate::metainfo::Info;
use crate::peer::Bitfield;

/// Canonical local bitfield for one swarm.
///
/// Reads return a snapshot taken under a shared lock, so a reader never sees
/// a half-applied update. Marking is idempotent.
#[derive(Debug)]
pub struct PieceManager {
    bitfield: RwLock<Bitfield>,
}

impl PieceManager {
    /// Nothing held yet.
    pub fn new(piece_count: usize) -> Self {
        Self {
            bitfield: RwLock::new(Bitfield::new(piece_count)),
        }
    }

    /// Every piece held, as for a seed.
    pub fn full(piece_count: usize) -> Self {
        Self {
            bitfield: RwLock::new(Bitfield::full(piece_count)),
        }
    }

    pub fn bitfield(&self) -> Bitfield {
        self.bitfield.read().clone()
    }

    pub fn piece_count(&self) -> usize {
        self.bitfield.read().len()
    }

    pub fn has_piece(&self, index: usize) -> bool {
        self.bitfield.read().has(index)
    }

    pub fn missing_pieces(&self) -> Vec<usize> {
        self.bitfield.read().missing()
    }

    pub fn is_complete(&self) -> bool {
        self.bitfield.read().is_complete()
    }

    /// Records piece `index` as held. Returns true if it was not held before.
    ///
    /// The caller is responsible for having verified the data; see
    /// [`verify_and_complete`](Self::verify_and_complete).
    pub fn mark_complete(&self, index: usize) -> Result<bool, PieceError> {
        let mut bitfield = self.bitfield.write();
        let count = bitfield.len();
        if index >= count {
            return Err(PieceError::IndexOutOfRange { index, count });
        }

        let newly_set = bitfield.set(index);
        if newly_set {
            debug!(piece = index, have = bitfield.count(), total = count, "piece complete");
            if bitfield.is_complete() {
                info!(pieces = count, "all pieces complete");
            }
        }
        Ok(newly_set)
    }

    /// Checks `data` against the declared hash of piece `index` and marks it
    /// complete only if it matches.
    pub async fn verify_and_complete(
        &self,
        index: usize,
        data: &[u8],
        info: &Info,
        hashes: &HashService,
    ) -> Result<bool, PieceError> {
        let count = self.piece_count();
        let expected = u32::try_from(index)
            .ok()
            .and_then(|i| info.piece_hash(i))
            .ok_or(PieceError::IndexOutOfRange { index, count })?;

        let actual = hashes.hash(data, &info.hash_algorithm).await?;
        if &actual != expected {
            debug!(piece = index, "piece failed verification");
            return Err(PieceError::HashMismatch(index));
        }
        self.mark_complete(index)
    }
}
