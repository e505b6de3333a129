use thiserror::Error;

use crate::crypto::CryptoError;

#[derive(Debug, Error)]
pub enum PieceError {
    #[error("piece index {index} out of range for {count} pieces")]
    IndexOutOfRange { index: usize, count: usize },

    #[error("piece hash mismatch for piece {0}")]
    HashMismatch(usize),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}
