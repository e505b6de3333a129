use thiserror::Error;

use crate::bencode::BencodeError;
use crate::crypto::CryptoError;

/// Errors that can occur when building, parsing or verifying metainfo.
#[derive(Debug, Error)]
pub enum MetainfoError {
    /// The metainfo contains invalid bencode.
    #[error("bencode error: {0}")]
    Bencode(#[from] BencodeError),

    /// Hashing or signing failed, or an algorithm is not registered.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// A required field is missing.
    #[error("missing field: {0}")]
    MissingField(&'static str),

    /// A field has an invalid value or type.
    #[error("invalid field: {0}")]
    InvalidField(&'static str),

    /// The sequence number does not fit a bencoded integer.
    #[error("sequence {0} exceeds the largest encodable sequence")]
    SequenceOutOfRange(u64),

    /// The stored info hash does not match the info dictionary.
    #[error("info hash does not match info dictionary")]
    InfoHashMismatch,

    /// The publisher signature over the info hash does not verify.
    #[error("metainfo signature does not verify")]
    InvalidSignature,

    /// A hex-encoded identifier could not be decoded.
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),
}
