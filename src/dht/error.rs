use thiserror::Error;

use crate::bencode::BencodeError;
use crate::crypto::CryptoError;

#[derive(Debug, Error)]
pub enum DhtError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bencode error: {0}")]
    Bencode(#[from] BencodeError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("invalid node id length")]
    InvalidNodeId,

    #[error("invalid target key")]
    InvalidTarget,

    #[error("timeout")]
    Timeout,

    #[error("rate limited")]
    RateLimited,

    #[error("record value of {0} bytes exceeds the limit")]
    ValueTooLarge(usize),

    #[error("record salt of {0} bytes exceeds the limit")]
    SaltTooLarge(usize),

    /// The record's key and salt do not hash to the target it claims.
    #[error("record does not belong to its target key")]
    TargetMismatch,

    #[error("record signature does not verify")]
    InvalidSignature,

    /// A record for a trusted target was signed by a different public key.
    #[error("record signed by a different key than the trusted one")]
    KeyChanged,

    #[error("sequence {0} exceeds the largest encodable sequence")]
    SequenceOutOfRange(u64),

    #[error("stale sequence {sequence}, last accepted {last}")]
    StaleSequence { sequence: u64, last: u64 },

    /// Error reply from a remote node.
    #[error("remote error {code}: {message}")]
    Remote { code: i64, message: String },
}
