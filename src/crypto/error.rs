use thiserror::Error;

/// Errors from the hash and signature registries.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// No algorithm with this name is registered.
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// A key has the wrong length or is not a valid key for the algorithm.
    #[error("invalid {kind} key for {algorithm}")]
    InvalidKey {
        algorithm: &'static str,
        kind: &'static str,
    },

    /// The public key does not belong to the secret key.
    #[error("public key does not match secret key for {0}")]
    KeyMismatch(&'static str),

    /// A key pair failed its self-check and must not be used.
    #[error("key pair failed validation")]
    InvalidKeyPair,

    /// A hex-encoded key could not be decoded.
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),
}
