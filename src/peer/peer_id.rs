use std::fmt;

use crate::constants::SHA1;
use crate::crypto::{CryptoError, HashService};

/// A 20-byte peer identifier.
///
/// Derived as the SHA-1 of 16 random bytes. A swarm computes its id once and
/// reuses it for every session it opens.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerId(pub [u8; 20]);

impl PeerId {
    /// Hashes a fresh random seed into a new id.
    pub async fn generate(hashes: &HashService) -> Result<Self, CryptoError> {
        let seed: [u8; 16] = rand::random();
        let digest = hashes.hash(&seed, SHA1).await?;
        Self::from_bytes(&digest).ok_or(CryptoError::InvalidKey {
            algorithm: SHA1,
            kind: "peer id",
        })
    }

    /// Returns `None` unless `bytes` is exactly 20 bytes long.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        <[u8; 20]>::try_from(bytes).ok().map(Self)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({})", hex::encode(&self.0[..6]))
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}
