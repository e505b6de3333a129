use super::error::MetainfoError;
use bytes::Bytes;
use std::fmt;

/// Content-addressed handle for one torrent's data.
///
/// The length depends on the hash algorithm that produced it (20 bytes for
/// SHA-1, 32 for SHA-256 or BLAKE3).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SwarmId(Bytes);

impl SwarmId {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    pub fn from_hex(s: &str) -> Result<Self, MetainfoError> {
        Ok(Self(hex::decode(s)?.into()))
    }

    pub fn as_bytes(&self) -> &Bytes {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl AsRef<[u8]> for SwarmId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for SwarmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = self.to_hex();
        write!(f, "SwarmId({}..)", &hex[..hex.len().min(12)])
    }
}

impl fmt::Display for SwarmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}
