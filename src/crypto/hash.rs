use super::error::CryptoError;
use crate::constants::{BLAKE3, SHA1, SHA256};
use async_trait::async_trait;
use bytes::Bytes;
use sha1::{Digest, Sha1};
use sha2::Sha256;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A named content-hash algorithm.
///
/// Hashing is asynchronous so that implementations backed by lazily
/// initialized or out-of-process hashers fit behind the same interface.
#[async_trait]
pub trait HashAlgorithm: Send + Sync {
    fn name(&self) -> &str;

    async fn hash(&self, data: &[u8]) -> Bytes;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Sha1Hash;

#[async_trait]
impl HashAlgorithm for Sha1Hash {
    fn name(&self) -> &str {
        SHA1
    }

    async fn hash(&self, data: &[u8]) -> Bytes {
        Bytes::copy_from_slice(&Sha1::digest(data))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Sha256Hash;

#[async_trait]
impl HashAlgorithm for Sha256Hash {
    fn name(&self) -> &str {
        SHA256
    }

    async fn hash(&self, data: &[u8]) -> Bytes {
        Bytes::copy_from_slice(&Sha256::digest(data))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Blake3Hash;

#[async_trait]
impl HashAlgorithm for Blake3Hash {
    fn name(&self) -> &str {
        BLAKE3
    }

    async fn hash(&self, data: &[u8]) -> Bytes {
        Bytes::copy_from_slice(blake3::hash(data).as_bytes())
    }
}

/// Registry of hash algorithms keyed by name.
#[derive(Clone, Default)]
pub struct HashService {
    algorithms: HashMap<String, Arc<dyn HashAlgorithm>>,
}

impl HashService {
    pub fn new(algorithms: impl IntoIterator<Item = Arc<dyn HashAlgorithm>>) -> Self {
        let mut service = Self::default();
        for algorithm in algorithms {
            service.register(algorithm);
        }
        service
    }

    /// SHA-1, SHA-256 and BLAKE3.
    pub fn with_defaults() -> Self {
        Self::new([
            Arc::new(Sha1Hash) as Arc<dyn HashAlgorithm>,
            Arc::new(Sha256Hash),
            Arc::new(Blake3Hash),
        ])
    }

    /// Registers an algorithm, replacing any previous one with the same name.
    pub fn register(&mut self, algorithm: Arc<dyn HashAlgorithm>) {
        self.algorithms
            .insert(algorithm.name().to_string(), algorithm);
    }

    pub fn supports(&self, algorithm: &str) -> bool {
        self.algorithms.contains_key(algorithm)
    }

    pub fn algorithms(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.algorithms.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub async fn hash(&self, data: &[u8], algorithm: &str) -> Result<Bytes, CryptoError> {
        let hasher = self
            .algorithms
            .get(algorithm)
            .ok_or_else(|| CryptoError::UnsupportedAlgorithm(algorithm.to_string()))?;
        Ok(hasher.hash(data).await)
    }
}

impl fmt::Debug for HashService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashService")
            .field("algorithms", &self.algorithms())
            .finish()
    }
}
