use super::ed25519::Ed25519Algorithm;
use super::error::CryptoError;
use super::key_pair::KeyPair;
use super::secp256k1::Secp256k1Algorithm;
use bytes::Bytes;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// A named asymmetric signature algorithm.
pub trait SigningAlgorithm: Send + Sync {
    fn name(&self) -> &'static str;

    /// Generates a fresh `(public_key, secret_key)` pair.
    fn generate_key_pair(&self) -> (Bytes, Bytes);

    /// Re-derives the public key belonging to `secret_key`.
    fn derive_public_key(&self, secret_key: &[u8]) -> Result<Bytes, CryptoError>;

    fn is_valid_public_key(&self, public_key: &[u8]) -> bool;

    fn sign(
        &self,
        message: &[u8],
        secret_key: &[u8],
        public_key: &[u8],
    ) -> Result<Bytes, CryptoError>;

    /// Returns false for malformed keys or signatures as well as for
    /// signatures that do not match.
    fn verify(&self, message: &[u8], signature: &[u8], public_key: &[u8]) -> bool;

    /// Checks that both keys are well formed and that the public key is the
    /// one derived from the secret key.
    fn check_key_pair(&self, public_key: &[u8], secret_key: &[u8]) -> bool {
        if !self.is_valid_public_key(public_key) {
            debug!("{} key pair check: malformed public key", self.name());
            return false;
        }
        match self.derive_public_key(secret_key) {
            Ok(derived) => derived.as_ref() == public_key,
            Err(e) => {
                debug!("{} key pair check: {}", self.name(), e);
                false
            }
        }
    }
}

/// Registry of signature algorithms keyed by name.
#[derive(Clone, Default)]
pub struct SigningService {
    algorithms: HashMap<&'static str, Arc<dyn SigningAlgorithm>>,
}

impl SigningService {
    pub fn new(algorithms: impl IntoIterator<Item = Arc<dyn SigningAlgorithm>>) -> Self {
        let mut service = Self::default();
        for algorithm in algorithms {
            service.register(algorithm);
        }
        service
    }

    /// Ed25519 and secp256k1.
    pub fn with_defaults() -> Self {
        Self::new([
            Arc::new(Ed25519Algorithm) as Arc<dyn SigningAlgorithm>,
            Arc::new(Secp256k1Algorithm),
        ])
    }

    pub fn register(&mut self, algorithm: Arc<dyn SigningAlgorithm>) {
        self.algorithms.insert(algorithm.name(), algorithm);
    }

    pub fn supports(&self, algorithm: &str) -> bool {
        self.algorithms.contains_key(algorithm)
    }

    pub fn algorithms(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.algorithms.keys().copied().collect();
        names.sort_unstable();
        names
    }

    pub fn algorithm(&self, name: &str) -> Result<Arc<dyn SigningAlgorithm>, CryptoError> {
        self.algorithms
            .get(name)
            .cloned()
            .ok_or_else(|| CryptoError::UnsupportedAlgorithm(name.to_string()))
    }

    pub fn generate_key_pair(&self, algorithm: &str) -> Result<KeyPair, CryptoError> {
        Ok(KeyPair::generate(self.algorithm(algorithm)?))
    }

    /// Rebuilds a stored key pair. The pair is not checked here; call
    /// [`KeyPair::is_valid_key_pair`] before trusting it.
    pub fn key_pair(
        &self,
        algorithm: &str,
        public_key: impl Into<Bytes>,
        secret_key: impl Into<Bytes>,
    ) -> Result<KeyPair, CryptoError> {
        Ok(KeyPair::new(
            self.algorithm(algorithm)?,
            public_key.into(),
            secret_key.into(),
        ))
    }

    pub fn sign(
        &self,
        message: &[u8],
        algorithm: &str,
        secret_key: &[u8],
        public_key: &[u8],
    ) -> Result<Bytes, CryptoError> {
        self.algorithm(algorithm)?
            .sign(message, secret_key, public_key)
    }

    pub fn verify(
        &self,
        message: &[u8],
        signature: &[u8],
        public_key: &[u8],
        algorithm: &str,
    ) -> Result<bool, CryptoError> {
        Ok(self
            .algorithm(algorithm)?
            .verify(message, signature, public_key))
    }
}

impl fmt::Debug for SigningService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningService")
            .field("algorithms", &self.algorithms())
            .finish()
    }
}
