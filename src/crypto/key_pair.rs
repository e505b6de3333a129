use super::error::CryptoError;
use super::signing::SigningAlgorithm;
use bytes::Bytes;
use std::fmt;
use std::sync::Arc;

/// A public/secret key pair bound to the algorithm that produced it.
///
/// A pair restored from storage may be inconsistent. [`is_valid_key_pair`]
/// must pass before the pair is used to sign anything that others will
/// trust; [`DhtService::publish`] and [`SignedMetainfo::create`] enforce this.
///
/// [`is_valid_key_pair`]: KeyPair::is_valid_key_pair
/// [`DhtService::publish`]: crate::dht::DhtService::publish
/// [`SignedMetainfo::create`]: crate::metainfo::SignedMetainfo::create
#[derive(Clone)]
pub struct KeyPair {
    algorithm: Arc<dyn SigningAlgorithm>,
    public_key: Bytes,
    secret_key: Bytes,
}

impl KeyPair {
    pub fn new(algorithm: Arc<dyn SigningAlgorithm>, public_key: Bytes, secret_key: Bytes) -> Self {
        Self {
            algorithm,
            public_key,
            secret_key,
        }
    }

    pub fn generate(algorithm: Arc<dyn SigningAlgorithm>) -> Self {
        let (public_key, secret_key) = algorithm.generate_key_pair();
        Self::new(algorithm, public_key, secret_key)
    }

    /// Restores a pair from hex-encoded keys.
    pub fn from_hex(
        algorithm: Arc<dyn SigningAlgorithm>,
        public_key: &str,
        secret_key: &str,
    ) -> Result<Self, CryptoError> {
        Ok(Self::new(
            algorithm,
            hex::decode(public_key)?.into(),
            hex::decode(secret_key)?.into(),
        ))
    }

    /// Returns `(public_key, secret_key)` as hex strings.
    pub fn to_hex(&self) -> (String, String) {
        (hex::encode(&self.public_key), hex::encode(&self.secret_key))
    }

    pub fn algorithm(&self) -> &'static str {
        self.algorithm.name()
    }

    pub fn public_key(&self) -> &Bytes {
        &self.public_key
    }

    pub fn secret_key(&self) -> &Bytes {
        &self.secret_key
    }

    /// Re-derives the public key from the secret key and checks both keys.
    /// Never panics; any failure during the check reports `false`.
    pub fn is_valid_key_pair(&self) -> bool {
        self.algorithm
            .check_key_pair(&self.public_key, &self.secret_key)
    }

    pub fn sign(&self, message: &[u8]) -> Result<Bytes, CryptoError> {
        self.algorithm
            .sign(message, &self.secret_key, &self.public_key)
    }

    pub fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        self.algorithm
            .verify(message, signature, &self.public_key)
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("algorithm", &self.algorithm.name())
            .field("public_key", &hex::encode(&self.public_key))
            .field("secret_key", &"<redacted>")
            .finish()
    }
}
