use super::error::CryptoError;
use super::signing::SigningAlgorithm;
use crate::constants::ED25519;
use bytes::Bytes;
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};

const KEY_LEN: usize = 32;

/// Ed25519 signatures.
///
/// Secret keys are the 32-byte seed; public keys are the 32-byte compressed
/// Edwards point. Verification uses the strict variant, which rejects
/// small-order keys and non-canonical signatures.
#[derive(Debug, Default, Clone, Copy)]
pub struct Ed25519Algorithm;

impl Ed25519Algorithm {
    fn signing_key(secret_key: &[u8]) -> Result<SigningKey, CryptoError> {
        let seed: [u8; KEY_LEN] = secret_key.try_into().map_err(|_| CryptoError::InvalidKey {
            algorithm: ED25519,
            kind: "secret",
        })?;
        Ok(SigningKey::from_bytes(&seed))
    }

    fn verifying_key(public_key: &[u8]) -> Option<VerifyingKey> {
        let bytes: [u8; KEY_LEN] = public_key.try_into().ok()?;
        VerifyingKey::from_bytes(&bytes).ok()
    }
}

impl SigningAlgorithm for Ed25519Algorithm {
    fn name(&self) -> &'static str {
        ED25519
    }

    fn generate_key_pair(&self) -> (Bytes, Bytes) {
        let seed: [u8; KEY_LEN] = rand::random();
        let signing_key = SigningKey::from_bytes(&seed);
        (
            Bytes::copy_from_slice(signing_key.verifying_key().as_bytes()),
            Bytes::copy_from_slice(&seed),
        )
    }

    fn derive_public_key(&self, secret_key: &[u8]) -> Result<Bytes, CryptoError> {
        let signing_key = Self::signing_key(secret_key)?;
        Ok(Bytes::copy_from_slice(
            signing_key.verifying_key().as_bytes(),
        ))
    }

    fn is_valid_public_key(&self, public_key: &[u8]) -> bool {
        Self::verifying_key(public_key).is_some_and(|key| !key.is_weak())
    }

    fn sign(
        &self,
        message: &[u8],
        secret_key: &[u8],
        public_key: &[u8],
    ) -> Result<Bytes, CryptoError> {
        let signing_key = Self::signing_key(secret_key)?;
        if signing_key.verifying_key().as_bytes() != public_key {
            return Err(CryptoError::KeyMismatch(ED25519));
        }
        let signature = signing_key.sign(message);
        Ok(Bytes::copy_from_slice(&signature.to_bytes()))
    }

    fn verify(&self, message: &[u8], signature: &[u8], public_key: &[u8]) -> bool {
        let Some(key) = Self::verifying_key(public_key) else {
            return false;
        };
        let Ok(signature) = Signature::from_slice(signature) else {
            return false;
        };
        key.verify_strict(message, &signature).is_ok()
    }
}
