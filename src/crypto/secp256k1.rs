use super::error::CryptoError;
use super::signing::SigningAlgorithm;
use crate::constants::SECP256K1;
use bytes::Bytes;
use k256::ecdsa::signature::{Signer, Verifier};
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};

/// ECDSA over secp256k1.
///
/// Secret keys are 32-byte scalars, public keys are 33-byte compressed SEC1
/// points and signatures are the 64-byte `r || s` form. Messages are hashed
/// with SHA-256 before signing.
#[derive(Debug, Default, Clone, Copy)]
pub struct Secp256k1Algorithm;

impl Secp256k1Algorithm {
    fn signing_key(secret_key: &[u8]) -> Result<SigningKey, CryptoError> {
        SigningKey::from_slice(secret_key).map_err(|_| CryptoError::InvalidKey {
            algorithm: SECP256K1,
            kind: "secret",
        })
    }

    fn encode_public(signing_key: &SigningKey) -> Bytes {
        Bytes::copy_from_slice(
            signing_key
                .verifying_key()
                .to_encoded_point(true)
                .as_bytes(),
        )
    }
}

impl SigningAlgorithm for Secp256k1Algorithm {
    fn name(&self) -> &'static str {
        SECP256K1
    }

    fn generate_key_pair(&self) -> (Bytes, Bytes) {
        // A random 32-byte string is a valid scalar except with negligible probability.
        loop {
            let candidate: [u8; 32] = rand::random();
            if let Ok(signing_key) = SigningKey::from_slice(&candidate) {
                return (
                    Self::encode_public(&signing_key),
                    Bytes::copy_from_slice(&candidate),
                );
            }
        }
    }

    fn derive_public_key(&self, secret_key: &[u8]) -> Result<Bytes, CryptoError> {
        Ok(Self::encode_public(&Self::signing_key(secret_key)?))
    }

    fn is_valid_public_key(&self, public_key: &[u8]) -> bool {
        public_key.len() == 33 && VerifyingKey::from_sec1_bytes(public_key).is_ok()
    }

    fn sign(
        &self,
        message: &[u8],
        secret_key: &[u8],
        public_key: &[u8],
    ) -> Result<Bytes, CryptoError> {
        let signing_key = Self::signing_key(secret_key)?;
        if Self::encode_public(&signing_key).as_ref() != public_key {
            return Err(CryptoError::KeyMismatch(SECP256K1));
        }
        let signature: Signature = signing_key.sign(message);
        Ok(Bytes::copy_from_slice(&signature.to_bytes()))
    }

    fn verify(&self, message: &[u8], signature: &[u8], public_key: &[u8]) -> bool {
        let Ok(key) = VerifyingKey::from_sec1_bytes(public_key) else {
            return false;
        };
        let Ok(signature) = Signature::from_slice(signature) else {
            return false;
        };
        key.verify(message, &signature).is_ok()
    }
}
