//! Pluggable content hashing and digital signatures.
//!
//! Algorithms are looked up by name through two registries, [`HashService`]
//! and [`SigningService`]. Both are closed at startup: callers register the
//! algorithms they trust and every later lookup is by the names in
//! [`crate::constants`]. Signed structures record the algorithm name they were
//! produced with, so verification always dispatches to the same algorithm.
//!
//! ```
//! use synapse::constants::{ED25519, SHA256};
//! use synapse::crypto::{HashService, SigningService};
//!
//! # async fn example() -> Result<(), synapse::crypto::CryptoError> {
//! let hashes = HashService::with_defaults();
//! let digest = hashes.hash(b"hello", SHA256).await?;
//! assert_eq!(digest.len(), 32);
//!
//! let signing = SigningService::with_defaults();
//! let keys = signing.generate_key_pair(ED25519)?;
//! assert!(keys.is_valid_key_pair());
//! let signature = keys.sign(b"hello")?;
//! assert!(signing.verify(b"hello", &signature, keys.public_key(), ED25519)?);
//! # Ok(())
//! # }
//! ```

mod ed25519;
mod error;
mod hash;
mod key_pair;
mod secp256k1;
mod signing;

pub use ed25519::Ed25519Algorithm;
pub use error::CryptoError;
pub use hash::{Blake3Hash, HashAlgorithm, HashService, Sha1Hash, Sha256Hash};
pub use key_pair::KeyPair;
pub use secp256k1::Secp256k1Algorithm;
pub use signing::{SigningAlgorithm, SigningService};
