//! Signed torrent descriptors.
//!
//! An [`Info`] dictionary describes one content item: its name, size, piece
//! layout and one content hash per piece under a declared hash algorithm.
//! A [`SignedMetainfo`] binds that descriptor to a publisher identity: the
//! canonical bencoding of the info dictionary is hashed into the info hash,
//! and the info hash is signed with the publisher's key pair.
//!
//! The info hash is the [`SwarmId`] peers rendezvous on. A new version of the
//! content is a new `SignedMetainfo` with a higher sequence number, announced
//! through the DHT (see [`crate::dht`]).
//!
//! ```
//! use synapse::constants::{ED25519, SHA256};
//! use synapse::crypto::{HashService, SigningService};
//! use synapse::metainfo::{Info, SignedMetainfo};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let hashes = HashService::with_defaults();
//! let signing = SigningService::with_defaults();
//! let keys = signing.generate_key_pair(ED25519)?;
//!
//! let info = Info::from_content("notes.txt", b"hello swarm", 4, SHA256, &hashes).await?;
//! let metainfo = SignedMetainfo::create(info, &keys, &hashes, 0).await?;
//! metainfo.verify(&hashes, &signing).await?;
//!
//! let decoded = SignedMetainfo::decode(&metainfo.encode())?;
//! assert_eq!(decoded.swarm_id(), metainfo.swarm_id());
//! # Ok(())
//! # }
//! ```

mod error;
mod info;
mod signed;
mod swarm_id;

pub use error::MetainfoError;
pub use info::Info;
pub use signed::SignedMetainfo;
pub use swarm_id::SwarmId;

#[cfg(test)]
mod tests;
