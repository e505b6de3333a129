//! Swarm coordination.
//!
//! [`PeerManager`] owns the live peer sessions of one swarm. It drives every
//! registered [`PeerStrategy`](crate::discovery::PeerStrategy), attaches
//! [`WireExtension`](crate::peer::WireExtension)s to each new session, and
//! fans peer events into a single [`PeerManagerEvent`] stream. Block requests
//! are routed through a swappable [`PeerSelector`].
//!
//! [`Swarm`] layers piece exchange on top: it serves blocks from a
//! [`PieceStore`], assembles and verifies received pieces, and announces
//! completed ones. [`follow`] connects the DHT to this layer by turning
//! pointer updates into verified descriptors ready to start a new swarm.
//!
//! ```
//! use std::sync::Arc;
//! use synapse::constants::{ED25519, SHA256};
//! use synapse::crypto::{HashService, SigningService};
//! use synapse::discovery::MemoryNetwork;
//! use synapse::metainfo::{Info, SignedMetainfo};
//! use synapse::swarm::{MemoryStore, PeerManager, Swarm};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let hashes = Arc::new(HashService::with_defaults());
//! let keys = SigningService::with_defaults().generate_key_pair(ED25519)?;
//! let content = vec![7u8; 100_000];
//!
//! let info = Info::from_content("blob", &content, 32 * 1024, SHA256, &hashes).await?;
//! let metainfo = SignedMetainfo::create(info, &keys, &hashes, 1).await?;
//!
//! let network = MemoryNetwork::new();
//! let seed = Swarm::start(
//!     metainfo.clone(),
//!     Arc::new(MemoryStore::from_content(&content, 32 * 1024)),
//!     PeerManager::builder(Arc::clone(&hashes)).strategy(Arc::new(network.strategy("seed"))),
//! )
//! .await?;
//! assert!(seed.pieces().is_complete());
//!
//! let leech = Swarm::start(
//!     metainfo,
//!     Arc::new(MemoryStore::new()),
//!     PeerManager::builder(hashes).strategy(Arc::new(network.strategy("leech"))),
//! )
//! .await?;
//! // Once the seed's bitfield has arrived:
//! let _ = leech.request_missing();
//! # Ok(())
//! # }
//! ```

mod error;
mod exchange;
mod follow;
mod manager;
mod selector;
mod store;

pub use error::{StoreError, SwarmError};
pub use exchange::Swarm;
pub use follow::{follow, FollowUpdate, MetainfoCatalog, MetainfoResolver};
pub use manager::{PeerManager, PeerManagerBuilder, PeerManagerEvent, SessionId};
pub use selector::{AnyKnownBitfield, PeerSelector, PieceHolder};
pub use store::{MemoryStore, PieceStore};

#[cfg(test)]
mod tests;
