//! synapse - signed, updatable BitTorrent swarms
//!
//! Torrents are described by a signed descriptor whose identity is the hash
//! of its encoded form. Publishers point at the current version through a
//! BEP-44 mutable record in the DHT, and followers subscribe to that record
//! to learn about new versions as their sequence number grows.
//!
//! # Modules
//!
//! - [`bencode`] - BEP-3 Bencode encoding/decoding
//! - [`crypto`] - Named hash and signature algorithm registries, key pairs
//! - [`metainfo`] - Signed torrent descriptors and swarm ids
//! - [`piece`] - Piece ownership and verification
//! - [`peer`] - Peer sessions, wire messages, extensions
//! - [`discovery`] - Pluggable peer discovery strategies
//! - [`swarm`] - Peer management and piece exchange
//! - [`dht`] - BEP-44 mutable records: publish, resolve, subscribe
//! - [`config`] - Client configuration

pub mod bencode;
pub mod config;
pub mod constants;
pub mod crypto;
pub mod dht;
pub mod discovery;
pub mod metainfo;
pub mod peer;
pub mod piece;
pub mod swarm;

pub use bencode::{decode, encode, BencodeError, Value};
pub use config::{ClientConfig, ConfigError, DhtConfig};
pub use crypto::{CryptoError, HashService, KeyPair, SigningService};
pub use dht::{DhtError, DhtNode, DhtService, MemoryDht, MutableRecord, Subscription, TargetKey};
pub use discovery::{DiscoveryError, FoundPeer, PeerStrategy};
pub use metainfo::{Info, MetainfoError, SignedMetainfo, SwarmId};
pub use peer::{Bitfield, Block, BlockRequest, Message, Peer, PeerError, PeerId, WireExtension};
pub use piece::{PieceError, PieceManager};
pub use swarm::{PeerManager, PeerManagerEvent, Swarm, SwarmError};
