//! Mutable-record publish/subscribe over a DHT ([BEP-44]).
//!
//! A publisher signs a [`MutableRecord`] (a value plus a sequence number)
//! under its key pair. The record lives at a [`TargetKey`] derived from the
//! publisher's public key and an optional salt, so the key stays stable while
//! the value it points at changes.
//!
//! Subscribers poll a target through [`DhtService::subscribe`]. A record is
//! handed to the callback only if it hashes to the target, its signature
//! verifies, it is signed by the same key as the first record accepted for
//! that target, and its sequence is strictly greater than the last accepted
//! one. There is no timestamp: freshness rests on publishers increasing the
//! sequence number.
//!
//! Records are stored through a [`RecordStore`]: [`MemoryDht`] in process,
//! or [`DhtNode`] on a UDP Kademlia network.
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use synapse::constants::ED25519;
//! use synapse::crypto::SigningService;
//! use synapse::dht::{DhtService, MemoryDht};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let signing = Arc::new(SigningService::with_defaults());
//! let dht = DhtService::new(Arc::new(MemoryDht::new()), Arc::clone(&signing));
//! let keys = signing.generate_key_pair(ED25519)?;
//!
//! let record = dht.publish(&keys, &b"swarm-v1"[..], None, 1).await?;
//! let subscription = dht.subscribe(record.target, Duration::from_secs(1), |record, _| {
//!     println!("now at {:?}", record.value);
//! });
//! subscription.cancel();
//! # Ok(())
//! # }
//! ```
//!
//! [BEP-44]: http://bittorrent.org/beps/bep_0044.html

mod error;
mod message;
mod node;
mod record;
mod routing;
mod server;
mod service;
mod store;
mod verifier;

pub use error::DhtError;
pub use message::{DhtMessage, DhtQuery, DhtResponse, TransactionId};
pub use node::{Node, NodeId};
pub use record::{MutableRecord, TargetKey};
pub use routing::RoutingTable;
pub use server::DhtNode;
pub use service::{DhtService, Subscription};
pub use store::{MemoryDht, RecordStore};
pub use verifier::RecordVerifier;
