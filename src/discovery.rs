//! Pluggable peer discovery.
//!
//! A [`PeerStrategy`] finds remote endpoints for a discovery key and hands
//! established [`WireSession`](crate::peer::WireSession)s to whoever attached
//! a sink. Strategies run independently; the swarm layer drives every
//! registered strategy concurrently and never needs to know which transport
//! produced a session.
//!
//! [`MemoryNetwork`] is an in-process rendezvous used to connect swarms that
//! live in the same process, such as in tests.

mod error;
mod memory;
mod strategy;

pub use error::DiscoveryError;
pub use memory::{MemoryNetwork, MemoryStrategy};
pub use strategy::{FoundPeer, FoundSink, PeerStrategy};
