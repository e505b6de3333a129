use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{debug, trace};

use super::error::DiscoveryError;
use super::strategy::{FoundPeer, FoundSink, PeerStrategy};
use crate::peer::WireSession;

type Sinks = Arc<RwLock<Vec<FoundSink>>>;

#[derive(Clone)]
struct Member {
    id: u64,
    sinks: Sinks,
}

#[derive(Default)]
struct NetworkInner {
    topics: DashMap<Bytes, Vec<Member>>,
    next_id: AtomicU64,
    offline: AtomicBool,
}

/// In-process rendezvous point.
///
/// Every strategy that starts discovery on a key is connected to every other
/// strategy already on that key with a fresh [`WireSession::pair`].
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    inner: Arc<NetworkInner>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn strategy(&self, name: impl Into<String>) -> MemoryStrategy {
        MemoryStrategy {
            id: self.inner.next_id.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
            network: self.clone(),
            sinks: Arc::default(),
        }
    }

    /// Number of strategies currently discovering on `discovery_key`.
    pub fn members(&self, discovery_key: &[u8]) -> usize {
        self.inner
            .topics
            .get(discovery_key)
            .map_or(0, |topic| topic.len())
    }

    /// While offline, start and stop calls fail with
    /// [`DiscoveryError::Unavailable`].
    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::Release);
    }

    fn check_online(&self, strategy: &str) -> Result<(), DiscoveryError> {
        if self.inner.offline.load(Ordering::Acquire) {
            return Err(DiscoveryError::Unavailable {
                strategy: strategy.to_string(),
                reason: "network offline".into(),
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for MemoryNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryNetwork")
            .field("topics", &self.inner.topics.len())
            .finish()
    }
}

fn deliver(sinks: &Sinks, session: WireSession, discovery_key: &Bytes) {
    let mut sinks = sinks.write();
    sinks.retain(|sink| !sink.is_closed());
    match sinks.iter().find(|sink| sink.wants(discovery_key)) {
        Some(sink) => {
            let _ = sink.send(FoundPeer {
                session,
                discovery_key: discovery_key.clone(),
            });
        }
        None => trace!("no sink wants this key, dropping session"),
    }
}

/// One endpoint on a [`MemoryNetwork`].
pub struct MemoryStrategy {
    id: u64,
    name: String,
    network: MemoryNetwork,
    sinks: Sinks,
}

impl std::fmt::Debug for MemoryStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStrategy")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

#[async_trait]
impl PeerStrategy for MemoryStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn attach(&self, sink: FoundSink) {
        self.sinks.write().push(sink);
    }

    async fn start_discovery(&self, discovery_key: &[u8]) -> Result<(), DiscoveryError> {
        self.network.check_online(&self.name)?;
        if self.sinks.read().iter().all(|sink| sink.is_closed()) {
            return Err(DiscoveryError::NotAttached(self.name.clone()));
        }

        let key = Bytes::copy_from_slice(discovery_key);
        let mut topic = self.network.inner.topics.entry(key.clone()).or_default();
        if topic.iter().any(|member| member.id == self.id) {
            return Ok(());
        }

        for member in topic.iter() {
            let (ours, theirs) = WireSession::pair();
            deliver(&self.sinks, ours, &key);
            deliver(&member.sinks, theirs, &key);
        }
        debug!(
            strategy = %self.name,
            existing = topic.len(),
            "joined rendezvous"
        );
        topic.push(Member {
            id: self.id,
            sinks: Arc::clone(&self.sinks),
        });
        Ok(())
    }

    async fn stop_discovery(&self, discovery_key: &[u8]) -> Result<(), DiscoveryError> {
        self.network.check_online(&self.name)?;
        let topics = &self.network.inner.topics;
        if let Some(mut topic) = topics.get_mut(discovery_key) {
            topic.retain(|member| member.id != self.id);
        }
        topics.remove_if(discovery_key, |_, topic| topic.is_empty());
        debug!(strategy = %self.name, "left rendezvous");
        Ok(())
    }
}
