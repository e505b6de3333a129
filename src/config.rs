//! Client configuration.
//!
//! Chooses which hash and signature algorithms are registered at startup,
//! how often DHT subscriptions poll, and where the UDP DHT node binds.
//! Everything has a default; [`ClientConfig::from_env`] overrides fields
//! from `SYNAPSE_*` environment variables.
//!
//! ```
//! use synapse::config::ClientConfig;
//!
//! let config = ClientConfig::default();
//! let hashes = config.hash_service().unwrap();
//! assert!(hashes.supports("sha256"));
//! ```

use std::env;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::warn;

use crate::constants::{
    BLAKE3, BOOTSTRAP_NODES, DEFAULT_DHT_PORT, DEFAULT_EVENT_CAPACITY, DEFAULT_POLL_INTERVAL,
    ED25519, SECP256K1, SHA1, SHA256,
};
use crate::crypto::{
    Blake3Hash, CryptoError, Ed25519Algorithm, HashAlgorithm, HashService, Secp256k1Algorithm,
    Sha1Hash, Sha256Hash, SigningAlgorithm, SigningService,
};
use crate::dht::{DhtError, DhtNode, DhtService, MutableRecord, Subscription, TargetKey};
use crate::swarm::{self, FollowUpdate, MetainfoResolver, PeerManager, PeerManagerBuilder};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhtConfig {
    pub bind: SocketAddr,
    /// `host:port` entries pinged on bootstrap.
    pub bootstrap: Vec<String>,
}

impl Default for DhtConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_DHT_PORT)),
            bootstrap: BOOTSTRAP_NODES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl DhtConfig {
    /// Binds a node, spawns its receive loop and bootstraps from the
    /// configured nodes. A failed bootstrap is logged; the node still runs.
    pub async fn start(&self, signing: Arc<SigningService>) -> Result<Arc<DhtNode>, DhtError> {
        let node = Arc::new(DhtNode::bind(self.bind, signing).await?);

        let runner = Arc::clone(&node);
        tokio::spawn(async move {
            if let Err(e) = runner.run().await {
                warn!(error = %e, "DHT node stopped");
            }
        });

        if !self.bootstrap.is_empty() {
            if let Err(e) = node.bootstrap(&self.bootstrap).await {
                warn!(error = %e, "DHT bootstrap failed");
            }
        }
        Ok(node)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub hash_algorithms: Vec<String>,
    pub signing_algorithms: Vec<String>,
    pub poll_interval: Duration,
    /// Capacity of each peer manager's event stream.
    pub event_capacity: usize,
    pub dht: DhtConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            hash_algorithms: vec![SHA1.into(), SHA256.into(), BLAKE3.into()],
            signing_algorithms: vec![ED25519.into(), SECP256K1.into()],
            poll_interval: DEFAULT_POLL_INTERVAL,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            dht: DhtConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Defaults overridden by `SYNAPSE_HASH_ALGORITHMS`,
    /// `SYNAPSE_SIGNING_ALGORITHMS` (comma separated),
    /// `SYNAPSE_POLL_INTERVAL_MS`, `SYNAPSE_EVENT_CAPACITY`,
    /// `SYNAPSE_DHT_BIND` and `SYNAPSE_DHT_BOOTSTRAP` (comma separated).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Like [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(value) = lookup("SYNAPSE_HASH_ALGORITHMS") {
            config.hash_algorithms = split_list(&value);
        }
        if let Some(value) = lookup("SYNAPSE_SIGNING_ALGORITHMS") {
            config.signing_algorithms = split_list(&value);
        }
        if let Some(value) = lookup("SYNAPSE_POLL_INTERVAL_MS") {
            let ms: u64 = parse("SYNAPSE_POLL_INTERVAL_MS", &value)?;
            config.poll_interval = Duration::from_millis(ms);
        }
        if let Some(value) = lookup("SYNAPSE_EVENT_CAPACITY") {
            config.event_capacity = parse("SYNAPSE_EVENT_CAPACITY", &value)?;
        }
        if let Some(value) = lookup("SYNAPSE_DHT_BIND") {
            config.dht.bind = parse("SYNAPSE_DHT_BIND", &value)?;
        }
        if let Some(value) = lookup("SYNAPSE_DHT_BOOTSTRAP") {
            config.dht.bootstrap = split_list(&value);
        }

        Ok(config)
    }

    /// Registry with the configured hash algorithms. Unknown names fail
    /// with [`CryptoError::UnsupportedAlgorithm`].
    pub fn hash_service(&self) -> Result<HashService, ConfigError> {
        let algorithms = self
            .hash_algorithms
            .iter()
            .map(|name| builtin_hash(name))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(HashService::new(algorithms))
    }

    pub fn signing_service(&self) -> Result<SigningService, ConfigError> {
        let algorithms = self
            .signing_algorithms
            .iter()
            .map(|name| builtin_signing(name))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(SigningService::new(algorithms))
    }

    /// Peer manager builder using the configured event capacity.
    pub fn peer_manager(&self, hashes: Arc<HashService>) -> PeerManagerBuilder {
        PeerManager::builder(hashes).event_capacity(self.event_capacity)
    }

    /// [`DhtService::subscribe`] at the configured poll interval.
    pub fn subscribe<F>(&self, dht: &DhtService, target: TargetKey, callback: F) -> Subscription
    where
        F: FnMut(MutableRecord, &Subscription) + Send + 'static,
    {
        dht.subscribe(target, self.poll_interval, callback)
    }

    /// [`swarm::follow`] at the configured poll interval.
    pub fn follow(
        &self,
        dht: &DhtService,
        target: TargetKey,
        resolver: Arc<dyn MetainfoResolver>,
        hashes: Arc<HashService>,
    ) -> (Subscription, mpsc::UnboundedReceiver<FollowUpdate>) {
        swarm::follow(dht, target, self.poll_interval, resolver, hashes)
    }
}

fn builtin_hash(name: &str) -> Result<Arc<dyn HashAlgorithm>, CryptoError> {
    match name {
        SHA1 => Ok(Arc::new(Sha1Hash)),
        SHA256 => Ok(Arc::new(Sha256Hash)),
        BLAKE3 => Ok(Arc::new(Blake3Hash)),
        other => Err(CryptoError::UnsupportedAlgorithm(other.to_string())),
    }
}

fn builtin_signing(name: &str) -> Result<Arc<dyn SigningAlgorithm>, CryptoError> {
    match name {
        ED25519 => Ok(Arc::new(Ed25519Algorithm)),
        SECP256K1 => Ok(Arc::new(Secp256k1Algorithm)),
        other => Err(CryptoError::UnsupportedAlgorithm(other.to_string())),
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn parse<T: std::str::FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        name,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dht::MemoryDht;
    use crate::discovery::MemoryNetwork;
    use crate::metainfo::SwarmId;
    use crate::piece::PieceManager;
    use bytes::Bytes;
    use std::collections::HashMap;
    use tokio::sync::broadcast::error::RecvError;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.poll_interval, Duration::from_millis(1000));
        assert_eq!(config.dht.bind.port(), DEFAULT_DHT_PORT);
        assert_eq!(config.dht.bootstrap.len(), BOOTSTRAP_NODES.len());

        let hashes = config.hash_service().unwrap();
        assert_eq!(hashes.algorithms(), vec![BLAKE3, SHA1, SHA256]);
        let signing = config.signing_service().unwrap();
        assert!(signing.supports(ED25519));
        assert!(signing.supports(SECP256K1));
    }

    #[test]
    fn test_overrides() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("SYNAPSE_HASH_ALGORITHMS", "sha256, blake3"),
            ("SYNAPSE_SIGNING_ALGORITHMS", "ed25519"),
            ("SYNAPSE_POLL_INTERVAL_MS", "250"),
            ("SYNAPSE_EVENT_CAPACITY", "64"),
            ("SYNAPSE_DHT_BIND", "127.0.0.1:7000"),
            ("SYNAPSE_DHT_BOOTSTRAP", "a.example:6881,b.example:6881"),
        ]))
        .unwrap();

        assert_eq!(config.hash_algorithms, vec!["sha256", "blake3"]);
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.event_capacity, 64);
        assert_eq!(config.dht.bind, "127.0.0.1:7000".parse().unwrap());
        assert_eq!(config.dht.bootstrap, vec!["a.example:6881", "b.example:6881"]);

        let hashes = config.hash_service().unwrap();
        assert!(!hashes.supports(SHA1));
        let signing = config.signing_service().unwrap();
        assert!(!signing.supports(SECP256K1));
    }

    #[test]
    fn test_invalid_values() {
        let err = ClientConfig::from_lookup(lookup(&[("SYNAPSE_POLL_INTERVAL_MS", "soon")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { name: "SYNAPSE_POLL_INTERVAL_MS", .. }
        ));

        let config = ClientConfig {
            hash_algorithms: vec!["md5".into()],
            ..ClientConfig::default()
        };
        let err = config.hash_service().unwrap_err();
        assert_eq!(err.to_string(), "unsupported algorithm: md5");
    }

    #[tokio::test]
    async fn test_start_local_dht() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("SYNAPSE_DHT_BIND", "127.0.0.1:0"),
            ("SYNAPSE_DHT_BOOTSTRAP", ""),
        ]))
        .unwrap();
        assert!(config.dht.bootstrap.is_empty());

        let signing = Arc::new(config.signing_service().unwrap());
        let node = config.dht.start(signing).await.unwrap();
        assert!(node.local_addr().ip().is_loopback());
        assert_ne!(node.local_addr().port(), 0);
    }

    #[tokio::test]
    async fn test_event_capacity_applies_to_peer_manager() {
        let config =
            ClientConfig::from_lookup(lookup(&[("SYNAPSE_EVENT_CAPACITY", "1")])).unwrap();
        let hashes = Arc::new(config.hash_service().unwrap());
        let network = MemoryNetwork::new();
        let swarm = SwarmId::new(Bytes::from_static(b"capacity"));

        let local = config
            .peer_manager(Arc::clone(&hashes))
            .strategy(Arc::new(network.strategy("local")))
            .build(Arc::new(PieceManager::new(4)))
            .unwrap();
        let mut events = local.subscribe();
        local.search(&swarm).await.unwrap();

        let mut remotes = Vec::new();
        for name in ["a", "b"] {
            let remote = PeerManager::builder(Arc::clone(&hashes))
                .strategy(Arc::new(network.strategy(name)))
                .build(Arc::new(PieceManager::new(4)))
                .unwrap();
            remote.search(&swarm).await.unwrap();
            remotes.push(remote);
        }
        while local.peer_count() < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        assert!(matches!(events.recv().await, Err(RecvError::Lagged(_))));
    }

    #[tokio::test]
    async fn test_poll_interval_applies_to_subscriptions() {
        let config =
            ClientConfig::from_lookup(lookup(&[("SYNAPSE_POLL_INTERVAL_MS", "3600000")])).unwrap();
        assert_eq!(config.poll_interval, Duration::from_secs(3600));

        let signing = Arc::new(config.signing_service().unwrap());
        let dht = DhtService::new(Arc::new(MemoryDht::new()), Arc::clone(&signing));
        let keys = signing.generate_key_pair(ED25519).unwrap();
        let first = dht.publish(&keys, &b"v1"[..], None, 1).await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let subscription = config.subscribe(&dht, first.target, move |record, _| {
            let _ = tx.send(record.sequence);
        });
        let seen = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
        assert_eq!(seen, Some(1));

        dht.publish(&keys, &b"v2"[..], None, 2).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(rx.try_recv().is_err());
        subscription.cancel();
    }
}
