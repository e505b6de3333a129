use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::error::SwarmError;
use crate::crypto::{HashService, SigningService};
use crate::dht::{DhtService, MutableRecord, Subscription, TargetKey};
use crate::metainfo::{SignedMetainfo, SwarmId};

/// Turns a mutable record's value into the descriptor it points at.
#[async_trait]
pub trait MetainfoResolver: Send + Sync {
    /// `Ok(None)` when the pointer is not known (yet).
    async fn resolve(&self, value: &[u8]) -> Result<Option<SignedMetainfo>, SwarmError>;
}

/// Resolver over descriptors we already have, keyed by swarm id. A record
/// value is read as the raw swarm id.
#[derive(Debug, Default)]
pub struct MetainfoCatalog {
    entries: DashMap<Bytes, SignedMetainfo>,
}

impl MetainfoCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, metainfo: SignedMetainfo) -> SwarmId {
        let id = metainfo.swarm_id();
        self.entries.insert(id.as_bytes().clone(), metainfo);
        id
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl MetainfoResolver for MetainfoCatalog {
    async fn resolve(&self, value: &[u8]) -> Result<Option<SignedMetainfo>, SwarmError> {
        Ok(self.entries.get(value).map(|entry| entry.value().clone()))
    }
}

/// A new version of a followed torrent.
#[derive(Debug, Clone)]
pub struct FollowUpdate {
    pub record: MutableRecord,
    pub metainfo: SignedMetainfo,
}

/// Follows the torrent a publisher points at through `target`.
///
/// Every record the subscription accepts is resolved to a descriptor; the
/// descriptor must verify and be signed by the same key as the record, or
/// the update is dropped. Accepted updates arrive on the returned channel in
/// sequence order, and the channel closes once the subscription is
/// cancelled.
pub fn follow(
    dht: &DhtService,
    target: TargetKey,
    interval: Duration,
    resolver: Arc<dyn MetainfoResolver>,
    hashes: Arc<HashService>,
) -> (Subscription, mpsc::UnboundedReceiver<FollowUpdate>) {
    let (records_tx, mut records_rx) = mpsc::unbounded_channel::<MutableRecord>();
    let (updates_tx, updates_rx) = mpsc::unbounded_channel();
    let signing = Arc::clone(dht.signing());

    let subscription = dht.subscribe(target, interval, move |record, _| {
        let _ = records_tx.send(record);
    });

    tokio::spawn(async move {
        while let Some(record) = records_rx.recv().await {
            match check_update(&record, resolver.as_ref(), &hashes, &signing).await {
                Ok(Some(metainfo)) => {
                    info!(
                        key = %target,
                        sequence = record.sequence,
                        swarm = %metainfo.swarm_id(),
                        "followed torrent updated"
                    );
                    if updates_tx.send(FollowUpdate { record, metainfo }).is_err() {
                        break;
                    }
                }
                Ok(None) => debug!(key = %target, sequence = record.sequence, "pointer not resolvable"),
                Err(e) => warn!(key = %target, error = %e, "rejected followed update"),
            }
        }
    });

    (subscription, updates_rx)
}

async fn check_update(
    record: &MutableRecord,
    resolver: &dyn MetainfoResolver,
    hashes: &HashService,
    signing: &SigningService,
) -> Result<Option<SignedMetainfo>, SwarmError> {
    let Some(metainfo) = resolver.resolve(&record.value).await? else {
        return Ok(None);
    };
    metainfo.verify(hashes, signing).await?;
    if metainfo.public_key != record.public_key {
        warn!(key = %record.target, "descriptor signed by a different key than the pointer");
        return Ok(None);
    }
    Ok(Some(metainfo))
}
