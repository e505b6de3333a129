use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use sha1::{Digest, Sha1};
use tokio::net::UdpSocket;
use tokio::sync::oneshot;
use tokio::time::{timeout, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use super::error::DhtError;
use super::message::{DhtMessage, DhtQuery, DhtResponse};
use super::node::{Node, NodeId};
use super::record::{MutableRecord, TargetKey};
use super::routing::RoutingTable;
use super::store::RecordStore;
use crate::constants::{
    DHT_ALPHA, DHT_BUCKET_REFRESH, DHT_MAX_ITERATIONS, DHT_MAX_RECORDS, DHT_QUERY_TIMEOUT,
    DHT_RECORD_LIFETIME, DHT_REPLICATION, DHT_TOKEN_ROTATION, MAX_PENDING_DHT_QUERIES,
};
use crate::crypto::SigningService;

// BEP-44 error codes.
const ERROR_PROTOCOL: i64 = 203;
const ERROR_INVALID_SIGNATURE: i64 = 206;
const ERROR_CAS_MISMATCH: i64 = 301;
const ERROR_SEQUENCE_TOO_LOW: i64 = 302;

struct StoredRecord {
    record: MutableRecord,
    stored_at: Instant,
}

/// Records this node holds on behalf of publishers.
#[derive(Default)]
struct RecordTable {
    records: HashMap<TargetKey, StoredRecord>,
}

impl RecordTable {
    fn expire(&mut self) {
        self.records
            .retain(|_, stored| stored.stored_at.elapsed() < DHT_RECORD_LIFETIME);
    }

    fn get(&self, target: &TargetKey) -> Option<&MutableRecord> {
        self.records
            .get(target)
            .filter(|stored| stored.stored_at.elapsed() < DHT_RECORD_LIFETIME)
            .map(|stored| &stored.record)
    }

    /// Applies the storage rules; the record must already be verified.
    fn store(&mut self, record: MutableRecord, cas: Option<u64>) -> Result<(), (i64, &'static str)> {
        let current = self.get(&record.target);
        if let (Some(cas), Some(current)) = (cas, current) {
            if current.sequence != cas {
                return Err((ERROR_CAS_MISMATCH, "cas mismatch"));
            }
        }
        if let Some(current) = current {
            if record.sequence < current.sequence
                || (record.sequence == current.sequence && record.value != current.value)
            {
                return Err((ERROR_SEQUENCE_TOO_LOW, "sequence number less than current"));
            }
        }
        if current.is_none() && self.records.len() >= DHT_MAX_RECORDS {
            self.expire();
            if self.records.len() >= DHT_MAX_RECORDS {
                return Err((ERROR_PROTOCOL, "storage full"));
            }
        }

        self.records.insert(
            record.target,
            StoredRecord {
                record,
                stored_at: Instant::now(),
            },
        );
        Ok(())
    }
}

struct TokenSecrets {
    current: [u8; 16],
    previous: [u8; 16],
}

impl TokenSecrets {
    fn new() -> Self {
        Self {
            current: rand::random(),
            previous: rand::random(),
        }
    }

    fn rotate(&mut self) {
        self.previous = self.current;
        self.current = rand::random();
    }
}

fn token_with_secret(addr: &SocketAddr, secret: &[u8; 16]) -> Bytes {
    let mut hasher = Sha1::new();
    hasher.update(secret);
    hasher.update(addr.ip().to_string().as_bytes());
    Bytes::copy_from_slice(&hasher.finalize()[..8])
}

/// A UDP Kademlia node serving BEP-44 mutable records.
///
/// The node answers `ping`, `find_node`, `get` and `put`, stores verified
/// records for other publishers, and implements [`RecordStore`] by running
/// iterative `get` lookups and replicating `put`s to the closest nodes that
/// handed out write tokens. [`run`](DhtNode::run) must be polled for any of
/// this to make progress.
///
/// ```no_run
/// use std::sync::Arc;
/// use synapse::crypto::SigningService;
/// use synapse::dht::{DhtNode, DhtService};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let signing = Arc::new(SigningService::with_defaults());
/// let node = Arc::new(DhtNode::bind("0.0.0.0:6881".parse()?, Arc::clone(&signing)).await?);
/// tokio::spawn({
///     let node = Arc::clone(&node);
///     async move { node.run().await }
/// });
/// node.bootstrap(&["router.bittorrent.com:6881".to_string()]).await?;
///
/// let dht = DhtService::new(node, signing);
/// # Ok(())
/// # }
/// ```
pub struct DhtNode {
    socket: UdpSocket,
    our_id: NodeId,
    local_addr: SocketAddr,
    routing_table: RoutingTable,
    pending_queries: RwLock<HashMap<Bytes, oneshot::Sender<DhtResponse>>>,
    token_secrets: RwLock<TokenSecrets>,
    records: RwLock<RecordTable>,
    signing: Arc<SigningService>,
}

impl DhtNode {
    pub async fn bind(addr: SocketAddr, signing: Arc<SigningService>) -> Result<Self, DhtError> {
        let socket = UdpSocket::bind(addr).await?;
        let local_addr = socket.local_addr()?;
        let our_id = NodeId::generate();

        info!(%local_addr, id = %our_id, "DHT node bound");

        Ok(Self {
            socket,
            our_id,
            local_addr,
            routing_table: RoutingTable::new(our_id),
            pending_queries: RwLock::default(),
            token_secrets: RwLock::new(TokenSecrets::new()),
            records: RwLock::default(),
            signing,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn our_id(&self) -> &NodeId {
        &self.our_id
    }

    pub fn routing_table(&self) -> &RoutingTable {
        &self.routing_table
    }

    /// Number of records held for other publishers.
    pub fn stored_records(&self) -> usize {
        self.records.read().records.len()
    }

    /// Pings each `host:port` and then looks up our own id to fill the
    /// routing table. Unreachable nodes are skipped.
    pub async fn bootstrap(&self, nodes: &[String]) -> Result<(), DhtError> {
        info!(nodes = nodes.len(), "starting DHT bootstrap");

        for host in nodes {
            match tokio::net::lookup_host(host.as_str()).await {
                Ok(mut addrs) => {
                    let Some(addr) = addrs.next() else { continue };
                    if let Err(e) = self.ping(addr).await {
                        debug!(%addr, error = %e, "bootstrap node did not answer");
                    }
                }
                Err(e) => warn!(%host, error = %e, "failed to resolve bootstrap node"),
            }
        }

        self.find_node(self.our_id).await?;
        info!(
            nodes = self.routing_table.node_count(),
            "DHT bootstrap complete"
        );
        Ok(())
    }

    pub async fn ping(&self, addr: SocketAddr) -> Result<NodeId, DhtError> {
        match self.send_query(addr, DhtQuery::Ping).await? {
            DhtResponse::Ack { id } => Ok(id),
            other => Err(unexpected(other)),
        }
    }

    /// One round of `find_node` against the closest known contacts.
    pub async fn find_node(&self, target: NodeId) -> Result<Vec<Node>, DhtError> {
        let closest = self.routing_table.find_closest(&target, DHT_ALPHA);
        let results = futures::future::join_all(closest.iter().map(|node| async move {
            (node.id, self.send_query(node.addr, DhtQuery::FindNode { target }).await)
        }))
        .await;

        let mut found = Vec::new();
        for (id, result) in results {
            match result {
                Ok(DhtResponse::FindNode { nodes, .. }) => {
                    for node in nodes {
                        self.routing_table.add_node(node.clone());
                        found.push(node);
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    debug!(node = %id, error = %e, "find_node failed");
                    self.routing_table.mark_failed(&id);
                }
            }
        }
        Ok(found)
    }

    /// Iterative BEP-44 `get`. Returns the closest responders with their
    /// write tokens and the highest-sequence record that verifies.
    async fn lookup(&self, target: &TargetKey) -> (Vec<(Node, Bytes)>, Option<MutableRecord>) {
        let target_id = NodeId::from(*target);
        let mut queried = HashSet::new();
        let mut candidates = self.routing_table.find_closest(&target_id, DHT_REPLICATION);
        let mut responders: Vec<(Node, Bytes)> = Vec::new();
        let mut best: Option<MutableRecord> = None;

        for _ in 0..DHT_MAX_ITERATIONS {
            candidates.retain(|n| n.id != self.our_id && !queried.contains(&n.id));
            candidates.sort_by_key(|n| n.id.distance(&target_id));
            candidates.dedup_by_key(|n| n.id);
            let batch: Vec<Node> = candidates.drain(..candidates.len().min(DHT_ALPHA)).collect();
            if batch.is_empty() {
                break;
            }

            let results = futures::future::join_all(batch.iter().map(|node| {
                queried.insert(node.id);
                self.send_query(
                    node.addr,
                    DhtQuery::Get {
                        target: *target,
                        seq: None,
                    },
                )
            }))
            .await;

            for (node, result) in batch.into_iter().zip(results) {
                match result {
                    Ok(DhtResponse::Get {
                        token,
                        nodes,
                        record,
                        ..
                    }) => {
                        for n in nodes {
                            self.routing_table.add_node(n.clone());
                            candidates.push(n);
                        }
                        if let Some(record) = record {
                            best = self.pick_newer(target, best, record);
                        }
                        responders.push((node, token));
                    }
                    Ok(other) => trace!(node = %node.id, ?other, "unexpected get reply"),
                    Err(e) => {
                        debug!(node = %node.id, error = %e, "get failed");
                        self.routing_table.mark_failed(&node.id);
                    }
                }
            }
        }

        responders.sort_by_key(|(n, _)| n.id.distance(&target_id));
        responders.truncate(DHT_REPLICATION);
        (responders, best)
    }

    fn pick_newer(
        &self,
        target: &TargetKey,
        best: Option<MutableRecord>,
        candidate: MutableRecord,
    ) -> Option<MutableRecord> {
        if candidate.target != *target {
            debug!("dropping record for a different target");
            return best;
        }
        if let Err(e) = candidate.verify(&self.signing) {
            debug!(error = %e, "dropping unverifiable record");
            return best;
        }
        match best {
            Some(best) if best.sequence >= candidate.sequence => Some(best),
            _ => Some(candidate),
        }
    }

    pub(crate) async fn send_query(&self, addr: SocketAddr, query: DhtQuery) -> Result<DhtResponse, DhtError> {
        let tid = Bytes::copy_from_slice(&rand::random::<[u8; 4]>());
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending_queries.write();
            if pending.len() >= MAX_PENDING_DHT_QUERIES {
                return Err(DhtError::RateLimited);
            }
            pending.insert(tid.clone(), tx);
        }

        let data = DhtMessage::query(tid.clone(), self.our_id, query).encode();
        let sent = self.socket.send_to(&data, addr).await;
        let result = match sent {
            Ok(_) => timeout(DHT_QUERY_TIMEOUT, rx).await,
            Err(e) => {
                self.pending_queries.write().remove(&tid);
                return Err(e.into());
            }
        };
        self.pending_queries.write().remove(&tid);

        match result {
            Ok(Ok(DhtResponse::Error { code, message })) => Err(DhtError::Remote { code, message }),
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) | Err(_) => Err(DhtError::Timeout),
        }
    }

    /// Receives and answers messages, refreshes stale buckets and rotates
    /// write tokens. Returns only on socket failure.
    pub async fn run(&self) -> Result<(), DhtError> {
        let mut buf = vec![0u8; 65535];
        let mut refresh = tokio::time::interval(DHT_BUCKET_REFRESH);
        let mut rotation = tokio::time::interval(DHT_TOKEN_ROTATION);
        refresh.set_missed_tick_behavior(MissedTickBehavior::Skip);
        rotation.set_missed_tick_behavior(MissedTickBehavior::Skip);
        refresh.tick().await;
        rotation.tick().await;

        loop {
            tokio::select! {
                result = self.socket.recv_from(&mut buf) => {
                    let (n, addr) = result?;
                    match DhtMessage::parse(&buf[..n]) {
                        Ok(message) => self.handle_message(message, addr).await,
                        Err(e) => debug!(%addr, error = %e, "failed to parse DHT message"),
                    }
                }
                _ = refresh.tick() => self.refresh_stale_buckets().await,
                _ = rotation.tick() => {
                    self.rotate_token_secret();
                    self.records.write().expire();
                }
            }
        }
    }

    async fn refresh_stale_buckets(&self) {
        let stale = self.routing_table.stale_buckets();
        if stale.is_empty() {
            return;
        }
        debug!(buckets = stale.len(), "refreshing stale buckets");
        for index in stale {
            let target = self.routing_table.random_id_in_bucket(index);
            let _ = self.find_node(target).await;
        }
    }

    async fn handle_message(&self, message: DhtMessage, addr: SocketAddr) {
        if let Some(id) = message.sender_id() {
            self.routing_table.add_node(Node::new(id, addr));
        }

        match message {
            DhtMessage::Response {
                transaction_id,
                response,
            } => {
                if let Some(tx) = self.pending_queries.write().remove(&transaction_id) {
                    let _ = tx.send(response);
                }
            }
            DhtMessage::Query {
                transaction_id,
                query,
                ..
            } => {
                let response = self.answer(query, &addr);
                let data = DhtMessage::response(transaction_id, response).encode();
                if let Err(e) = self.socket.send_to(&data, addr).await {
                    debug!(%addr, error = %e, "failed to send reply");
                }
            }
        }
    }

    fn answer(&self, query: DhtQuery, addr: &SocketAddr) -> DhtResponse {
        match query {
            DhtQuery::Ping => DhtResponse::Ack { id: self.our_id },
            DhtQuery::FindNode { target } => DhtResponse::FindNode {
                id: self.our_id,
                nodes: self.routing_table.find_closest(&target, DHT_REPLICATION),
            },
            DhtQuery::Get { target, seq } => {
                let record = self
                    .records
                    .read()
                    .get(&target)
                    .filter(|r| seq.map_or(true, |seq| r.sequence > seq))
                    .cloned();
                DhtResponse::Get {
                    id: self.our_id,
                    token: self.generate_token(addr),
                    nodes: self
                        .routing_table
                        .find_closest(&NodeId::from(target), DHT_REPLICATION),
                    record,
                }
            }
            DhtQuery::Put { record, token, cas } => {
                if !self.validate_token(addr, &token) {
                    debug!(%addr, "rejecting put with invalid token");
                    return DhtResponse::error(ERROR_PROTOCOL, "invalid token");
                }
                match self.store_verified(record, cas) {
                    Ok(()) => DhtResponse::Ack { id: self.our_id },
                    Err((code, message)) => DhtResponse::error(code, message),
                }
            }
        }
    }

    /// Verifies and stores a record locally.
    fn store_verified(&self, record: MutableRecord, cas: Option<u64>) -> Result<(), (i64, &'static str)> {
        if let Err(e) = record.verify(&self.signing) {
            debug!(key = %record.target, error = %e, "rejecting unverifiable record");
            return Err((ERROR_INVALID_SIGNATURE, "invalid signature"));
        }
        let (target, sequence) = (record.target, record.sequence);
        self.records.write().store(record, cas)?;
        debug!(key = %target, sequence, "stored record");
        Ok(())
    }

    fn generate_token(&self, addr: &SocketAddr) -> Bytes {
        token_with_secret(addr, &self.token_secrets.read().current)
    }

    fn validate_token(&self, addr: &SocketAddr, token: &Bytes) -> bool {
        let secrets = self.token_secrets.read();
        &token_with_secret(addr, &secrets.current) == token
            || &token_with_secret(addr, &secrets.previous) == token
    }

    pub fn rotate_token_secret(&self) {
        self.token_secrets.write().rotate();
        trace!("DHT token secret rotated");
    }
}

fn unexpected(response: DhtResponse) -> DhtError {
    DhtError::InvalidMessage(format!("unexpected response: {response:?}"))
}

#[async_trait]
impl RecordStore for DhtNode {
    /// Stores locally, then replicates to the closest nodes that handed out
    /// write tokens. Rejections by remote nodes (stale sequence, full
    /// storage) are logged, not returned.
    async fn put(&self, record: MutableRecord) -> Result<(), DhtError> {
        record.verify(&self.signing)?;
        if let Err((code, message)) = self.store_verified(record.clone(), None) {
            debug!(code, message, "local node kept its current record");
        }

        let (responders, _) = self.lookup(&record.target).await;
        let puts = responders.into_iter().map(|(node, token)| {
            let query = DhtQuery::Put {
                record: record.clone(),
                token,
                cas: None,
            };
            async move { (node.id, self.send_query(node.addr, query).await) }
        });

        let mut stored = 0;
        for (id, result) in futures::future::join_all(puts).await {
            match result {
                Ok(_) => stored += 1,
                Err(e) => debug!(node = %id, error = %e, "put rejected"),
            }
        }
        debug!(key = %record.target, sequence = record.sequence, stored, "replicated record");
        Ok(())
    }

    /// The newest verified record among our own store and the network.
    async fn get(&self, target: &TargetKey) -> Result<Option<MutableRecord>, DhtError> {
        let local = self.records.read().get(target).cloned();
        let (_, remote) = self.lookup(target).await;
        Ok(match (local, remote) {
            (Some(local), Some(remote)) if remote.sequence > local.sequence => Some(remote),
            (Some(local), _) => Some(local),
            (None, remote) => remote,
        })
    }
}

impl std::fmt::Debug for DhtNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DhtNode")
            .field("id", &self.our_id)
            .field("local_addr", &self.local_addr)
            .field("nodes", &self.routing_table.node_count())
            .finish()
    }
}
