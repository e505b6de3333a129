use std::collections::VecDeque;

use parking_lot::RwLock;

use super::node::{Node, NodeId};
use crate::constants::{DHT_BUCKET_REFRESH, DHT_REPLICATION};

const K: usize = DHT_REPLICATION;
const NUM_BUCKETS: usize = 160;

#[derive(Debug, Default)]
struct Bucket {
    nodes: VecDeque<Node>,
    replacements: VecDeque<Node>,
}

impl Bucket {
    fn position(&self, id: &NodeId) -> Option<usize> {
        self.nodes.iter().position(|n| &n.id == id)
    }

    fn add(&mut self, node: Node) -> bool {
        if let Some(mut existing) = self.position(&node.id).and_then(|pos| self.nodes.remove(pos)) {
            existing.addr = node.addr;
            existing.touch();
            self.nodes.push_back(existing);
            return true;
        }
        if self.nodes.len() < K {
            self.nodes.push_back(node);
            return true;
        }
        if self.replacements.len() < K && !self.replacements.iter().any(|n| n.id == node.id) {
            self.replacements.push_back(node);
        }
        false
    }

    fn remove(&mut self, id: &NodeId) -> Option<Node> {
        let removed = self.position(id).and_then(|pos| self.nodes.remove(pos))?;
        if let Some(replacement) = self.replacements.pop_front() {
            self.nodes.push_back(replacement);
        }
        Some(removed)
    }

    fn get_mut(&mut self, id: &NodeId) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| &n.id == id)
    }
}

/// Kademlia routing table: 160 k-buckets keyed by shared prefix length with
/// our id, each with a small replacement cache.
#[derive(Debug)]
pub struct RoutingTable {
    our_id: NodeId,
    buckets: Vec<RwLock<Bucket>>,
}

impl RoutingTable {
    pub fn new(our_id: NodeId) -> Self {
        Self {
            our_id,
            buckets: (0..NUM_BUCKETS).map(|_| RwLock::default()).collect(),
        }
    }

    pub fn our_id(&self) -> &NodeId {
        &self.our_id
    }

    fn bucket(&self, id: &NodeId) -> &RwLock<Bucket> {
        &self.buckets[self.our_id.bucket_index(id)]
    }

    /// Inserts or refreshes a contact. Our own id is never stored.
    pub fn add_node(&self, node: Node) -> bool {
        if node.id == self.our_id {
            return false;
        }
        self.bucket(&node.id).write().add(node)
    }

    pub fn remove_node(&self, id: &NodeId) -> Option<Node> {
        self.bucket(id).write().remove(id)
    }

    /// Counts a failed query; evicts the contact once it is bad.
    pub fn mark_failed(&self, id: &NodeId) {
        let mut bucket = self.bucket(id).write();
        let bad = bucket.get_mut(id).is_some_and(|node| {
            node.fail();
            node.is_bad()
        });
        if bad {
            bucket.remove(id);
        }
    }

    /// Good contacts ordered by XOR distance to `target`.
    pub fn find_closest(&self, target: &NodeId, count: usize) -> Vec<Node> {
        let mut nodes: Vec<Node> = self
            .buckets
            .iter()
            .flat_map(|bucket| {
                bucket
                    .read()
                    .nodes
                    .iter()
                    .filter(|n| n.is_good())
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .collect();
        nodes.sort_by_key(|n| n.id.distance(target));
        nodes.truncate(count);
        nodes
    }

    pub fn node_count(&self) -> usize {
        self.buckets.iter().map(|b| b.read().nodes.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.node_count() == 0
    }

    /// Buckets whose oldest contact has not been heard from within the
    /// refresh interval.
    pub fn stale_buckets(&self) -> Vec<usize> {
        self.buckets
            .iter()
            .enumerate()
            .filter(|(_, bucket)| {
                bucket
                    .read()
                    .nodes
                    .front()
                    .is_some_and(|oldest| oldest.last_seen.elapsed() > DHT_BUCKET_REFRESH)
            })
            .map(|(i, _)| i)
            .collect()
    }

    /// A random id that falls in bucket `index` relative to our id.
    pub fn random_id_in_bucket(&self, index: usize) -> NodeId {
        if index >= NUM_BUCKETS {
            return NodeId::generate();
        }
        let mut id = self.our_id.0;
        let byte = index / 8;
        let bit = 7 - (index % 8);
        let random: [u8; 20] = rand::random();

        let keep = !((1u8 << bit) - 1) & !(1u8 << bit);
        id[byte] = (id[byte] & keep) | (!id[byte] & (1u8 << bit)) | (random[byte] & ((1u8 << bit) - 1));
        id[byte + 1..].copy_from_slice(&random[byte + 1..]);
        NodeId(id)
    }
}
