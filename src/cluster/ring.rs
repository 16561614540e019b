//! Consistent-hashing affinity ring.
//!
//! Every node projects `replica_factor` virtual points onto a `u32` ring.
//! A document key hashes to a point and belongs to the first virtual node at
//! or after it, wrapping around at the top. With enough virtual points per
//! node the keyspace splits close to evenly, and removing a node only moves
//! the keys that sat on its own points.
//!
//! Hashes come from blake3, truncated to the first four digest bytes
//! little-endian. All nodes must build the ring with the same cluster size
//! and replica factor or affinity decisions diverge.

use std::collections::BTreeMap;

/// Ring position -> owning node id.
#[derive(Debug, Clone)]
pub struct AffinityRing {
    ring: BTreeMap<u32, u32>,
    replica_factor: usize,
}

fn ring_point(key: &str) -> u32 {
    let digest = blake3::hash(key.as_bytes());
    let bytes = digest.as_bytes();
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

impl AffinityRing {
    /// Builds the ring for nodes `1..=cluster_size`.
    pub fn new(cluster_size: u32, replica_factor: usize) -> Self {
        let mut ring = Self {
            ring: BTreeMap::new(),
            replica_factor,
        };
        for node_id in 1..=cluster_size {
            ring.add_node(node_id);
        }
        ring
    }

    pub fn add_node(&mut self, node_id: u32) {
        for replica in 0..self.replica_factor {
            self.ring.insert(ring_point(&format!("node{node_id}{replica}")), node_id);
        }
    }

    pub fn remove_node(&mut self, node_id: u32) {
        self.ring.retain(|_, owner| *owner != node_id);
    }

    /// Node owning `key`: the clockwise successor of the key's ring point.
    pub fn owning_node(&self, key: &str) -> Option<u32> {
        if self.ring.is_empty() {
            return None;
        }
        let point = ring_point(key);
        self.ring
            .range(point..)
            .next()
            .or_else(|| self.ring.iter().next())
            .map(|(_, node_id)| *node_id)
    }

    pub fn is_owned_locally(&self, key: &str, local_node: u32) -> bool {
        self.owning_node(key) == Some(local_node)
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }
}
