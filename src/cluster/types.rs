//! Cluster configuration.

/// Static description of the cluster this node belongs to.
///
/// Nodes are numbered `1..=cluster_size` and reachable through
/// `peer_url_template`, a base URL carrying the literal `NODE_ID` token
/// where the peer's number goes (for example `http://node-NODE_ID:7700`).
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub node_id: u32,
    pub cluster_size: u32,
    /// Virtual nodes per physical node on the affinity ring.
    pub replica_factor: usize,
    pub peer_url_template: String,
    /// Basic-auth credentials for node-to-node calls, when the cluster
    /// fronts its nodes with auth.
    pub username: Option<String>,
    pub password: Option<String>,
}

pub const DEFAULT_REPLICA_FACTOR: usize = 300;

impl NodeConfig {
    pub fn new(node_id: u32, cluster_size: u32, peer_url_template: impl Into<String>) -> Self {
        Self {
            node_id,
            cluster_size,
            replica_factor: DEFAULT_REPLICA_FACTOR,
            peer_url_template: peer_url_template.into(),
            username: None,
            password: None,
        }
    }

    pub fn is_single_node(&self) -> bool {
        self.cluster_size <= 1
    }

    /// Peer node ids other than this node's own.
    pub fn peer_ids(&self) -> impl Iterator<Item = u32> + '_ {
        (1..=self.cluster_size).filter(move |id| *id != self.node_id)
    }
}
