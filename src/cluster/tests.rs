//! Cluster Module Tests
//!
//! Validates the affinity ring's determinism and the wire conventions.
//!
//! ## Test Scopes
//! - **Ring**: Deterministic ownership, full assignment coverage, spread
//!   across nodes, stability under node removal.
//! - **Protocol**: Peer URL templating and error-body decoding.
//!
//! *Note: Network paths (redirection, broadcast delivery) are exercised in
//! integration tests against live nodes.*

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use reqwest::Method;
    use serde_json::json;

    use crate::cluster::protocol::{PeerOutcome, PeerRequest};
    use crate::cluster::redirect::parse_remote_error;
    use crate::cluster::ring::AffinityRing;
    use crate::cluster::types::{NodeConfig, DEFAULT_REPLICA_FACTOR};

    // ============================================================
    // AFFINITY RING TESTS
    // ============================================================

    #[test]
    fn test_ownership_is_deterministic() {
        let ring_a = AffinityRing::new(3, DEFAULT_REPLICA_FACTOR);
        let ring_b = AffinityRing::new(3, DEFAULT_REPLICA_FACTOR);

        for i in 0..200 {
            let key = format!("doc-{i}");
            assert_eq!(
                ring_a.owning_node(&key),
                ring_b.owning_node(&key),
                "Rings built from the same configuration must agree"
            );
        }
    }

    #[test]
    fn test_every_key_gets_an_owner_in_range() {
        let ring = AffinityRing::new(4, DEFAULT_REPLICA_FACTOR);

        for i in 0..1000 {
            let owner = ring.owning_node(&format!("doc-{i}")).unwrap();
            assert!((1..=4).contains(&owner), "Owner {owner} should be a cluster node");
        }
    }

    #[test]
    fn test_keys_spread_across_nodes() {
        let ring = AffinityRing::new(3, DEFAULT_REPLICA_FACTOR);
        let mut counts: HashMap<u32, usize> = HashMap::new();

        for i in 0..3000 {
            let owner = ring.owning_node(&format!("doc-{i}")).unwrap();
            *counts.entry(owner).or_insert(0) += 1;
        }

        assert_eq!(counts.len(), 3, "All nodes should own some keys");
        for (node, count) in &counts {
            assert!(
                *count > 300,
                "Node {node} owns only {count} of 3000 keys, distribution is badly skewed"
            );
        }
    }

    #[test]
    fn test_removing_a_node_only_moves_its_keys() {
        let full = AffinityRing::new(3, DEFAULT_REPLICA_FACTOR);
        let mut reduced = AffinityRing::new(3, DEFAULT_REPLICA_FACTOR);
        reduced.remove_node(3);

        for i in 0..1000 {
            let key = format!("doc-{i}");
            let before = full.owning_node(&key).unwrap();
            let after = reduced.owning_node(&key).unwrap();
            assert_ne!(after, 3, "Removed node must own nothing");
            if before != 3 {
                assert_eq!(before, after, "Keys of surviving nodes must not move");
            }
        }
    }

    #[test]
    fn test_empty_ring_owns_nothing() {
        let mut ring = AffinityRing::new(1, DEFAULT_REPLICA_FACTOR);
        ring.remove_node(1);

        assert!(ring.is_empty());
        assert_eq!(ring.owning_node("doc-1"), None);
    }

    // ============================================================
    // PROTOCOL TESTS
    // ============================================================

    #[test]
    fn test_peer_request_renders_url_per_node() {
        let request = PeerRequest::new(
            Method::POST,
            "http://node-NODE_ID:7700/shop/orders",
            Some(json!({"item": "mouse"})),
        );

        assert_eq!(request.render_url(1), "http://node-1:7700/shop/orders");
        assert_eq!(request.render_url(12), "http://node-12:7700/shop/orders");
    }

    #[test]
    fn test_peer_ids_skip_self() {
        let config = NodeConfig::new(2, 4, "http://node-NODE_ID:7700");
        let peers: Vec<u32> = config.peer_ids().collect();
        assert_eq!(peers, vec![1, 3, 4]);
    }

    #[test]
    fn test_peer_outcome_success_requires_2xx() {
        assert!(PeerOutcome::delivered(1, 201).is_success());
        assert!(!PeerOutcome::delivered(1, 409).is_success());
        assert!(!PeerOutcome::failed(1, "connection refused").is_success());
    }

    #[test]
    fn test_parse_remote_error_prefers_structured_body() {
        let (status, message) =
            parse_remote_error(500, r#"{"status": 409, "error": "collection already exists"}"#);
        assert_eq!(status, 409);
        assert_eq!(message, "collection already exists");
    }

    #[test]
    fn test_parse_remote_error_falls_back_to_code_colon_message() {
        let (status, message) = parse_remote_error(500, "404: document not found");
        assert_eq!(status, 404);
        assert_eq!(message, "document not found");
    }

    #[test]
    fn test_parse_remote_error_keeps_raw_text_otherwise() {
        let (status, message) = parse_remote_error(503, "upstream exploded");
        assert_eq!(status, 503);
        assert_eq!(message, "upstream exploded");
    }
}
