//! Replication fan-out.
//!
//! After a write commits locally, the owning node replays it on every peer
//! with the broadcast header set. Delivery is best effort with bounded
//! retries per peer; the per-peer outcomes go back to the caller so a
//! partial fan-out is visible instead of silently dropped.

use std::sync::Arc;
use std::time::Duration;

use crate::cluster::protocol::{PeerOutcome, PeerRequest, BROADCAST_HEADER};
use crate::cluster::types::NodeConfig;

const PEER_TIMEOUT: Duration = Duration::from_secs(5);
const PEER_ATTEMPTS: usize = 3;

#[derive(Debug, Clone)]
pub struct Broadcaster {
    http_client: reqwest::Client,
    config: Arc<NodeConfig>,
}

impl Broadcaster {
    pub fn new(config: Arc<NodeConfig>) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            config,
        }
    }

    /// Replays `request` on every peer, skipping this node. Returns one
    /// outcome per peer.
    pub async fn broadcast(&self, request: &PeerRequest) -> Vec<PeerOutcome> {
        let mut outcomes = Vec::new();
        for node_id in self.config.peer_ids() {
            let url = request.render_url(node_id);
            let outcome = match self.send_with_retry(request, &url).await {
                Ok(status) => {
                    if !(200..300).contains(&status) {
                        tracing::warn!("Peer {} rejected broadcast with status {}", node_id, status);
                    }
                    PeerOutcome::delivered(node_id, status)
                }
                Err(reason) => {
                    tracing::warn!("Broadcast to peer {} failed: {}", node_id, reason);
                    PeerOutcome::failed(node_id, reason)
                }
            };
            outcomes.push(outcome);
        }
        outcomes
    }

    async fn send_with_retry(&self, request: &PeerRequest, url: &str) -> Result<u16, String> {
        let mut delay_ms = 150u64;

        for attempt in 0..PEER_ATTEMPTS {
            let mut builder = self
                .http_client
                .request(request.method.clone(), url)
                .header(BROADCAST_HEADER, "true")
                .timeout(PEER_TIMEOUT);
            if let Some(username) = &self.config.username {
                builder = builder.basic_auth(username, self.config.password.as_deref());
            }
            if let Some(body) = &request.body {
                builder = builder.json(body);
            }

            match builder.send().await {
                Ok(response) => return Ok(response.status().as_u16()),
                Err(e) => {
                    if attempt + 1 == PEER_ATTEMPTS {
                        return Err(e.to_string());
                    }
                    let jitter = rand::random::<u64>() % 50;
                    tokio::time::sleep(Duration::from_millis(delay_ms + jitter)).await;
                    delay_ms = (delay_ms * 2).min(1200);
                }
            }
        }

        Err("retry attempts exhausted".to_string())
    }
}
