//! Node-to-node wire conventions.

use reqwest::Method;
use serde_json::Value;

/// Marks a request as a replication fan-out. A node receiving a request
/// with this header applies it locally and never redirects or re-broadcasts,
/// which keeps replication loops impossible.
pub const BROADCAST_HEADER: &str = "X-Broadcast";

/// Token in peer URL templates that gets replaced by a node id.
pub const NODE_ID_PLACEHOLDER: &str = "NODE_ID";

/// One request addressed to the whole cluster. The URL keeps the
/// [`NODE_ID_PLACEHOLDER`] token so the same request renders against every
/// peer.
#[derive(Debug, Clone)]
pub struct PeerRequest {
    pub method: Method,
    pub url_template: String,
    pub body: Option<Value>,
}

impl PeerRequest {
    pub fn new(method: Method, url_template: impl Into<String>, body: Option<Value>) -> Self {
        Self {
            method,
            url_template: url_template.into(),
            body,
        }
    }

    /// Concrete URL for one peer.
    pub fn render_url(&self, node_id: u32) -> String {
        self.url_template
            .replace(NODE_ID_PLACEHOLDER, &node_id.to_string())
    }
}

/// What happened to one peer during a fan-out.
#[derive(Debug, Clone)]
pub struct PeerOutcome {
    pub node_id: u32,
    pub outcome: Result<u16, String>,
}

impl PeerOutcome {
    pub fn delivered(node_id: u32, status: u16) -> Self {
        Self {
            node_id,
            outcome: Ok(status),
        }
    }

    pub fn failed(node_id: u32, reason: impl Into<String>) -> Self {
        Self {
            node_id,
            outcome: Err(reason.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Ok(status) if (200..300).contains(&status))
    }
}
