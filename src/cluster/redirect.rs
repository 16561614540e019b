//! Write redirection.
//!
//! A node that receives a client write for a document it does not own
//! forwards the request to the owner and relays the owner's answer. Error
//! replies are decoded back into the local error shape so the client sees
//! the owner's real status and message.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use serde_json::Value;

use crate::cluster::protocol::NODE_ID_PLACEHOLDER;
use crate::cluster::types::NodeConfig;
use crate::error::{ErrorBody, NodeError, Result};

const REDIRECT_TIMEOUT: Duration = Duration::from_secs(10);

/// A successful reply relayed from the owner node.
#[derive(Debug)]
pub struct RemoteResponse {
    pub status: u16,
    pub body: Value,
}

#[derive(Debug, Clone)]
pub struct Redirector {
    http_client: reqwest::Client,
    config: Arc<NodeConfig>,
}

impl Redirector {
    pub fn new(config: Arc<NodeConfig>) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            config,
        }
    }

    /// Forwards one request to `owner` at `path` and returns its reply.
    pub async fn forward(
        &self,
        owner: u32,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<RemoteResponse> {
        let base = self
            .config
            .peer_url_template
            .replace(NODE_ID_PLACEHOLDER, &owner.to_string());
        let url = format!("{}{}", base.trim_end_matches('/'), path);
        tracing::info!("Redirecting {} {} to owner node {}", method, path, owner);

        let mut builder = self
            .http_client
            .request(method, &url)
            .timeout(REDIRECT_TIMEOUT);
        if let Some(username) = &self.config.username {
            builder = builder.basic_auth(username, self.config.password.as_deref());
        }
        if let Some(body) = &body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| NodeError::Redirection {
            status: 502,
            message: format!("owner node {owner} unreachable: {e}"),
        })?;

        let status = response.status().as_u16();
        let text = response.text().await.map_err(|e| NodeError::Redirection {
            status: 502,
            message: format!("reading reply from owner node {owner}: {e}"),
        })?;

        if (200..300).contains(&status) {
            let body = if text.is_empty() {
                Value::Null
            } else {
                serde_json::from_str(&text).unwrap_or(Value::String(text))
            };
            return Ok(RemoteResponse { status, body });
        }

        let (status, message) = parse_remote_error(status, &text);
        Err(NodeError::Redirection { status, message })
    }
}

/// Decodes an owner node's error reply. Structured `{status, error}` bodies
/// are preferred; a bare `code: message` line is the fallback, and anything
/// else keeps the transport status with the raw text.
pub fn parse_remote_error(status: u16, text: &str) -> (u16, String) {
    if let Ok(body) = serde_json::from_str::<ErrorBody>(text) {
        return (body.status, body.error);
    }
    if let Some((code, message)) = text.split_once(':') {
        if let Ok(code) = code.trim().parse::<u16>() {
            return (code, message.trim().to_string());
        }
    }
    (status, text.trim().to_string())
}
