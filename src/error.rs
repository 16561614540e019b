//! Error Taxonomy
//!
//! Every failure the node can surface maps to exactly one variant here, and
//! every variant maps to one stable HTTP status. Redirection failures carry
//! the *remote* node's status and message so the original caller sees the
//! owner node's real outcome rather than a generic gateway error.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, NodeError>;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("invalid {0} name")]
    InvalidResourceName(&'static str),

    #[error("{0} not found")]
    ResourceNotFound(String),

    #[error("{0} already exists")]
    ResourceAlreadyExists(&'static str),

    #[error("expected version does not match stored document version")]
    VersionMismatch,

    #[error("document does not match collection schema: {0}")]
    SchemaMismatch(String),

    #[error("failed to {0}")]
    OperationFailed(String),

    #[error("redirection failed ({status}): {message}")]
    Redirection { status: u16, message: String },
}

impl NodeError {
    pub fn not_found(what: impl Into<String>) -> Self {
        NodeError::ResourceNotFound(what.into())
    }

    pub fn operation_failed(what: impl Into<String>) -> Self {
        NodeError::OperationFailed(what.into())
    }

    pub fn schema_mismatch(reason: impl Into<String>) -> Self {
        NodeError::SchemaMismatch(reason.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            NodeError::InvalidResourceName(_) => StatusCode::BAD_REQUEST,
            NodeError::ResourceNotFound(_) => StatusCode::NOT_FOUND,
            NodeError::ResourceAlreadyExists(_) => StatusCode::CONFLICT,
            NodeError::VersionMismatch => StatusCode::CONFLICT,
            NodeError::SchemaMismatch(_) => StatusCode::UNPROCESSABLE_ENTITY,
            NodeError::OperationFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            NodeError::Redirection { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
        }
    }
}

/// Wire shape of every error response. This is also the shape the
/// redirection service parses back out of a peer's error reply.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub status: u16,
    pub error: String,
}

impl IntoResponse for NodeError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            status: status.as_u16(),
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
