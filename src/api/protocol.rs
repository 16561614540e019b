//! Client-facing request and response shapes.

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DatabaseListResponse {
    pub databases: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CollectionListResponse {
    pub collections: Vec<String>,
}

/// Optional equality filter on the document listing endpoint.
#[derive(Debug, Deserialize)]
pub struct PropertyQuery {
    pub property_name: Option<String>,
    pub property_value: Option<String>,
}
