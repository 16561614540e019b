//! Document representation and reserved fields.

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{NodeError, Result};

/// Node-assigned identifier, present on every stored document.
pub const ID_FIELD: &str = "_id";

/// Optimistic-concurrency counter, starts at 0 and bumps on every update.
pub const VERSION_FIELD: &str = "_version";

/// A stored document: a JSON object carrying the reserved `_id` and
/// `_version` fields alongside its schema-declared properties.
#[derive(Debug, Clone)]
pub struct Document {
    fields: Map<String, Value>,
}

impl Document {
    /// Wraps a client-supplied body as a brand-new document at version 0.
    /// The client may name its own `_id`; otherwise a UUID is assigned.
    /// `_version` always belongs to the node and is rejected in the body.
    pub fn new_from_body(body: Map<String, Value>) -> Result<Self> {
        if body.contains_key(VERSION_FIELD) {
            return Err(NodeError::schema_mismatch(
                "document body may not set the reserved '_version' field".to_string(),
            ));
        }
        let mut fields = body;
        match fields.get(ID_FIELD) {
            None => {
                fields.insert(
                    ID_FIELD.to_string(),
                    Value::String(Uuid::new_v4().to_string()),
                );
            }
            Some(Value::String(id)) if !id.trim().is_empty() => {}
            Some(_) => {
                return Err(NodeError::schema_mismatch(
                    "'_id' must be a non-empty string".to_string(),
                ));
            }
        }
        fields.insert(VERSION_FIELD.to_string(), Value::from(0u64));
        Ok(Self { fields })
    }

    /// Wraps an already-stored object read back from disk.
    pub fn from_stored(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    pub fn id(&self) -> Option<&str> {
        self.fields.get(ID_FIELD).and_then(Value::as_str)
    }

    pub fn version(&self) -> Option<u64> {
        self.fields.get(VERSION_FIELD).and_then(Value::as_u64)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.fields
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Replaces the document body with `body`, keeping the stored id and
    /// bumping the version by one.
    pub fn replace_body(&mut self, body: Map<String, Value>) -> Result<()> {
        if body.contains_key(ID_FIELD) || body.contains_key(VERSION_FIELD) {
            return Err(NodeError::schema_mismatch(
                "document body may not set the reserved '_id' or '_version' fields".to_string(),
            ));
        }
        let id = self
            .fields
            .get(ID_FIELD)
            .cloned()
            .ok_or_else(|| NodeError::operation_failed("read stored document id"))?;
        let next_version = self.version().unwrap_or(0) + 1;
        self.fields = body;
        self.fields.insert(ID_FIELD.to_string(), id);
        self.fields
            .insert(VERSION_FIELD.to_string(), Value::from(next_version));
        Ok(())
    }
}
