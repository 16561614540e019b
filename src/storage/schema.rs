//! Collection schemas.
//!
//! Every collection is created with a schema that names its properties and
//! their primitive types. Documents are validated against it on create and
//! update, and the inverted indexes use the declared types to key their
//! trees.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{NodeError, Result};
use crate::index::typed::PropertyType;
use crate::storage::types::{ID_FIELD, VERSION_FIELD};

/// Schema for one collection, persisted as `<coll>Schema.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schema {
    #[serde(rename = "type")]
    pub object_type: String,
    pub properties: BTreeMap<String, PropertySpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertySpec {
    #[serde(rename = "type")]
    pub property_type: PropertyType,
    #[serde(default)]
    pub required: bool,
}

impl Schema {
    /// Validates a document body against the schema. Reserved fields are
    /// ignored here since the engine stamps them itself.
    pub fn validate_document(&self, doc: &Map<String, Value>) -> Result<()> {
        for (name, spec) in &self.properties {
            match doc.get(name) {
                Some(value) => {
                    if !spec.property_type.matches(value) {
                        return Err(NodeError::schema_mismatch(format!(
                            "property '{name}' has the wrong type"
                        )));
                    }
                }
                None if spec.required => {
                    return Err(NodeError::schema_mismatch(format!(
                        "required property '{name}' is missing"
                    )));
                }
                None => {}
            }
        }
        for name in doc.keys() {
            if name == ID_FIELD || name == VERSION_FIELD {
                continue;
            }
            if !self.properties.contains_key(name) {
                return Err(NodeError::schema_mismatch(format!(
                    "property '{name}' is not declared in the schema"
                )));
            }
        }
        Ok(())
    }

    /// Declared type of a property, if the schema knows it.
    pub fn property_type(&self, name: &str) -> Option<PropertyType> {
        self.properties.get(name).map(|spec| spec.property_type)
    }
}
