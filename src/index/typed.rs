//! Typed property values for the inverted indexes.
//!
//! Collection schemas declare each property as one of four primitive types.
//! The declared type is parsed once into the closed `PropertyType` enum and
//! carried with the property metadata; every place that must cast a raw
//! string or pick an inverted-index key type matches on it exhaustively.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{NodeError, Result};

/// Primitive type a schema can declare for a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    String,
    Integer,
    Number,
    Boolean,
}

impl PropertyType {
    /// Casts a raw stringified value to its typed form.
    pub fn cast(&self, raw: &str) -> Result<TypedValue> {
        match self {
            PropertyType::String => Ok(TypedValue::String(raw.to_string())),
            PropertyType::Integer => raw
                .parse::<i64>()
                .map(TypedValue::Integer)
                .map_err(|_| NodeError::schema_mismatch(format!("'{raw}' is not an integer"))),
            PropertyType::Number => raw
                .parse::<f64>()
                .map(TypedValue::Float)
                .map_err(|_| NodeError::schema_mismatch(format!("'{raw}' is not a number"))),
            PropertyType::Boolean => raw
                .parse::<bool>()
                .map(TypedValue::Boolean)
                .map_err(|_| NodeError::schema_mismatch(format!("'{raw}' is not a boolean"))),
        }
    }

    /// Whether a JSON value carries this declared type.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            PropertyType::String => value.is_string(),
            PropertyType::Integer => value.is_i64() || value.is_u64(),
            PropertyType::Number => value.is_number(),
            PropertyType::Boolean => value.is_boolean(),
        }
    }
}

/// A property value cast to its schema-declared type, totally ordered so it
/// can key a B+Tree. Floats order via `total_cmp`.
#[derive(Debug, Clone)]
pub enum TypedValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
}

impl TypedValue {
    fn rank(&self) -> u8 {
        match self {
            TypedValue::String(_) => 0,
            TypedValue::Integer(_) => 1,
            TypedValue::Float(_) => 2,
            TypedValue::Boolean(_) => 3,
        }
    }
}

impl Ord for TypedValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (TypedValue::String(a), TypedValue::String(b)) => a.cmp(b),
            (TypedValue::Integer(a), TypedValue::Integer(b)) => a.cmp(b),
            (TypedValue::Float(a), TypedValue::Float(b)) => a.total_cmp(b),
            (TypedValue::Boolean(a), TypedValue::Boolean(b)) => a.cmp(b),
            // One inverted index only ever holds a single variant; the
            // cross-variant order just keeps Ord lawful.
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for TypedValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for TypedValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for TypedValue {}

/// Stringified form of a JSON value as stored in the property-index files:
/// strings keep their bare content, everything else serializes as JSON.
pub fn index_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
