//! Secondary Index Module
//!
//! Maintains the in-memory indexes that make document lookups cheap and keeps
//! them persisted alongside the collection data.
//!
//! ## Index Families
//! - **Collection index**: document id -> position in the collection's JSON array.
//!   Backs constant-position reads and the array compaction after deletes.
//! - **Forward property index**: document id -> stringified property value, one
//!   per schema property. Backs single-property reads.
//! - **Inverted property index**: typed property value -> document ids. Backs
//!   equality queries; keys are cast to the schema-declared type so `10` and
//!   `"10"` stay distinct across typed collections.
//!
//! All three families share one generic B+Tree ([`btree::BPlusTree`]) and are
//! rebuilt from their files at node startup.

pub mod btree;
pub mod manager;
pub mod typed;
