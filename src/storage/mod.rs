//! Disk Storage Module
//!
//! Implements the node's persistent state: databases, collections and JSON
//! documents on the local filesystem.
//!
//! ## Core Concepts
//! - **Layout**: One directory tree per database, collections as pretty-printed
//!   JSON arrays, schemas and index files beside them. All rewrites are atomic.
//! - **Schemas**: Every collection declares typed properties; documents are
//!   validated on create and update.
//! - **Locking**: `LocksManager` keeps one mutex per resource, acquired in
//!   containment order (database, collection, document).
//! - **Versioning**: Documents carry a `_version` counter; updates are
//!   optimistic and conflict instead of overwriting newer writes.

pub mod engine;
pub mod layout;
pub mod locks;
pub mod schema;
pub mod types;

#[cfg(test)]
mod tests;
