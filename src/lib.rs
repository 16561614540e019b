//! Distributed JSON Document Store Node Library
//!
//! This library crate defines the core modules of a single node in a
//! horizontally-partitioned document database. It serves as the foundation
//! for the binary executable (`main.rs`).
//!
//! ## Architecture Modules
//! The node is composed of four loosely coupled subsystems:
//!
//! - **`index`**: The secondary-index layer. An in-memory B+Tree backs the
//!   per-collection document-position index, the forward property indexes and
//!   the typed inverted indexes, all persisted as line-oriented text files.
//! - **`storage`**: The on-disk state layer. Performs database / collection /
//!   document CRUD against the filesystem with optimistic-concurrency
//!   versioning, coordinated by a per-resource locks manager.
//! - **`cluster`**: The distribution layer. A consistent-hashing affinity
//!   ring assigns each document an owning node; writes for non-owned
//!   documents are redirected to the owner and completed writes are
//!   broadcast to every peer for replication.
//! - **`api`**: The HTTP surface. Axum handlers that drive the storage
//!   engine and wire the affinity / redirect / broadcast control flow.

pub mod api;
pub mod cluster;
pub mod error;
pub mod index;
pub mod storage;
