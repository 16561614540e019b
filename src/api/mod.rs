//! HTTP API Module
//!
//! The node's client-facing surface: REST routes over databases, collections
//! and documents, wired in `main`. Handlers stay thin; ownership checks,
//! redirection and replication fan-out happen here, everything else lives in
//! the storage engine.

pub mod handlers;
pub mod protocol;
