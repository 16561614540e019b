//! Cluster Distribution Module
//!
//! Implements the node's view of the cluster: who owns which document, and
//! how writes travel between nodes.
//!
//! ## Core Mechanisms
//! - **Affinity**: A consistent-hashing ring with virtual nodes assigns every
//!   document id an owning node. All nodes compute the same assignment from
//!   static configuration.
//! - **Redirection**: A write landing on a non-owner is forwarded to the
//!   owner; the owner's reply (success or error) is relayed to the client.
//! - **Broadcast**: After a local write commits, the owner replays it on
//!   every peer with the broadcast header set, so replicas converge without
//!   re-broadcasting.

pub mod broadcast;
pub mod protocol;
pub mod redirect;
pub mod ring;
pub mod types;

#[cfg(test)]
mod tests;
