//! Error types for the cluster-registry crate.

use std::io;

use thiserror::Error;

use crate::node::NodeRole;

/// Main error type for registry operations
#[derive(Error, Debug)]
pub enum RegistryError {
    /// Node record does not exist on disk
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    /// Placement record does not exist for the account
    #[error("No placement for account: {0}")]
    PlacementNotFound(u64),

    /// Placement could not find any online candidate for the role
    #[error("No suitable node for role: {0}")]
    NoSuitableNode(NodeRole),

    /// Record rejected before it reached the store
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization or parse error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Type alias for Result with RegistryError
pub type RegistryResult<T> = Result<T, RegistryError>;
