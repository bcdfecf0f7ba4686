//! Error types for clusterlet

use thiserror::Error;

/// Main error type for clusterlet
#[derive(Error, Debug)]
pub enum ClusterletError {
    /// Malformed or non-positive input supplied by the caller
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Node not found
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    /// Pod not found
    #[error("Pod not found: {0}")]
    PodNotFound(String),

    /// No eligible node can hold the requested CPU
    #[error("Insufficient capacity: {0}")]
    InsufficientCapacity(String),

    /// The execution backend failed to provision, start or stop a resource
    #[error("Resource provisioning error: {0}")]
    ResourceProvisioning(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error (invariant violation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ClusterletError {
    /// Whether the error refers to an unknown node or pod
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ClusterletError::NodeNotFound(_) | ClusterletError::PodNotFound(_)
        )
    }
}

/// Result type for clusterlet operations
pub type ClusterletResult<T> = Result<T, ClusterletError>;

impl From<toml::de::Error> for ClusterletError {
    fn from(err: toml::de::Error) -> Self {
        ClusterletError::Config(err.to_string())
    }
}
