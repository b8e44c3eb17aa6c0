//! Error types for the public IP publisher
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Result type alias for publisher operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the public IP publisher
#[derive(Error, Debug)]
pub enum Error {
    /// The public IP address could not be determined
    #[error("IP resolution error: {0}")]
    IpResolution(String),

    /// The target node does not exist in the cluster store
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    /// Cluster store request failed (transport or API)
    #[error("Node store error: {0}")]
    NodeStore(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Schedule expression errors
    #[error("Schedule error: {0}")]
    Schedule(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A collaborator call exceeded its deadline
    #[error("Timed out after {secs}s: {operation}")]
    Timeout {
        /// What was being waited on
        operation: String,
        /// Deadline in seconds
        secs: u64,
    },

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an IP resolution error
    pub fn ip_resolution(msg: impl Into<String>) -> Self {
        Self::IpResolution(msg.into())
    }

    /// Create a "node not found" error
    pub fn node_not_found(name: impl Into<String>) -> Self {
        Self::NodeNotFound(name.into())
    }

    /// Create a node store error
    pub fn node_store(msg: impl Into<String>) -> Self {
        Self::NodeStore(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a schedule error
    pub fn schedule(msg: impl Into<String>) -> Self {
        Self::Schedule(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, secs: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            secs,
        }
    }

    /// Whether this error must terminate the process.
    ///
    /// Only a failed IP resolution and a missing target node are fatal; every
    /// other failure is retried from scratch on the next cycle.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::IpResolution(_) | Self::NodeNotFound(_))
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
