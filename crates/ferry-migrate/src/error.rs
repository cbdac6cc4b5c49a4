//! Error types for migration operations.
//!
//! Anything returned as `Err` from a client aborts the run. Per-item
//! rejections from the destination are not errors; they travel as
//! [`WriteOutcome::Rejected`](crate::client::WriteOutcome::Rejected).

use thiserror::Error;

/// Migration-specific errors.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Failed to authenticate with the source or destination.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Project, repository or endpoint not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// API request failed.
    #[error("API request failed: {0}")]
    ApiError(String),

    /// Rate limit exceeded.
    #[error("Rate limit exceeded, retry after {0} seconds")]
    RateLimitExceeded(u64),

    /// Network error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A source identifier was registered twice with different destinations.
    #[error("{kind} {source_id} is already mapped to {existing}, refusing to remap to {attempted}")]
    MappingConflict {
        kind: &'static str,
        source_id: u64,
        existing: u64,
        attempted: u64,
    },

    /// Configuration file or environment could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl MigrationError {
    /// Whether the error points at credentials rather than data.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::AuthenticationFailed(_))
    }
}

/// Result type for migration operations.
pub type Result<T> = std::result::Result<T, MigrationError>;
