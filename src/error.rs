//! Caller-visible error taxonomy

use thiserror::Error;

/// Outcomes that end a request without a batch
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// The caller asked for something the service cannot interpret
    #[error("{0}")]
    InvalidFilter(String),

    /// The session was never initialized or has been stopped
    #[error("Broker not initialized")]
    Unavailable,

    /// Collection finished with zero records
    #[error("No proxies found matching the criteria")]
    NotFound,

    /// The engine failed and nothing was collected
    #[error("Proxy discovery failed: {0}")]
    DiscoveryFailed(String),

    /// `init` was called on a session that is running or stopped
    #[error("session cannot be initialized twice")]
    AlreadyInitialized,
}

impl ServiceError {
    /// Stable machine-readable code for responses
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::InvalidFilter(_) => "INVALID_FILTER",
            ServiceError::Unavailable => "SERVICE_UNAVAILABLE",
            ServiceError::NotFound => "NOT_FOUND",
            ServiceError::DiscoveryFailed(_) => "DISCOVERY_FAILED",
            ServiceError::AlreadyInitialized => "ALREADY_INITIALIZED",
        }
    }
}

/// Result type alias for `ServiceError`.
pub type ServiceResult<T> = std::result::Result<T, ServiceError>;
