//! Outbound transport error types

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur delivering a request to the backend
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Backend address not configured")]
    NotConfigured,

    #[error("Invalid backend address '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Backend returned HTTP {status}")]
    Status { status: u16 },

    #[error("Backend did not acknowledge within {0:?}")]
    Timeout(Duration),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl TransportError {
    /// Check if the backend answered, even if only to refuse the request
    pub fn reached_backend(&self) -> bool {
        matches!(self, TransportError::Status { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        assert_eq!(TransportError::NotConfigured.to_string(), "Backend address not configured");
        assert_eq!(TransportError::Status { status: 503 }.to_string(), "Backend returned HTTP 503");
        assert_eq!(
            TransportError::Timeout(Duration::from_secs(5)).to_string(),
            "Backend did not acknowledge within 5s"
        );
    }

    #[test]
    fn test_reached_backend() {
        assert!(TransportError::Status { status: 500 }.reached_backend());
        assert!(!TransportError::NotConfigured.reached_backend());
        assert!(!TransportError::Timeout(Duration::from_secs(1)).reached_backend());
    }
}
