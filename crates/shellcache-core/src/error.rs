use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for cache manager operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Failure to reach the network at all. Never surfaced from the fetch path.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Request timed out")]
    Timeout,

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Transport error: {0}")]
    Other(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_connect() {
            TransportError::Connect(err.to_string())
        } else {
            TransportError::Other(err.to_string())
        }
    }
}

/// Failure of the underlying blob store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Cache store I/O failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to (de)serialize cache entry: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid cache store name: {0:?}")]
    InvalidName(String),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}

#[derive(Error, Debug)]
pub enum CacheError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Not cached: {0}")]
    NotFound(String),

    #[error("Upstream returned {status} for {url}")]
    Upstream { url: String, status: u16 },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl CacheError {
    /// Whether the failure came from being unable to reach the network.
    pub fn is_transport(&self) -> bool {
        matches!(self, CacheError::Transport(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_error_message() {
        let err = CacheError::Upstream {
            url: "http://localhost:8080/menu.json".to_string(),
            status: 404,
        };
        assert_eq!(
            err.to_string(),
            "Upstream returned 404 for http://localhost:8080/menu.json"
        );
        assert!(!err.is_transport());
    }

    #[test]
    fn test_transport_error_is_transparent() {
        let err: CacheError = TransportError::Timeout.into();
        assert_eq!(err.to_string(), "Request timed out");
        assert!(err.is_transport());
    }
}
