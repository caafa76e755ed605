use serde::{Deserialize, Serialize};

/// Failures of the local persistence layer. Never fatal to a caller.
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum StorageError {
    #[error("storage quota exceeded")]
    QuotaExceeded,
    #[error("corrupt cache entry: {0}")]
    Corrupt(String),
    #[error("storage backend: {0}")]
    Backend(String),
}

/// Errors crossing the core's component seams.
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum CatalogError {
    /// Transport failure or non-success status.
    #[error("network: {message}")]
    Network { status: Option<u16>, message: String },
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl CatalogError {
    pub fn network(message: impl Into<String>) -> Self {
        CatalogError::Network { status: None, message: message.into() }
    }

    pub fn status(status: u16, message: impl Into<String>) -> Self {
        CatalogError::Network { status: Some(status), message: message.into() }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        CatalogError::MalformedResponse(message.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CatalogError::Network { status: Some(404), .. })
    }
}

pub type CatalogResult<T> = Result<T, CatalogError>;
