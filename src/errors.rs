use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Invalid store configuration: {0}")]
    ConfigurationError(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Store rejected the request with status {status}: {message}")]
    StoreFailure {
        status: u16,
        sub_status: Option<u32>,
        activity_id: Option<String>,
        message: String,
    },

    #[error("Failed to send HTTP request: {0}")]
    HttpError(String),

    #[error("Failed to convert document: {0}")]
    SerializationError(String),

    #[error("Unsupported filter expression: {0}")]
    FilterError(String),

    #[error("Document id mismatch: addressed '{addressed}' but item carries '{embedded}'")]
    IdentifierMismatch { addressed: String, embedded: String },
}

impl StoreError {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    /// HTTP status reported by the store, when the failure came from a store reply.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            StoreError::NotFound(_) => Some(404),
            StoreError::StoreFailure { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(error: reqwest::Error) -> Self {
        StoreError::HttpError(error.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(error: serde_json::Error) -> Self {
        StoreError::SerializationError(error.to_string())
    }
}
