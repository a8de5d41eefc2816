use thiserror::Error;

/// Errors raised while reading or writing persisted records.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage I/O failed for '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize '{key}': {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to deserialize '{key}': {source}")]
    Deserialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

impl StorageError {
    /// Whether the backend itself failed, as opposed to a bad record.
    ///
    /// Backend failures disable the persistence middleware.
    pub fn is_backend_failure(&self) -> bool {
        matches!(self, StorageError::Io { .. } | StorageError::Unavailable(_))
    }
}
