use std::error::Error;
use thiserror::Error;

/// Result alias for key-value store operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by key-value backends regardless of the underlying technology.
///
/// A missing key is never an error: backends report it as `Ok(None)`.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage unavailable: {message}")]
    Unavailable {
        message: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    #[error("stored value under `{key}` is unreadable: {message}")]
    CorruptValue { key: String, message: String },
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(
        message: impl Into<String>,
        source: impl Error + Send + Sync + 'static,
    ) -> Self {
        StorageError::Unavailable {
            message: message.into(),
            source: Box::new(source),
        }
    }

    /// Construct an error describing a value that exists but cannot be interpreted.
    pub fn corrupt_value(key: impl Into<String>, message: impl Into<String>) -> Self {
        StorageError::CorruptValue {
            key: key.into(),
            message: message.into(),
        }
    }
}
