//! Error handling and custom error types
//!
//! Provides unified error handling across the pipeline using thiserror.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Malformed job message: {0}")]
    MalformedMessage(String),

    #[error("Failed to fetch '{key}' from store: {reason}")]
    StoreFetch { key: String, reason: String },

    #[error("Failed to upload '{key}' to store: {reason}")]
    StoreUpload { key: String, reason: String },

    #[error("Failed to delete '{key}' from store: {reason}")]
    StoreDelete { key: String, reason: String },

    #[error("Format {0} is not supported")]
    UnsupportedFormat(String),

    #[error("Failed to decode source image: {0}")]
    Decode(String),

    #[error("Failed to encode {format}: {reason}")]
    Encode { format: String, reason: String },

    #[error("External encoder '{program}' failed: {reason}")]
    ExternalProcess { program: String, reason: String },

    #[error("External encoder '{program}' timed out after {timeout_secs} seconds")]
    ExternalProcessTimeout { program: String, timeout_secs: u64 },

    #[error("Unsupported host: {0}")]
    UnsupportedHost(String),

    #[error("Job timed out after {0} seconds")]
    JobTimeout(u64),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Publish timed out after {0} seconds")]
    PublishTimeout(u64),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Background task error: {0}")]
    Task(String),
}

impl Error {
    /// True for errors produced by the conversion engine itself.
    pub fn is_conversion_failure(&self) -> bool {
        matches!(
            self,
            Error::UnsupportedFormat(_)
                | Error::Decode(_)
                | Error::Encode { .. }
                | Error::ExternalProcess { .. }
                | Error::ExternalProcessTimeout { .. }
                | Error::UnsupportedHost(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_format_names_the_format() {
        let err = Error::UnsupportedFormat("bmp".to_string());
        assert!(err.to_string().contains("bmp"));
        assert!(err.is_conversion_failure());
    }

    #[test]
    fn test_store_errors_are_not_conversion_failures() {
        let err = Error::StoreFetch {
            key: "cat.png".to_string(),
            reason: "NoSuchKey".to_string(),
        };
        assert!(!err.is_conversion_failure());
        assert!(err.to_string().contains("cat.png"));
    }
}
