//! Error types for s3push

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for s3push operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for s3push
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors (file system operations)
    #[error("I/O error: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// Local sync root or an entry below it does not exist
    #[error("File not found: {path}")]
    NotFound { path: PathBuf },

    /// Directory walk failed for an entry
    #[error("Scan error at {path}: {message}")]
    Scan { path: PathBuf, message: String },

    /// Storage backend errors not raised by the SDK itself
    #[error("Storage error: {message}")]
    Storage { message: String },

    /// AWS SDK error
    #[error("AWS error: {message}")]
    Aws { message: String },

    /// Multipart upload error
    #[error("Multipart upload error: {message}")]
    MultipartUpload {
        message: String,
        upload_id: Option<String>,
    },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Invalid target URI
    #[error("Invalid URI: {uri} - {reason}")]
    InvalidUri { uri: String, reason: String },

    /// No usable AWS credentials on this machine
    #[error("No AWS credentials found: {message}")]
    MissingCredentials { message: String },

    /// Operation was cancelled
    #[error("Operation cancelled")]
    Cancelled,
}

impl Error {
    /// Create an I/O error with context
    pub fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source,
        }
    }

    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an AWS error from anything displayable
    pub fn aws(message: impl std::fmt::Display) -> Self {
        Self::Aws {
            message: message.to_string(),
        }
    }

    /// Classify an I/O error raised while looking at `path`
    pub fn from_path(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound { path }
        } else {
            Self::Io {
                message: format!("{}: {}", path.display(), source),
                source,
            }
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Aws { message } => {
                let msg = message.to_lowercase();
                msg.contains("throttl")
                    || msg.contains("slowdown")
                    || msg.contains("timeout")
                    || msg.contains("timed out")
                    || msg.contains("dispatch failure")
                    || msg.contains("connection")
                    || msg.contains("internalerror")
                    || msg.contains("503")
                    || msg.contains("500")
                    || msg.contains("429")
            }

            Error::Io { source, .. } => {
                use std::io::ErrorKind;
                matches!(
                    source.kind(),
                    ErrorKind::ConnectionReset
                        | ErrorKind::ConnectionAborted
                        | ErrorKind::TimedOut
                        | ErrorKind::Interrupted
                )
            }

            Error::MultipartUpload { .. } => true,

            _ => false,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::Config {
            message: format!("TOML parse error: {}", err),
        }
    }
}
