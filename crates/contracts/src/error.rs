//! Layered error definitions
//!
//! Categorized by source: config / fetch / decode / delivery.
//! Every runtime failure carries an explicit [`ErrorKind`] which the retry
//! policy inspects instead of matching on concrete error types.

use thiserror::Error;

/// Failure category consulted by retry and delivery policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Resource does not exist. Terminal, delivered as error.
    NotFound,
    /// Timeout, content-length mismatch or other I/O hiccup. Retry-eligible.
    Transient,
    /// Locator scheme nobody can handle. Terminal, delivered without a hunter.
    Unsupported,
    /// Bytes were fetched but could not be decoded. Terminal.
    Decode,
    /// Work was abandoned. Never delivered.
    Cancelled,
}

impl ErrorKind {
    /// Whether a failure of this kind may be retried in-process
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Transient)
    }
}

/// Unified configuration error type
#[derive(Debug, Error)]
pub enum ContractError {
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Errors raised by a [`Fetcher`](crate::Fetcher)
#[derive(Debug, Error)]
pub enum FetchError {
    /// Resource missing at the source
    #[error("resource not found: {locator}")]
    NotFound { locator: String },

    /// Source did not answer in time
    #[error("timed out fetching {locator}")]
    Timeout { locator: String },

    /// Body length disagrees with the advertised length
    #[error("content length mismatch: expected {expected} bytes, got {actual}")]
    ContentLengthMismatch { expected: u64, actual: u64 },

    /// Generic I/O failure
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl FetchError {
    pub fn not_found(locator: impl Into<String>) -> Self {
        Self::NotFound {
            locator: locator.into(),
        }
    }

    pub fn timeout(locator: impl Into<String>) -> Self {
        Self::Timeout {
            locator: locator.into(),
        }
    }

    /// Error category
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Io(e) if e.kind() == std::io::ErrorKind::NotFound => ErrorKind::NotFound,
            Self::Timeout { .. } | Self::ContentLengthMismatch { .. } | Self::Io(_) => {
                ErrorKind::Transient
            }
        }
    }
}

/// Errors raised by a [`Decoder`](crate::Decoder)
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Bytes are not in a format the decoder understands
    #[error("unsupported image format")]
    UnsupportedFormat,

    /// Bytes are in a known format but corrupt
    #[error("decode error: {0}")]
    Malformed(String),
}

/// Error delivered to a consumer
///
/// Cloneable because every action attached to a failed hunter receives its
/// own copy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error("resource not found: {locator}")]
    NotFound { locator: String },

    #[error("transient failure: {message}")]
    Transient {
        message: String,
        /// Set when the failure was a content-length mismatch
        content_length: bool,
    },

    #[error("unrecognized type of request: {locator}")]
    Unsupported { locator: String },

    #[error("decode failed: {message}")]
    Decode { message: String },

    #[error("request cancelled")]
    Cancelled,
}

impl LoadError {
    pub fn unsupported(locator: impl Into<String>) -> Self {
        Self::Unsupported {
            locator: locator.into(),
        }
    }

    /// Error category
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Transient { .. } => ErrorKind::Transient,
            Self::Unsupported { .. } => ErrorKind::Unsupported,
            Self::Decode { .. } => ErrorKind::Decode,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Whether the failure was a content-length mismatch
    pub fn is_content_length_mismatch(&self) -> bool {
        matches!(
            self,
            Self::Transient {
                content_length: true,
                ..
            }
        )
    }

    /// Convert a fetch failure for `locator` into a deliverable error
    pub fn from_fetch(locator: &str, error: FetchError) -> Self {
        match error.kind() {
            ErrorKind::NotFound => Self::NotFound {
                locator: locator.to_string(),
            },
            _ => Self::Transient {
                content_length: matches!(error, FetchError::ContentLengthMismatch { .. }),
                message: error.to_string(),
            },
        }
    }
}

impl From<DecodeError> for LoadError {
    fn from(error: DecodeError) -> Self {
        Self::Decode {
            message: error.to_string(),
        }
    }
}
