//! Error types for CLI operations.

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Configuration could not be loaded or failed validation
    #[error("Invalid configuration: {message}")]
    ConfigInvalid { message: String },

    /// Nothing to fetch
    #[error("No locators given; pass them as arguments or with --input")]
    NoLocators,

    /// Locator list could not be read
    #[error("Failed to read locator list {path}: {source}")]
    InputRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Loader could not be assembled
    #[error("Failed to build loader: {message}")]
    LoaderBuild { message: String },
}

impl CliError {
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    pub fn config_invalid(message: impl Into<String>) -> Self {
        Self::ConfigInvalid {
            message: message.into(),
        }
    }

    pub fn input_read(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::InputRead {
            path: path.into(),
            source,
        }
    }

    pub fn loader_build(message: impl Into<String>) -> Self {
        Self::LoaderBuild {
            message: message.into(),
        }
    }
}

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
