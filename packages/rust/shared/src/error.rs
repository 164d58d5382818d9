//! Error types for the YouMind client.
//!
//! Library crates use [`YoumindError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all YouMind client operations.
#[derive(Debug, thiserror::Error)]
pub enum YoumindError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// No persisted auth artifact, or the artifact was rejected before a
    /// browser resource was allocated.
    #[error("not authenticated — run `youmind auth setup` first")]
    Unauthenticated,

    /// The operator did not complete the interactive login within the wait.
    #[error("login was not completed within {waited_secs}s")]
    AuthSetupAborted { waited_secs: u64 },

    /// WebDriver wire-protocol or transport failure.
    #[error("webdriver error: {0}")]
    WebDriver(String),

    /// Browser context open/close failure.
    #[error("session error: {0}")]
    Session(String),

    /// Board library persistence error.
    #[error("library error: {0}")]
    Storage(String),

    /// A composed query transaction did not produce an answer.
    #[error("query failed: {0}")]
    Query(String),

    /// A board with this URL already exists in the library.
    #[error("a board with URL {url} already exists (use --allow-duplicate to override)")]
    DuplicateUrl { url: String },

    /// No board with this id exists in the library.
    #[error("board '{id}' not found")]
    NotFound { id: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (schema mismatch, invalid format, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, YoumindError>;

impl YoumindError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a webdriver error from any displayable message.
    pub fn webdriver(msg: impl Into<String>) -> Self {
        Self::WebDriver(msg.into())
    }

    /// Create a session error from any displayable message.
    pub fn session(msg: impl Into<String>) -> Self {
        Self::Session(msg.into())
    }

    /// Create a library storage error from any displayable message.
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a query error from any displayable message.
    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    /// Create a not-found error for a board id.
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = YoumindError::config("missing base URL");
        assert_eq!(err.to_string(), "config error: missing base URL");

        let err = YoumindError::not_found("0193a");
        assert!(err.to_string().contains("0193a"));

        let err = YoumindError::AuthSetupAborted { waited_secs: 600 };
        assert!(err.to_string().contains("600"));
    }
}
