//! # Error Handling
//!
//! Error types for the listener synthesizer, defined with `thiserror`.
//!
//! Errors here are deliberately coarse: a failure while assembling a single
//! listener (malformed CIDR, plugin refusal) is scoped to that listener by the
//! assemblers, which log it and continue with the rest of the push.

/// Custom result type for meshplane operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the listener synthesizer
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Configuration errors (malformed CIDR, invalid listener spec, ...)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A plugin rejected or failed while contributing to a filter chain
    #[error("Plugin error: {0}")]
    Plugin(String),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    /// Create a new plugin error
    pub fn plugin<S: Into<String>>(message: S) -> Self {
        Self::Plugin(message.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }
}
