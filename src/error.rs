//! Error handling for histscope
//!
//! This module defines the crate-wide error type and a Result alias.
//! Errors are grouped so the chart controller can decide how to surface
//! them: protocol errors become a one-shot alert, transport errors a
//! persistent banner, everything else is logged.

use thiserror::Error;

/// Main error type for histscope operations
#[derive(Error, Debug)]
pub enum HistScopeError {
    /// Malformed or truncated binary payload from the history service
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// History service unreachable or the request failed
    #[error("Transport error: {0}")]
    Transport(String),

    /// A display formula failed to compile
    #[error("Formula error in '{variable}': {message}")]
    Formula { variable: String, message: String },

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors related to variable name parsing
    #[error("Variable error: {0}")]
    Variable(String),

    /// A chunk arrived in a representation the series does not hold
    #[error("Mode mismatch: series holds {expected} data, chunk is {actual}")]
    ModeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<HistScopeError>,
    },
}

impl HistScopeError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        HistScopeError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Create a formula error from a Rhai parse error
    pub fn from_parse_error(variable: impl Into<String>, err: rhai::ParseError) -> Self {
        HistScopeError::Formula {
            variable: variable.into(),
            message: err.to_string(),
        }
    }

    /// The innermost error, skipping any context wrappers
    pub fn root(&self) -> &HistScopeError {
        match self {
            HistScopeError::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether the payload itself was bad (alert, no retry)
    pub fn is_protocol(&self) -> bool {
        matches!(self.root(), HistScopeError::Protocol(_))
    }

    /// Whether the service could not be reached (banner, keep polling)
    pub fn is_transport(&self) -> bool {
        matches!(self.root(), HistScopeError::Transport(_))
    }
}

impl From<serde_json::Error> for HistScopeError {
    fn from(err: serde_json::Error) -> Self {
        HistScopeError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for HistScopeError {
    fn from(err: toml::de::Error) -> Self {
        HistScopeError::Config(err.to_string())
    }
}

/// Result type alias for histscope operations
pub type Result<T> = std::result::Result<T, HistScopeError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}
