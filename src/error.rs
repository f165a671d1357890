//! Error handling for the livesort engine
//!
//! This module defines the crate error type and a Result alias for use
//! throughout the pipeline. The taxonomy follows the propagation policy of
//! the engine: attach, create and regate calls return errors synchronously
//! to their caller, while per-event conditions (bad events, transient read
//! failures) are handled inside the producer loop and surfaced as monitor
//! notifications instead.

use thiserror::Error;

/// Main error type for livesort operations
#[derive(Error, Debug)]
pub enum SortError {
    /// A gate or parameter expression failed to compile against the schema
    #[error("Expression error in `{text}`: {message}")]
    Compile { text: String, message: String },

    /// A file data source could not be opened
    #[error("Open error for {path}: {message}")]
    Open { path: String, message: String },

    /// An online data source refused or failed connection negotiation
    #[error("Connect error for source `{source_id}`: {message}")]
    Connect { source_id: String, message: String },

    /// Byte-level corruption or exhaustion while reading a source
    #[error("Read error: {0}")]
    Read(String),

    /// Histogram name collision at creation time
    #[error("Histogram `{0}` already exists")]
    DuplicateName(String),

    /// Schema registration or field lookup failure
    #[error("Schema error: {0}")]
    Schema(String),

    /// Histogram lookup or state failure
    #[error("Histogram error: {0}")]
    Histogram(String),

    /// Errors related to channel communication
    #[error("Channel error: {0}")]
    Channel(String),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

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
        source: Box<SortError>,
    },
}

impl SortError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        SortError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Create a compile error from a failed expression
    pub(crate) fn compile(text: impl Into<String>, message: impl ToString) -> Self {
        SortError::Compile {
            text: text.into(),
            message: message.to_string(),
        }
    }

    /// Create an open error for a file path
    pub(crate) fn open(path: impl ToString, message: impl ToString) -> Self {
        SortError::Open {
            path: path.to_string(),
            message: message.to_string(),
        }
    }
}

/// Result type alias for livesort operations
pub type Result<T> = std::result::Result<T, SortError>;

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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SortError::DuplicateName("h1".to_string());
        assert_eq!(err.to_string(), "Histogram `h1` already exists");
    }

    #[test]
    fn test_error_with_context() {
        let err = SortError::Schema("unknown field".to_string());
        let with_ctx = err.with_context("Failed to create histogram");
        assert!(with_ctx.to_string().contains("Failed to create histogram"));
    }

    #[test]
    fn test_compile_error_carries_text() {
        let err = SortError::compile("e.missing > 1", "Variable not found");
        assert!(err.to_string().contains("e.missing > 1"));
    }
}
