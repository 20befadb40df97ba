//! Error types for Preflight.
//!
//! Defines the main error enum used throughout the application, following
//! the stage taxonomy of the analysis pipeline: every failure identifies
//! which stage produced it.

use thiserror::Error;

/// Main error type for Preflight operations.
#[derive(Error, Debug)]
pub enum PreflightError {
    /// Database connection errors (host unreachable, auth failed, etc.)
    #[error("Connection error: {0}")]
    Connection(String),

    /// Statement classification errors (malformed or unrecognized SQL).
    #[error("Parse error: {0}")]
    Parse(String),

    /// Topology probe errors (genuine connectivity/permission failures;
    /// "feature not present" is never reported through this variant).
    #[error("Probe error: {0}")]
    Probe(String),

    /// Metadata or version read errors. Fatal: every downstream decision
    /// depends on table metadata and the server version.
    #[error("Metadata error: {0}")]
    Metadata(String),

    /// Query execution errors against the live server.
    #[error("Query error: {0}")]
    Query(String),

    /// The server does not support a statement or variable the probe tried.
    /// Probe chains treat this as a typed negative result, not a failure.
    #[error("Not supported by server: {0}")]
    Unsupported(String),

    /// Configuration errors (invalid config file, missing required fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal application errors (unexpected states, bugs, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PreflightError {
    /// Creates a connection error with the given message.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates a parse error with the given message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Creates a probe error with the given message.
    pub fn probe(msg: impl Into<String>) -> Self {
        Self::Probe(msg.into())
    }

    /// Creates a metadata error with the given message.
    pub fn metadata(msg: impl Into<String>) -> Self {
        Self::Metadata(msg.into())
    }

    /// Creates a query error with the given message.
    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    /// Creates an unsupported-feature error with the given message.
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns true for the typed negative result used inside probe chains.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported(_))
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connection(_) => "Connection Error",
            Self::Parse(_) => "Parse Error",
            Self::Probe(_) => "Probe Error",
            Self::Metadata(_) => "Metadata Error",
            Self::Query(_) => "Query Error",
            Self::Unsupported(_) => "Unsupported Feature",
            Self::Config(_) => "Configuration Error",
            Self::Internal(_) => "Internal Error",
        }
    }
}

/// Result type alias using PreflightError.
pub type Result<T> = std::result::Result<T, PreflightError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_connection() {
        let err = PreflightError::connection("Cannot connect to localhost:3306");
        assert_eq!(
            err.to_string(),
            "Connection error: Cannot connect to localhost:3306"
        );
        assert_eq!(err.category(), "Connection Error");
    }

    #[test]
    fn test_error_display_parse() {
        let err = PreflightError::parse("unexpected token at position 7");
        assert_eq!(
            err.to_string(),
            "Parse error: unexpected token at position 7"
        );
        assert_eq!(err.category(), "Parse Error");
    }

    #[test]
    fn test_error_display_probe() {
        let err = PreflightError::probe("permission denied for SHOW REPLICA STATUS");
        assert_eq!(
            err.to_string(),
            "Probe error: permission denied for SHOW REPLICA STATUS"
        );
        assert_eq!(err.category(), "Probe Error");
    }

    #[test]
    fn test_unsupported_is_typed_negative() {
        let err = PreflightError::unsupported("SHOW REPLICA STATUS");
        assert!(err.is_unsupported());
        assert!(!PreflightError::query("boom").is_unsupported());
    }

    #[test]
    fn test_error_display_metadata() {
        let err = PreflightError::metadata("table `shop`.`orders` not found");
        assert_eq!(err.category(), "Metadata Error");
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<PreflightError>();
    }
}
