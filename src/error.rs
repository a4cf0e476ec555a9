//! Error types and handling for Automedon
//!
//! This module defines the error types used throughout the application,
//! providing consistent error handling and reporting.

use thiserror::Error;

/// Result type alias for Automedon operations
pub type Result<T> = std::result::Result<T, AutomedonError>;

/// Main error type for Automedon
#[derive(Debug, Error)]
pub enum AutomedonError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Invalid credentials or PIN
    #[error("Authentication error: {message}")]
    Auth { message: String },

    /// Session could not be established or yielded no vehicles
    #[error("Session error: {message}")]
    Session { message: String },

    /// Timeout errors
    #[error("Timeout error: {message}")]
    Timeout { message: String },

    /// Vehicle API errors
    #[error("API error: {message}")]
    Api { message: String },

    /// One stage of a full refresh failed after an earlier stage succeeded
    #[error("Partial fetch error during {stage}: {message}")]
    PartialFetch { stage: String, message: String },

    /// Network-related errors
    #[error("Network error: {message}")]
    Network { message: String },

    /// Capability or trigger sink errors
    #[error("Sink error: {message}")]
    Sink { message: String },

    /// HTTP/Web server errors
    #[error("Web server error: {message}")]
    Web { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Validation errors
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// Generic errors with context
    #[error("Error: {message}")]
    Generic { message: String },
}

impl AutomedonError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        AutomedonError::Config {
            message: message.into(),
        }
    }

    /// Create a new auth error
    pub fn auth<S: Into<String>>(message: S) -> Self {
        AutomedonError::Auth {
            message: message.into(),
        }
    }

    /// Create a new session error
    pub fn session<S: Into<String>>(message: S) -> Self {
        AutomedonError::Session {
            message: message.into(),
        }
    }

    /// Create a new timeout error
    pub fn timeout<S: Into<String>>(message: S) -> Self {
        AutomedonError::Timeout {
            message: message.into(),
        }
    }

    /// Create a new API error
    pub fn api<S: Into<String>>(message: S) -> Self {
        AutomedonError::Api {
            message: message.into(),
        }
    }

    /// Create a new partial fetch error for the named refresh stage
    pub fn partial_fetch<S: Into<String>>(stage: S, message: S) -> Self {
        AutomedonError::PartialFetch {
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// Create a new network error
    pub fn network<S: Into<String>>(message: S) -> Self {
        AutomedonError::Network {
            message: message.into(),
        }
    }

    /// Create a new sink error
    pub fn sink<S: Into<String>>(message: S) -> Self {
        AutomedonError::Sink {
            message: message.into(),
        }
    }

    /// Create a new web error
    pub fn web<S: Into<String>>(message: S) -> Self {
        AutomedonError::Web {
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        AutomedonError::Io {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(field: S, message: S) -> Self {
        AutomedonError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new generic error
    pub fn generic<S: Into<String>>(message: S) -> Self {
        AutomedonError::Generic {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for AutomedonError {
    fn from(err: std::io::Error) -> Self {
        AutomedonError::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for AutomedonError {
    fn from(err: serde_yaml::Error) -> Self {
        AutomedonError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for AutomedonError {
    fn from(err: serde_json::Error) -> Self {
        AutomedonError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for AutomedonError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AutomedonError::timeout(err.to_string())
        } else {
            AutomedonError::network(err.to_string())
        }
    }
}

impl From<tokio::time::error::Elapsed> for AutomedonError {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        AutomedonError::timeout(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = AutomedonError::config("test config error");
        assert!(matches!(err, AutomedonError::Config { .. }));

        let err = AutomedonError::partial_fetch("location", "gateway returned 502");
        assert!(matches!(err, AutomedonError::PartialFetch { .. }));

        let err = AutomedonError::validation("field", "test validation error");
        assert!(matches!(err, AutomedonError::Validation { .. }));
    }

    #[test]
    fn test_error_display() {
        let err = AutomedonError::config("test error");
        assert_eq!(format!("{}", err), "Configuration error: test error");

        let err = AutomedonError::partial_fetch("odometer", "boom");
        assert_eq!(
            format!("{}", err),
            "Partial fetch error during odometer: boom"
        );
    }
}
