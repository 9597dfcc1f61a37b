//! Error types for SMTP operations.

use std::io;

/// Result type alias for SMTP operations.
pub type Result<T> = std::result::Result<T, Error>;

/// SMTP error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// TLS error.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Server returned an unexpected reply.
    #[error("SMTP error {code}: {message}")]
    SmtpError {
        /// Reply code (e.g., 550).
        code: u16,
        /// Message from server.
        message: String,
    },

    /// Protocol error (malformed or missing reply).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Authentication was rejected.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// None of the server's AUTH mechanisms is supported.
    #[error("No supported authentication mechanism among: {0}")]
    NoCommonAuthMechanism(String),

    /// Message exceeds the server's advertised SIZE limit.
    #[error("Message size {size} exceeds server limit of {limit} bytes")]
    MessageTooLarge {
        /// Composed message size in bytes.
        size: usize,
        /// Limit advertised by the server.
        limit: u64,
    },

    /// Feature not supported by server.
    #[error("Server does not support {0}")]
    NotSupported(String),

    /// A network wait ran out of time.
    #[error("Timed out waiting for {0}")]
    Timeout(String),

    /// Inconsistent session configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// No connection is open.
    #[error("Not connected")]
    NotConnected,
}

impl Error {
    /// Creates an SMTP error from a reply code and message.
    #[must_use]
    pub fn smtp_error(code: u16, message: impl Into<String>) -> Self {
        Self::SmtpError {
            code,
            message: message.into(),
        }
    }

    /// Returns true if this is a permanent error (5xx).
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::SmtpError { code, .. } if *code >= 500 && *code < 600)
    }

    /// Returns true if this is a transient error (4xx).
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::SmtpError { code, .. } if *code >= 400 && *code < 500)
    }

    /// Returns true if a timeout aborted the operation.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Returns true if the error was raised before any I/O because of
    /// inconsistent settings.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(Error::smtp_error(550, "no such user").is_permanent());
        assert!(Error::smtp_error(451, "try later").is_transient());
        assert!(!Error::smtp_error(250, "ok").is_permanent());
        assert!(Error::Timeout("greeting".into()).is_timeout());
        assert!(Error::Config("x".into()).is_config());
        assert!(!Error::NotConnected.is_timeout());
    }

    #[test]
    fn test_display() {
        let err = Error::MessageTooLarge {
            size: 200,
            limit: 100,
        };
        assert_eq!(
            err.to_string(),
            "Message size 200 exceeds server limit of 100 bytes"
        );
    }
}
