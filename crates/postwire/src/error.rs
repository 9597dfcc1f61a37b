//! Error types for the mailer.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while composing or sending mail.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid or inconsistent settings.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Message composition failed.
    #[error("MIME error: {0}")]
    Mime(#[from] postwire_mime::Error),

    /// SMTP delivery failed.
    #[error("SMTP error: {0}")]
    Smtp(#[from] postwire_smtp::Error),

    /// A file to attach or embed could not be read.
    #[error("Could not read {}: {source}", path.display())]
    File {
        /// Path that was read.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The local mail submission program failed.
    #[error("Local submission failed: {0}")]
    LocalSubmission(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure class of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Settings are missing or inconsistent; nothing was sent.
    Configuration,
    /// The message could not be composed; nothing was sent.
    Composition,
    /// A file or socket could not be used.
    Io,
    /// The server or local mailer refused the message.
    Protocol,
    /// A connect or reply wait ran out of time.
    Timeout,
}

impl Error {
    /// Returns the failure class.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Configuration,
            Self::Mime(e) => {
                if e.is_configuration() {
                    ErrorKind::Configuration
                } else {
                    ErrorKind::Composition
                }
            }
            Self::Smtp(e) => match e {
                postwire_smtp::Error::Config(_) => ErrorKind::Configuration,
                postwire_smtp::Error::Timeout(_) => ErrorKind::Timeout,
                postwire_smtp::Error::Io(_) => ErrorKind::Io,
                postwire_smtp::Error::InvalidAddress(_) => ErrorKind::Composition,
                _ => ErrorKind::Protocol,
            },
            Self::File { .. } | Self::Io(_) => ErrorKind::Io,
            Self::LocalSubmission(_) => ErrorKind::Protocol,
        }
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_kind() {
        assert_eq!(Error::Config("x".into()).kind(), ErrorKind::Configuration);
        assert_eq!(
            Error::from(postwire_mime::Error::NoContent).kind(),
            ErrorKind::Composition
        );
        assert_eq!(
            Error::from(postwire_mime::Error::MissingHostName).kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            Error::from(postwire_smtp::Error::smtp_error(550, "no")).kind(),
            ErrorKind::Protocol
        );
        assert_eq!(
            Error::from(postwire_smtp::Error::Timeout("reply".into())).kind(),
            ErrorKind::Timeout
        );
        assert_eq!(
            Error::from(postwire_smtp::Error::Config("tls".into())).kind(),
            ErrorKind::Configuration
        );
        let missing = Error::File {
            path: PathBuf::from("/missing"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert_eq!(missing.kind(), ErrorKind::Io);
        assert!(missing.to_string().contains("/missing"));
    }
}
