//! Error types for MIME operations.

use std::string::FromUtf8Error;

/// Result type alias for MIME operations.
pub type Result<T> = std::result::Result<T, Error>;

/// MIME error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid encoding.
    #[error("Invalid encoding: {0}")]
    InvalidEncoding(String),

    /// Base64 decode error.
    #[error("Base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),

    /// UTF-8 decode error.
    #[error("UTF-8 decode error: {0}")]
    Utf8Decode(#[from] FromUtf8Error),

    /// The message has neither a text body nor attachments.
    #[error("There is no content to send")]
    NoContent,

    /// No MIME type is known for a file extension.
    #[error("Unknown MIME type for file extension: {0:?}")]
    UnknownExtension(String),

    /// A folded header line exceeds the RFC 5322 hard limit.
    #[error("Header line of {length} octets exceeds RFC 5322 limit of {limit}")]
    HeaderTooLong {
        /// Length of the offending physical line.
        length: usize,
        /// Hard line length limit.
        limit: usize,
    },

    /// The sending host name was required but never configured.
    #[error("Host name must be set before generating message or content identifiers")]
    MissingHostName,

    /// Two inline images ended up with the same content identifier.
    #[error("Duplicate content identifier: {0}")]
    DuplicateContentId(String),
}

impl Error {
    /// Returns true if the error stems from missing configuration rather
    /// than from the message content itself.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(self, Self::MissingHostName)
    }
}
