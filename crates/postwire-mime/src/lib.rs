//! # postwire-mime
//!
//! MIME message composition for outgoing email.
//!
//! ## Features
//!
//! - **Header encoding**: RFC 2047 encoded-words with RFC 5322 folding
//! - **Transfer encodings**: Base64 and Quoted-Printable bodies
//! - **Message model**: plain/HTML bodies, attachments, inline images
//! - **Composition**: nested `multipart/mixed`, `alternative` and `related`
//!
//! ## Quick Start
//!
//! ```ignore
//! use postwire_mime::{Message, compose::{compose, ComposeOptions}};
//!
//! let mut message = Message::new();
//! message.set_from("Sender", "sender@example.com");
//! message.set_to("Recipient", "rcpt@example.com");
//! message.set_subject("Grüße");
//! message.set_text_plain("Hello");
//!
//! let options = ComposeOptions::new("mail.example.com");
//! let composed = compose(&message, &options, &|_: &str| None::<String>)?;
//! println!("{}", composed.to_message_string());
//! ```
//!
//! ### Encoding/Decoding
//!
//! ```ignore
//! use postwire_mime::encoding::{encode_base64, decode_base64, encode_quoted_printable};
//!
//! let encoded = encode_base64(b"Hello, World!");
//! let decoded = decode_base64(&encoded)?;
//!
//! let encoded = encode_quoted_printable("Héllo, Wørld!");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod error;
mod message;

pub mod boundary;
pub mod compose;
pub mod encoding;
pub mod header;

pub use compose::MultipartKind;
pub use encoding::TransferEncoding;
pub use error::{Error, Result};
pub use header::MB_LEN_MAX;
pub use message::{Attachment, InlineImage, Message, random_hex};

/// Line terminator used for every generated line.
pub const CRLF: &str = "\r\n";

/// Character set declared for all text content.
pub const CHARSET: &str = "utf-8";

/// Preferred maximum line length (RFC 5322 section 2.1.1).
pub const WRAP_LEN: usize = 76;

/// Hard maximum line length in octets, excluding CRLF.
pub const LINE_LEN_MAX: usize = 998;
