//! # postwire
//!
//! Outgoing mail for applications.
//!
//! This crate provides:
//! - Typed, validated configuration from a settings bag or a builder
//! - MIME composition with RFC 2047 headers, attachments and inline images
//! - Delivery over SMTP (STARTTLS, implicit TLS, PLAIN/LOGIN/CRAM-MD5) with
//!   connection reuse, or through the local sendmail program
//! - A protocol transcript for troubleshooting
//!
//! ## Quick Start
//!
//! ```ignore
//! use postwire::{Mailer, MailerConfig};
//!
//! #[tokio::main]
//! async fn main() -> postwire::Result<()> {
//!     let config = MailerConfig::builder()
//!         .host_name("app.example.com")
//!         .smtp_server("smtp.example.com", 587)
//!         .credentials("user", "password")
//!         .force_secure(true)
//!         .from("noreply@example.com", "Example App")
//!         .build()?;
//!
//!     let mut mailer = Mailer::new(config)?;
//!     let logo = mailer.add_inline_image("logo.png").await?;
//!     mailer
//!         .to("jane@example.com", "Jane Doe")
//!         .subject("Welcome")
//!         .text_plain("Welcome aboard!")
//!         .text_html(format!("<img src=\"cid:{logo}\"><p>Welcome aboard!</p>"));
//!
//!     let message_id = mailer.send(false).await?;
//!     println!("sent {message_id}");
//!
//!     mailer.close().await;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod config;
mod error;
pub mod local;
mod mailer;
pub mod mime_types;
pub mod transport;

pub use config::{
    DebugConfig, DebugSettings, MailerConfig, MailerConfigBuilder, Settings, TransportMode,
};
pub use error::{Error, ErrorKind, Result};
pub use local::LocalSubmission;
pub use mailer::Mailer;
pub use mime_types::resolve_mime_type;
pub use transport::Transport;

pub use postwire_mime as mime;
pub use postwire_smtp as smtp;
