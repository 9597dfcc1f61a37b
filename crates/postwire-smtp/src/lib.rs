//! # postwire-smtp
//!
//! SMTP submission client implementing the sending side of RFC 5321.
//!
//! ## Features
//!
//! - **Type-state client**: Compile-time enforcement of valid SMTP state
//!   transitions
//! - **Session management**: connection reuse, renegotiation after the
//!   server drops an idle connection, orderly `QUIT`
//! - **TLS support**: Both implicit TLS (port 465) and STARTTLS
//! - **Authentication**: PLAIN, LOGIN, CRAM-MD5
//! - **Extensions**: SIZE limit enforced before `MAIL FROM`
//! - **Transcript**: optional protocol log to `tracing` or a locked file
//!
//! ## Quick Start
//!
//! ```ignore
//! use postwire_smtp::{Address, DebugLog, SessionConfig, SmtpSession};
//!
//! #[tokio::main]
//! async fn main() -> postwire_smtp::Result<()> {
//!     let config = SessionConfig::new("smtp.example.com", 587, "client.example.com")
//!         .credentials("user@example.com", "password")
//!         .force_secure(true);
//!     let mut session = SmtpSession::new(config, DebugLog::default())?;
//!
//!     let from = Address::new("sender@example.com")?;
//!     let to = Address::new("recipient@example.com")?;
//!     session
//!         .send(&from, &to, "Subject: Test\r\n\r\nHello, World!\r\n")
//!         .await?;
//!
//!     session.close().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Connection States
//!
//! ```text
//! Connected ── ehlo() ──→ Greeted ── starttls() ──→ Greeted
//!                            │
//!                            ├── authenticate() ──→ Ready
//!                            └── ready() ─────────→ Ready
//!
//! Ready ── mail_from() ──→ MailTransaction ── rcpt_to() ──→ RecipientAdded
//!   ↑                                                           │
//!   └──────────── send_message() ←── Data ←── data() ───────────┘
//! ```
//!
//! ## Modules
//!
//! - [`command`]: SMTP command builders
//! - [`connection`]: Streams and the type-state client
//! - [`debug`]: Protocol transcript
//! - [`parser`]: Reply parser
//! - [`session`]: Session state machine
//! - [`types`]: Core SMTP types (addresses, extensions, replies)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
pub mod debug;
mod error;
pub mod parser;
pub mod session;
pub mod types;

pub use connection::{
    Client, Connected, Data, Greeted, MailTransaction, Ready, RecipientAdded, ReplyTimeouts,
    TlsSettings,
};
pub use debug::{DebugLog, DebugSink};
pub use error::{Error, Result};
pub use session::{Credentials, SessionConfig, SessionState, SmtpSession};
pub use types::{Address, AuthMechanism, ExtensionSet, ExtensionValue, Reply, ReplyCode};
