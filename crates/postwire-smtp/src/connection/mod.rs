//! SMTP connection management with type-state pattern.

mod client;
mod stream;

pub use client::{
    Client, Connected, Data, Greeted, MailTransaction, Ready, RecipientAdded, ReplyTimeouts,
};
pub use stream::{SmtpStream, TlsSettings, connect, connect_tls};
