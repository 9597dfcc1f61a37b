//! Core SMTP types.

mod address;
mod extension;
mod reply;

pub use address::Address;
pub use extension::{AuthMechanism, ExtensionSet, ExtensionValue};
pub use reply::{Reply, ReplyCode};
