//! SMTP reply types.

use crate::error::{Error, Result};

/// SMTP reply from server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Reply code (e.g., 250).
    pub code: ReplyCode,
    /// Reply text, one entry per line, without code and separator.
    pub message: Vec<String>,
}

impl Reply {
    /// Creates a new reply.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // Vec is not const-compatible
    pub fn new(code: ReplyCode, message: Vec<String>) -> Self {
        Self { code, message }
    }

    /// Returns true if this is a success reply (2xx).
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code.is_success()
    }

    /// Returns the full message as a single string.
    #[must_use]
    pub fn message_text(&self) -> String {
        self.message.join("\n")
    }

    /// Returns the text of the last line, which carries the payload of
    /// `334` challenges.
    #[must_use]
    pub fn last_line(&self) -> &str {
        self.message.last().map_or("", String::as_str)
    }

    /// Checks the reply code against the accepted codes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SmtpError`] carrying the reply if its code is not
    /// one of `accepted`.
    pub fn expect(self, accepted: &[ReplyCode]) -> Result<Self> {
        if accepted.contains(&self.code) {
            Ok(self)
        } else {
            Err(Error::smtp_error(self.code.as_u16(), self.message_text()))
        }
    }
}

/// SMTP reply code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ReplyCode(u16);

impl ReplyCode {
    /// Creates a new reply code.
    #[must_use]
    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    /// Returns the numeric code.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Returns true if this is a success code (2xx).
    #[must_use]
    pub const fn is_success(self) -> bool {
        self.0 >= 200 && self.0 < 300
    }

    /// Returns true if this is an intermediate reply (3xx).
    #[must_use]
    pub const fn is_intermediate(self) -> bool {
        self.0 >= 300 && self.0 < 400
    }
}

impl std::fmt::Display for ReplyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Codes the client expects during a session
impl ReplyCode {
    /// 220 Service ready (greeting, STARTTLS)
    pub const SERVICE_READY: Self = Self(220);
    /// 221 Service closing transmission channel
    pub const CLOSING: Self = Self(221);
    /// 235 Authentication succeeded
    pub const AUTH_SUCCESS: Self = Self(235);
    /// 250 Requested mail action okay, completed
    pub const OK: Self = Self(250);
    /// 251 User not local; will forward
    pub const FORWARD: Self = Self(251);
    /// 334 Continue with authentication
    pub const AUTH_CONTINUE: Self = Self(334);
    /// 354 Start mail input
    pub const START_DATA: Self = Self(354);
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

    mod reply_code_tests {
        use super::*;

        #[test]
        fn classes() {
            assert!(ReplyCode::OK.is_success());
            assert!(ReplyCode::CLOSING.is_success());
            assert!(ReplyCode::AUTH_CONTINUE.is_intermediate());
            assert!(ReplyCode::START_DATA.is_intermediate());
            assert!(!ReplyCode::new(550).is_success());
        }

        #[test]
        fn display() {
            assert_eq!(ReplyCode::AUTH_SUCCESS.to_string(), "235");
        }
    }

    mod reply_tests {
        use super::*;

        #[test]
        fn expect_accepts_listed_code() {
            let reply = Reply::new(ReplyCode::FORWARD, vec!["forwarding".to_string()]);
            let reply = reply.expect(&[ReplyCode::OK, ReplyCode::FORWARD]).unwrap();
            assert_eq!(reply.code, ReplyCode::FORWARD);
        }

        #[test]
        fn expect_rejects_other_code() {
            let reply = Reply::new(
                ReplyCode::new(550),
                vec!["5.1.1 No such user".to_string()],
            );
            let err = reply.expect(&[ReplyCode::OK]).unwrap_err();
            assert!(err.is_permanent());
            assert_eq!(err.to_string(), "SMTP error 550: 5.1.1 No such user");
        }

        #[test]
        fn last_line() {
            let reply = Reply::new(
                ReplyCode::AUTH_CONTINUE,
                vec!["first".to_string(), "PDEyMzQ+".to_string()],
            );
            assert_eq!(reply.last_line(), "PDEyMzQ+");
            assert_eq!(Reply::new(ReplyCode::OK, vec![]).last_line(), "");
        }

        #[test]
        fn message_text_multiple_lines() {
            let reply = Reply::new(
                ReplyCode::SERVICE_READY,
                vec![
                    "smtp.example.com ESMTP".to_string(),
                    "Ready to serve".to_string(),
                ],
            );
            assert_eq!(
                reply.message_text(),
                "smtp.example.com ESMTP\nReady to serve"
            );
        }
    }
}
