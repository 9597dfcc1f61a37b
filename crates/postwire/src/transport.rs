//! Delivery of composed messages.

use crate::config::{MailerConfig, TransportMode};
use crate::error::Result;
use crate::local::LocalSubmission;
use postwire_mime::compose::Composed;
use postwire_smtp::{Address, DebugLog, SmtpSession};

/// Delivery backend chosen by [`TransportMode`].
#[derive(Debug)]
pub enum Transport {
    /// Local sendmail program.
    Local(LocalSubmission),
    /// SMTP relay; the session is reused across sends.
    Smtp(Box<SmtpSession>),
}

impl Transport {
    /// Creates the transport for a configuration.
    ///
    /// No connection is made until the first delivery.
    ///
    /// # Errors
    ///
    /// Returns an error if the SMTP settings are invalid.
    pub fn from_config(config: &MailerConfig, transcript: DebugLog) -> Result<Self> {
        Ok(match config.mode {
            TransportMode::Local => Self::Local(LocalSubmission::new(&config.sendmail_path)),
            TransportMode::Smtp => Self::Smtp(Box::new(SmtpSession::new(
                config.smtp.clone(),
                transcript,
            )?)),
        })
    }

    /// Returns true if `To` and `Subject` belong in the composed header
    /// block. Local submission passes them separately.
    #[must_use]
    pub const fn includes_envelope_headers(&self) -> bool {
        matches!(self, Self::Smtp(_))
    }

    /// Returns true if an SMTP connection is held open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        match self {
            Self::Local(_) => false,
            Self::Smtp(session) => session.is_open(),
        }
    }

    /// Delivers a composed message from `from` to `to`.
    ///
    /// # Errors
    ///
    /// Returns an error if an address is invalid or delivery fails.
    pub async fn deliver(&mut self, from: &str, to: &str, composed: &Composed) -> Result<()> {
        match self {
            Self::Local(local) => local.submit(from, composed).await,
            Self::Smtp(session) => {
                let from = Address::new(from)?;
                let to = Address::new(to)?;
                session
                    .send(&from, &to, &composed.to_message_string())
                    .await?;
                Ok(())
            }
        }
    }

    /// Closes an open SMTP connection with `QUIT`.
    pub async fn close(&mut self) {
        if let Self::Smtp(session) = self {
            session.close().await;
        }
    }
}
