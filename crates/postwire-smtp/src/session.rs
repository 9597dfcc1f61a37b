//! SMTP session: connection lifecycle, negotiation and reuse.
//!
//! A [`SmtpSession`] owns at most one [`Client`] in the [`Ready`] state.
//! Negotiation walks the type-state client through greeting, EHLO,
//! STARTTLS and AUTH; a transaction takes the client out, runs
//! `MAIL FROM`/`RCPT TO`/`DATA` and puts it back. Any failure drops the
//! client, which closes the socket without `QUIT`.

use crate::connection::{Client, Ready, ReplyTimeouts, TlsSettings, connect, connect_tls};
use crate::debug::{DebugLog, format_elapsed};
use crate::error::{Error, Result};
use crate::types::{Address, AuthMechanism, ExtensionSet};
use std::time::{Duration, Instant};

/// Default SMTP port.
pub const DEFAULT_PORT: u16 = 25;

/// Default connect and per-line read timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default overall wait for one reply.
pub const DEFAULT_TIME_LIMIT: Duration = Duration::from_secs(30);

const SEPARATOR: &str = "---------------------------------------------------------";

/// SMTP login.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// User name.
    pub username: String,
    /// Password.
    pub password: String,
}

impl Credentials {
    /// Creates credentials.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Connection settings for a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// SMTP server host.
    pub server: String,
    /// SMTP server port.
    pub port: u16,
    /// Name sent in EHLO.
    pub client_host: String,
    /// Login, used when the server advertises AUTH.
    pub credentials: Option<Credentials>,
    /// Require an encrypted connection.
    pub force_secure: bool,
    /// Connect with TLS from the start instead of STARTTLS.
    pub implicit_tls: bool,
    /// Certificate handling.
    pub tls: TlsSettings,
    /// Connect timeout and per-line read timeout.
    pub timeout: Duration,
    /// Overall wait for one reply; zero disables the limit.
    pub time_limit: Duration,
}

impl SessionConfig {
    /// Creates a plain configuration with default timeouts.
    #[must_use]
    pub fn new(server: impl Into<String>, port: u16, client_host: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            port,
            client_host: client_host.into(),
            credentials: None,
            force_secure: false,
            implicit_tls: false,
            tls: TlsSettings::default(),
            timeout: DEFAULT_TIMEOUT,
            time_limit: DEFAULT_TIME_LIMIT,
        }
    }

    /// Sets the login.
    #[must_use]
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some(Credentials::new(username, password));
        self
    }

    /// Requires TLS, through STARTTLS unless `implicit_tls` is set.
    #[must_use]
    pub const fn force_secure(mut self, force: bool) -> Self {
        self.force_secure = force;
        self
    }

    /// Checks settings that can be judged without a server.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an empty server or client host name,
    /// a zero timeout, implicit TLS without forced-secure mode, or
    /// credentials with an empty user name or password.
    pub fn validate(&self) -> Result<()> {
        if self.server.trim().is_empty() {
            return Err(Error::Config("SMTP server is not set".into()));
        }
        if self.client_host.trim().is_empty() {
            return Err(Error::Config("client host name is not set".into()));
        }
        if self.timeout.is_zero() {
            return Err(Error::Config("timeout must be greater than zero".into()));
        }
        if self.implicit_tls && !self.force_secure {
            return Err(Error::Config(
                "implicit TLS requires forced-secure mode".into(),
            ));
        }
        if let Some(credentials) = &self.credentials
            && (credentials.username.is_empty() || credentials.password.is_empty())
        {
            return Err(Error::Config(
                "authentication requires non-empty username and password".into(),
            ));
        }
        Ok(())
    }

    /// True if credentials or a CA file are configured, which must not be
    /// used on a connection that could have been encrypted but was not
    /// forced to be.
    fn wants_secure(&self) -> bool {
        self.credentials.is_some() || self.tls.ca_file.is_some()
    }
}

/// Where a session stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No connection.
    Closed,
    /// Greeting accepted.
    Connected,
    /// EHLO accepted.
    Greeted,
    /// Negotiated and idle.
    Ready,
    /// A mail transaction is running.
    InTransaction,
}

/// Reusable SMTP session.
#[derive(Debug)]
pub struct SmtpSession {
    config: SessionConfig,
    transcript: DebugLog,
    client: Option<Client<Ready>>,
    state: SessionState,
    messages_sent: usize,
    opened_at: Option<Instant>,
}

impl SmtpSession {
    /// Creates a closed session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration is invalid.
    pub fn new(config: SessionConfig, transcript: DebugLog) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            transcript,
            client: None,
            state: SessionState::Closed,
            messages_sent: 0,
            opened_at: None,
        })
    }

    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Returns true if a negotiated connection is held.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.client.is_some()
    }

    /// Returns the number of messages accepted since the connection opened.
    #[must_use]
    pub const fn messages_sent(&self) -> usize {
        self.messages_sent
    }

    /// Returns the server extensions of the open connection.
    #[must_use]
    pub fn extensions(&self) -> Option<&ExtensionSet> {
        self.client.as_ref().map(Client::extensions)
    }

    /// Returns the session configuration.
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Makes sure a negotiated connection is available.
    ///
    /// An open connection is reused unless the server has gone away, in
    /// which case it is dropped and a new one negotiated.
    ///
    /// # Errors
    ///
    /// Returns an error if connecting or negotiating fails; the session is
    /// then closed.
    pub async fn ensure_ready(&mut self) -> Result<()> {
        if let Some(client) = self.client.as_mut() {
            if !client.is_closed().await {
                return Ok(());
            }
            tracing::debug!(server = %self.config.server, "Server closed idle connection");
            self.transcript.log("Connection closed by server");
            self.hard_close();
        }

        match self.open().await {
            Ok(client) => {
                self.client = Some(client);
                self.state = SessionState::Ready;
                Ok(())
            }
            Err(e) => {
                self.transcript.log(&format!("ERROR: {e}"));
                self.hard_close();
                Err(e)
            }
        }
    }

    /// Sends one message to one recipient.
    ///
    /// `message` is the complete header block and body. It is refused
    /// locally when larger than the server's advertised `SIZE`.
    ///
    /// # Errors
    ///
    /// Returns an error if negotiation or any step of the transaction fails;
    /// the session is then closed.
    pub async fn send(&mut self, from: &Address, to: &Address, message: &str) -> Result<()> {
        self.ensure_ready().await?;
        let client = self.client.take().ok_or(Error::NotConnected)?;

        if let Some(limit) = client.extensions().size_limit()
            && u64::try_from(message.len()).unwrap_or(u64::MAX) > limit
        {
            let error = Error::MessageTooLarge {
                size: message.len(),
                limit,
            };
            self.transcript.log(&format!("ERROR: {error}"));
            drop(client);
            self.hard_close();
            return Err(error);
        }

        self.state = SessionState::InTransaction;
        self.transcript.log(SEPARATOR);

        let result = async {
            client
                .mail_from(from.clone())
                .await?
                .rcpt_to(to.clone())
                .await?
                .data()
                .await?
                .send_message(message.as_bytes())
                .await
        }
        .await;

        match result {
            Ok(client) => {
                self.client = Some(client);
                self.state = SessionState::Ready;
                self.messages_sent += 1;
                tracing::info!(to = %to, bytes = message.len(), "Message accepted");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(to = %to, error = %e, "Mail transaction failed");
                self.transcript.log(&format!("ERROR: {e}"));
                self.hard_close();
                Err(e)
            }
        }
    }

    /// Sends QUIT, logs the connection summary and closes the socket.
    ///
    /// A missing or unexpected QUIT reply is only logged.
    pub async fn close(&mut self) {
        let Some(client) = self.client.take() else {
            self.state = SessionState::Closed;
            return;
        };

        self.transcript.log(SEPARATOR);
        if let Err(e) = client.quit().await {
            tracing::warn!(error = %e, "QUIT not acknowledged");
            self.transcript.log(&format!("ERROR: QUIT failed: {e}"));
        }

        let elapsed = self.opened_at.map(|t| t.elapsed()).unwrap_or_default();
        self.transcript.log(SEPARATOR);
        self.transcript.log(&format!(
            "MESSAGES-SENT: {}; CONNECTION-TIME: {}",
            self.messages_sent,
            format_elapsed(elapsed)
        ));
        self.transcript.log(SEPARATOR);

        self.hard_close();
    }

    fn hard_close(&mut self) {
        self.client = None;
        self.state = SessionState::Closed;
        self.opened_at = None;
    }

    async fn open(&mut self) -> Result<Client<Ready>> {
        let config = &self.config;
        self.opened_at = Some(Instant::now());
        self.messages_sent = 0;

        self.transcript.log("START NEW SMTP CONNECTION");
        self.transcript.log(&format!(
            "Connecting to server {} on port {} ...",
            config.server.to_uppercase(),
            config.port
        ));
        tracing::debug!(server = %config.server, port = config.port, implicit_tls = config.implicit_tls, "Connecting");

        let stream = if config.implicit_tls {
            connect_tls(&config.server, config.port, config.timeout, &config.tls).await?
        } else {
            connect(&config.server, config.port, config.timeout).await?
        };

        let timeouts = ReplyTimeouts {
            read: config.timeout,
            total: config.time_limit,
        };
        let client = Client::from_stream(stream, timeouts, self.transcript.clone()).await?;
        self.state = SessionState::Connected;

        let mut client = client.ehlo(&config.client_host).await?;
        self.state = SessionState::Greeted;

        if !client.is_tls() {
            if client.extensions().supports_starttls() {
                if !config.force_secure && config.wants_secure() {
                    return Err(Error::Config(
                        "credentials or CA file configured without forced-secure mode".into(),
                    ));
                }
                client = client
                    .starttls(&config.server, &config.client_host, &config.tls)
                    .await?;
            } else if config.force_secure {
                return Err(Error::NotSupported(format!(
                    "STARTTLS on {}",
                    config.server
                )));
            }
        }

        let Some(credentials) = &config.credentials else {
            return Ok(client.ready());
        };

        let offered = client.extensions().auth_mechanisms();
        if offered.is_empty() {
            tracing::warn!(server = %config.server, "Server does not advertise AUTH, continuing without login");
            return Ok(client.ready());
        }
        let mechanism = AuthMechanism::select(offered)
            .ok_or_else(|| Error::NoCommonAuthMechanism(offered.join(" ")))?;

        client
            .authenticate(mechanism, &credentials.username, &credentials.password)
            .await
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
    fn test_validate() {
        let config = SessionConfig::new("smtp.example.com", 587, "client.example.com");
        assert!(config.validate().is_ok());

        let empty = SessionConfig::new("", 25, "client.example.com");
        assert!(empty.validate().unwrap_err().is_config());

        let no_host = SessionConfig::new("smtp.example.com", 25, " ");
        assert!(no_host.validate().is_err());

        let mut implicit = SessionConfig::new("smtp.example.com", 465, "c");
        implicit.implicit_tls = true;
        assert!(implicit.validate().is_err());
        assert!(implicit.force_secure(true).validate().is_ok());

        let blank_password =
            SessionConfig::new("smtp.example.com", 25, "c").credentials("user", "");
        assert!(blank_password.validate().is_err());
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let credentials = Credentials::new("user", "hunter2");
        let debug = format!("{credentials:?}");
        assert!(debug.contains("user"));
        assert!(!debug.contains("hunter2"));
    }

    #[tokio::test]
    async fn test_new_session_is_closed() {
        let config = SessionConfig::new("smtp.example.com", 25, "client.example.com");
        let mut session = SmtpSession::new(config, DebugLog::default()).unwrap();
        assert_eq!(session.state(), SessionState::Closed);
        assert!(!session.is_open());
        assert!(session.extensions().is_none());

        session.close().await;
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(session.messages_sent(), 0);
    }
}
