//! Type-state SMTP client.

use super::SmtpStream;
use super::stream::TlsSettings;
use crate::command::Command;
use crate::debug::DebugLog;
use crate::error::{Error, Result};
use crate::parser::{is_last_reply_line, parse_reply};
use crate::types::{Address, AuthMechanism, ExtensionSet, Reply, ReplyCode};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use std::marker::PhantomData;
use std::time::Duration;
use tokio::time::Instant;

type HmacMd5 = Hmac<md5::Md5>;

/// Type-state marker: greeting received.
#[derive(Debug)]
pub struct Connected;

/// Type-state marker: EHLO accepted.
#[derive(Debug)]
pub struct Greeted;

/// Type-state marker: ready for a mail transaction.
#[derive(Debug)]
pub struct Ready;

/// Type-state marker for mail transaction started.
#[derive(Debug)]
pub struct MailTransaction;

/// Type-state marker for recipient added.
#[derive(Debug)]
pub struct RecipientAdded;

/// Type-state marker for data mode.
#[derive(Debug)]
pub struct Data;

/// Limits on waiting for a server reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyTimeouts {
    /// Longest wait for any single line.
    pub read: Duration,
    /// Longest wait for a whole reply; zero means no overall limit.
    pub total: Duration,
}

impl Default for ReplyTimeouts {
    fn default() -> Self {
        Self {
            read: Duration::from_secs(30),
            total: Duration::from_secs(30),
        }
    }
}

/// SMTP client with type-state pattern.
///
/// Dropping a client closes the socket without `QUIT`.
#[derive(Debug)]
pub struct Client<State> {
    stream: SmtpStream,
    extensions: ExtensionSet,
    timeouts: ReplyTimeouts,
    transcript: DebugLog,
    _state: PhantomData<State>,
}

impl Client<Connected> {
    /// Creates a client from a stream and reads the server greeting.
    ///
    /// # Errors
    ///
    /// Returns an error if reading the greeting fails or its code is not 220.
    pub async fn from_stream(
        stream: SmtpStream,
        timeouts: ReplyTimeouts,
        transcript: DebugLog,
    ) -> Result<Self> {
        let mut client = Self {
            stream,
            extensions: ExtensionSet::default(),
            timeouts,
            transcript,
            _state: PhantomData,
        };

        let greeting = client
            .read_reply()
            .await?
            .expect(&[ReplyCode::SERVICE_READY])?;
        tracing::debug!(greeting = %greeting.message_text(), "Server greeting received");
        Ok(client)
    }

    /// Sends EHLO and records the advertised extensions.
    ///
    /// # Errors
    ///
    /// Returns an error if the EHLO command fails.
    pub async fn ehlo(mut self, client_hostname: &str) -> Result<Client<Greeted>> {
        self.send_ehlo(client_hostname).await?;
        Ok(self.into_state())
    }
}

impl Client<Greeted> {
    /// Upgrades the connection to TLS using STARTTLS, then repeats EHLO.
    ///
    /// `server_hostname` is verified against the certificate;
    /// `client_hostname` is sent in the new EHLO.
    ///
    /// # Errors
    ///
    /// Returns an error if STARTTLS is not advertised, is refused, or the
    /// handshake or second EHLO fails. A handshake that outlasts the read
    /// timeout fails with [`Error::Timeout`].
    pub async fn starttls(
        mut self,
        server_hostname: &str,
        client_hostname: &str,
        settings: &TlsSettings,
    ) -> Result<Self> {
        if !self.extensions.supports_starttls() {
            return Err(Error::NotSupported("STARTTLS".into()));
        }

        self.send_command(Command::StartTls)
            .await?
            .expect(&[ReplyCode::SERVICE_READY])?;

        let handshake = self.stream.upgrade_to_tls(server_hostname, settings);
        self.stream = tokio::time::timeout(self.timeouts.read, handshake)
            .await
            .map_err(|_| Error::Timeout("TLS handshake".into()))??;
        self.transcript.log("TLS session established");

        self.send_ehlo(client_hostname).await?;
        Ok(self)
    }

    /// Authenticates with the given mechanism.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Authentication`] if the server rejects any step.
    pub async fn authenticate(
        mut self,
        mechanism: AuthMechanism,
        username: &str,
        password: &str,
    ) -> Result<Client<Ready>> {
        tracing::debug!(mechanism = %mechanism, "Authenticating");

        let rejected = |e: Error| match e {
            Error::SmtpError { code, message } => {
                Error::Authentication(format!("{mechanism} rejected with {code}: {message}"))
            }
            other => other,
        };

        let challenge = self
            .send_command(Command::Auth { mechanism })
            .await?
            .expect(&[ReplyCode::AUTH_CONTINUE])
            .map_err(rejected)?;

        let final_response = match mechanism {
            AuthMechanism::Plain => STANDARD.encode(format!("\0{username}\0{password}")),
            AuthMechanism::Login => {
                self.send_command(Command::AuthResponse(STANDARD.encode(username)))
                    .await?
                    .expect(&[ReplyCode::AUTH_CONTINUE])
                    .map_err(rejected)?;
                STANDARD.encode(password)
            }
            AuthMechanism::CramMd5 => {
                let challenge = STANDARD
                    .decode(challenge.last_line().trim())
                    .map_err(|e| Error::Authentication(format!("Invalid CRAM-MD5 challenge: {e}")))?;
                let digest = cram_md5_digest(password, &challenge)?;
                STANDARD.encode(format!("{username} {digest}"))
            }
        };

        self.send_command(Command::AuthResponse(final_response))
            .await?
            .expect(&[ReplyCode::AUTH_SUCCESS])
            .map_err(rejected)?;

        Ok(self.into_state())
    }

    /// Proceeds without authentication.
    #[must_use]
    pub fn ready(self) -> Client<Ready> {
        self.into_state()
    }
}

impl Client<Ready> {
    /// Starts a mail transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the MAIL FROM command fails.
    pub async fn mail_from(mut self, from: Address) -> Result<Client<MailTransaction>> {
        self.send_command(Command::MailFrom { from })
            .await?
            .expect(&[ReplyCode::OK])?;
        Ok(self.into_state())
    }

    /// Checks without blocking whether the server has closed the connection.
    pub async fn is_closed(&mut self) -> bool {
        self.stream.is_closed().await
    }
}

impl Client<MailTransaction> {
    /// Adds a recipient to the transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the RCPT TO command is answered with anything but
    /// 250 or 251.
    pub async fn rcpt_to(mut self, to: Address) -> Result<Client<RecipientAdded>> {
        self.send_rcpt(to).await?;
        Ok(self.into_state())
    }
}

impl Client<RecipientAdded> {
    /// Adds another recipient to the transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the RCPT TO command fails.
    pub async fn rcpt_to(mut self, to: Address) -> Result<Self> {
        self.send_rcpt(to).await?;
        Ok(self)
    }

    /// Begins sending message data.
    ///
    /// # Errors
    ///
    /// Returns an error if the DATA command is not answered with 354.
    pub async fn data(mut self) -> Result<Client<Data>> {
        self.send_command(Command::Data)
            .await?
            .expect(&[ReplyCode::START_DATA])?;
        Ok(self.into_state())
    }
}

impl Client<Data> {
    /// Sends the message content and completes the transaction.
    ///
    /// Line endings are normalized to CRLF, lines starting with `.` are
    /// dot-stuffed and the terminating `.` line is appended. The payload
    /// goes out in a single write.
    ///
    /// # Errors
    ///
    /// Returns an error if sending the message fails or server rejects it.
    pub async fn send_message(mut self, message: &[u8]) -> Result<Client<Ready>> {
        let payload = dot_stuff(message);
        self.transcript
            .log(&format!(">>> {}", String::from_utf8_lossy(&payload)));
        self.write_all(&payload).await?;

        self.read_reply().await?.expect(&[ReplyCode::OK])?;
        Ok(self.into_state())
    }
}

// Common implementation for all states
impl<S> Client<S> {
    /// Returns the extensions from the latest EHLO.
    #[must_use]
    pub const fn extensions(&self) -> &ExtensionSet {
        &self.extensions
    }

    /// Returns true if the connection is encrypted.
    #[must_use]
    pub const fn is_tls(&self) -> bool {
        self.stream.is_tls()
    }

    fn into_state<T>(self) -> Client<T> {
        Client {
            stream: self.stream,
            extensions: self.extensions,
            timeouts: self.timeouts,
            transcript: self.transcript,
            _state: PhantomData,
        }
    }

    async fn send_ehlo(&mut self, client_hostname: &str) -> Result<()> {
        let reply = self
            .send_command(Command::Ehlo {
                hostname: client_hostname.to_string(),
            })
            .await?
            .expect(&[ReplyCode::OK])?;

        self.extensions = ExtensionSet::from_reply(&reply.message);
        tracing::debug!(extensions = ?self.extensions, "EHLO accepted");
        Ok(())
    }

    async fn send_rcpt(&mut self, to: Address) -> Result<()> {
        self.send_command(Command::RcptTo { to })
            .await?
            .expect(&[ReplyCode::OK, ReplyCode::FORWARD])?;
        Ok(())
    }

    async fn send_command(&mut self, cmd: Command) -> Result<Reply> {
        self.transcript.log(&format!(">>> {}", cmd.redacted()));
        self.write_all(&cmd.serialize()).await?;
        self.read_reply().await
    }

    /// Writes to the server, bounded by the per-line timeout.
    async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        tokio::time::timeout(self.timeouts.read, self.stream.write_all(data))
            .await
            .map_err(|_| Error::Timeout("write to server".into()))?
    }

    /// Reads one reply, bounded by the per-line and overall timeouts.
    ///
    /// If time runs out after at least one line arrived, the lines received
    /// so far are taken as the reply.
    async fn read_reply(&mut self) -> Result<Reply> {
        let deadline =
            (!self.timeouts.total.is_zero()).then(|| Instant::now() + self.timeouts.total);
        let mut lines: Vec<String> = Vec::new();

        loop {
            let wait = deadline.map_or(self.timeouts.read, |deadline| {
                deadline
                    .saturating_duration_since(Instant::now())
                    .min(self.timeouts.read)
            });

            match tokio::time::timeout(wait, self.stream.read_line()).await {
                Ok(Ok(Some(line))) => {
                    if line.is_empty() {
                        continue;
                    }
                    let is_last = is_last_reply_line(&line);
                    lines.push(line);
                    if is_last {
                        break;
                    }
                }
                Ok(Ok(None)) => {
                    if lines.is_empty() {
                        return Err(Error::Protocol("Connection closed by server".into()));
                    }
                    break;
                }
                Ok(Err(e)) => return Err(e),
                Err(_elapsed) => {
                    if lines.is_empty() {
                        return Err(Error::Timeout("server reply".into()));
                    }
                    tracing::warn!(lines = lines.len(), "Reply incomplete when time ran out");
                    break;
                }
            }
        }

        self.transcript.log(&format!("<<< {}", lines.join("\r\n")));
        parse_reply(&lines)
    }

    /// Sends QUIT and closes the connection (available in any state).
    ///
    /// The socket is closed whatever the outcome.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails or the reply is not 221.
    pub async fn quit(mut self) -> Result<()> {
        self.send_command(Command::Quit)
            .await?
            .expect(&[ReplyCode::CLOSING])?;
        Ok(())
    }
}

/// Computes the hex HMAC-MD5 of a CRAM-MD5 challenge keyed by the password.
fn cram_md5_digest(password: &str, challenge: &[u8]) -> Result<String> {
    let mut mac = HmacMd5::new_from_slice(password.as_bytes())
        .map_err(|e| Error::Authentication(e.to_string()))?;
    mac.update(challenge);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Normalizes line endings to CRLF, dot-stuffs, and appends `.` CRLF.
fn dot_stuff(message: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(message.len() + message.len() / 64 + 5);
    let body = message.strip_suffix(b"\n").unwrap_or(message);

    if !message.is_empty() {
        for line in body.split(|&b| b == b'\n') {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            if line.first() == Some(&b'.') {
                out.push(b'.');
            }
            out.extend_from_slice(line);
            out.extend_from_slice(b"\r\n");
        }
    }

    out.extend_from_slice(b".\r\n");
    out
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
    fn test_cram_md5_digest_rfc2195() {
        // Example exchange from RFC 2195.
        let digest = cram_md5_digest(
            "tanstaaftanstaaf",
            b"<1896.697170952@postoffice.reston.mci.net>",
        )
        .unwrap();
        assert_eq!(digest, "b913a602c7eda7a495b4e6e7334d3890");
    }

    #[test]
    fn test_dot_stuff() {
        assert_eq!(
            dot_stuff(b"Subject: x\r\n\r\n.hidden\nline\r\n"),
            b"Subject: x\r\n\r\n..hidden\r\nline\r\n.\r\n"
        );
        assert_eq!(dot_stuff(b"no newline"), b"no newline\r\n.\r\n");
        assert_eq!(dot_stuff(b"."), b"..\r\n.\r\n");
        assert_eq!(dot_stuff(b""), b".\r\n");
    }

    #[test]
    fn test_default_timeouts() {
        let timeouts = ReplyTimeouts::default();
        assert_eq!(timeouts.read, Duration::from_secs(30));
        assert_eq!(timeouts.total, Duration::from_secs(30));
    }
}
