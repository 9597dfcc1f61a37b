//! The mailer facade.

use crate::config::MailerConfig;
use crate::error::{Error, Result};
use crate::mime_types::resolve_mime_type;
use crate::transport::Transport;
use postwire_mime::compose::{ComposeOptions, MimeTypeResolver, compose};
use postwire_mime::header::{sanitize_email, sanitize_header_text};
use postwire_mime::{Attachment, InlineImage, Message};
use postwire_smtp::DebugLog;
use std::path::{Path, PathBuf};

/// Composes messages and sends them through the configured transport.
///
/// Message fields persist between sends, so a mailer can send the same
/// message to several recipients by changing only [`Mailer::to`]. The SMTP
/// connection is kept open between sends; call [`Mailer::close`] for an
/// orderly `QUIT`. Dropping the mailer closes the socket without it.
pub struct Mailer {
    config: MailerConfig,
    message: Message,
    transport: Transport,
    transcript: DebugLog,
    mime_types: Box<dyn MimeTypeResolver + Send + Sync>,
}

impl std::fmt::Debug for Mailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mailer")
            .field("config", &self.config)
            .field("message", &self.message)
            .field("transport", &self.transport)
            .finish_non_exhaustive()
    }
}

impl Mailer {
    /// Creates a mailer.
    ///
    /// # Errors
    ///
    /// Returns an error if the SMTP settings are invalid.
    pub fn new(config: MailerConfig) -> Result<Self> {
        let transcript =
            DebugLog::with_time_offset(config.debug.sink.clone(), config.debug.time_offset);
        if config.debug.enabled {
            transcript.enable();
        }

        let transport = Transport::from_config(&config, transcript.clone())?;

        let mut message = Message::new();
        message.set_from(config.from_name.clone(), config.from_email.clone());

        tracing::debug!(host_name = %config.host_name, mode = ?config.mode, "Mailer created");

        Ok(Self {
            config,
            message,
            transport,
            transcript,
            mime_types: Box::new(resolve_mime_type),
        })
    }

    /// Replaces the file extension to MIME type lookup.
    #[must_use]
    pub fn with_mime_types(
        mut self,
        resolver: impl MimeTypeResolver + Send + Sync + 'static,
    ) -> Self {
        self.mime_types = Box::new(resolver);
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &MailerConfig {
        &self.config
    }

    /// Returns the message as it stands.
    #[must_use]
    pub const fn message(&self) -> &Message {
        &self.message
    }

    /// Returns the debug transcript handle.
    #[must_use]
    pub const fn transcript(&self) -> &DebugLog {
        &self.transcript
    }

    /// Returns true if an SMTP connection is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.transport.is_open()
    }

    /// Overrides the configured sender.
    pub fn from(&mut self, email: impl Into<String>, name: impl Into<String>) -> &mut Self {
        self.message.set_from(name, email);
        self
    }

    /// Sets the recipient.
    pub fn to(&mut self, email: impl Into<String>, name: impl Into<String>) -> &mut Self {
        self.message.set_to(name, email);
        self
    }

    /// Sets the subject.
    pub fn subject(&mut self, subject: impl Into<String>) -> &mut Self {
        self.message.set_subject(subject);
        self
    }

    /// Sets the plain text body.
    pub fn text_plain(&mut self, text: impl Into<String>) -> &mut Self {
        self.message.set_text_plain(text);
        self
    }

    /// Sets the HTML body.
    pub fn text_html(&mut self, html: impl Into<String>) -> &mut Self {
        self.message.set_text_html(html);
        self
    }

    /// Sets the `Content-Language` of the text parts.
    pub fn content_language(&mut self, language: impl Into<String>) -> &mut Self {
        self.message.set_content_language(language);
        self
    }

    /// Adds or replaces a custom header.
    pub fn header(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.message.add_header(name, value);
        self
    }

    /// Attaches a file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::File`] if the file cannot be read; the attachment
    /// list is left unchanged.
    pub async fn add_attachment(&mut self, path: impl AsRef<Path>) -> Result<&mut Self> {
        let attachment = read_attachment(path.as_ref()).await?;
        self.message.add_attachment(attachment);
        Ok(self)
    }

    /// Replaces all attachments with the given files.
    ///
    /// # Errors
    ///
    /// Returns [`Error::File`] if any file cannot be read; the attachment
    /// list is left unchanged.
    pub async fn attach<I, P>(&mut self, paths: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut attachments = Vec::new();
        for path in paths {
            attachments.push(read_attachment(path.as_ref()).await?);
        }

        self.message.clear_attachments();
        for attachment in attachments {
            self.message.add_attachment(attachment);
        }
        Ok(self)
    }

    /// Removes all attachments.
    pub fn clear_attachments(&mut self) -> &mut Self {
        self.message.clear_attachments();
        self
    }

    /// Embeds an image and returns its content identifier, for use as
    /// `cid:<id>` in the HTML body.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub async fn add_inline_image(&mut self, path: impl AsRef<Path>) -> Result<String> {
        let path = path.as_ref();
        let data = read_file(path).await?;
        let image = InlineImage::new(&path.to_string_lossy(), &data, &self.config.host_name)?;
        Ok(self.message.embed_image(image)?)
    }

    /// Composes the message and sends it.
    ///
    /// With `debug` set the protocol transcript is switched on for this and
    /// all later sends.
    ///
    /// Returns the Message-ID.
    ///
    /// # Errors
    ///
    /// Composition errors are returned before any network activity.
    /// Delivery errors close the SMTP connection; see
    /// [`Error::kind`](crate::Error::kind) for the failure classes.
    pub async fn send(&mut self, debug: bool) -> Result<String> {
        if debug {
            self.transcript.enable();
        }

        let message = self.sanitized_message();

        let mut options =
            ComposeOptions::new(self.config.host_name.clone()).encoding(self.config.encoding);
        if !self.transport.includes_envelope_headers() {
            options = options.without_envelope_headers();
        }

        let composed = compose(&message, &options, self.mime_types.as_ref())?;
        tracing::debug!(message_id = %composed.message_id, "Message composed");

        if let Err(e) = self
            .transport
            .deliver(message.from_email(), message.to_email(), &composed)
            .await
        {
            tracing::warn!(message_id = %composed.message_id, error = %e, "Delivery failed");
            return Err(e);
        }

        Ok(composed.message_id)
    }

    /// Closes the SMTP connection with `QUIT`, logging the session summary.
    pub async fn close(&mut self) {
        self.transport.close().await;
    }

    /// Copy of the message with envelope fields cleaned of header
    /// injection characters.
    fn sanitized_message(&self) -> Message {
        let mut message = self.message.clone();
        message.set_from(
            sanitize_header_text(self.message.from_name()),
            sanitize_email(self.message.from_email()),
        );
        message.set_to(
            sanitize_header_text(self.message.to_name()),
            sanitize_email(self.message.to_email()),
        );
        message.set_subject(sanitize_header_text(self.message.subject()));
        message
    }
}

async fn read_file(path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path).await.map_err(|source| Error::File {
        path: PathBuf::from(path),
        source,
    })
}

async fn read_attachment(path: &Path) -> Result<Attachment> {
    let data = read_file(path).await?;
    tracing::debug!(path = %path.display(), bytes = data.len(), "Attachment read");
    Ok(Attachment::from_bytes(&path.to_string_lossy(), &data))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::TransportMode;

    fn mailer() -> Mailer {
        let config = MailerConfig::builder()
            .host_name("mail.example.com")
            .mode(TransportMode::Local)
            .from("sender@example.com", "Sender")
            .build()
            .unwrap();
        Mailer::new(config).unwrap()
    }

    #[test]
    fn test_setters() {
        let mut mailer = mailer();
        mailer
            .to("rcpt@example.com", "Recipient")
            .subject("Hello")
            .text_plain("Body")
            .header("X-Campaign", "42");

        let message = mailer.message();
        assert_eq!(message.from_email(), "sender@example.com");
        assert_eq!(message.to_name(), "Recipient");
        assert_eq!(message.subject(), "Hello");
        assert_eq!(message.text_plain(), Some("Body"));
        assert_eq!(message.headers().len(), 1);
        assert!(!mailer.is_connected());
    }

    #[test]
    fn test_sanitized_message() {
        let mut mailer = mailer();
        mailer
            .to("rcpt@exa mple.com\r\n", "Bob\r\nBcc: evil@example.com")
            .subject("Hi%0AThere\t!");

        let message = mailer.sanitized_message();
        assert_eq!(message.to_email(), "rcpt@example.com");
        assert_eq!(message.to_name(), "BobBcc: evil@example.com");
        assert_eq!(message.subject(), "HiThere!");
        // The stored message is untouched.
        assert_eq!(mailer.message().subject(), "Hi%0AThere\t!");
    }

    #[tokio::test]
    async fn test_send_without_content() {
        let mut mailer = mailer();
        mailer.to("rcpt@example.com", "Recipient");
        let err = mailer.send(false).await.unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Composition);
    }

    #[tokio::test]
    async fn test_debug_flag_enables_transcript() {
        let mut mailer = mailer();
        assert!(!mailer.transcript().is_enabled());
        let _ = mailer.send(true).await;
        assert!(mailer.transcript().is_enabled());
    }
}
