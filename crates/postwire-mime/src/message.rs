//! In-memory model of an outgoing message.

use crate::encoding::encode_base64;
use crate::error::{Error, Result};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use rand::Rng;
use std::path::Path;

/// Characters left unescaped in attachment file names (RFC 3986 unreserved).
const FILENAME_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Length of the random hash used for inline image names.
const INLINE_HASH_LEN: usize = 12;

/// Returns `len` random lowercase hexadecimal characters.
#[must_use]
pub fn random_hex(len: usize) -> String {
    let mut bytes = vec![0u8; len.div_ceil(2)];
    rand::thread_rng().fill(bytes.as_mut_slice());
    let mut hex = hex::encode(bytes);
    hex.truncate(len);
    hex
}

/// Lower-cased extension of the last path component, or an empty string.
fn extension_of(file_name: &str) -> String {
    Path::new(file_name)
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// Final path component of a file name.
fn base_name(file_name: &str) -> String {
    Path::new(file_name)
        .file_name()
        .map_or_else(|| file_name.to_string(), |name| name.to_string_lossy().into_owned())
}

/// A file attached to a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    filename: String,
    extension: String,
    content_base64: String,
    size: usize,
}

impl Attachment {
    /// Creates an attachment from a file name and its contents.
    ///
    /// Only the last path component of `file_name` is kept, percent-encoded.
    #[must_use]
    pub fn from_bytes(file_name: &str, data: &[u8]) -> Self {
        let base = base_name(file_name);
        Self {
            filename: utf8_percent_encode(&base, FILENAME_ESCAPE).to_string(),
            extension: extension_of(&base),
            content_base64: encode_base64(data),
            size: data.len(),
        }
    }

    /// Percent-encoded file name.
    #[must_use]
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Lower-cased file extension.
    #[must_use]
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Base64 of the file contents, unwrapped.
    #[must_use]
    pub fn content_base64(&self) -> &str {
        &self.content_base64
    }

    /// Size of the file in bytes.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }
}

/// An image referenced from the HTML body through its content identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    filename: String,
    extension: String,
    content_base64: String,
    content_id: String,
}

impl InlineImage {
    /// Creates an inline image.
    ///
    /// The image is renamed to `<hash>.<ext>` and receives the content
    /// identifier `<hash>@<host_name>`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingHostName`] if `host_name` is empty.
    pub fn new(file_name: &str, data: &[u8], host_name: &str) -> Result<Self> {
        if host_name.is_empty() {
            return Err(Error::MissingHostName);
        }

        let hash = random_hex(INLINE_HASH_LEN);
        let extension = extension_of(file_name);
        Ok(Self {
            filename: format!("{hash}.{extension}"),
            content_id: format!("{hash}@{host_name}"),
            extension,
            content_base64: encode_base64(data),
        })
    }

    /// Generated file name.
    #[must_use]
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Lower-cased file extension.
    #[must_use]
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Base64 of the image data, unwrapped.
    #[must_use]
    pub fn content_base64(&self) -> &str {
        &self.content_base64
    }

    /// Content identifier, without angle brackets.
    #[must_use]
    pub fn content_id(&self) -> &str {
        &self.content_id
    }
}

/// An outgoing message before composition.
#[derive(Debug, Clone, Default)]
pub struct Message {
    from_name: String,
    from_email: String,
    to_name: String,
    to_email: String,
    subject: String,
    text_plain: Option<String>,
    text_html: Option<String>,
    content_language: Option<String>,
    headers: Vec<(String, String)>,
    attachments: Vec<Attachment>,
    inline_images: Vec<InlineImage>,
}

/// Empty strings count as absent.
fn non_empty(value: impl Into<String>) -> Option<String> {
    let value = value.into();
    (!value.is_empty()).then_some(value)
}

impl Message {
    /// Creates an empty message.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the sender.
    pub fn set_from(&mut self, name: impl Into<String>, email: impl Into<String>) {
        self.from_name = name.into();
        self.from_email = email.into();
    }

    /// Sets the recipient.
    pub fn set_to(&mut self, name: impl Into<String>, email: impl Into<String>) {
        self.to_name = name.into();
        self.to_email = email.into();
    }

    /// Sets the subject.
    pub fn set_subject(&mut self, subject: impl Into<String>) {
        self.subject = subject.into();
    }

    /// Sets the plain text body. An empty string clears it.
    pub fn set_text_plain(&mut self, text: impl Into<String>) {
        self.text_plain = non_empty(text);
    }

    /// Sets the HTML body. An empty string clears it.
    pub fn set_text_html(&mut self, html: impl Into<String>) {
        self.text_html = non_empty(html);
    }

    /// Sets the language of the text parts, e.g. `en`.
    pub fn set_content_language(&mut self, language: impl Into<String>) {
        self.content_language = non_empty(language);
    }

    /// Adds a custom header, replacing any previous value under the same name.
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        if let Some(entry) = self
            .headers
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(&name))
        {
            entry.1 = value;
        } else {
            self.headers.push((name, value));
        }
    }

    /// Appends an attachment.
    pub fn add_attachment(&mut self, attachment: Attachment) {
        self.attachments.push(attachment);
    }

    /// Removes all attachments.
    pub fn clear_attachments(&mut self) {
        self.attachments.clear();
    }

    /// Adds an inline image and returns its content identifier.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateContentId`] if an image with the same
    /// identifier is already embedded.
    pub fn embed_image(&mut self, image: InlineImage) -> Result<String> {
        if self
            .inline_images
            .iter()
            .any(|existing| existing.content_id == image.content_id)
        {
            return Err(Error::DuplicateContentId(image.content_id));
        }
        let content_id = image.content_id.clone();
        self.inline_images.push(image);
        Ok(content_id)
    }

    /// Sender display name.
    #[must_use]
    pub fn from_name(&self) -> &str {
        &self.from_name
    }

    /// Sender address.
    #[must_use]
    pub fn from_email(&self) -> &str {
        &self.from_email
    }

    /// Recipient display name.
    #[must_use]
    pub fn to_name(&self) -> &str {
        &self.to_name
    }

    /// Recipient address.
    #[must_use]
    pub fn to_email(&self) -> &str {
        &self.to_email
    }

    /// Subject line.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Plain text body.
    #[must_use]
    pub fn text_plain(&self) -> Option<&str> {
        self.text_plain.as_deref()
    }

    /// HTML body.
    #[must_use]
    pub fn text_html(&self) -> Option<&str> {
        self.text_html.as_deref()
    }

    /// Language of the text parts.
    #[must_use]
    pub fn content_language(&self) -> Option<&str> {
        self.content_language.as_deref()
    }

    /// Custom headers in insertion order.
    #[must_use]
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Attachments in insertion order.
    #[must_use]
    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    /// Inline images in insertion order.
    #[must_use]
    pub fn inline_images(&self) -> &[InlineImage] {
        &self.inline_images
    }

    /// Returns true if a plain or HTML body is present.
    #[must_use]
    pub const fn has_text(&self) -> bool {
        self.text_plain.is_some() || self.text_html.is_some()
    }

    /// Returns true if the message has anything to send.
    #[must_use]
    pub fn has_content(&self) -> bool {
        self.has_text() || !self.attachments.is_empty()
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

    mod attachment_tests {
        use super::*;

        #[test]
        fn test_filename_is_percent_encoded_basename() {
            let attachment = Attachment::from_bytes("/tmp/reports/Q1 résumé.PDF", b"%PDF");
            assert_eq!(attachment.filename(), "Q1%20r%C3%A9sum%C3%A9.PDF");
            assert_eq!(attachment.extension(), "pdf");
            assert_eq!(attachment.size(), 4);
            assert_eq!(attachment.content_base64(), "JVBERg==");
        }

        #[test]
        fn test_no_extension() {
            let attachment = Attachment::from_bytes("README", b"");
            assert_eq!(attachment.extension(), "");
            assert_eq!(attachment.size(), 0);
        }
    }

    mod inline_image_tests {
        use super::*;

        #[test]
        fn test_requires_host_name() {
            let result = InlineImage::new("logo.png", b"png", "");
            assert!(matches!(result, Err(Error::MissingHostName)));
        }

        #[test]
        fn test_generated_names() {
            let image = InlineImage::new("assets/Logo.PNG", b"png", "mail.example.com").unwrap();
            let (hash, host) = image.content_id().split_once('@').unwrap();
            assert_eq!(hash.len(), 12);
            assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
            assert_eq!(host, "mail.example.com");
            assert_eq!(image.filename(), format!("{hash}.png"));
            assert_eq!(image.extension(), "png");
        }

        #[test]
        fn test_duplicate_content_id_rejected() {
            let mut message = Message::new();
            let image = InlineImage::new("a.gif", b"gif", "host").unwrap();
            message.embed_image(image.clone()).unwrap();
            assert!(matches!(
                message.embed_image(image),
                Err(Error::DuplicateContentId(_))
            ));
            assert_eq!(message.inline_images().len(), 1);
        }
    }

    mod message_tests {
        use super::*;

        #[test]
        fn test_empty_bodies_are_absent() {
            let mut message = Message::new();
            message.set_text_plain("");
            message.set_text_html("");
            assert!(!message.has_text());
            assert!(!message.has_content());

            message.add_attachment(Attachment::from_bytes("a.txt", b"a"));
            assert!(message.has_content());
        }

        #[test]
        fn test_add_header_replaces() {
            let mut message = Message::new();
            message.add_header("X-Campaign", "one");
            message.add_header("X-Other", "two");
            message.add_header("x-campaign", "three");
            assert_eq!(
                message.headers(),
                &[
                    ("X-Campaign".to_string(), "three".to_string()),
                    ("X-Other".to_string(), "two".to_string())
                ]
            );
        }

        #[test]
        fn test_clear_attachments() {
            let mut message = Message::new();
            message.add_attachment(Attachment::from_bytes("a.txt", b"a"));
            message.add_attachment(Attachment::from_bytes("b.txt", b"b"));
            message.clear_attachments();
            assert!(message.attachments().is_empty());
        }
    }

    #[test]
    fn test_random_hex() {
        let value = random_hex(30);
        assert_eq!(value.len(), 30);
        assert!(value.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')));
        assert_ne!(random_hex(30), value);
    }
}
