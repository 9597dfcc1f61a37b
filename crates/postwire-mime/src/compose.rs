//! MIME composition.
//!
//! Turns a [`Message`] into an ordered header list and a body string. The
//! multipart structure is a linear stack of nesting levels chosen by
//! [`plan_layout`]; [`compose`] walks that stack once outward-in to open the
//! levels and emit text parts, then inward-out to emit attachments and close
//! every boundary.

use crate::boundary::BoundaryRegistry;
use crate::encoding::{TransferEncoding, encode_body, wrap_encoded};
use crate::error::{Error, Result};
use crate::header::{encode_header, encode_name_header, sanitize_header_text};
use crate::message::{Attachment, InlineImage, Message, random_hex};
use crate::{CHARSET, CRLF};
use chrono::{DateTime, FixedOffset, Local};
use std::fmt;

/// Default `X-Mailer` header value.
pub const DEFAULT_X_MAILER: &str = concat!("postwire/", env!("CARGO_PKG_VERSION"));

/// Hex characters in the random part of a Message-ID.
const MESSAGE_ID_HEX_LEN: usize = 30;

/// Size of the hyphen-separated groups in a Message-ID.
const MESSAGE_ID_GROUP_LEN: usize = 10;

/// Multipart content types used by the compositor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MultipartKind {
    /// `multipart/mixed`: body plus attachments.
    Mixed,
    /// `multipart/alternative`: plain and HTML renditions.
    Alternative,
    /// `multipart/related`: HTML plus inline images.
    Related,
}

impl MultipartKind {
    /// Returns the MIME type string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mixed => "multipart/mixed",
            Self::Alternative => "multipart/alternative",
            Self::Related => "multipart/related",
        }
    }
}

impl fmt::Display for MultipartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps a file extension to a MIME type.
pub trait MimeTypeResolver {
    /// Returns the MIME type for a lower-cased extension, if known.
    fn resolve(&self, extension: &str) -> Option<String>;
}

impl<F> MimeTypeResolver for F
where
    F: Fn(&str) -> Option<String>,
{
    fn resolve(&self, extension: &str) -> Option<String> {
        self(extension)
    }
}

/// Settings that affect composition but are not part of the message.
#[derive(Debug, Clone)]
pub struct ComposeOptions {
    /// Host name used in the Message-ID.
    pub host_name: String,
    /// Transfer encoding for text parts.
    pub encoding: TransferEncoding,
    /// Whether `To` and `Subject` are part of the header block.
    pub include_envelope_headers: bool,
    /// Value of the `X-Mailer` header.
    pub x_mailer: String,
    /// Fixed `Date` header value; the current local time when unset.
    pub date: Option<DateTime<FixedOffset>>,
}

impl ComposeOptions {
    /// Creates options with Base64 text encoding and envelope headers.
    #[must_use]
    pub fn new(host_name: impl Into<String>) -> Self {
        Self {
            host_name: host_name.into(),
            encoding: TransferEncoding::default(),
            include_envelope_headers: true,
            x_mailer: DEFAULT_X_MAILER.to_string(),
            date: None,
        }
    }

    /// Sets the text transfer encoding.
    #[must_use]
    pub const fn encoding(mut self, encoding: TransferEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Leaves `To` and `Subject` out of the header block.
    #[must_use]
    pub const fn without_envelope_headers(mut self) -> Self {
        self.include_envelope_headers = false;
        self
    }

    /// Fixes the `Date` header.
    #[must_use]
    pub const fn date(mut self, date: DateTime<FixedOffset>) -> Self {
        self.date = Some(date);
        self
    }
}

/// A composed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Composed {
    /// Top-level header lines, each possibly folded, without trailing CRLF.
    pub headers: Vec<String>,
    /// MIME body.
    pub body: String,
    /// Message-ID without angle brackets.
    pub message_id: String,
    /// Encoded recipient, as it would follow `To: `.
    pub to: String,
    /// Encoded subject, as it would follow `Subject: `.
    pub subject: String,
}

impl Composed {
    /// Header lines joined with CRLF.
    #[must_use]
    pub fn header_block(&self) -> String {
        self.headers.join(CRLF)
    }

    /// Full message text: headers, blank line, body.
    #[must_use]
    pub fn to_message_string(&self) -> String {
        format!("{}{CRLF}{CRLF}{}", self.header_block(), self.body)
    }
}

/// Chooses the multipart nesting levels for a message, outermost first.
///
/// An empty result means the message is emitted without a multipart wrapper.
#[must_use]
pub fn plan_layout(message: &Message) -> Vec<MultipartKind> {
    let plain = message.text_plain().is_some();
    let html = message.text_html().is_some();
    let attachments = message.attachments();
    let has_inline = !message.inline_images().is_empty();

    if attachments.len() > 1 && !message.has_text() {
        return vec![MultipartKind::Mixed];
    }

    if !attachments.is_empty() && message.has_text() {
        let mut levels = vec![MultipartKind::Mixed];
        if plain {
            levels.push(MultipartKind::Alternative);
            if html {
                levels.push(MultipartKind::Related);
            }
        } else {
            // Attachments are present, so HTML always gets a related level.
            levels.push(MultipartKind::Related);
        }
        return levels;
    }

    match (plain, html, has_inline) {
        (true, true, true) => vec![MultipartKind::Alternative, MultipartKind::Related],
        (true, true, false) => vec![MultipartKind::Alternative],
        (false, true, true) => vec![MultipartKind::Related],
        _ => Vec::new(),
    }
}

/// Generates a Message-ID: three hyphen-joined groups of ten hex characters
/// followed by `@host_name`.
///
/// # Errors
///
/// Returns [`Error::MissingHostName`] if `host_name` is empty.
pub fn generate_message_id(host_name: &str) -> Result<String> {
    if host_name.is_empty() {
        return Err(Error::MissingHostName);
    }

    let hex = random_hex(MESSAGE_ID_HEX_LEN);
    let groups: Vec<&str> = hex
        .as_bytes()
        .chunks(MESSAGE_ID_GROUP_LEN)
        .filter_map(|chunk| std::str::from_utf8(chunk).ok())
        .collect();
    Ok(format!("{}@{host_name}", groups.join("-")))
}

/// Composes a message into headers and body.
///
/// # Errors
///
/// Returns an error if the message has no content, the host name is missing,
/// an attachment has an unknown extension, or a header line is too long.
pub fn compose(
    message: &Message,
    options: &ComposeOptions,
    mime_types: &dyn MimeTypeResolver,
) -> Result<Composed> {
    if !message.has_content() {
        return Err(Error::NoContent);
    }

    let message_id = generate_message_id(&options.host_name)?;
    let to_line = encode_name_header("To", message.to_name(), message.to_email())?;
    let subject_line = encode_header("Subject", message.subject(), true)?;

    let mut headers = Vec::new();
    if options.include_envelope_headers {
        headers.push(to_line.clone());
        headers.push(subject_line.clone());
    }

    let date = options
        .date
        .unwrap_or_else(|| Local::now().fixed_offset())
        .to_rfc2822();
    headers.push(format!("Date: {date}"));
    headers.push(encode_name_header(
        "From",
        message.from_name(),
        message.from_email(),
    )?);
    headers.push(format!("Message-ID: <{message_id}>"));

    for (name, value) in message.headers() {
        let name = sanitize_header_text(name);
        let value = sanitize_header_text(value);
        headers.push(encode_header(&name, &value, true)?);
    }

    headers.push(encode_header("X-Mailer", &options.x_mailer, true)?);
    headers.push("MIME-Version: 1.0".to_string());

    let levels = plan_layout(message);
    let mut writer = BodyWriter {
        message,
        encoding: options.encoding,
        mime_types,
        boundaries: BoundaryRegistry::new(),
        body: String::new(),
    };

    if levels.is_empty() {
        writer.write_flat(&mut headers)?;
    } else {
        writer.write_nested(&levels, &mut headers)?;
    }

    tracing::debug!(
        message_id = %message_id,
        levels = levels.len(),
        attachments = message.attachments().len(),
        inline_images = message.inline_images().len(),
        body_len = writer.body.len(),
        "Composed message"
    );

    Ok(Composed {
        headers,
        body: writer.body,
        message_id,
        to: strip_header_name(&to_line, "To"),
        subject: strip_header_name(&subject_line, "Subject"),
    })
}

fn strip_header_name(line: &str, name: &str) -> String {
    line.strip_prefix(name)
        .and_then(|rest| rest.strip_prefix(": "))
        .unwrap_or(line)
        .to_string()
}

/// Accumulates the body of one message.
struct BodyWriter<'a> {
    message: &'a Message,
    encoding: TransferEncoding,
    mime_types: &'a dyn MimeTypeResolver,
    boundaries: BoundaryRegistry,
    body: String,
}

impl BodyWriter<'_> {
    fn mime_type(&self, extension: &str) -> Result<String> {
        self.mime_types
            .resolve(extension)
            .ok_or_else(|| Error::UnknownExtension(extension.to_string()))
    }

    /// Header lines of a text part.
    fn text_headers(&self, subtype: &str) -> Vec<String> {
        let mut lines = Vec::with_capacity(3);
        if let Some(language) = self.message.content_language() {
            lines.push(format!("Content-Language: {language}"));
        }
        lines.push(format!("Content-Type: text/{subtype}; charset={CHARSET}"));
        lines.push(format!("Content-Transfer-Encoding: {}", self.encoding));
        lines
    }

    /// Emits one part inside `kind`: delimiter, headers, blank line, content.
    fn write_part(&mut self, kind: MultipartKind, headers: &[String], content: &str) {
        let boundary = self.boundaries.get(kind).to_string();
        self.body.push_str(&format!("--{boundary}{CRLF}"));
        for line in headers {
            self.body.push_str(line);
            self.body.push_str(CRLF);
        }
        self.body.push_str(CRLF);
        self.body.push_str(content);
        self.body.push_str(CRLF);
    }

    fn write_text_part(&mut self, kind: MultipartKind, subtype: &str, text: &str) {
        let headers = self.text_headers(subtype);
        let content = encode_body(text.trim(), self.encoding);
        self.write_part(kind, &headers, &content);
    }

    fn write_inline_image(&mut self, kind: MultipartKind, image: &InlineImage) -> Result<()> {
        let mime_type = self.mime_type(image.extension())?;
        let headers = [
            format!("Content-ID: <{}>", image.content_id()),
            format!("Content-Type: {mime_type}; name=\"{}\"", image.filename()),
            "Content-Transfer-Encoding: base64".to_string(),
            format!("Content-Disposition: inline; filename=\"{}\"", image.filename()),
        ];
        self.write_part(kind, &headers, &wrap_encoded(image.content_base64()));
        Ok(())
    }

    fn attachment_headers(&self, attachment: &Attachment) -> Result<[String; 3]> {
        let mime_type = self.mime_type(attachment.extension())?;
        Ok([
            format!(
                "Content-Type: {mime_type};{CRLF}\tname=\"{}\"",
                attachment.filename()
            ),
            "Content-Transfer-Encoding: base64".to_string(),
            format!(
                "Content-Disposition: attachment;{CRLF}\tfilename=\"{}\";{CRLF}\tsize={}",
                attachment.filename(),
                attachment.size()
            ),
        ])
    }

    /// Single-part message: the content type goes into the top-level headers.
    fn write_flat(&mut self, headers: &mut Vec<String>) -> Result<()> {
        let message = self.message;
        if let Some(text) = message.text_plain() {
            headers.extend(self.text_headers("plain"));
            self.body = encode_body(text.trim(), self.encoding);
        } else if let Some(html) = message.text_html() {
            headers.extend(self.text_headers("html"));
            self.body = encode_body(html.trim(), self.encoding);
        } else if let Some(attachment) = message.attachments().first() {
            headers.extend(self.attachment_headers(attachment)?);
            self.body = wrap_encoded(attachment.content_base64());
        } else {
            return Err(Error::NoContent);
        }
        Ok(())
    }

    fn write_nested(&mut self, levels: &[MultipartKind], headers: &mut Vec<String>) -> Result<()> {
        let message = self.message;

        // Open outermost to innermost.
        for (depth, &kind) in levels.iter().enumerate() {
            let boundary = self.boundaries.get(kind).to_string();
            let content_type = format!("Content-Type: {kind};{CRLF}\tboundary=\"{boundary}\"");

            if depth == 0 {
                headers.push(content_type);
            } else {
                let parent = self.boundaries.get(levels[depth - 1]).to_string();
                self.body
                    .push_str(&format!("--{parent}{CRLF}{content_type}{CRLF}{CRLF}"));
            }

            match kind {
                MultipartKind::Alternative => {
                    if let Some(text) = message.text_plain() {
                        self.write_text_part(kind, "plain", text);
                    }
                    let related_follows = levels.get(depth + 1) == Some(&MultipartKind::Related);
                    if !related_follows && let Some(html) = message.text_html() {
                        self.write_text_part(kind, "html", html);
                    }
                }
                MultipartKind::Related => {
                    if let Some(html) = message.text_html() {
                        self.write_text_part(kind, "html", html);
                    }
                    for image in message.inline_images() {
                        self.write_inline_image(kind, image)?;
                    }
                }
                MultipartKind::Mixed => {}
            }
        }

        // Close innermost to outermost.
        for &kind in levels.iter().rev() {
            if kind == MultipartKind::Mixed {
                for attachment in message.attachments() {
                    let part_headers = self.attachment_headers(attachment)?;
                    self.write_part(kind, &part_headers, &wrap_encoded(attachment.content_base64()));
                }
            }
            let boundary = self.boundaries.get(kind).to_string();
            self.body.push_str(&format!("--{boundary}--{CRLF}{CRLF}"));
        }

        let trimmed_len = self.body.trim_end().len();
        self.body.truncate(trimmed_len);
        self.body.push_str(CRLF);
        Ok(())
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
    use crate::encoding::{decode_base64, decode_quoted_printable};

    fn resolver(extension: &str) -> Option<String> {
        match extension {
            "pdf" => Some("application/pdf".to_string()),
            "png" => Some("image/png".to_string()),
            "txt" => Some("text/plain".to_string()),
            _ => None,
        }
    }

    fn options() -> ComposeOptions {
        let date = DateTime::parse_from_rfc2822("Tue, 15 Jul 2003 10:52:37 +0200").unwrap();
        ComposeOptions::new("mail.example.com").date(date)
    }

    fn base_message() -> Message {
        let mut message = Message::new();
        message.set_from("Sender", "sender@example.com");
        message.set_to("Recipient", "rcpt@example.com");
        message.set_subject("Status");
        message
    }

    fn boundary_of(content_type_line: &str) -> String {
        let start = content_type_line.find("boundary=\"").unwrap() + 10;
        let end = content_type_line[start..].find('"').unwrap() + start;
        content_type_line[start..end].to_string()
    }

    mod layout_tests {
        use super::*;

        #[test]
        fn test_flat_plain() {
            let mut message = base_message();
            message.set_text_plain("hi");
            assert!(plan_layout(&message).is_empty());
        }

        #[test]
        fn test_multiple_attachments_without_text() {
            let mut message = base_message();
            message.add_attachment(Attachment::from_bytes("a.pdf", b"a"));
            message.add_attachment(Attachment::from_bytes("b.pdf", b"b"));
            assert_eq!(plan_layout(&message), vec![MultipartKind::Mixed]);
        }

        #[test]
        fn test_single_attachment_without_text_is_flat() {
            let mut message = base_message();
            message.add_attachment(Attachment::from_bytes("a.pdf", b"a"));
            assert!(plan_layout(&message).is_empty());
        }

        #[test]
        fn test_plain_html_attachments() {
            let mut message = base_message();
            message.set_text_plain("plain");
            message.set_text_html("<p>html</p>");
            message.add_attachment(Attachment::from_bytes("a.pdf", b"a"));
            assert_eq!(
                plan_layout(&message),
                vec![
                    MultipartKind::Mixed,
                    MultipartKind::Alternative,
                    MultipartKind::Related
                ]
            );
        }

        #[test]
        fn test_html_with_attachment() {
            let mut message = base_message();
            message.set_text_html("<p>html</p>");
            message.add_attachment(Attachment::from_bytes("a.pdf", b"a"));
            assert_eq!(
                plan_layout(&message),
                vec![MultipartKind::Mixed, MultipartKind::Related]
            );
        }

        #[test]
        fn test_plain_and_html() {
            let mut message = base_message();
            message.set_text_plain("plain");
            message.set_text_html("<p>html</p>");
            assert_eq!(plan_layout(&message), vec![MultipartKind::Alternative]);

            message
                .embed_image(InlineImage::new("logo.png", b"png", "host").unwrap())
                .unwrap();
            assert_eq!(
                plan_layout(&message),
                vec![MultipartKind::Alternative, MultipartKind::Related]
            );
        }

        #[test]
        fn test_html_with_inline_images() {
            let mut message = base_message();
            message.set_text_html("<img src=\"cid:x\">");
            message
                .embed_image(InlineImage::new("logo.png", b"png", "host").unwrap())
                .unwrap();
            assert_eq!(plan_layout(&message), vec![MultipartKind::Related]);
        }
    }

    mod compose_tests {
        use super::*;

        #[test]
        fn test_no_content() {
            let message = base_message();
            assert!(matches!(
                compose(&message, &options(), &resolver),
                Err(Error::NoContent)
            ));
        }

        #[test]
        fn test_missing_host_name() {
            let mut message = base_message();
            message.set_text_plain("hi");
            let options = ComposeOptions::new("");
            assert!(matches!(
                compose(&message, &options, &resolver),
                Err(Error::MissingHostName)
            ));
        }

        #[test]
        fn test_header_order_flat_plain() {
            let mut message = base_message();
            message.set_text_plain("  Hello there  ");
            message.set_content_language("en");
            message.add_header("X-Campaign", "spring\r\nBcc: evil@example.com");

            let composed = compose(&message, &options(), &resolver).unwrap();
            let names: Vec<&str> = composed
                .headers
                .iter()
                .map(|line| line.split(':').next().unwrap())
                .collect();
            assert_eq!(
                names,
                vec![
                    "To",
                    "Subject",
                    "Date",
                    "From",
                    "Message-ID",
                    "X-Campaign",
                    "X-Mailer",
                    "MIME-Version",
                    "Content-Language",
                    "Content-Type",
                    "Content-Transfer-Encoding"
                ]
            );
            assert_eq!(composed.headers[0], "To: Recipient <rcpt@example.com>");
            assert_eq!(composed.headers[2], "Date: Tue, 15 Jul 2003 10:52:37 +0200");
            assert_eq!(composed.headers[5], "X-Campaign: springBcc: evil@example.com");
            assert_eq!(composed.headers[9], "Content-Type: text/plain; charset=utf-8");
            assert_eq!(composed.headers[10], "Content-Transfer-Encoding: base64");
            assert_eq!(decode_base64(&composed.body).unwrap(), b"Hello there");
            assert!(composed.headers.iter().all(|h| !h.contains('\n') || h.contains("\r\n")));
        }

        #[test]
        fn test_message_id_format() {
            let mut message = base_message();
            message.set_text_plain("hi");
            let composed = compose(&message, &options(), &resolver).unwrap();

            let (local, host) = composed.message_id.split_once('@').unwrap();
            assert_eq!(host, "mail.example.com");
            let groups: Vec<&str> = local.split('-').collect();
            assert_eq!(groups.len(), 3);
            assert!(groups.iter().all(|g| g.len() == 10));
            assert!(
                composed
                    .headers
                    .contains(&format!("Message-ID: <{}>", composed.message_id))
            );
        }

        #[test]
        fn test_envelope_headers_omitted() {
            let mut message = base_message();
            message.set_subject("Grüße");
            message.set_text_plain("hi");
            let options = options().without_envelope_headers();
            let composed = compose(&message, &options, &resolver).unwrap();

            assert!(composed.headers[0].starts_with("Date: "));
            assert!(!composed.headers.iter().any(|h| h.starts_with("To:")));
            assert!(!composed.headers.iter().any(|h| h.starts_with("Subject:")));
            assert_eq!(composed.to, "Recipient <rcpt@example.com>");
            assert!(composed.subject.starts_with("=?utf-8?B?"));
        }

        #[test]
        fn test_quoted_printable_text() {
            let mut message = base_message();
            message.set_text_html("<p>Größe</p>");
            let options = options().encoding(TransferEncoding::QuotedPrintable);
            let composed = compose(&message, &options, &resolver).unwrap();

            assert!(
                composed
                    .headers
                    .contains(&"Content-Transfer-Encoding: quoted-printable".to_string())
            );
            assert!(
                composed
                    .headers
                    .contains(&"Content-Type: text/html; charset=utf-8".to_string())
            );
            assert_eq!(
                decode_quoted_printable(composed.body.trim_end()).unwrap(),
                "<p>Größe</p>"
            );
        }

        #[test]
        fn test_single_attachment_flat() {
            let mut message = base_message();
            message.add_attachment(Attachment::from_bytes("report.pdf", b"%PDF-1.4"));
            let composed = compose(&message, &options(), &resolver).unwrap();

            assert!(composed.headers.contains(
                &"Content-Type: application/pdf;\r\n\tname=\"report.pdf\"".to_string()
            ));
            assert!(composed.headers.contains(
                &"Content-Disposition: attachment;\r\n\tfilename=\"report.pdf\";\r\n\tsize=8"
                    .to_string()
            ));
            assert_eq!(decode_base64(&composed.body).unwrap(), b"%PDF-1.4");
        }

        #[test]
        fn test_unknown_extension() {
            let mut message = base_message();
            message.set_text_plain("see attached");
            message.add_attachment(Attachment::from_bytes("data.xyz", b"?"));
            assert!(matches!(
                compose(&message, &options(), &resolver),
                Err(Error::UnknownExtension(ext)) if ext == "xyz"
            ));
        }

        #[test]
        fn test_plain_html_two_attachments_structure() {
            let mut message = base_message();
            message.set_text_plain("Plain version");
            message.set_text_html("<p>HTML version</p>");
            message.add_attachment(Attachment::from_bytes("one.pdf", b"first"));
            message.add_attachment(Attachment::from_bytes("two.txt", b"second"));

            let composed = compose(&message, &options(), &resolver).unwrap();
            let top = composed
                .headers
                .iter()
                .find(|h| h.starts_with("Content-Type: "))
                .unwrap();
            assert!(top.starts_with("Content-Type: multipart/mixed;"));
            let mixed = boundary_of(top);

            let body = &composed.body;
            let alt_at = body.find("Content-Type: multipart/alternative;").unwrap();
            let alternative = boundary_of(&body[alt_at..]);
            let rel_at = body.find("Content-Type: multipart/related;").unwrap();
            let related = boundary_of(&body[rel_at..]);

            assert_ne!(mixed, alternative);
            assert_ne!(alternative, related);
            assert_ne!(mixed, related);

            for boundary in [&mixed, &alternative, &related] {
                assert_eq!(body.matches(&format!("--{boundary}--")).count(), 1);
            }

            // Nesting: related closes inside alternative, which closes inside mixed.
            let rel_close = body.find(&format!("--{related}--")).unwrap();
            let alt_close = body.find(&format!("--{alternative}--")).unwrap();
            let mixed_close = body.find(&format!("--{mixed}--")).unwrap();
            assert!(alt_at < rel_at && rel_at < rel_close);
            assert!(rel_close < alt_close && alt_close < mixed_close);

            // Exactly two attachment parts, both inside mixed after alternative closes.
            let attachments: Vec<usize> = body
                .match_indices("Content-Disposition: attachment;")
                .map(|(i, _)| i)
                .collect();
            assert_eq!(attachments.len(), 2);
            assert!(attachments.iter().all(|&i| i > alt_close && i < mixed_close));
            assert_eq!(
                body[alt_close..mixed_close]
                    .matches(&format!("--{mixed}\r\n"))
                    .count(),
                2
            );

            assert!(body.contains("Content-Type: text/plain; charset=utf-8"));
            assert!(body.contains("Content-Type: text/html; charset=utf-8"));
            assert!(body.ends_with(&format!("--{mixed}--\r\n")));
        }

        #[test]
        fn test_html_with_inline_image_parts() {
            let mut message = base_message();
            let image = InlineImage::new("logo.png", b"\x89PNG", "mail.example.com").unwrap();
            let cid = message.embed_image(image).unwrap();
            message.set_text_html(format!("<img src=\"cid:{cid}\">"));

            let composed = compose(&message, &options(), &resolver).unwrap();
            let body = &composed.body;
            let hash = cid.split('@').next().unwrap();

            assert!(body.contains(&format!("Content-ID: <{cid}>")));
            assert!(body.contains(&format!(
                "Content-Type: image/png; name=\"{hash}.png\""
            )));
            assert!(body.contains(&format!(
                "Content-Disposition: inline; filename=\"{hash}.png\""
            )));
            assert!(body.find("text/html").unwrap() < body.find("Content-ID").unwrap());
        }

        #[test]
        fn test_plain_html_inline_keeps_html() {
            let mut message = base_message();
            message.set_text_plain("plain");
            message.set_text_html("<p>html</p>");
            message
                .embed_image(InlineImage::new("logo.png", b"png", "host").unwrap())
                .unwrap();

            let composed = compose(&message, &options(), &resolver).unwrap();
            assert_eq!(composed.body.matches("text/html").count(), 1);
            assert_eq!(composed.body.matches("Content-ID:").count(), 1);
        }

        #[test]
        fn test_to_message_string() {
            let mut message = base_message();
            message.set_text_plain("hi");
            let composed = compose(&message, &options(), &resolver).unwrap();
            let full = composed.to_message_string();
            let (head, body) = full.split_once("\r\n\r\n").unwrap();
            assert_eq!(head, composed.header_block());
            assert_eq!(body, composed.body);
        }
    }
}
