//! Content transfer encodings.
//!
//! Base64 and Quoted-Printable body encoding (RFC 2045) plus the single-word
//! RFC 2047 helpers used by the header codec.

use crate::error::{Error, Result};
use crate::{CHARSET, CRLF, WRAP_LEN};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::fmt;
use std::fmt::Write as _;

/// Transfer encoding applied to text bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferEncoding {
    /// Base64 encoding, wrapped at 76 characters.
    #[default]
    Base64,
    /// Quoted-Printable encoding.
    QuotedPrintable,
}

impl TransferEncoding {
    /// Parses a transfer encoding name, as used in configuration.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "base64" => Some(Self::Base64),
            "quoted-printable" => Some(Self::QuotedPrintable),
            _ => None,
        }
    }

    /// Returns the `Content-Transfer-Encoding` token.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Base64 => "base64",
            Self::QuotedPrintable => "quoted-printable",
        }
    }
}

impl fmt::Display for TransferEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Encodes data as Base64.
#[must_use]
pub fn encode_base64(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Decodes Base64 data, ignoring embedded line breaks and whitespace.
///
/// # Errors
///
/// Returns an error if the input is not valid Base64.
pub fn decode_base64(data: &str) -> Result<Vec<u8>> {
    let cleaned: String = data.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD.decode(cleaned).map_err(Into::into)
}

/// Encodes data as Base64 split into CRLF-terminated lines of at most
/// [`WRAP_LEN`] characters.
#[must_use]
pub fn wrap_base64(data: &[u8]) -> String {
    wrap_encoded(&encode_base64(data))
}

/// Splits already encoded ASCII text into CRLF-terminated lines of at most
/// [`WRAP_LEN`] characters.
#[must_use]
pub fn wrap_encoded(encoded: &str) -> String {
    let mut result = String::with_capacity(encoded.len() + (encoded.len() / WRAP_LEN + 1) * 2);

    // Encoded text is ASCII, so byte offsets are char boundaries.
    let mut start = 0;
    while start < encoded.len() {
        let end = (start + WRAP_LEN).min(encoded.len());
        result.push_str(&encoded[start..end]);
        result.push_str(CRLF);
        start = end;
    }

    result
}

/// Encodes text using Quoted-Printable encoding (RFC 2045).
///
/// CRLF pairs are kept as hard line breaks; every other byte that is not
/// printable ASCII is escaped, as is whitespace at the end of a line.
/// Encoded lines never exceed 76 characters including the soft break.
#[must_use]
pub fn encode_quoted_printable(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut result = String::with_capacity(bytes.len() + bytes.len() / 2);
    let mut line_length = 0;
    let mut i = 0;

    while i < bytes.len() {
        let byte = bytes[i];

        if byte == b'\r' && bytes.get(i + 1) == Some(&b'\n') {
            result.push_str(CRLF);
            line_length = 0;
            i += 2;
            continue;
        }

        let at_line_end = match bytes.get(i + 1) {
            None => true,
            Some(b'\r') => bytes.get(i + 2) == Some(&b'\n'),
            Some(_) => false,
        };

        let literal = match byte {
            b'!'..=b'<' | b'>'..=b'~' => true,
            b' ' | b'\t' => !at_line_end,
            _ => false,
        };
        let width = if literal { 1 } else { 3 };

        // Leave room for the trailing '=' of a soft line break.
        if line_length + width > WRAP_LEN - 1 {
            result.push('=');
            result.push_str(CRLF);
            line_length = 0;
        }

        if literal {
            result.push(char::from(byte));
        } else {
            let _ = write!(result, "={byte:02X}");
        }
        line_length += width;
        i += 1;
    }

    result
}

/// Decodes Quoted-Printable text (RFC 2045).
///
/// # Errors
///
/// Returns an error if the input contains invalid escape sequences or the
/// decoded bytes are not UTF-8.
pub fn decode_quoted_printable(text: &str) -> Result<String> {
    let mut result = Vec::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '=' {
            // Soft line break
            if chars.peek() == Some(&'\r') {
                chars.next();
                if chars.peek() == Some(&'\n') {
                    chars.next();
                    continue;
                }
                return Err(Error::InvalidEncoding("Bare CR after '='".to_string()));
            } else if chars.peek() == Some(&'\n') {
                chars.next();
                continue;
            }

            let hex: String = chars.by_ref().take(2).collect();
            if hex.len() == 2 {
                let byte = u8::from_str_radix(&hex, 16)
                    .map_err(|e| Error::InvalidEncoding(format!("Invalid hex: {e}")))?;
                result.push(byte);
            } else {
                return Err(Error::InvalidEncoding(
                    "Incomplete escape sequence".to_string(),
                ));
            }
        } else {
            let mut buf = [0u8; 4];
            result.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
        }
    }

    String::from_utf8(result).map_err(Into::into)
}

/// Encodes a text body with the chosen transfer encoding.
///
/// Quoted-Printable output is terminated with a line break; Base64 output is
/// wrapped at 76 characters with every line CRLF-terminated.
#[must_use]
pub fn encode_body(text: &str, encoding: TransferEncoding) -> String {
    match encoding {
        TransferEncoding::QuotedPrintable => {
            let mut encoded = encode_quoted_printable(text);
            encoded.push_str(CRLF);
            encoded
        }
        TransferEncoding::Base64 => wrap_base64(text.as_bytes()),
    }
}

/// Encodes a header value using RFC 2047 encoding if needed.
///
/// Format: `=?charset?B?encoded-text?=`. Values that are plain ASCII and
/// contain no encoded-word delimiters are returned unchanged.
#[must_use]
pub fn encode_rfc2047(text: &str) -> String {
    if text.chars().all(|c| c.is_ascii() && c != '=' && c != '?') {
        return text.to_string();
    }
    encoded_word(text)
}

/// Wraps text as a single Base64 encoded-word, unconditionally.
#[must_use]
pub fn encoded_word(text: &str) -> String {
    format!("=?{CHARSET}?B?{}?=", encode_base64(text.as_bytes()))
}

/// Decodes a single RFC 2047 encoded-word.
///
/// Text that is not an encoded-word is returned unchanged.
///
/// # Errors
///
/// Returns an error if the word is malformed or uses an unknown encoding.
pub fn decode_rfc2047(text: &str) -> Result<String> {
    if !text.starts_with("=?") || !text.ends_with("?=") || text.len() < 4 {
        return Ok(text.to_string());
    }

    let inner = &text[2..text.len() - 2];
    let parts: Vec<&str> = inner.split('?').collect();

    if parts.len() != 3 {
        return Err(Error::InvalidEncoding(
            "Invalid RFC 2047 format".to_string(),
        ));
    }

    let encoding = parts[1].to_uppercase();
    let encoded_text = parts[2];

    match encoding.as_str() {
        "B" => {
            let decoded = decode_base64(encoded_text)?;
            String::from_utf8(decoded).map_err(Into::into)
        }
        "Q" => {
            let text_with_spaces = encoded_text.replace('_', " ");
            decode_quoted_printable(&text_with_spaces)
        }
        _ => Err(Error::InvalidEncoding(format!(
            "Unknown encoding: {encoding}"
        ))),
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
    use proptest::prelude::*;

    #[test]
    fn test_base64_encode_decode() {
        let data = b"Hello, World!";
        let encoded = encode_base64(data);
        assert_eq!(encoded, "SGVsbG8sIFdvcmxkIQ==");

        let decoded = decode_base64(&encoded).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn test_wrap_base64_line_length() {
        let data = vec![0xABu8; 500];
        let wrapped = wrap_base64(&data);
        assert!(wrapped.ends_with("\r\n"));
        for line in wrapped.split("\r\n").filter(|l| !l.is_empty()) {
            assert!(line.len() <= 76);
        }
        assert_eq!(decode_base64(&wrapped).unwrap(), data);
    }

    #[test]
    fn test_wrap_encoded_exact_multiple() {
        let encoded = "A".repeat(WRAP_LEN * 2);
        let wrapped = wrap_encoded(&encoded);
        assert_eq!(wrapped.matches(CRLF).count(), 2);
        assert!(wrapped.ends_with(&format!("{}{CRLF}", "A".repeat(WRAP_LEN))));
        assert_eq!(wrap_encoded("QUJD"), "QUJD\r\n");
    }

    #[test]
    fn test_wrap_base64_empty() {
        assert_eq!(wrap_base64(b""), "");
    }

    #[test]
    fn test_quoted_printable_encode() {
        let text = "Hello, World!";
        let encoded = encode_quoted_printable(text);
        assert_eq!(encoded, "Hello, World!");

        let text = "Héllo, Wørld!";
        let encoded = encode_quoted_printable(text);
        assert!(encoded.contains("=C3"));
    }

    #[test]
    fn test_quoted_printable_trailing_space_encoded() {
        assert_eq!(encode_quoted_printable("end "), "end=20");
        assert_eq!(encode_quoted_printable("a \r\nb"), "a=20\r\nb");
    }

    #[test]
    fn test_quoted_printable_soft_breaks_respect_width() {
        let text = "x".repeat(200);
        let encoded = encode_quoted_printable(&text);
        for line in encoded.split("\r\n") {
            assert!(line.len() <= 76, "line too long: {}", line.len());
        }
        assert_eq!(decode_quoted_printable(&encoded).unwrap(), text);
    }

    #[test]
    fn test_quoted_printable_decode() {
        let decoded = decode_quoted_printable("H=C3=A9llo").unwrap();
        assert_eq!(decoded, "Héllo");
    }

    #[test]
    fn test_quoted_printable_soft_line_break() {
        let encoded = "Hello=\r\nWorld";
        let decoded = decode_quoted_printable(encoded).unwrap();
        assert_eq!(decoded, "HelloWorld");
    }

    #[test]
    fn test_quoted_printable_incomplete_escape() {
        assert!(decode_quoted_printable("abc=4").is_err());
    }

    #[test]
    fn test_encode_body_variants() {
        let qp = encode_body("hi", TransferEncoding::QuotedPrintable);
        assert_eq!(qp, "hi\r\n");

        let b64 = encode_body("hi", TransferEncoding::Base64);
        assert_eq!(b64, "aGk=\r\n");
    }

    #[test]
    fn test_transfer_encoding_parse() {
        assert_eq!(TransferEncoding::parse("base64"), Some(TransferEncoding::Base64));
        assert_eq!(
            TransferEncoding::parse("Quoted-Printable"),
            Some(TransferEncoding::QuotedPrintable)
        );
        assert_eq!(TransferEncoding::parse("8bit"), None);
        assert_eq!(TransferEncoding::QuotedPrintable.to_string(), "quoted-printable");
    }

    #[test]
    fn test_rfc2047_encode() {
        assert_eq!(encode_rfc2047("Hello"), "Hello");

        let encoded = encode_rfc2047("Héllo");
        assert!(encoded.starts_with("=?utf-8?B?"));
        assert!(encoded.ends_with("?="));
    }

    #[test]
    fn test_rfc2047_decode() {
        assert_eq!(decode_rfc2047("Hello").unwrap(), "Hello");
        assert_eq!(decode_rfc2047("=?utf-8?B?SMOpbGxv?=").unwrap(), "Héllo");
        assert_eq!(decode_rfc2047("=?utf-8?Q?H=C3=A9llo_you?=").unwrap(), "Héllo you");
    }

    proptest! {
        #[test]
        fn base64_round_trip(data in proptest::collection::vec(any::<u8>(), 0..2048)) {
            let wrapped = wrap_base64(&data);
            prop_assert_eq!(decode_base64(&wrapped).unwrap(), data);
        }

        #[test]
        fn quoted_printable_round_trip(text in "\\PC*(\r\n\\PC*){0,4}") {
            let encoded = encode_quoted_printable(&text);
            prop_assert!(encoded.is_ascii());
            prop_assert_eq!(decode_quoted_printable(&encoded).unwrap(), text);
        }

        #[test]
        fn quoted_printable_lines_bounded(text in "[ -~\t\u{e9}\u{4e16}]{0,400}") {
            let encoded = encode_quoted_printable(&text);
            for line in encoded.split("\r\n") {
                prop_assert!(line.len() <= 76);
            }
        }
    }
}
