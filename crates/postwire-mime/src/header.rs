//! Header field encoding.
//!
//! Produces RFC 5322 header lines with RFC 2047 encoded-words for non-ASCII
//! text. Long lines are folded at whitespace without tearing an
//! encoded-word apart.

use crate::encoding::{decode_rfc2047, encoded_word};
use crate::error::{Error, Result};
use crate::{CRLF, LINE_LEN_MAX, WRAP_LEN};
use regex::Regex;
use std::sync::LazyLock;

/// Maximum number of characters carried by one encoded-word.
///
/// Seven 4-byte characters encode to 40 Base64 characters, which keeps a
/// complete encoded-word comfortably inside the folding width.
pub const MB_LEN_MAX: usize = 7;

/// Characters that force a display name into a quoted string.
const DISPLAY_NAME_SPECIALS: &[char] = &[',', ';', ':', '(', ')', '[', ']', '.', '\\', '<', '>', '@', '"'];

#[allow(clippy::expect_used)]
static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("Invalid regex"));

/// CR, LF, TAB and backspace, raw or percent-encoded.
#[allow(clippy::expect_used)]
static INJECTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:\n|\r|\t|%0A|%0D|%08|%09)+").expect("Invalid regex")
});

/// Replaces every run of whitespace with a single space.
#[must_use]
pub fn collapse_whitespace(text: &str) -> String {
    WHITESPACE_RUN.replace_all(text, " ").into_owned()
}

/// Removes CR, LF, TAB and their URL-encoded forms from header input.
#[must_use]
pub fn sanitize_header_text(text: &str) -> String {
    INJECTION.replace_all(text, "").into_owned()
}

/// Keeps only the characters permitted in an email address.
#[must_use]
pub fn sanitize_email(email: &str) -> String {
    email
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || "!#$%&'*+-=?^_`{|}~@.[]".contains(*c))
        .collect()
}

/// Returns true if the text contains anything beyond single-byte ASCII.
#[must_use]
fn is_multibyte(text: &str) -> bool {
    text.chars().count() < text.len()
}

/// Encodes free text for use in a header value.
///
/// Whitespace is collapsed first. Pure ASCII text is returned as is.
/// Otherwise the text is split at spaces into words; consecutive words that
/// contain non-ASCII characters form a run that is emitted as encoded-words
/// of at most [`MB_LEN_MAX`] characters each, joined by single spaces.
/// ASCII words are emitted verbatim.
#[must_use]
pub fn encode_string(text: &str) -> String {
    let text = collapse_whitespace(text);
    if !is_multibyte(&text) {
        return text;
    }

    let words: Vec<&str> = text.split(' ').collect();
    let mut groups: Vec<String> = Vec::new();
    let mut i = 0;

    while i < words.len() {
        if is_multibyte(words[i]) {
            let mut j = i + 1;
            while j < words.len() && is_multibyte(words[j]) {
                j += 1;
            }
            let run = words[i..j].join(" ");
            let encoded: Vec<String> = break_to_segments(&run)
                .iter()
                .map(|segment| encoded_word(segment))
                .collect();
            groups.push(encoded.join(" "));
            i = j;
        } else {
            groups.push(words[i].to_string());
            i += 1;
        }
    }

    groups.join(" ")
}

/// Splits text into chunks of at most [`MB_LEN_MAX`] characters.
fn break_to_segments(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(MB_LEN_MAX)
        .map(|chunk| chunk.iter().collect())
        .collect()
}

/// Folds a header line per RFC 5322.
///
/// ASCII lines of at most 76 characters are returned unchanged. Longer lines
/// are wrapped at spaces to 75 characters; a wrapped piece that is still too
/// long is split after each `?=` so that encoded-words stay whole. Pieces are
/// joined with CRLF followed by a single space.
///
/// # Errors
///
/// Returns [`Error::HeaderTooLong`] if any physical line would exceed
/// 998 octets.
pub fn fold_line(line: &str) -> Result<String> {
    if line.is_ascii() && line.len() <= WRAP_LEN {
        return Ok(line.to_string());
    }

    let mut pieces: Vec<&str> = Vec::new();
    for chunk in word_wrap(line, WRAP_LEN - 1) {
        if chunk.len() > WRAP_LEN - 1 && chunk.contains("?=") {
            pieces.extend(chunk.split_inclusive("?=").filter(|p| !p.is_empty()));
        } else {
            pieces.push(chunk);
        }
    }

    // Continuation lines carry one leading space.
    if let Some(length) = pieces
        .iter()
        .enumerate()
        .map(|(n, piece)| if n == 0 { piece.len() } else { piece.len() + 1 })
        .find(|&length| length > LINE_LEN_MAX)
    {
        return Err(Error::HeaderTooLong {
            length,
            limit: LINE_LEN_MAX,
        });
    }

    Ok(pieces.join(&format!("{CRLF} ")))
}

/// Greedy word wrap at single spaces. Words longer than `width` are kept
/// intact on a line of their own.
fn word_wrap(text: &str, width: usize) -> Vec<&str> {
    let mut lines = Vec::new();
    let mut line_start = 0;
    let mut line_end: Option<usize> = None;
    let mut offset = 0;

    for word in text.split(' ') {
        let word_end = offset + word.len();
        if let Some(end) = line_end
            && word_end - line_start > width
        {
            lines.push(&text[line_start..end]);
            line_start = offset;
        }
        line_end = Some(word_end);
        offset = word_end + 1;
    }

    lines.push(&text[line_start..]);
    lines
}

/// Builds a complete header line, e.g. `Subject: =?utf-8?B?...?=`.
///
/// # Errors
///
/// Returns an error if folding is requested and the line exceeds the hard
/// length limit.
pub fn encode_header(name: &str, value: &str, fold: bool) -> Result<String> {
    let line = format!("{name}: {}", encode_string(value));
    if fold { fold_line(&line) } else { Ok(line) }
}

/// Builds an address header such as `To: Display Name <user@example.com>`.
///
/// ASCII display names containing RFC 5322 specials are quoted; non-ASCII
/// names become encoded-words. An empty name yields a bare angle address.
///
/// # Errors
///
/// Returns an error if the folded line exceeds the hard length limit.
pub fn encode_name_header(name: &str, display_name: &str, email: &str) -> Result<String> {
    let display_name = collapse_whitespace(display_name.trim());
    if display_name.is_empty() {
        return fold_line(&format!("{name}: <{email}>"));
    }

    let phrase = if is_multibyte(&display_name) {
        encode_string(&display_name)
    } else {
        format_display_name(&display_name, "")
    };
    fold_line(&format!("{name}: {phrase} <{email}>"))
}

/// Formats a display name, quoting it if it contains RFC 5322 specials.
///
/// A non-empty comment is appended in parentheses after the name.
#[must_use]
pub fn format_display_name(name: &str, comment: &str) -> String {
    let formatted = if name.contains(DISPLAY_NAME_SPECIALS) {
        let escaped = name.replace('\\', "\\\\").replace('"', "\\\"");
        format!("\"{escaped}\"")
    } else {
        name.to_string()
    };

    if comment.is_empty() {
        formatted
    } else {
        format!("{formatted} ({comment})")
    }
}

/// Decodes a header value containing encoded-words.
///
/// Whitespace between two adjacent encoded-words is dropped, as RFC 2047
/// requires; all other text is kept verbatim.
///
/// # Errors
///
/// Returns an error if an encoded-word cannot be decoded.
pub fn decode_header_value(value: &str) -> Result<String> {
    let unfolded = value.replace(&format!("{CRLF} "), " ");
    let mut result = String::with_capacity(unfolded.len());
    let mut pending_space = String::new();
    let mut previous_was_encoded = false;

    for token in split_keep_spaces(&unfolded) {
        if token.chars().all(|c| c == ' ') {
            pending_space.push_str(token);
            continue;
        }
        let is_encoded = token.starts_with("=?") && token.ends_with("?=");
        if !(is_encoded && previous_was_encoded) {
            result.push_str(&pending_space);
        }
        pending_space.clear();
        if is_encoded {
            result.push_str(&decode_rfc2047(token)?);
        } else {
            result.push_str(token);
        }
        previous_was_encoded = is_encoded;
    }
    result.push_str(&pending_space);

    Ok(result)
}

/// Splits text into alternating runs of spaces and non-spaces.
fn split_keep_spaces(text: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut start = 0;
    let mut in_space: Option<bool> = None;

    for (idx, ch) in text.char_indices() {
        let is_space = ch == ' ';
        if in_space.is_some_and(|s| s != is_space) {
            tokens.push(&text[start..idx]);
            start = idx;
        }
        in_space = Some(is_space);
    }
    if start < text.len() {
        tokens.push(&text[start..]);
    }
    tokens
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
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("a \t\r\n b"), "a b");
        assert_eq!(collapse_whitespace("  lead"), " lead");
    }

    #[test]
    fn test_sanitize_header_text() {
        assert_eq!(sanitize_header_text("Hello\r\nBcc: x"), "HelloBcc: x");
        assert_eq!(sanitize_header_text("a%0d%0Ab%09c"), "abc");
    }

    #[test]
    fn test_sanitize_email() {
        assert_eq!(sanitize_email("us er(@)exa\nmple.com"), "user@example.com");
        assert_eq!(sanitize_email("a+tag@[127.0.0.1]"), "a+tag@[127.0.0.1]");
    }

    #[test]
    fn test_ascii_header_unchanged() {
        let line = encode_header("Subject", "Quarterly   report\tready", true).unwrap();
        assert_eq!(line, "Subject: Quarterly report ready");
        assert!(!line.contains("=?utf-8?B?"));
    }

    #[test]
    fn test_non_ascii_word_is_encoded() {
        let encoded = encode_string("Hello Мир");
        assert!(encoded.starts_with("Hello =?utf-8?B?"));
        assert_eq!(decode_header_value(&encoded).unwrap(), "Hello Мир");
    }

    #[test]
    fn test_encoded_words_are_space_delimited() {
        let encoded = encode_string("Привет мир and more");
        for token in encoded.split(' ') {
            if token.contains("=?") {
                assert!(token.starts_with("=?") && token.ends_with("?="));
            }
        }
        assert!(encoded.ends_with(" and more"));
    }

    #[test]
    fn test_segments_capped_at_seven_chars() {
        let encoded = encode_string("ééééééééééééééé");
        let words: Vec<&str> = encoded.split(' ').collect();
        assert_eq!(words.len(), 3);
        for word in words {
            let decoded = decode_rfc2047(word).unwrap();
            assert!(decoded.chars().count() <= MB_LEN_MAX);
        }
    }

    #[test]
    fn test_fold_long_ascii_header() {
        let value = "word ".repeat(40);
        let folded = encode_header("Subject", &value, true).unwrap();
        for line in folded.split("\r\n") {
            assert!(line.len() <= 76);
        }
        let unfolded = folded.replace("\r\n ", " ");
        assert_eq!(unfolded, format!("Subject: {}", collapse_whitespace(&value)));
    }

    #[test]
    fn test_fold_does_not_tear_encoded_words() {
        let folded = encode_header("Subject", &"Ärger über Öl ".repeat(10), true).unwrap();
        for line in folded.split("\r\n") {
            assert!(line.len() <= 76, "{line}");
            for token in line.split(' ').filter(|t| t.contains("=?")) {
                assert!(token.ends_with("?="), "torn word {token}");
            }
        }
    }

    #[test]
    fn test_fold_too_long_fails() {
        let line = format!("X-Long: {}", "a".repeat(1200));
        assert!(matches!(
            fold_line(&line),
            Err(Error::HeaderTooLong { limit: 998, .. })
        ));
    }

    #[test]
    fn test_fold_long_unbreakable_word_within_limit() {
        let line = format!("X-Token: {}", "b".repeat(300));
        let folded = fold_line(&line).unwrap();
        assert_eq!(folded, format!("X-Token:\r\n {}", "b".repeat(300)));
    }

    #[test]
    fn test_format_display_name() {
        assert_eq!(format_display_name("John Doe", ""), "John Doe");
        assert_eq!(format_display_name("Doe, John", ""), "\"Doe, John\"");
        assert_eq!(
            format_display_name("Say \"hi\".", "team"),
            "\"Say \\\"hi\\\".\" (team)"
        );
        assert_eq!(format_display_name("Support", "Acme"), "Support (Acme)");
    }

    #[test]
    fn test_encode_name_header() {
        assert_eq!(
            encode_name_header("To", "Jane Roe", "jane@example.com").unwrap(),
            "To: Jane Roe <jane@example.com>"
        );
        assert_eq!(
            encode_name_header("From", "Roe, Jane", "jane@example.com").unwrap(),
            "From: \"Roe, Jane\" <jane@example.com>"
        );
        assert_eq!(
            encode_name_header("To", "", "jane@example.com").unwrap(),
            "To: <jane@example.com>"
        );
        let encoded = encode_name_header("To", "Jürgen", "j@example.com").unwrap();
        assert!(encoded.starts_with("To: =?utf-8?B?"));
        assert!(encoded.ends_with(" <j@example.com>"));
    }

    #[test]
    fn test_word_wrap_basic() {
        assert_eq!(word_wrap("aa bb cc", 5), vec!["aa bb", "cc"]);
        assert_eq!(word_wrap("aaaaaaa bb", 5), vec!["aaaaaaa", "bb"]);
        assert_eq!(word_wrap("short", 5), vec!["short"]);
    }

    proptest! {
        #[test]
        fn ascii_only_passes_through(text in "[ -~]{0,60}") {
            let encoded = encode_string(&text);
            prop_assert!(!encoded.contains("=?utf-8?B?"));
            prop_assert_eq!(encoded, collapse_whitespace(&text));
        }

        #[test]
        fn mixed_text_reconstructs(text in "[a-zA-Z0-9 ,.\u{e9}\u{fc}\u{416}\u{436}\u{4e16}\u{754c}]{0,80}") {
            let encoded = encode_string(&text);
            prop_assert_eq!(decode_header_value(&encoded).unwrap(), collapse_whitespace(&text));
        }

        #[test]
        fn folded_lines_bounded(text in "[a-z\u{e9}\u{4e16}]{1,20}( [a-z\u{e9}\u{4e16}]{1,20}){0,15}") {
            let folded = encode_header("Subject", &text, true).unwrap();
            for line in folded.split("\r\n") {
                prop_assert!(line.len() <= 76, "line {:?}", line);
            }
        }
    }
}
