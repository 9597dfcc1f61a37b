//! SMTP reply parser.

use crate::error::{Error, Result};
use crate::types::{Reply, ReplyCode};

/// Parses an SMTP reply from response lines.
///
/// SMTP replies can be single-line or multi-line:
/// - Single: `250 OK\r\n`
/// - Multi: `250-First line\r\n250-Second line\r\n250 Last line\r\n`
///
/// The code is taken from the first line. A reply cut short by a timeout
/// (no final line) is accepted as received so far.
///
/// # Errors
///
/// Returns an error if there are no lines or a line does not start with a
/// three-digit code.
pub fn parse_reply(lines: &[String]) -> Result<Reply> {
    let Some(first) = lines.first() else {
        return Err(Error::Protocol("Empty reply".into()));
    };

    let code = reply_code(first)
        .ok_or_else(|| Error::Protocol(format!("Invalid reply line: {first}")))?;

    let mut message = Vec::with_capacity(lines.len());
    for line in lines {
        if reply_code(line).is_none() {
            return Err(Error::Protocol(format!("Malformed reply line: {line}")));
        }
        // Skip code and separator ("250-" or "250 ")
        message.push(line.get(4..).unwrap_or_default().to_string());
    }

    Ok(Reply::new(ReplyCode::new(code), message))
}

/// Extracts the three-digit code at the start of a reply line.
#[must_use]
pub fn reply_code(line: &str) -> Option<u16> {
    let code = line.get(..3)?;
    if !code.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    match line.as_bytes().get(3) {
        None | Some(b' ' | b'-') => code.parse().ok(),
        Some(_) => None,
    }
}

/// Checks if a line is the last line of a multi-line reply.
///
/// Multi-line replies use `-` separator for continuation and ` ` for the last line.
#[must_use]
pub fn is_last_reply_line(line: &str) -> bool {
    (line.len() >= 4 && line.as_bytes()[3] == b' ')
        || (line.len() == 3 && reply_code(line).is_some())
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
    fn test_parse_single_line_reply() {
        let lines = vec!["250 OK".to_string()];
        let reply = parse_reply(&lines).unwrap();
        assert_eq!(reply.code.as_u16(), 250);
        assert_eq!(reply.message, vec!["OK"]);
    }

    #[test]
    fn test_parse_multi_line_reply() {
        let lines = vec![
            "250-mail.example.com".to_string(),
            "250-SIZE 100".to_string(),
            "250 AUTH PLAIN".to_string(),
        ];
        let reply = parse_reply(&lines).unwrap();
        assert_eq!(reply.code, ReplyCode::OK);
        assert_eq!(
            reply.message,
            vec!["mail.example.com", "SIZE 100", "AUTH PLAIN"]
        );
    }

    #[test]
    fn test_parse_bare_code() {
        let reply = parse_reply(&["334".to_string()]).unwrap();
        assert_eq!(reply.code, ReplyCode::AUTH_CONTINUE);
        assert_eq!(reply.message, vec![""]);
    }

    #[test]
    fn test_parse_partial_reply() {
        let lines = vec!["250-first".to_string(), "250-second".to_string()];
        let reply = parse_reply(&lines).unwrap();
        assert_eq!(reply.message.len(), 2);
    }

    #[test]
    fn test_is_last_reply_line() {
        assert!(is_last_reply_line("250 OK"));
        assert!(is_last_reply_line("221"));
        assert!(!is_last_reply_line("250-Continuing"));
        assert!(!is_last_reply_line("25"));
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_reply(&[]).is_err());
        assert!(parse_reply(&["25".to_string()]).is_err());
        assert!(parse_reply(&["ABC OK".to_string()]).is_err());
        assert!(parse_reply(&["2500 OK".to_string()]).is_err());
        assert!(parse_reply(&["250-ok".to_string(), "garbage".to_string()]).is_err());
    }
}
