//! SMTP service extensions advertised in the EHLO reply.

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// EHLO keyword line: keyword plus optional parameters.
#[allow(clippy::expect_used)]
static EHLO_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Z0-9][A-Z0-9-]{1,65})(?: ([\x21-\x7E ]{1,128}))?$").expect("Invalid regex")
});

/// Value attached to an advertised extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtensionValue {
    /// Keyword without a value the client uses.
    Flag,
    /// `SIZE` limit in bytes.
    Size(u64),
    /// `AUTH` mechanism names, upper-cased.
    Auth(Vec<String>),
}

/// Extensions advertised by a server.
///
/// Rebuilt from scratch after every EHLO.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtensionSet {
    entries: BTreeMap<String, ExtensionValue>,
}

impl ExtensionSet {
    /// Parses the text lines of an EHLO reply.
    ///
    /// Lines that do not look like `KEYWORD [params]` are skipped, which
    /// drops the greeting line. `SIZE` keeps its numeric limit and `AUTH`
    /// its mechanism list; any other keyword is a flag. When a keyword is
    /// repeated the first occurrence wins.
    #[must_use]
    pub fn from_reply(lines: &[String]) -> Self {
        let mut entries = BTreeMap::new();

        for line in lines {
            let Some(captures) = EHLO_LINE.captures(line.trim_end()) else {
                continue;
            };
            let keyword = captures[1].to_string();
            if entries.contains_key(&keyword) {
                continue;
            }
            let params = captures.get(2).map_or("", |m| m.as_str()).trim();

            let value = match keyword.as_str() {
                "SIZE" => params
                    .parse()
                    .map_or(ExtensionValue::Flag, ExtensionValue::Size),
                "AUTH" if !params.is_empty() => ExtensionValue::Auth(
                    params
                        .split_whitespace()
                        .map(str::to_ascii_uppercase)
                        .collect(),
                ),
                _ => ExtensionValue::Flag,
            };
            entries.insert(keyword, value);
        }

        Self { entries }
    }

    /// Returns true if the keyword was advertised.
    #[must_use]
    pub fn supports(&self, keyword: &str) -> bool {
        self.entries.contains_key(keyword)
    }

    /// Returns true if STARTTLS was advertised.
    #[must_use]
    pub fn supports_starttls(&self) -> bool {
        self.supports("STARTTLS")
    }

    /// Returns the advertised `SIZE` limit, if any.
    ///
    /// A limit of zero means no fixed limit (RFC 1870).
    #[must_use]
    pub fn size_limit(&self) -> Option<u64> {
        match self.entries.get("SIZE") {
            Some(ExtensionValue::Size(limit)) if *limit > 0 => Some(*limit),
            _ => None,
        }
    }

    /// Returns the advertised AUTH mechanisms.
    #[must_use]
    pub fn auth_mechanisms(&self) -> &[String] {
        match self.entries.get("AUTH") {
            Some(ExtensionValue::Auth(mechanisms)) => mechanisms,
            _ => &[],
        }
    }

    /// Returns the value stored for a keyword.
    #[must_use]
    pub fn get(&self, keyword: &str) -> Option<&ExtensionValue> {
        self.entries.get(keyword)
    }

    /// Returns true if nothing was advertised.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// SASL authentication mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthMechanism {
    /// PLAIN - plaintext authentication
    Plain,
    /// LOGIN - legacy plaintext
    Login,
    /// CRAM-MD5 - challenge-response
    CramMd5,
}

impl AuthMechanism {
    /// Mechanisms in order of preference.
    pub const PRIORITY: [Self; 3] = [Self::Plain, Self::Login, Self::CramMd5];

    /// Parses an authentication mechanism name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "PLAIN" => Some(Self::Plain),
            "LOGIN" => Some(Self::Login),
            "CRAM-MD5" => Some(Self::CramMd5),
            _ => None,
        }
    }

    /// Returns the mechanism name as a string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "PLAIN",
            Self::Login => "LOGIN",
            Self::CramMd5 => "CRAM-MD5",
        }
    }

    /// Picks the first mechanism in [`Self::PRIORITY`] that the server offers.
    #[must_use]
    pub fn select(offered: &[String]) -> Option<Self> {
        Self::PRIORITY.into_iter().find(|mechanism| {
            offered
                .iter()
                .any(|name| name.eq_ignore_ascii_case(mechanism.as_str()))
        })
    }
}

impl std::fmt::Display for AuthMechanism {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
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

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(ToString::to_string).collect()
    }

    mod extension_set_tests {
        use super::*;

        #[test]
        fn parses_typical_ehlo_reply() {
            let set = ExtensionSet::from_reply(&lines(&[
                "mail.example.com Hello client [192.0.2.1]",
                "SIZE 35882577",
                "8BITMIME",
                "AUTH PLAIN LOGIN CRAM-MD5",
                "STARTTLS",
                "ENHANCEDSTATUSCODES",
            ]));
            assert_eq!(set.size_limit(), Some(35_882_577));
            assert_eq!(set.auth_mechanisms(), ["PLAIN", "LOGIN", "CRAM-MD5"]);
            assert!(set.supports_starttls());
            assert!(set.supports("8BITMIME"));
            assert!(set.supports("ENHANCEDSTATUSCODES"));
            assert!(!set.supports("mail.example.com"));
        }

        #[test]
        fn first_occurrence_wins() {
            let set = ExtensionSet::from_reply(&lines(&["SIZE 100", "SIZE 999"]));
            assert_eq!(set.size_limit(), Some(100));
        }

        #[test]
        fn size_without_value_is_flag() {
            let set = ExtensionSet::from_reply(&lines(&["SIZE"]));
            assert!(set.supports("SIZE"));
            assert_eq!(set.size_limit(), None);
            assert_eq!(set.get("SIZE"), Some(&ExtensionValue::Flag));
        }

        #[test]
        fn zero_size_means_unlimited() {
            let set = ExtensionSet::from_reply(&lines(&["SIZE 0"]));
            assert_eq!(set.size_limit(), None);
        }

        #[test]
        fn lowercase_and_malformed_lines_ignored() {
            let set = ExtensionSet::from_reply(&lines(&["starttls", "X", "AUTH=LOGIN"]));
            assert!(set.is_empty());
        }

        #[test]
        fn auth_mechanisms_uppercased() {
            let set = ExtensionSet::from_reply(&lines(&["AUTH login xoauth2"]));
            assert_eq!(set.auth_mechanisms(), ["LOGIN", "XOAUTH2"]);
        }
    }

    mod auth_mechanism_tests {
        use super::*;

        #[test]
        fn parse() {
            assert_eq!(AuthMechanism::parse("plain"), Some(AuthMechanism::Plain));
            assert_eq!(
                AuthMechanism::parse("CRAM-MD5"),
                Some(AuthMechanism::CramMd5)
            );
            assert_eq!(AuthMechanism::parse("XOAUTH2"), None);
        }

        #[test]
        fn select_follows_priority() {
            let offered = lines(&["CRAM-MD5", "LOGIN", "PLAIN"]);
            assert_eq!(AuthMechanism::select(&offered), Some(AuthMechanism::Plain));

            let offered = lines(&["CRAM-MD5", "LOGIN"]);
            assert_eq!(AuthMechanism::select(&offered), Some(AuthMechanism::Login));

            let offered = lines(&["XOAUTH2", "CRAM-MD5"]);
            assert_eq!(
                AuthMechanism::select(&offered),
                Some(AuthMechanism::CramMd5)
            );
        }

        #[test]
        fn select_none_in_common() {
            assert_eq!(AuthMechanism::select(&lines(&["XOAUTH2", "GSSAPI"])), None);
            assert_eq!(AuthMechanism::select(&[]), None);
        }
    }
}
