//! Multipart boundary generation.

use crate::compose::MultipartKind;
use crate::message::random_hex;
use std::collections::HashMap;

/// Hex characters of the per-message session token.
const SESSION_TOKEN_LEN: usize = 40;

/// Hex characters of the per-kind prefix.
const KIND_TOKEN_LEN: usize = 8;

/// Boundary tokens for one message, one per multipart kind.
///
/// Every token has the form `__<8 hex>:<40 hex>__`. The 40-character part is
/// shared by all tokens of the message; the 8-character part differs per
/// kind. Tokens are generated on first use.
#[derive(Debug, Default)]
pub struct BoundaryRegistry {
    session: Option<String>,
    tokens: HashMap<MultipartKind, String>,
}

impl BoundaryRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the boundary for `kind`, generating it if needed.
    pub fn get(&mut self, kind: MultipartKind) -> &str {
        let session = self
            .session
            .get_or_insert_with(|| random_hex(SESSION_TOKEN_LEN).to_uppercase())
            .clone();

        if !self.tokens.contains_key(&kind) {
            let token = loop {
                let candidate = format!(
                    "__{}:{session}__",
                    random_hex(KIND_TOKEN_LEN).to_uppercase()
                );
                if !self.tokens.values().any(|existing| *existing == candidate) {
                    break candidate;
                }
            };
            tracing::trace!(kind = %kind, boundary = %token, "Generated boundary");
            self.tokens.insert(kind, token);
        }

        self.tokens.get(&kind).map_or("", String::as_str)
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
    fn test_boundary_format() {
        let mut registry = BoundaryRegistry::new();
        let token = registry.get(MultipartKind::Mixed).to_string();
        assert!(token.starts_with("__") && token.ends_with("__"));
        let inner = &token[2..token.len() - 2];
        let (kind, session) = inner.split_once(':').unwrap();
        assert_eq!(kind.len(), 8);
        assert_eq!(session.len(), 40);
        assert!(
            inner
                .chars()
                .all(|c| c == ':' || matches!(c, '0'..='9' | 'A'..='F'))
        );
    }

    #[test]
    fn test_stable_per_kind() {
        let mut registry = BoundaryRegistry::new();
        let first = registry.get(MultipartKind::Related).to_string();
        assert_eq!(registry.get(MultipartKind::Related), first);
    }

    #[test]
    fn test_distinct_kinds_share_session() {
        let mut registry = BoundaryRegistry::new();
        let mixed = registry.get(MultipartKind::Mixed).to_string();
        let alternative = registry.get(MultipartKind::Alternative).to_string();
        let related = registry.get(MultipartKind::Related).to_string();

        assert_ne!(mixed, alternative);
        assert_ne!(alternative, related);
        assert_ne!(mixed, related);
        assert_eq!(mixed[11..], alternative[11..]);
        assert_eq!(alternative[11..], related[11..]);
    }

    #[test]
    fn test_fresh_registry_fresh_session() {
        let mut first = BoundaryRegistry::new();
        let mut second = BoundaryRegistry::new();
        assert_ne!(
            first.get(MultipartKind::Mixed),
            second.get(MultipartKind::Mixed)
        );
    }
}
