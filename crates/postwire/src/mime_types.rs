//! File extension to MIME type lookup.

/// Returns the MIME type registered for a file extension.
///
/// Backed by the `mime_guess` table. Any `Fn(&str) -> Option<String>`
/// can stand in for this function through
/// [`Mailer::with_mime_types`](crate::Mailer::with_mime_types).
#[must_use]
pub fn resolve_mime_type(extension: &str) -> Option<String> {
    mime_guess::from_ext(extension).first_raw().map(str::to_string)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_known_extensions() {
        assert_eq!(resolve_mime_type("pdf").as_deref(), Some("application/pdf"));
        assert_eq!(resolve_mime_type("png").as_deref(), Some("image/png"));
        assert_eq!(resolve_mime_type("txt").as_deref(), Some("text/plain"));
    }

    #[test]
    fn test_unknown_extension() {
        assert_eq!(resolve_mime_type("nosuchext"), None);
        assert_eq!(resolve_mime_type(""), None);
    }
}
