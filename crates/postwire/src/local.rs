//! Local submission through a sendmail-compatible program.

use crate::error::{Error, Result};
use postwire_mime::{CRLF, compose::Composed};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Hands messages to the host's mail submission program.
///
/// The program is run as `<program> -t -i -f <envelope sender>` with the
/// message on standard input; recipients are taken from its `To` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalSubmission {
    program: PathBuf,
}

impl LocalSubmission {
    /// Creates a submitter running `program`.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Returns the submission program.
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Submits a composed message.
    ///
    /// `To` and `Subject` are prepended to the composed header block.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LocalSubmission`] if the program cannot be started
    /// or exits unsuccessfully.
    pub async fn submit(&self, envelope_from: &str, composed: &Composed) -> Result<()> {
        let message = format!(
            "To: {}{CRLF}Subject: {}{CRLF}{}",
            composed.to,
            composed.subject,
            composed.to_message_string()
        );

        tracing::debug!(
            program = %self.program.display(),
            message_id = %composed.message_id,
            bytes = message.len(),
            "Submitting message locally"
        );

        let mut child = Command::new(&self.program)
            .arg("-t")
            .arg("-i")
            .arg("-f")
            .arg(envelope_from)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::LocalSubmission(format!(
                    "could not run {}: {e}",
                    self.program.display()
                ))
            })?;

        // The exit status takes precedence over a failed write.
        let written = match child.stdin.take() {
            Some(mut stdin) => async {
                stdin.write_all(message.as_bytes()).await?;
                stdin.shutdown().await
            }
            .await,
            None => Ok(()),
        };

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::LocalSubmission(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                stderr.trim()
            )));
        }
        written?;

        tracing::info!(message_id = %composed.message_id, "Message submitted locally");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn composed() -> Composed {
        Composed {
            headers: vec!["Date: x".into(), "MIME-Version: 1.0".into()],
            body: "hello\r\n".into(),
            message_id: "abc@host".into(),
            to: "Bob <bob@example.com>".into(),
            subject: "Hi".into(),
        }
    }

    #[tokio::test]
    async fn test_missing_program() {
        let local = LocalSubmission::new("/nonexistent/sendmail");
        let err = local.submit("a@example.com", &composed()).await.unwrap_err();
        assert!(matches!(err, Error::LocalSubmission(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_program() {
        let local = LocalSubmission::new("/bin/false");
        let err = local.submit("a@example.com", &composed()).await.unwrap_err();
        assert!(err.to_string().contains("exited with"));
    }
}
