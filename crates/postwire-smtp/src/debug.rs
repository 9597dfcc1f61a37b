//! Protocol transcript for troubleshooting.
//!
//! Every event is emitted through `tracing` at debug level. When the
//! transcript is enabled it is additionally written to the configured sink:
//! `tracing` at info level, or an append-only file with one
//! `[YYYY-MM-DD HH:MM:SS] message` line per event.
//!
//! File writes are synchronous so lines stay in protocol order. On a
//! multi-threaded tokio runtime they run inside
//! [`tokio::task::block_in_place`]; on a current-thread runtime they block
//! the runtime thread for the duration of the write.

use chrono::{DateTime, Utc};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::runtime::RuntimeFlavor;

/// Longest message written to a log file before truncation.
pub const MAX_LOG_MESSAGE_LEN: usize = 1000;

/// Where enabled transcript lines go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebugSink {
    /// In-process output via `tracing::info!`.
    Tracing,
    /// Append to `directory/file_name` under an exclusive lock.
    File {
        /// Directory holding the log file.
        directory: PathBuf,
        /// Log file name.
        file_name: String,
    },
}

#[derive(Debug)]
struct Inner {
    enabled: AtomicBool,
    sink: DebugSink,
    time_offset: chrono::Duration,
}

/// Shared handle to the protocol transcript.
///
/// Clones write to the same sink and share the enabled flag.
#[derive(Debug, Clone)]
pub struct DebugLog {
    inner: Arc<Inner>,
}

impl Default for DebugLog {
    fn default() -> Self {
        Self::new(DebugSink::Tracing)
    }
}

impl DebugLog {
    /// Creates a disabled transcript writing to `sink` once enabled.
    #[must_use]
    pub fn new(sink: DebugSink) -> Self {
        Self::with_time_offset(sink, chrono::Duration::zero())
    }

    /// Creates a disabled transcript whose file timestamps are UTC shifted
    /// by `time_offset`.
    #[must_use]
    pub fn with_time_offset(sink: DebugSink, time_offset: chrono::Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                enabled: AtomicBool::new(false),
                sink,
                time_offset,
            }),
        }
    }

    /// Turns the transcript on.
    pub fn enable(&self) {
        self.inner.enabled.store(true, Ordering::Relaxed);
    }

    /// Returns true if the transcript is on.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::Relaxed)
    }

    /// Returns the configured sink.
    #[must_use]
    pub fn sink(&self) -> &DebugSink {
        &self.inner.sink
    }

    /// Records one event.
    pub fn log(&self, message: &str) {
        tracing::debug!(target: "postwire_smtp::transcript", "{}", message.trim());

        if !self.is_enabled() {
            return;
        }

        match &self.inner.sink {
            DebugSink::Tracing => {
                tracing::info!(target: "postwire_smtp::transcript", "{}", message.trim());
            }
            DebugSink::File {
                directory,
                file_name,
            } => {
                let line = self.format_line(message, Utc::now());
                let path = directory.join(file_name);
                if let Err(e) = off_runtime(|| append_locked(&path, &line)) {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to write debug log");
                }
            }
        }
    }

    /// Formats a log file line for `message` at time `now`.
    #[must_use]
    pub fn format_line(&self, message: &str, now: DateTime<Utc>) -> String {
        let stamp = (now + self.inner.time_offset).format("%Y-%m-%d %H:%M:%S");
        format!("[{stamp}] {}\n", truncate_message(message.trim()))
    }
}

/// Cuts a message at [`MAX_LOG_MESSAGE_LEN`] bytes, on a char boundary.
fn truncate_message(message: &str) -> String {
    if message.len() <= MAX_LOG_MESSAGE_LEN {
        return message.to_string();
    }
    let mut end = MAX_LOG_MESSAGE_LEN;
    while !message.is_char_boundary(end) {
        end -= 1;
    }
    format!("{} ... [truncated]", &message[..end])
}

/// Runs a blocking closure, letting a multi-threaded runtime move its other
/// tasks off this worker first.
fn off_runtime<R>(f: impl FnOnce() -> R) -> R {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(f)
        }
        _ => f(),
    }
}

fn append_locked(path: &std::path::Path, line: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.lock()?;
    let result = file.write_all(line.as_bytes());
    file.unlock()?;
    result
}

/// Formats an elapsed time as `sec`, `msec` or `μsec` with two decimals.
#[must_use]
pub fn format_elapsed(elapsed: Duration) -> String {
    let seconds = elapsed.as_secs_f64();
    if seconds >= 1.0 {
        return format!("{seconds:.2} sec");
    }
    let millis = seconds * 1000.0;
    if millis >= 1.0 {
        return format!("{millis:.2} msec");
    }
    format!("{:.2} μsec", millis * 1000.0)
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
    use chrono::TimeZone;

    #[test]
    fn test_format_line() {
        let log = DebugLog::new(DebugSink::Tracing);
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(
            log.format_line("  >>> EHLO host\r\n", now),
            "[2024-03-09 07:05:01] >>> EHLO host\n"
        );
    }

    #[test]
    fn test_time_offset() {
        let log = DebugLog::with_time_offset(DebugSink::Tracing, chrono::Duration::hours(2));
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 23, 30, 0).unwrap();
        assert!(log.format_line("x", now).starts_with("[2024-03-10 01:30:00]"));
    }

    #[test]
    fn test_truncation() {
        let long = "a".repeat(1500);
        let truncated = truncate_message(&long);
        assert_eq!(truncated.len(), 1000 + " ... [truncated]".len());
        assert!(truncated.ends_with(" ... [truncated]"));
        assert_eq!(truncate_message("short"), "short");

        let wide = "é".repeat(600);
        assert!(truncate_message(&wide).ends_with(" ... [truncated]"));
    }

    #[test]
    fn test_file_sink_only_when_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let log = DebugLog::new(DebugSink::File {
            directory: dir.path().to_path_buf(),
            file_name: "smtp.log".to_string(),
        });
        let path = dir.path().join("smtp.log");

        log.log("before enable");
        assert!(!path.exists());

        let shared = log.clone();
        shared.enable();
        assert!(log.is_enabled());
        log.log("<<< 220 ready");
        log.log(">>> QUIT");

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("] <<< 220 ready"));
        assert!(lines[1].ends_with("] >>> QUIT"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_file_sink_on_multi_thread_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let log = DebugLog::new(DebugSink::File {
            directory: dir.path().to_path_buf(),
            file_name: "smtp.log".to_string(),
        });
        log.enable();

        let writer = log.clone();
        tokio::spawn(async move {
            for n in 0..20 {
                writer.log(&format!(">>> RCPT TO:<user{n}@example.com>"));
            }
        })
        .await
        .unwrap();

        let contents = std::fs::read_to_string(dir.path().join("smtp.log")).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 20);
        assert!(lines[0].ends_with("] >>> RCPT TO:<user0@example.com>"));
        assert!(lines[19].ends_with("] >>> RCPT TO:<user19@example.com>"));
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::from_millis(2500)), "2.50 sec");
        assert_eq!(format_elapsed(Duration::from_micros(12_340)), "12.34 msec");
        assert_eq!(format_elapsed(Duration::from_nanos(56_780)), "56.78 μsec");
    }
}
