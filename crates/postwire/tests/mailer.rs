//! End-to-end tests for the mailer.
//!
//! SMTP delivery runs against a scripted server on a local socket; local
//! submission runs a fake sendmail script that records its input.

#![allow(clippy::unwrap_used)]

use std::path::Path;
use std::time::Duration;

use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use postwire::{ErrorKind, Mailer, MailerConfig, Settings, TransportMode};

/// Routes library logs to the test output; `RUST_LOG` picks the level.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Answers one connection with canned replies; returns every line received.
async fn scripted_server(replies: Vec<&'static str>) -> (u16, JoinHandle<Vec<String>>) {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let (read, mut write) = socket.into_split();
        let mut reader = BufReader::new(read);
        let mut replies = replies.into_iter().peekable();
        let mut lines = Vec::new();
        let mut in_data = false;

        write
            .write_all(replies.next().unwrap().as_bytes())
            .await
            .unwrap();

        while replies.peek().is_some() {
            let mut line = String::new();
            if reader.read_line(&mut line).await.unwrap_or(0) == 0 {
                break;
            }
            let line = line.trim_end_matches(['\r', '\n']).to_string();
            lines.push(line.clone());
            if in_data && line != "." {
                continue;
            }
            in_data = line == "DATA";
            let reply = replies.next().unwrap();
            write.write_all(reply.as_bytes()).await.unwrap();
        }
        lines
    });

    (port, handle)
}

fn smtp_config(port: u16) -> MailerConfig {
    MailerConfig::builder()
        .host_name("mail.example.com")
        .smtp_server("127.0.0.1", port)
        .credentials("user", "pass")
        .timeouts(Duration::from_secs(5), Duration::from_secs(5))
        .from("sender@example.com", "Sender")
        .build()
        .unwrap()
}

fn write_file(dir: &Path, name: &str, contents: &[u8]) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

#[tokio::test]
async fn test_send_over_smtp() {
    let (port, server) = scripted_server(vec![
        "220 relay.test ESMTP\r\n",
        "250-SIZE 100000\r\n250 AUTH PLAIN\r\n",
        "334 \r\n",
        "235 Accepted\r\n",
        "250 OK\r\n",
        "250 OK\r\n",
        "354 Go ahead\r\n",
        "250 Queued\r\n",
        "221 Bye\r\n",
    ])
    .await;

    let dir = tempfile::tempdir().unwrap();
    let report = write_file(dir.path(), "report.pdf", b"%PDF-1.4 fake");
    let notes = write_file(dir.path(), "notes.txt", b"some notes");

    let mut mailer = Mailer::new(smtp_config(port)).unwrap();
    mailer
        .to("rcpt@example.com", "Jörg Müller")
        .subject("Quarterly report")
        .text_plain("See attached.")
        .text_html("<p>See attached.</p>");
    mailer.attach([&report, &notes]).await.unwrap();
    assert_eq!(mailer.message().attachments().len(), 2);

    let message_id = mailer.send(false).await.unwrap();
    assert!(mailer.is_connected());
    let id_pattern = Regex::new(r"^[0-9a-f-]+@mail\.example\.com$").unwrap();
    assert!(id_pattern.is_match(&message_id), "{message_id}");

    mailer.close().await;
    assert!(!mailer.is_connected());

    let lines = server.await.unwrap();
    assert_eq!(lines[0], "EHLO mail.example.com");
    assert!(lines.contains(&"MAIL FROM:<sender@example.com>".to_string()));
    assert!(lines.contains(&"RCPT TO:<rcpt@example.com>".to_string()));
    assert!(lines.contains(&format!("Message-ID: <{message_id}>")));
    assert!(lines.iter().any(|l| l.starts_with("To: =?utf-8?B?")));
    assert!(lines.contains(&"Subject: Quarterly report".to_string()));
    assert!(lines.iter().any(|l| l.contains("multipart/mixed")));
    assert!(lines.iter().any(|l| l.contains("multipart/alternative")));
    assert!(lines.iter().any(|l| l.contains("application/pdf")));
    assert!(lines.iter().any(|l| l.contains("filename=\"report.pdf\"")));
    assert_eq!(lines.last().unwrap(), "QUIT");
}

#[tokio::test]
async fn test_rejected_recipient() {
    let (port, server) = scripted_server(vec![
        "220 relay.test\r\n",
        "250 AUTH PLAIN\r\n",
        "334 \r\n",
        "235 Accepted\r\n",
        "250 OK\r\n",
        "550 No such user\r\n",
    ])
    .await;

    let mut mailer = Mailer::new(smtp_config(port)).unwrap();
    mailer
        .to("nobody@example.com", "Nobody")
        .subject("Hello")
        .text_plain("Hi");

    let err = mailer.send(false).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Protocol);
    assert!(!mailer.is_connected());

    let lines = server.await.unwrap();
    assert!(!lines.contains(&"DATA".to_string()));
}

#[tokio::test]
async fn test_attach_missing_file_keeps_attachments() {
    let dir = tempfile::tempdir().unwrap();
    let existing = write_file(dir.path(), "a.txt", b"a");

    let mut mailer = Mailer::new(smtp_config(25)).unwrap();
    mailer.add_attachment(&existing).await.unwrap();

    let err = mailer
        .add_attachment(dir.path().join("missing.txt"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
    assert_eq!(mailer.message().attachments().len(), 1);

    let err = mailer
        .attach([dir.path().join("b.txt"), dir.path().join("missing.txt")])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
    assert_eq!(mailer.message().attachments().len(), 1);
    assert_eq!(mailer.message().attachments()[0].filename(), "a.txt");

    mailer.clear_attachments();
    assert!(mailer.message().attachments().is_empty());
}

#[tokio::test]
async fn test_unknown_attachment_type_fails_before_connecting() {
    let dir = tempfile::tempdir().unwrap();
    let odd = write_file(dir.path(), "data.zzunknown", b"???");

    // Nothing listens on this port; composition must fail first.
    let mut mailer = Mailer::new(smtp_config(9)).unwrap();
    mailer
        .to("rcpt@example.com", "R")
        .subject("S")
        .text_plain("Body");
    mailer.add_attachment(&odd).await.unwrap();

    let err = mailer.send(false).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Composition);

    let mut mailer = Mailer::new(smtp_config(9))
        .unwrap()
        .with_mime_types(|ext: &str| (ext == "zzunknown").then(|| "application/x-zz".to_string()));
    mailer
        .to("rcpt@example.com", "R")
        .subject("S")
        .text_plain("Body");
    mailer.add_attachment(&odd).await.unwrap();
    let err = mailer.send(false).await.unwrap_err();
    assert_ne!(err.kind(), ErrorKind::Composition);
}

#[tokio::test]
async fn test_inline_image_ids() {
    let dir = tempfile::tempdir().unwrap();
    let logo = write_file(dir.path(), "Logo.PNG", b"\x89PNG fake");

    let mut mailer = Mailer::new(smtp_config(25)).unwrap();
    let first = mailer.add_inline_image(&logo).await.unwrap();
    let second = mailer.add_inline_image(&logo).await.unwrap();

    let id_pattern = Regex::new(r"^[0-9a-f]{12}@mail\.example\.com$").unwrap();
    assert!(id_pattern.is_match(&first), "{first}");
    assert_ne!(first, second);
    assert_eq!(mailer.message().inline_images()[0].extension(), "png");

    let err = mailer
        .add_inline_image(dir.path().join("missing.png"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
}

#[cfg(unix)]
#[tokio::test]
async fn test_local_submission() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let args_file = dir.path().join("args");
    let input_file = dir.path().join("input");
    let script = write_file(
        dir.path(),
        "sendmail",
        format!(
            "#!/bin/sh\necho \"$@\" > '{}'\ncat > '{}'\n",
            args_file.display(),
            input_file.display()
        )
        .as_bytes(),
    );
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

    let settings = Settings {
        host_name: "mail.example.com".into(),
        mail_method: "local".into(),
        sendmail_path: script,
        from_email: "sender@example.com".into(),
        from_name: "Sender".into(),
        ..Settings::default()
    };
    let config = MailerConfig::try_from(settings).unwrap();
    assert_eq!(config.mode, TransportMode::Local);

    let mut mailer = Mailer::new(config).unwrap();
    mailer
        .to("rcpt@example.com", "Recipient")
        .subject("Local delivery")
        .text_plain("Hello from the local mailer.");
    let message_id = mailer.send(false).await.unwrap();

    let args = std::fs::read_to_string(&args_file).unwrap();
    assert_eq!(args.trim(), "-t -i -f sender@example.com");

    let input = std::fs::read_to_string(&input_file).unwrap();
    assert!(input.starts_with("To: Recipient <rcpt@example.com>\r\nSubject: Local delivery\r\n"));
    assert_eq!(input.matches("To: ").count(), 1);
    assert!(input.contains(&format!("Message-ID: <{message_id}>")));
    assert!(input.contains("Content-Transfer-Encoding: base64"));
}

#[test]
fn test_settings_validation() {
    let settings: Settings =
        serde_json::from_str(r#"{"mail_method": "smtp", "smtp_username": "user"}"#).unwrap();
    let err = MailerConfig::try_from(settings).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);

    let settings: Settings = serde_json::from_str(r#"{"mail_method": "pigeon"}"#).unwrap();
    assert_eq!(
        MailerConfig::try_from(settings).unwrap_err().kind(),
        ErrorKind::Configuration
    );
}
