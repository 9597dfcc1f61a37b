//! Integration tests for the SMTP session.
//!
//! These tests run the session against a scripted server on a local
//! socket. The server answers each command with the next canned reply and
//! records what it received.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;

use postwire_smtp::{
    Address, DebugLog, DebugSink, Error, SessionConfig, SessionState, SmtpSession,
};

/// Routes library logs to the test output; `RUST_LOG` picks the level.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// What the scripted server saw on one connection.
#[derive(Debug, Default)]
struct Received {
    commands: Vec<String>,
    bodies: Vec<Vec<String>>,
}

/// Serves one connection per reply script, in order.
///
/// The first reply is the greeting. The connection is closed once its
/// script runs out.
async fn scripted_server(scripts: Vec<Vec<&'static str>>) -> (u16, JoinHandle<Vec<Received>>) {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = tokio::spawn(async move {
        let mut connections = Vec::new();
        for script in scripts {
            let (socket, _) = listener.accept().await.unwrap();
            let (read, mut write) = socket.into_split();
            let mut reader = BufReader::new(read);
            let mut replies = script.into_iter().peekable();
            let mut received = Received::default();
            let mut body: Option<Vec<String>> = None;

            let greeting = replies.next().unwrap();
            write.write_all(greeting.as_bytes()).await.unwrap();

            while replies.peek().is_some() {
                let mut line = String::new();
                if reader.read_line(&mut line).await.unwrap_or(0) == 0 {
                    break;
                }
                let line = line.trim_end_matches(['\r', '\n']).to_string();

                if let Some(lines) = body.as_mut() {
                    if line != "." {
                        lines.push(line);
                        continue;
                    }
                    received.bodies.extend(body.take());
                }
                received.commands.push(line.clone());

                let Some(reply) = replies.next() else {
                    break;
                };
                write.write_all(reply.as_bytes()).await.unwrap();
                if line == "DATA" && reply.starts_with("354") {
                    body = Some(Vec::new());
                }
            }
            connections.push(received);
        }
        connections
    });

    (port, handle)
}

fn config(port: u16) -> SessionConfig {
    let mut config = SessionConfig::new("127.0.0.1", port, "client.test");
    config.timeout = Duration::from_secs(5);
    config.time_limit = Duration::from_secs(5);
    config
}

fn addresses() -> (Address, Address) {
    (
        Address::new("sender@example.com").unwrap(),
        Address::new("rcpt@example.com").unwrap(),
    )
}

const MESSAGE: &str = "Subject: Hi\r\n\r\n.dot\r\nbody\r\n";

#[tokio::test]
async fn test_auth_plain_transaction() {
    let (port, server) = scripted_server(vec![vec![
        "220 mail.test ESMTP\r\n",
        "250-SIZE 100\r\n250 AUTH PLAIN\r\n",
        "334 \r\n",
        "235 2.7.0 Accepted\r\n",
        "250 OK\r\n",
        "250 OK\r\n",
        "354 Go ahead\r\n",
        "250 Queued\r\n",
        "221 Bye\r\n",
    ]])
    .await;

    let dir = tempfile::tempdir().unwrap();
    let transcript = DebugLog::new(DebugSink::File {
        directory: dir.path().to_path_buf(),
        file_name: "smtp.log".to_string(),
    });
    transcript.enable();

    let mut session =
        SmtpSession::new(config(port).credentials("user", "pass"), transcript).unwrap();
    let (from, to) = addresses();

    session.send(&from, &to, MESSAGE).await.unwrap();
    assert_eq!(session.state(), SessionState::Ready);
    assert_eq!(session.messages_sent(), 1);
    assert_eq!(session.extensions().unwrap().size_limit(), Some(100));

    session.close().await;
    assert_eq!(session.state(), SessionState::Closed);

    let received = server.await.unwrap();
    assert_eq!(
        received[0].commands,
        vec![
            "EHLO client.test",
            "AUTH PLAIN",
            "AHVzZXIAcGFzcw==",
            "MAIL FROM:<sender@example.com>",
            "RCPT TO:<rcpt@example.com>",
            "DATA",
            ".",
            "QUIT",
        ]
    );
    assert_eq!(
        received[0].bodies,
        vec![vec!["Subject: Hi", "", "..dot", "body"]]
    );

    let log = std::fs::read_to_string(dir.path().join("smtp.log")).unwrap();
    assert!(log.contains("] START NEW SMTP CONNECTION"));
    assert!(log.contains("] Connecting to server 127.0.0.1 on port"));
    assert!(log.contains("] >>> AUTH PLAIN"));
    assert!(log.contains("] >>> <credentials>"));
    assert!(!log.contains("AHVzZXIAcGFzcw=="));
    assert!(log.contains("] MESSAGES-SENT: 1; CONNECTION-TIME: "));
}

#[tokio::test]
async fn test_rejected_recipient_skips_data() {
    let (port, server) = scripted_server(vec![vec![
        "220 mail.test\r\n",
        "250 mail.test\r\n",
        "250 OK\r\n",
        "550 5.1.1 No such user\r\n",
    ]])
    .await;

    let mut session = SmtpSession::new(config(port), DebugLog::default()).unwrap();
    let (from, to) = addresses();

    let err = session.send(&from, &to, MESSAGE).await.unwrap_err();
    assert!(matches!(err, Error::SmtpError { code: 550, .. }));
    assert!(err.is_permanent());
    assert_eq!(session.state(), SessionState::Closed);
    assert!(!session.is_open());
    assert_eq!(session.messages_sent(), 0);

    let received = server.await.unwrap();
    assert!(!received[0].commands.iter().any(|c| c == "DATA"));
}

#[tokio::test]
async fn test_size_limit_refused_before_mail_from() {
    let (port, server) = scripted_server(vec![vec![
        "220 mail.test\r\n",
        "250-mail.test\r\n250 SIZE 10\r\n",
    ]])
    .await;

    let mut session = SmtpSession::new(config(port), DebugLog::default()).unwrap();
    let (from, to) = addresses();

    let err = session.send(&from, &to, MESSAGE).await.unwrap_err();
    assert!(matches!(err, Error::MessageTooLarge { limit: 10, .. }));
    assert_eq!(session.state(), SessionState::Closed);

    let received = server.await.unwrap();
    assert_eq!(received[0].commands, vec!["EHLO client.test"]);
}

#[tokio::test]
async fn test_auth_login() {
    let (port, server) = scripted_server(vec![vec![
        "220 mail.test\r\n",
        "250-mail.test\r\n250 AUTH LOGIN\r\n",
        "334 VXNlcm5hbWU6\r\n",
        "334 UGFzc3dvcmQ6\r\n",
        "235 OK\r\n",
        "250 OK\r\n",
        "250 OK\r\n",
        "354 Go ahead\r\n",
        "250 Queued\r\n",
    ]])
    .await;

    let mut session =
        SmtpSession::new(config(port).credentials("user", "pass"), DebugLog::default()).unwrap();
    let (from, to) = addresses();
    session.send(&from, &to, MESSAGE).await.unwrap();
    drop(session);

    let received = server.await.unwrap();
    assert_eq!(
        &received[0].commands[1..4],
        &["AUTH LOGIN", "dXNlcg==", "cGFzcw=="]
    );
}

#[tokio::test]
async fn test_auth_cram_md5() {
    let (port, server) = scripted_server(vec![vec![
        "220 mail.test\r\n",
        "250-mail.test\r\n250 AUTH CRAM-MD5\r\n",
        "334 PDE4OTYuNjk3MTcwOTUyQHBvc3RvZmZpY2UucmVzdG9uLm1jaS5uZXQ+\r\n",
        "235 OK\r\n",
        "250 OK\r\n",
        "250 OK\r\n",
        "354 Go ahead\r\n",
        "250 Queued\r\n",
    ]])
    .await;

    let mut session = SmtpSession::new(
        config(port).credentials("tim", "tanstaaftanstaaf"),
        DebugLog::default(),
    )
    .unwrap();
    let (from, to) = addresses();
    session.send(&from, &to, MESSAGE).await.unwrap();
    drop(session);

    let received = server.await.unwrap();
    assert_eq!(
        &received[0].commands[1..3],
        &[
            "AUTH CRAM-MD5",
            "dGltIGI5MTNhNjAyYzdlZGE3YTQ5NWI0ZTZlNzMzNGQzODkw"
        ]
    );
}

#[tokio::test]
async fn test_auth_rejected() {
    let (port, _server) = scripted_server(vec![vec![
        "220 mail.test\r\n",
        "250-mail.test\r\n250 AUTH PLAIN\r\n",
        "334 \r\n",
        "535 5.7.8 Bad credentials\r\n",
    ]])
    .await;

    let mut session =
        SmtpSession::new(config(port).credentials("user", "wrong"), DebugLog::default()).unwrap();
    let (from, to) = addresses();

    let err = session.send(&from, &to, MESSAGE).await.unwrap_err();
    assert!(matches!(err, Error::Authentication(_)));
    assert_eq!(session.state(), SessionState::Closed);
}

#[tokio::test]
async fn test_no_common_auth_mechanism() {
    let (port, _server) = scripted_server(vec![vec![
        "220 mail.test\r\n",
        "250-mail.test\r\n250 AUTH GSSAPI NTLM\r\n",
    ]])
    .await;

    let mut session =
        SmtpSession::new(config(port).credentials("user", "pass"), DebugLog::default()).unwrap();
    let (from, to) = addresses();

    let err = session.send(&from, &to, MESSAGE).await.unwrap_err();
    assert!(matches!(err, Error::NoCommonAuthMechanism(ref offered) if offered == "GSSAPI NTLM"));
}

#[tokio::test]
async fn test_bad_greeting() {
    let (port, _server) = scripted_server(vec![vec!["554 No service\r\n"]]).await;

    let mut session = SmtpSession::new(config(port), DebugLog::default()).unwrap();
    let (from, to) = addresses();

    let err = session.send(&from, &to, MESSAGE).await.unwrap_err();
    assert!(matches!(err, Error::SmtpError { code: 554, .. }));
    assert_eq!(session.state(), SessionState::Closed);
}

#[tokio::test]
async fn test_connection_reused() {
    let (port, server) = scripted_server(vec![vec![
        "220 mail.test\r\n",
        "250 mail.test\r\n",
        "250 OK\r\n",
        "250 OK\r\n",
        "354 Go ahead\r\n",
        "250 Queued\r\n",
        "250 OK\r\n",
        "251 Will forward\r\n",
        "354 Go ahead\r\n",
        "250 Queued\r\n",
        "221 Bye\r\n",
    ]])
    .await;

    let mut session = SmtpSession::new(config(port), DebugLog::default()).unwrap();
    let (from, to) = addresses();

    session.send(&from, &to, MESSAGE).await.unwrap();
    session.send(&from, &to, MESSAGE).await.unwrap();
    assert_eq!(session.messages_sent(), 2);
    session.close().await;

    let received = server.await.unwrap();
    assert_eq!(received.len(), 1);
    let ehlo_count = received[0]
        .commands
        .iter()
        .filter(|c| c.starts_with("EHLO"))
        .count();
    assert_eq!(ehlo_count, 1);
    assert_eq!(received[0].bodies.len(), 2);
}

#[tokio::test]
async fn test_reconnects_after_server_drop() {
    let (port, server) = scripted_server(vec![
        vec![
            "220 mail.test\r\n",
            "250 mail.test\r\n",
            "250 OK\r\n",
            "250 OK\r\n",
            "354 Go ahead\r\n",
            "250 Queued\r\n",
        ],
        vec![
            "220 mail.test\r\n",
            "250 mail.test\r\n",
            "250 OK\r\n",
            "250 OK\r\n",
            "354 Go ahead\r\n",
            "250 Queued\r\n",
        ],
    ])
    .await;

    let mut session = SmtpSession::new(config(port), DebugLog::default()).unwrap();
    let (from, to) = addresses();

    session.send(&from, &to, MESSAGE).await.unwrap();
    // The first script is exhausted, so the server hangs up.
    tokio::time::sleep(Duration::from_millis(100)).await;
    session.send(&from, &to, MESSAGE).await.unwrap();
    assert_eq!(session.messages_sent(), 1);

    let received = server.await.unwrap();
    assert_eq!(received.len(), 2);
}

#[tokio::test]
async fn test_force_secure_without_starttls() {
    let (port, _server) = scripted_server(vec![vec![
        "220 mail.test\r\n",
        "250-mail.test\r\n250 SIZE 1000\r\n",
    ]])
    .await;

    let mut session =
        SmtpSession::new(config(port).force_secure(true), DebugLog::default()).unwrap();
    let (from, to) = addresses();

    let err = session.send(&from, &to, MESSAGE).await.unwrap_err();
    assert!(matches!(err, Error::NotSupported(_)));
}

#[tokio::test]
async fn test_credentials_without_force_secure_on_starttls_server() {
    let (port, server) = scripted_server(vec![vec![
        "220 mail.test\r\n",
        "250-mail.test\r\n250-STARTTLS\r\n250 AUTH PLAIN\r\n",
    ]])
    .await;

    let mut session =
        SmtpSession::new(config(port).credentials("user", "pass"), DebugLog::default()).unwrap();
    let (from, to) = addresses();

    let err = session.send(&from, &to, MESSAGE).await.unwrap_err();
    assert!(err.is_config());

    let received = server.await.unwrap();
    assert_eq!(received[0].commands, vec!["EHLO client.test"]);
}

#[tokio::test]
async fn test_reply_timeout() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = tokio::spawn(async move {
        // Accept and stay silent.
        let (socket, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        drop(socket);
    });

    let mut config = config(port);
    config.timeout = Duration::from_millis(200);
    config.time_limit = Duration::from_millis(300);
    let mut session = SmtpSession::new(config, DebugLog::default()).unwrap();
    let (from, to) = addresses();

    let err = session.send(&from, &to, MESSAGE).await.unwrap_err();
    assert!(err.is_timeout());
    assert_eq!(session.state(), SessionState::Closed);
    server.abort();
}

#[tokio::test]
async fn test_stalled_tls_handshake_times_out() {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let mut stream = BufReader::new(socket);
        stream.get_mut().write_all(b"220 mail.test\r\n").await.unwrap();
        let mut commands = Vec::new();
        converse(
            &mut stream,
            &["250-mail.test\r\n250 STARTTLS\r\n", "220 Go ahead\r\n"],
            &mut commands,
        )
        .await;
        // Never answer the ClientHello.
        tokio::time::sleep(Duration::from_secs(10)).await;
        drop(stream);
    });

    let mut config = config(port).force_secure(true);
    config.timeout = Duration::from_millis(300);
    config.time_limit = Duration::from_millis(300);
    let mut session = SmtpSession::new(config, DebugLog::default()).unwrap();
    let (from, to) = addresses();

    let err = tokio::time::timeout(Duration::from_secs(5), session.send(&from, &to, MESSAGE))
        .await
        .expect("handshake was not bounded by the timeout")
        .unwrap_err();
    assert!(err.is_timeout());
    assert!(err.to_string().contains("TLS handshake"));
    assert_eq!(session.state(), SessionState::Closed);
    server.abort();
}

/// Self-signed certificate for 127.0.0.1, as PEM, plus a server acceptor.
fn loopback_tls() -> (String, TlsAcceptor) {
    let mut params = rcgen::CertificateParams::default();
    params.subject_alt_names = vec![rcgen::SanType::IpAddress(IpAddr::V4(Ipv4Addr::LOCALHOST))];
    let cert = rcgen::Certificate::from_params(params).unwrap();

    let chain = vec![CertificateDer::from(cert.serialize_der().unwrap())];
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(cert.serialize_private_key_der()));
    let config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(chain, key)
        .unwrap();

    (cert.serialize_pem().unwrap(), TlsAcceptor::from(Arc::new(config)))
}

/// Answers one command per reply, skipping message data after `DATA`.
async fn converse<S>(stream: &mut BufReader<S>, replies: &[&str], commands: &mut Vec<String>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut in_data = false;
    for reply in replies {
        let mut line = String::new();
        loop {
            line.clear();
            if stream.read_line(&mut line).await.unwrap_or(0) == 0 {
                return;
            }
            if !in_data || line.trim_end() == "." {
                break;
            }
        }
        let line = line.trim_end().to_string();
        in_data = line == "DATA";
        commands.push(line);

        stream.get_mut().write_all(reply.as_bytes()).await.unwrap();
        stream.get_mut().flush().await.unwrap();
    }
}

/// Serves one connection that upgrades with STARTTLS and then offers AUTH
/// and a bigger SIZE than before the upgrade.
async fn starttls_server(acceptor: TlsAcceptor) -> (u16, JoinHandle<Vec<String>>) {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let mut commands = Vec::new();

        let mut plain = BufReader::new(socket);
        plain.get_mut().write_all(b"220 mail.test ESMTP\r\n").await.unwrap();
        converse(
            &mut plain,
            &[
                "250-mail.test\r\n250-SIZE 100\r\n250 STARTTLS\r\n",
                "220 Ready to start TLS\r\n",
            ],
            &mut commands,
        )
        .await;

        let Ok(tls) = acceptor.accept(plain.into_inner()).await else {
            return commands;
        };
        let mut secure = BufReader::new(tls);
        converse(
            &mut secure,
            &[
                "250-mail.test\r\n250-SIZE 5000\r\n250 AUTH PLAIN LOGIN\r\n",
                "334 \r\n",
                "235 2.7.0 Accepted\r\n",
                "250 OK\r\n",
                "250 OK\r\n",
                "354 Go ahead\r\n",
                "250 Queued\r\n",
                "221 Bye\r\n",
            ],
            &mut commands,
        )
        .await;
        commands
    });

    (port, handle)
}

async fn assert_starttls_transaction(config: SessionConfig, server: JoinHandle<Vec<String>>) {
    let mut session = SmtpSession::new(config, DebugLog::default()).unwrap();
    let (from, to) = addresses();

    session.send(&from, &to, MESSAGE).await.unwrap();
    assert_eq!(session.state(), SessionState::Ready);
    assert_eq!(session.messages_sent(), 1);

    let extensions = session.extensions().unwrap();
    assert_eq!(extensions.size_limit(), Some(5000));
    assert_eq!(extensions.auth_mechanisms(), ["PLAIN", "LOGIN"]);
    assert!(!extensions.supports_starttls());

    session.close().await;
    assert_eq!(
        server.await.unwrap(),
        vec![
            "EHLO client.test",
            "STARTTLS",
            "EHLO client.test",
            "AUTH PLAIN",
            "AHVzZXIAcGFzcw==",
            "MAIL FROM:<sender@example.com>",
            "RCPT TO:<rcpt@example.com>",
            "DATA",
            ".",
            "QUIT",
        ]
    );
}

#[tokio::test]
async fn test_starttls_without_certificate_verification() {
    let (_pem, acceptor) = loopback_tls();
    let (port, server) = starttls_server(acceptor).await;

    let mut config = config(port).force_secure(true).credentials("user", "pass");
    config.tls.verify_certificates = false;

    assert_starttls_transaction(config, server).await;
}

#[tokio::test]
async fn test_starttls_with_ca_file() {
    let (pem, acceptor) = loopback_tls();
    let dir = tempfile::tempdir().unwrap();
    let ca_file = dir.path().join("ca.pem");
    std::fs::write(&ca_file, pem).unwrap();

    let (port, server) = starttls_server(acceptor).await;
    let mut config = config(port).force_secure(true).credentials("user", "pass");
    config.tls.ca_file = Some(ca_file);

    assert_starttls_transaction(config, server).await;
}

#[tokio::test]
async fn test_starttls_untrusted_certificate() {
    let (_pem, acceptor) = loopback_tls();
    let (port, _server) = starttls_server(acceptor).await;

    let mut session =
        SmtpSession::new(config(port).force_secure(true), DebugLog::default()).unwrap();
    let (from, to) = addresses();

    let err = session.send(&from, &to, MESSAGE).await.unwrap_err();
    assert!(!err.is_timeout());
    assert_eq!(session.state(), SessionState::Closed);
}
