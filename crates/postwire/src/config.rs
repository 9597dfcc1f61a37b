//! Mailer configuration.
//!
//! [`Settings`] is the raw settings bag as found in an application config
//! file. [`MailerConfig`] is the validated, typed form the [`Mailer`] is
//! built from; it comes from [`MailerConfig::builder`] or from
//! `MailerConfig::try_from(settings)`.
//!
//! [`Mailer`]: crate::Mailer

use crate::error::{Error, Result};
use postwire_mime::TransferEncoding;
use postwire_smtp::{DebugSink, SessionConfig, TlsSettings};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Host name used when none is configured and the system has none.
pub const FALLBACK_HOST_NAME: &str = "[127.0.0.1]";

/// Default local submission program.
pub const DEFAULT_SENDMAIL_PATH: &str = "/usr/sbin/sendmail";

/// Default debug log file name.
pub const DEFAULT_LOG_FILE_NAME: &str = "postwire.log";

/// How messages leave the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportMode {
    /// Hand messages to the local sendmail program.
    Local,
    /// Speak SMTP to a relay.
    #[default]
    Smtp,
}

impl TransportMode {
    /// Parses a mode name: `smtp`, or `local` (also `mail`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for any other value.
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "smtp" => Ok(Self::Smtp),
            "local" | "mail" => Ok(Self::Local),
            other => Err(Error::Config(format!("unsupported transport mode: {other:?}"))),
        }
    }
}

/// Debug transcript settings as found in a config file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DebugSettings {
    /// Turn the transcript on from the start.
    pub enabled: bool,
    /// `echo` for in-process output, `log` for a log file.
    pub method: String,
    /// Directory holding the log file.
    pub directory: PathBuf,
    /// Log file name.
    pub file_name: String,
    /// Offset from UTC for log timestamps, in seconds.
    pub time_offset: i64,
}

impl Default for DebugSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            method: "echo".to_string(),
            directory: std::env::temp_dir(),
            file_name: DEFAULT_LOG_FILE_NAME.to_string(),
            time_offset: 0,
        }
    }
}

/// Raw mailer settings.
///
/// Keys mirror a typical application config file. Missing keys take the
/// values of [`Settings::default`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Name used in EHLO and identifiers; empty means the system host name.
    pub host_name: String,
    /// `smtp` or `local`.
    pub mail_method: String,
    /// SMTP server host.
    pub smtp_server: String,
    /// SMTP server port.
    pub smtp_port: u16,
    /// SMTP user name.
    pub smtp_username: String,
    /// SMTP password.
    pub smtp_password: String,
    /// Require an encrypted connection.
    pub smtp_secure: bool,
    /// Use implicit TLS instead of STARTTLS.
    pub smtp_tls: bool,
    /// Verify the server certificate.
    pub smtp_verify_certificates: bool,
    /// Extra trusted CA certificates (PEM).
    pub ca_file: Option<PathBuf>,
    /// Connect and read timeout in seconds.
    pub smtp_timeout: u64,
    /// Overall wait for one reply in seconds; 0 disables it.
    pub smtp_time_limit: u64,
    /// Sender address.
    pub from_email: String,
    /// Sender display name.
    pub from_name: String,
    /// `base64` or `quoted-printable`.
    pub text_encoding: String,
    /// Local submission program.
    pub sendmail_path: PathBuf,
    /// Debug transcript.
    pub debug: DebugSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host_name: String::new(),
            mail_method: "smtp".to_string(),
            smtp_server: "localhost".to_string(),
            smtp_port: postwire_smtp::session::DEFAULT_PORT,
            smtp_username: String::new(),
            smtp_password: String::new(),
            smtp_secure: false,
            smtp_tls: false,
            smtp_verify_certificates: true,
            ca_file: None,
            smtp_timeout: postwire_smtp::session::DEFAULT_TIMEOUT.as_secs(),
            smtp_time_limit: postwire_smtp::session::DEFAULT_TIME_LIMIT.as_secs(),
            from_email: String::new(),
            from_name: String::new(),
            text_encoding: TransferEncoding::default().as_str().to_string(),
            sendmail_path: PathBuf::from(DEFAULT_SENDMAIL_PATH),
            debug: DebugSettings::default(),
        }
    }
}

/// Debug transcript configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugConfig {
    /// Turn the transcript on from the start.
    pub enabled: bool,
    /// Where transcript lines go once enabled.
    pub sink: DebugSink,
    /// Offset from UTC for log file timestamps.
    pub time_offset: chrono::Duration,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            sink: DebugSink::Tracing,
            time_offset: chrono::Duration::zero(),
        }
    }
}

/// Validated mailer configuration.
#[derive(Debug, Clone)]
pub struct MailerConfig {
    /// Sending host name (EHLO, Message-ID, inline image ids).
    pub host_name: String,
    /// Delivery mode.
    pub mode: TransportMode,
    /// SMTP connection settings; `client_host` equals `host_name`.
    pub smtp: SessionConfig,
    /// Default sender address.
    pub from_email: String,
    /// Default sender display name.
    pub from_name: String,
    /// Transfer encoding for text parts.
    pub encoding: TransferEncoding,
    /// Local submission program.
    pub sendmail_path: PathBuf,
    /// Debug transcript.
    pub debug: DebugConfig,
}

impl MailerConfig {
    /// Starts building a configuration.
    #[must_use]
    pub fn builder() -> MailerConfigBuilder {
        MailerConfigBuilder::default()
    }
}

impl TryFrom<Settings> for MailerConfig {
    type Error = Error;

    fn try_from(settings: Settings) -> Result<Self> {
        let encoding = TransferEncoding::parse(&settings.text_encoding).ok_or_else(|| {
            Error::Config(format!(
                "unsupported text encoding: {:?}",
                settings.text_encoding
            ))
        })?;

        let sink = match settings.debug.method.trim().to_ascii_lowercase().as_str() {
            "echo" | "tracing" => DebugSink::Tracing,
            "log" | "file" => DebugSink::File {
                directory: settings.debug.directory,
                file_name: settings.debug.file_name,
            },
            other => return Err(Error::Config(format!("unsupported debug method: {other:?}"))),
        };

        MailerConfigBuilder {
            host_name: settings.host_name,
            mode: TransportMode::parse(&settings.mail_method)?,
            smtp_server: settings.smtp_server,
            smtp_port: settings.smtp_port,
            username: settings.smtp_username,
            password: settings.smtp_password,
            force_secure: settings.smtp_secure,
            implicit_tls: settings.smtp_tls,
            tls: TlsSettings {
                verify_certificates: settings.smtp_verify_certificates,
                ca_file: settings.ca_file,
            },
            timeout: Duration::from_secs(settings.smtp_timeout),
            time_limit: Duration::from_secs(settings.smtp_time_limit),
            from_email: settings.from_email,
            from_name: settings.from_name,
            encoding,
            sendmail_path: settings.sendmail_path,
            debug: DebugConfig {
                enabled: settings.debug.enabled,
                sink,
                time_offset: chrono::Duration::seconds(settings.debug.time_offset),
            },
        }
        .build()
    }
}

/// Builder for [`MailerConfig`].
#[derive(Debug, Clone)]
pub struct MailerConfigBuilder {
    host_name: String,
    mode: TransportMode,
    smtp_server: String,
    smtp_port: u16,
    username: String,
    password: String,
    force_secure: bool,
    implicit_tls: bool,
    tls: TlsSettings,
    timeout: Duration,
    time_limit: Duration,
    from_email: String,
    from_name: String,
    encoding: TransferEncoding,
    sendmail_path: PathBuf,
    debug: DebugConfig,
}

impl Default for MailerConfigBuilder {
    fn default() -> Self {
        let settings = Settings::default();
        Self {
            host_name: settings.host_name,
            mode: TransportMode::default(),
            smtp_server: settings.smtp_server,
            smtp_port: settings.smtp_port,
            username: String::new(),
            password: String::new(),
            force_secure: false,
            implicit_tls: false,
            tls: TlsSettings::default(),
            timeout: postwire_smtp::session::DEFAULT_TIMEOUT,
            time_limit: postwire_smtp::session::DEFAULT_TIME_LIMIT,
            from_email: String::new(),
            from_name: String::new(),
            encoding: TransferEncoding::default(),
            sendmail_path: settings.sendmail_path,
            debug: DebugConfig::default(),
        }
    }
}

impl MailerConfigBuilder {
    /// Sets the sending host name.
    #[must_use]
    pub fn host_name(mut self, host_name: impl Into<String>) -> Self {
        self.host_name = host_name.into();
        self
    }

    /// Sets the delivery mode.
    #[must_use]
    pub const fn mode(mut self, mode: TransportMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the SMTP server.
    #[must_use]
    pub fn smtp_server(mut self, server: impl Into<String>, port: u16) -> Self {
        self.smtp_server = server.into();
        self.smtp_port = port;
        self
    }

    /// Sets the SMTP login.
    #[must_use]
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    /// Requires an encrypted connection.
    #[must_use]
    pub const fn force_secure(mut self, force: bool) -> Self {
        self.force_secure = force;
        self
    }

    /// Connects with TLS from the start.
    #[must_use]
    pub const fn implicit_tls(mut self, implicit: bool) -> Self {
        self.implicit_tls = implicit;
        self
    }

    /// Sets certificate handling.
    #[must_use]
    pub fn tls(mut self, tls: TlsSettings) -> Self {
        self.tls = tls;
        self
    }

    /// Sets the connect/read timeout and the overall reply time limit.
    #[must_use]
    pub const fn timeouts(mut self, timeout: Duration, time_limit: Duration) -> Self {
        self.timeout = timeout;
        self.time_limit = time_limit;
        self
    }

    /// Sets the default sender.
    #[must_use]
    pub fn from(mut self, email: impl Into<String>, name: impl Into<String>) -> Self {
        self.from_email = email.into();
        self.from_name = name.into();
        self
    }

    /// Sets the text transfer encoding.
    #[must_use]
    pub const fn encoding(mut self, encoding: TransferEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Sets the local submission program.
    #[must_use]
    pub fn sendmail_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.sendmail_path = path.into();
        self
    }

    /// Sets the debug transcript.
    #[must_use]
    pub fn debug(mut self, debug: DebugConfig) -> Self {
        self.debug = debug;
        self
    }

    /// Validates and builds the configuration.
    ///
    /// An empty host name is replaced by the system host name, or
    /// [`FALLBACK_HOST_NAME`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if only one of user name and password is
    /// set, or if SMTP settings are invalid.
    pub fn build(self) -> Result<MailerConfig> {
        let host_name = if self.host_name.trim().is_empty() {
            system_host_name()
        } else {
            self.host_name.trim().to_string()
        };

        let credentials = match (self.username.is_empty(), self.password.is_empty()) {
            (true, true) => None,
            (false, false) => Some(postwire_smtp::Credentials::new(
                self.username,
                self.password,
            )),
            _ => {
                return Err(Error::Config(
                    "SMTP authentication requires both username and password".into(),
                ));
            }
        };

        let smtp = SessionConfig {
            server: self.smtp_server,
            port: self.smtp_port,
            client_host: host_name.clone(),
            credentials,
            force_secure: self.force_secure,
            implicit_tls: self.implicit_tls,
            tls: self.tls,
            timeout: self.timeout,
            time_limit: self.time_limit,
        };
        if self.mode == TransportMode::Smtp {
            smtp.validate()?;
        }

        Ok(MailerConfig {
            host_name,
            mode: self.mode,
            smtp,
            from_email: self.from_email,
            from_name: self.from_name,
            encoding: self.encoding,
            sendmail_path: self.sendmail_path,
            debug: self.debug,
        })
    }
}

/// Returns the system host name, or [`FALLBACK_HOST_NAME`].
#[must_use]
pub fn system_host_name() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| FALLBACK_HOST_NAME.to_string())
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
    use crate::ErrorKind;

    mod settings_tests {
        use super::*;

        #[test]
        fn test_defaults() {
            let config = MailerConfig::try_from(Settings::default()).unwrap();
            assert_eq!(config.mode, TransportMode::Smtp);
            assert_eq!(config.smtp.server, "localhost");
            assert_eq!(config.smtp.port, 25);
            assert_eq!(config.smtp.timeout, Duration::from_secs(30));
            assert_eq!(config.smtp.time_limit, Duration::from_secs(30));
            assert_eq!(config.encoding, TransferEncoding::Base64);
            assert!(config.smtp.credentials.is_none());
            assert!(!config.host_name.is_empty());
            assert_eq!(config.smtp.client_host, config.host_name);
            assert_eq!(config.sendmail_path, PathBuf::from("/usr/sbin/sendmail"));
            assert_eq!(config.debug.sink, DebugSink::Tracing);
        }

        #[test]
        fn test_full_settings() {
            let settings = Settings {
                host_name: "mail.example.com".into(),
                mail_method: "mail".into(),
                text_encoding: "quoted-printable".into(),
                smtp_username: "user".into(),
                smtp_password: "pass".into(),
                debug: DebugSettings {
                    enabled: true,
                    method: "log".into(),
                    directory: PathBuf::from("/var/log"),
                    file_name: "mailer.log".into(),
                    time_offset: 3600,
                },
                ..Settings::default()
            };
            let config = MailerConfig::try_from(settings).unwrap();
            assert_eq!(config.host_name, "mail.example.com");
            assert_eq!(config.mode, TransportMode::Local);
            assert_eq!(config.encoding, TransferEncoding::QuotedPrintable);
            assert_eq!(config.smtp.credentials.unwrap().username, "user");
            assert!(config.debug.enabled);
            assert_eq!(
                config.debug.sink,
                DebugSink::File {
                    directory: PathBuf::from("/var/log"),
                    file_name: "mailer.log".into(),
                }
            );
            assert_eq!(config.debug.time_offset, chrono::Duration::hours(1));
        }

        #[test]
        fn test_invalid_values() {
            let bad_mode = Settings {
                mail_method: "carrier-pigeon".into(),
                ..Settings::default()
            };
            let err = MailerConfig::try_from(bad_mode).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Configuration);

            let bad_encoding = Settings {
                text_encoding: "7bit".into(),
                ..Settings::default()
            };
            assert!(MailerConfig::try_from(bad_encoding).is_err());

            let bad_debug = Settings {
                debug: DebugSettings {
                    method: "syslog".into(),
                    ..DebugSettings::default()
                },
                ..Settings::default()
            };
            assert!(MailerConfig::try_from(bad_debug).is_err());
        }
    }

    mod builder_tests {
        use super::*;

        #[test]
        fn test_half_credentials() {
            let err = MailerConfig::builder()
                .credentials("user", "")
                .build()
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Configuration);
        }

        #[test]
        fn test_smtp_settings_validated() {
            let err = MailerConfig::builder()
                .smtp_server("", 25)
                .build()
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Configuration);

            let err = MailerConfig::builder()
                .implicit_tls(true)
                .build()
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Configuration);

            // SMTP settings do not matter for local submission.
            let config = MailerConfig::builder()
                .mode(TransportMode::Local)
                .smtp_server("", 25)
                .build()
                .unwrap();
            assert_eq!(config.mode, TransportMode::Local);
        }

        #[test]
        fn test_host_name() {
            let config = MailerConfig::builder()
                .host_name("  relay.example.org ")
                .build()
                .unwrap();
            assert_eq!(config.host_name, "relay.example.org");
            assert_eq!(config.smtp.client_host, "relay.example.org");

            let config = MailerConfig::builder().build().unwrap();
            assert_eq!(config.host_name, system_host_name());
        }
    }

    #[test]
    fn test_transport_mode_parse() {
        assert_eq!(TransportMode::parse("SMTP").unwrap(), TransportMode::Smtp);
        assert_eq!(TransportMode::parse("local").unwrap(), TransportMode::Local);
        assert_eq!(TransportMode::parse("mail").unwrap(), TransportMode::Local);
        assert!(TransportMode::parse("").is_err());
    }

    #[test]
    fn test_settings_from_json() {
        let settings: Settings = serde_json::from_str(
            r#"{"host_name": "h.example", "smtp_server": "smtp.example", "smtp_port": 587,
                "smtp_secure": true, "debug": {"enabled": true}}"#,
        )
        .unwrap();
        assert_eq!(settings.smtp_port, 587);
        assert!(settings.smtp_secure);
        assert!(settings.debug.enabled);
        assert_eq!(settings.debug.method, "echo");
        assert_eq!(settings.text_encoding, "base64");
    }
}
