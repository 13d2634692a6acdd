//! # Syslog sink.
//!
//! Ships messages to a syslog endpoint over udp, tcp, or tcp+tls
//! (RFC3164 framing, facility `daemon`).
//!
//! ## Rules
//! - Connection parameters (address, protocol, certificate bundle) come
//!   from the default logger config when set there, otherwise from the
//!   first registering config that carries them.
//! - Tag: per-message `program_name` → sink default `program_name` → the
//!   message's `process_name`.
//! - Hostname: per-message override → sink default override → the OS
//!   hostname. Both tag and hostname can be suffixed with the container
//!   hostname via the `append_container_name_*` flags, which is useful for
//!   telling containers apart on a shared endpoint.
//! - Priority: INFO for stdout lines, CRIT for stderr lines. With
//!   `extract_log_level` the body is parsed as JSON and a `level` field is
//!   mapped onto the syslog severities; anything unparseable keeps the
//!   pipe default.

use std::io::BufReader;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Local;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, UdpSocket};
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;

use crate::config::{DefaultLoggerConfig, LoggingConfig, SyslogConfig};
use crate::error::SinkError;
use crate::logging::message::{LogMessage, Pipe};
use crate::logging::sink::Sink;

pub const ENGINE: &str = "syslog";

const TLS_PROTOCOL: &str = "tcp+tls";
const TCP_PROTOCOL: &str = "tcp";
const UDP_PROTOCOL: &str = "udp";
const DEFAULT_PROTOCOL: &str = TLS_PROTOCOL;

/// Syslog severities, numbered per RFC5424.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Severity {
    Emerg = 0,
    Alert = 1,
    Crit = 2,
    Err = 3,
    Warning = 4,
    Notice = 5,
    Info = 6,
    Debug = 7,
}

/// Facility `daemon`.
const FACILITY: u8 = 3;

fn priority(severity: Severity) -> u8 {
    (FACILITY << 3) | severity as u8
}

enum Transport {
    Udp(UdpSocket),
    Tcp(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

pub struct SyslogSink {
    /// Effective connection parameters.
    conn: SyslogConfig,
    /// Default per-message fields, taken from the default logger config.
    sink_defaults: SyslogConfig,
    tls: Option<TlsConnector>,
    transport: Option<Transport>,
    /// The container's own hostname.
    basename: String,
}

impl SyslogSink {
    pub fn new() -> Self {
        Self {
            conn: SyslogConfig::default(),
            sink_defaults: SyslogConfig::default(),
            tls: None,
            transport: None,
            basename: String::new(),
        }
    }

    fn load_certificates(&self) -> Result<TlsConnector, SinkError> {
        let register_err = |reason: String| SinkError::Register {
            engine: ENGINE.to_string(),
            reason,
        };

        if self.conn.cert_bundle_path.is_empty() {
            return Err(register_err("no certificate bundle specified".to_string()));
        }
        let file = std::fs::File::open(&self.conn.cert_bundle_path)
            .map_err(|e| register_err(format!("cannot read {}: {e}", self.conn.cert_bundle_path)))?;
        let certs: Vec<_> = rustls_pemfile::certs(&mut BufReader::new(file))
            .collect::<Result<_, _>>()
            .map_err(|e| register_err(format!("invalid certificate bundle: {e}")))?;

        let mut roots = RootCertStore::empty();
        let (added, _ignored) = roots.add_parsable_certificates(certs);
        if added == 0 {
            return Err(register_err(
                "failed to parse the given certificate bundle".to_string(),
            ));
        }

        let config = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        Ok(TlsConnector::from(Arc::new(config)))
    }

    async fn send(&mut self, line: &str) {
        let result = match self.transport.as_mut() {
            Some(Transport::Udp(socket)) => {
                // Datagrams carry no framing newline.
                socket.send(line.trim_end_matches('\n').as_bytes()).await.map(|_| ())
            }
            Some(Transport::Tcp(stream)) => stream.write_all(line.as_bytes()).await,
            Some(Transport::Tls(stream)) => stream.write_all(line.as_bytes()).await,
            None => return,
        };
        if let Err(e) = result {
            eprintln!("failed to ship log line to syslog: {e}");
        }
    }
}

impl Default for SyslogSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Sink for SyslogSink {
    fn register_config(
        &mut self,
        config: &LoggingConfig,
        defaults: &DefaultLoggerConfig,
    ) -> Result<(), SinkError> {
        self.sink_defaults = defaults.logging_config.syslog.clone();

        // Connection parameters: defaults first, then the first registering
        // config that actually names an address.
        if self.conn.address.is_empty() {
            if !self.sink_defaults.address.is_empty() {
                self.conn = self.sink_defaults.clone();
            } else if !config.syslog.address.is_empty() {
                self.conn = config.syslog.clone();
            }
        }
        if self.conn.protocol.is_empty() {
            self.conn.protocol = DEFAULT_PROTOCOL.to_string();
        }
        match self.conn.protocol.as_str() {
            TLS_PROTOCOL | TCP_PROTOCOL | UDP_PROTOCOL => {}
            other => {
                return Err(SinkError::Register {
                    engine: ENGINE.to_string(),
                    reason: format!("{other} is not a valid protocol to connect to syslog"),
                })
            }
        }

        if self.conn.protocol == TLS_PROTOCOL && !self.conn.address.is_empty() && self.tls.is_none()
        {
            self.tls = Some(self.load_certificates()?);
        }

        if self.basename.is_empty() {
            self.basename = nix::unistd::gethostname()
                .map(|h| h.to_string_lossy().into_owned())
                .unwrap_or_else(|_| "not_available".to_string());
        }

        Ok(())
    }

    async fn start(&mut self) -> Result<(), SinkError> {
        let start_err = |reason: String| SinkError::Start {
            engine: ENGINE.to_string(),
            reason,
        };

        if self.conn.address.is_empty() {
            return Err(start_err("no syslog address configured".to_string()));
        }

        let transport = match self.conn.protocol.as_str() {
            UDP_PROTOCOL => {
                let socket = UdpSocket::bind("0.0.0.0:0")
                    .await
                    .map_err(|e| start_err(e.to_string()))?;
                socket
                    .connect(&self.conn.address)
                    .await
                    .map_err(|e| start_err(format!("failed to connect to syslog server: {e}")))?;
                Transport::Udp(socket)
            }
            TCP_PROTOCOL => {
                let stream = TcpStream::connect(&self.conn.address)
                    .await
                    .map_err(|e| start_err(format!("failed to connect to syslog server: {e}")))?;
                Transport::Tcp(stream)
            }
            _ => {
                let connector = self
                    .tls
                    .clone()
                    .ok_or_else(|| start_err("tls requested but not configured".to_string()))?;
                let host = self
                    .conn
                    .address
                    .rsplit_once(':')
                    .map(|(host, _)| host)
                    .unwrap_or(self.conn.address.as_str())
                    .to_string();
                let server_name = ServerName::try_from(host)
                    .map_err(|e| start_err(format!("invalid syslog host name: {e}")))?;
                let stream = TcpStream::connect(&self.conn.address)
                    .await
                    .map_err(|e| start_err(format!("failed to connect to syslog server: {e}")))?;
                let stream = connector
                    .connect(server_name, stream)
                    .await
                    .map_err(|e| start_err(format!("tls handshake failed: {e}")))?;
                Transport::Tls(Box::new(stream))
            }
        };

        self.transport = Some(transport);
        Ok(())
    }

    async fn submit(&mut self, msg: LogMessage) {
        let tag = message_tag(&msg.config, &self.sink_defaults, &self.basename);
        let hostname = message_hostname(&msg.config, &self.sink_defaults, &self.basename);

        let mut severity = match msg.pipe {
            Pipe::Out => Severity::Info,
            Pipe::Err => Severity::Crit,
        };
        if msg.config.syslog.extract_log_level {
            if let Some(extracted) = extract_level(&msg.message) {
                severity = extracted;
            }
        }

        let line = format!(
            "<{}>{} {} {}: {}",
            priority(severity),
            Local::now().format("%b %e %H:%M:%S"),
            hostname,
            tag,
            msg.message,
        );
        self.send(&line).await;
    }

    async fn shutdown(&mut self) -> Result<(), SinkError> {
        // Nothing started, nothing to close.
        let result = match self.transport.as_mut() {
            Some(Transport::Tcp(stream)) => stream.shutdown().await,
            Some(Transport::Tls(stream)) => stream.shutdown().await,
            Some(Transport::Udp(_)) | None => Ok(()),
        };
        self.transport = None;
        result.map_err(|e| SinkError::Shutdown {
            engine: ENGINE.to_string(),
            reason: format!("failed to close syslog connection: {e}"),
        })
    }
}

fn message_tag(config: &LoggingConfig, defaults: &SyslogConfig, basename: &str) -> String {
    let mut tag = if !config.syslog.program_name.is_empty() {
        config.syslog.program_name.clone()
    } else if !defaults.program_name.is_empty() {
        defaults.program_name.clone()
    } else {
        config.process_name.clone()
    };
    if config.syslog.append_container_name_to_tag || defaults.append_container_name_to_tag {
        tag.push_str(basename);
    }
    tag
}

fn message_hostname(config: &LoggingConfig, defaults: &SyslogConfig, basename: &str) -> String {
    let mut hostname = if !config.syslog.override_hostname.is_empty() {
        config.syslog.override_hostname.clone()
    } else if !defaults.override_hostname.is_empty() {
        defaults.override_hostname.clone()
    } else {
        basename.to_string()
    };
    if config.syslog.append_container_name_to_hostname || defaults.append_container_name_to_hostname
    {
        hostname.push_str(basename);
    }
    hostname
}

#[derive(Deserialize)]
struct LevelProbe {
    #[serde(default)]
    level: String,
}

/// Pulls a severity out of a JSON-shaped log line. `None` when the body is
/// not JSON or carries no level, so the caller keeps the pipe default.
fn extract_level(body: &str) -> Option<Severity> {
    let probe: LevelProbe = serde_json::from_str(body).ok()?;
    if probe.level.is_empty() {
        return None;
    }
    Some(match probe.level.to_lowercase().as_str() {
        "emerg" => Severity::Emerg,
        "alert" => Severity::Alert,
        "crit" => Severity::Crit,
        "err" | "error" => Severity::Err,
        "warning" | "warn" => Severity::Warning,
        "notice" => Severity::Notice,
        "debug" => Severity::Debug,
        _ => Severity::Info,
    })
}
