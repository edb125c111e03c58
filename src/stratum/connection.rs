//! Pool connection management with line-delimited I/O.
//!
//! Stratum is newline-delimited JSON over TCP, optionally wrapped in TLS.
//! [`Connection`] resolves the endpoint, walks the candidate addresses with
//! a per-attempt timeout, and performs the TLS handshake where the endpoint
//! asks for one; a handshake failure advances to the next address rather
//! than failing the session. The [`Transport`] trait abstracts message I/O
//! so tests can run the session over channels.

use std::time::Duration;

use async_trait::async_trait;
use native_tls::Protocol;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufStream};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use super::error::{StratumError, StratumResult};
use super::messages::{parse_line, RawMessage};
use crate::pool::endpoint::{Endpoint, SecureLevel};

/// Message-level I/O for the Stratum session.
///
/// Production runs over [`Connection`]; tests run over a channel-backed
/// mock so protocol scenarios are deterministic.
#[async_trait]
pub trait Transport: Send {
    /// Read one frame.
    ///
    /// Returns `None` on clean connection close (EOF). A malformed line
    /// surfaces as [`StratumError::Frame`]; the stream stays readable.
    async fn read_message(&mut self) -> StratumResult<Option<RawMessage>>;

    /// Write one frame.
    async fn write_message(&mut self, msg: &Value) -> StratumResult<()>;
}

trait Stream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> Stream for T {}

/// Buffered pool connection, plaintext or TLS.
pub struct Connection {
    io: BufStream<Box<dyn Stream>>,
    line_buf: String,
}

impl Connection {
    /// Wrap an established plaintext stream.
    pub fn new(stream: TcpStream) -> Self {
        Self::from_stream(Box::new(stream))
    }

    fn from_stream(stream: Box<dyn Stream>) -> Self {
        Self {
            io: BufStream::new(stream),
            line_buf: String::with_capacity(4096),
        }
    }

    /// Resolve the endpoint and connect, trying each address in turn.
    ///
    /// Each TCP attempt is bounded by `connect_timeout`. With TLS enabled
    /// the handshake happens here too, and a failed handshake moves on to
    /// the next address; only exhaustion of all addresses fails the call.
    pub async fn connect(endpoint: &Endpoint, connect_timeout: Duration) -> StratumResult<Self> {
        let authority = format!("{}:{}", endpoint.host(), endpoint.port());
        let addrs: Vec<_> = tokio::net::lookup_host(authority.as_str())
            .await
            .map_err(|e| StratumError::Resolve {
                host: endpoint.host().to_string(),
                reason: e.to_string(),
            })?
            .collect();
        if addrs.is_empty() {
            return Err(StratumError::Resolve {
                host: endpoint.host().to_string(),
                reason: "no addresses".to_string(),
            });
        }

        let tls = match endpoint.secure_level() {
            SecureLevel::None => None,
            level => Some(tls_connector(level).await?),
        };

        for addr in addrs {
            debug!(%addr, "trying address");

            let stream = match timeout(connect_timeout, TcpStream::connect(addr)).await {
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) => {
                    warn!(%addr, error = %e, "connect failed");
                    continue;
                }
                Err(_) => {
                    warn!(%addr, "connect timed out");
                    continue;
                }
            };

            let Some(connector) = &tls else {
                return Ok(Self::new(stream));
            };

            match connector.connect(endpoint.host(), stream).await {
                Ok(stream) => return Ok(Self::from_stream(Box::new(stream))),
                Err(e) => {
                    warn!(%addr, error = %e, "TLS handshake failed");
                    warn!(
                        "if this is a certificate problem: install ca-certificates, point \
                         SSL_CERT_FILE at a valid bundle, or allow self-signed certificates \
                         for this pool"
                    );
                    continue;
                }
            }
        }

        Err(StratumError::Connect(format!(
            "no more addresses to try for {authority}"
        )))
    }
}

/// Build the TLS context for the endpoint's security level.
///
/// Verification uses the platform trust store (the system root store on
/// Windows); on Unix an `SSL_CERT_FILE` PEM bundle overrides it. Only
/// `AllowSelfSigned` turns verification off.
async fn tls_connector(level: SecureLevel) -> StratumResult<tokio_native_tls::TlsConnector> {
    let mut builder = native_tls::TlsConnector::builder();

    match level {
        SecureLevel::Tls => {
            builder.min_protocol_version(Some(Protocol::Tlsv10));
        }
        SecureLevel::Tls12 => {
            builder.min_protocol_version(Some(Protocol::Tlsv12));
        }
        SecureLevel::AllowSelfSigned => {
            builder.min_protocol_version(Some(Protocol::Tlsv12));
            builder.danger_accept_invalid_certs(true);
        }
        SecureLevel::None => unreachable!("plaintext endpoints never build a TLS context"),
    }

    #[cfg(not(windows))]
    if level != SecureLevel::AllowSelfSigned {
        if let Ok(path) = std::env::var("SSL_CERT_FILE") {
            match tokio::fs::read(&path).await {
                Ok(pem) => {
                    let certs = split_pem_bundle(&pem);
                    if certs.is_empty() {
                        warn!(path, "SSL_CERT_FILE contains no usable certificates");
                    }
                    for cert in certs {
                        builder.add_root_certificate(cert);
                    }
                }
                Err(e) => {
                    warn!(path, error = %e, "could not read SSL_CERT_FILE, using platform trust store");
                }
            }
        }
    }

    builder
        .build()
        .map(tokio_native_tls::TlsConnector::from)
        .map_err(|e| StratumError::Tls(e.to_string()))
}

/// Split a PEM bundle into individual certificates.
#[cfg(not(windows))]
fn split_pem_bundle(pem: &[u8]) -> Vec<native_tls::Certificate> {
    const BEGIN: &str = "-----BEGIN CERTIFICATE-----";
    const END: &str = "-----END CERTIFICATE-----";

    let text = String::from_utf8_lossy(pem);
    let mut certs = Vec::new();
    let mut block = String::new();
    let mut inside = false;

    for line in text.lines() {
        if line.starts_with(BEGIN) {
            inside = true;
            block.clear();
        }
        if inside {
            block.push_str(line);
            block.push('\n');
        }
        if line.starts_with(END) {
            inside = false;
            match native_tls::Certificate::from_pem(block.as_bytes()) {
                Ok(cert) => certs.push(cert),
                Err(e) => warn!(error = %e, "skipping unparseable certificate in bundle"),
            }
        }
    }
    certs
}

#[async_trait]
impl Transport for Connection {
    async fn read_message(&mut self) -> StratumResult<Option<RawMessage>> {
        loop {
            self.line_buf.clear();

            let n = self
                .io
                .read_line(&mut self.line_buf)
                .await
                .map_err(StratumError::Io)?;

            if n == 0 {
                return Ok(None);
            }

            let line = self.line_buf.trim();
            if line.is_empty() {
                continue;
            }

            trace!(rx = %line, "received");
            return parse_line(line).map(Some);
        }
    }

    async fn write_message(&mut self, msg: &Value) -> StratumResult<()> {
        let json = serde_json::to_string(msg)?;
        trace!(tx = %json, "sending");

        self.io.write_all(json.as_bytes()).await?;
        self.io.write_all(b"\n").await?;
        self.io.flush().await?;

        Ok(())
    }
}

/// Channel-backed transport for deterministic testing.
///
/// Carries raw lines rather than parsed frames so the framing path
/// (including malformed-line recovery) is exercised exactly as over TCP.
/// Works with `tokio::time::pause()` since no real I/O is involved.
#[cfg(test)]
pub(crate) struct MockTransport {
    rx: tokio::sync::mpsc::UnboundedReceiver<String>,
    tx: tokio::sync::mpsc::UnboundedSender<String>,
}

/// Test-side handle for a [`MockTransport`].
#[cfg(test)]
pub(crate) struct MockTransportHandle {
    tx: tokio::sync::mpsc::UnboundedSender<String>,
    rx: tokio::sync::mpsc::UnboundedReceiver<String>,
}

#[cfg(test)]
impl MockTransport {
    /// Create a linked (transport, handle) pair.
    pub fn pair() -> (Self, MockTransportHandle) {
        let (client_tx, handle_rx) = tokio::sync::mpsc::unbounded_channel();
        let (handle_tx, client_rx) = tokio::sync::mpsc::unbounded_channel();

        (
            MockTransport {
                rx: client_rx,
                tx: client_tx,
            },
            MockTransportHandle {
                tx: handle_tx,
                rx: handle_rx,
            },
        )
    }
}

#[cfg(test)]
#[async_trait]
impl Transport for MockTransport {
    async fn read_message(&mut self) -> StratumResult<Option<RawMessage>> {
        match self.rx.recv().await {
            Some(line) => parse_line(&line).map(Some),
            None => Ok(None),
        }
    }

    async fn write_message(&mut self, msg: &Value) -> StratumResult<()> {
        self.tx
            .send(serde_json::to_string(msg)?)
            .map_err(|_| StratumError::Disconnected)
    }
}

#[cfg(test)]
impl MockTransportHandle {
    /// Feed a raw line to the session.
    pub fn send_line(&self, line: impl Into<String>) {
        self.tx.send(line.into()).expect("transport dropped");
    }

    /// Feed a JSON frame to the session.
    pub fn send_json(&self, msg: Value) {
        self.send_line(msg.to_string());
    }

    /// Receive the next frame the session wrote.
    pub async fn recv(&mut self) -> Value {
        let line = self.rx.recv().await.expect("transport dropped");
        serde_json::from_str(&line).expect("session wrote invalid json")
    }

    /// Simulate the pool closing the connection.
    pub fn close(self) {}
}
