//! Error types for the Stratum session.

use thiserror::Error;

/// Stratum session errors.
///
/// `Frame` is the only locally recoverable kind: the session logs it and
/// keeps reading. Everything else tears the session down and lets the pool
/// manager apply its retry policy.
#[derive(Error, Debug)]
pub enum StratumError {
    /// Network I/O error
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error on an outgoing message
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// DNS resolution failed
    #[error("could not resolve {host}: {reason}")]
    Resolve { host: String, reason: String },

    /// All candidate addresses failed to connect
    #[error("connection failed: {0}")]
    Connect(String),

    /// TLS setup failed (context construction, not per-address handshake)
    #[error("tls error: {0}")]
    Tls(String),

    /// No `mining.notify` within the work timeout
    #[error("no new work received in {0} seconds")]
    WorkTimeout(u64),

    /// No acknowledgment of a submitted solution within the response timeout
    #[error("no response received in {0} seconds")]
    ResponseTimeout(u64),

    /// Pool sent a response that violates the JSON-RPC rules it claims
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// One malformed JSON line; the session continues
    #[error("malformed frame: {0}")]
    Frame(String),

    /// Pool refused the subscription handshake
    #[error("subscription failed: {0}")]
    SubscribeFailed(String),

    /// Pool refused worker authorization
    #[error("authorization failed: {0}")]
    AuthorizeFailed(String),

    /// Connection closed by the pool
    #[error("connection closed")]
    Disconnected,
}

/// Convenient Result type for session operations.
pub type StratumResult<T> = Result<T, StratumError>;
