//! Error types for the gateway engine

use thiserror::Error;

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while dispatching DNS queries
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Failed to parse configuration file
    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// DNS wire format error
    #[error("DNS error: {0}")]
    Codec(#[from] veil_dns::Error),

    /// HTTP transport error (connection, TLS, per-attempt timeout)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Malformed JSON envelope
    #[error("malformed JSON envelope: {0}")]
    Json(#[from] serde_json::Error),

    /// Upstream returned a non-success status the transport cannot recover from
    #[error("upstream HTTP error: status {status}: {body}")]
    UpstreamStatus { status: u16, body: String },

    /// Bearer token rejected even after a refresh
    #[error("unauthorized: token rejected by upstream")]
    Unauthorized,

    /// Recoverable statuses kept failing until the retry budget ran out
    #[error("retry budget exhausted after {0} attempts")]
    RetriesExhausted(usize),

    /// Security association could not be established with the proxy
    #[error("SA establishment failed: {0}")]
    SaCreation(String),

    /// Ciphertext shorter than the AEAD nonce prefix
    #[error("truncated ciphertext: {0} octets")]
    TruncatedCiphertext(usize),

    /// Encryption or decryption failure
    #[error("crypto error: {0}")]
    Crypto(String),

    /// Proxy certificate could not be parsed or used
    #[error("certificate error: {0}")]
    Certificate(String),

    /// Timed out waiting for a response
    #[error("timeout: {0}")]
    Timeout(String),

    /// Passthrough queries must carry exactly one question
    #[error("passthrough query carries {0} questions")]
    MultiQuestionPassthrough(usize),
}

impl Error {
    /// Check if this is a recoverable error
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Timeout(_) | Error::Http(_) | Error::RetriesExhausted(_)
        )
    }
}
