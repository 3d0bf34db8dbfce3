//! Error types for the HTTP transport layer.

use agora::encoding::EnvelopeError;

/// Errors that can occur during payment header encoding.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    /// The proof could not be wrapped as base64 JSON.
    #[error("envelope error: {0}")]
    Envelope(#[from] EnvelopeError),

    /// The encoded proof is not a legal header value.
    #[error("invalid header value: {0}")]
    HeaderValue(#[from] http::header::InvalidHeaderValue),
}

/// Errors raised by an [`HttpTransport`](crate::transport::HttpTransport).
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The request could not be sent or its body not read.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The request could not be built.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}
