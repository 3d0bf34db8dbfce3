//! Base64 transport encoding for payment headers.
//!
//! Payment requirements, payment proofs and settlement receipts travel in HTTP
//! headers as base64-wrapped JSON. [`Base64Bytes`] holds the encoded form and
//! the `*_json` helpers move typed values in and out of it.

use std::fmt::{self, Display, Formatter};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as b64;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Errors produced while unwrapping a base64 JSON header value.
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    /// The header value is not valid base64.
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    /// The decoded bytes are not the expected JSON document.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Base64-encoded bytes as they appear on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Base64Bytes(pub Vec<u8>);

impl Base64Bytes {
    /// Decodes the base64 text back into raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the data is not valid base64.
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        b64.decode(self.0.trim_ascii())
    }

    /// Encodes raw bytes into base64 text.
    pub fn encode<T: AsRef<[u8]>>(input: T) -> Self {
        Self(b64.encode(input.as_ref()).into_bytes())
    }

    /// Serializes `value` as JSON and wraps it in base64.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::Json`] if `value` cannot be serialized.
    pub fn encode_json<T: Serialize + ?Sized>(value: &T) -> Result<Self, EnvelopeError> {
        let json = serde_json::to_vec(value)?;
        Ok(Self::encode(json))
    }

    /// Unwraps the base64 text and parses the JSON inside it.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError`] if either layer is malformed.
    pub fn decode_json<T: DeserializeOwned>(&self) -> Result<T, EnvelopeError> {
        let bytes = self.decode()?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

impl AsRef<[u8]> for Base64Bytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<&[u8]> for Base64Bytes {
    fn from(slice: &[u8]) -> Self {
        Self(slice.to_vec())
    }
}

impl From<&str> for Base64Bytes {
    fn from(value: &str) -> Self {
        Self(value.as_bytes().to_vec())
    }
}

impl Display for Base64Bytes {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}
