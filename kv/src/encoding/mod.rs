use std::fmt;

use crate::error::Error;

pub mod hex_codec;

pub use hex_codec::HexCodec;

/// Errors that can occur during encoding/decoding operations.
#[derive(Debug, Clone, PartialEq)]
pub enum EncodingError {
    DecodingFailed(String),
}

impl fmt::Display for EncodingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodingError::DecodingFailed(msg) => write!(f, "decoding operation failed: {}", msg),
        }
    }
}

impl std::error::Error for EncodingError {}

impl From<EncodingError> for Error {
    fn from(err: EncodingError) -> Self {
        Error::Internal(err.to_string())
    }
}

/// Trait for data encoding/decoding implementations.
pub trait DataCodec: Send + Sync {
    /// Encode raw bytes into a string representation.
    fn encode(&self, data: &[u8]) -> Result<String, EncodingError>;

    /// Decode string representation back to raw bytes.
    fn decode(&self, encoded: &str) -> Result<Vec<u8>, EncodingError>;

    /// Check if the given string can be decoded by this codec.
    fn can_decode(&self, data: &str) -> bool;

    /// Get the name of this encoding format.
    fn format_name(&self) -> &'static str;
}
