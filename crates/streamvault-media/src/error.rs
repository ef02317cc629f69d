//! Error types for streamvault-media.

use std::io;
use thiserror::Error;

/// Result type for streamvault-media operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for streamvault-media operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Invalid FLV file structure.
    #[error("Invalid FLV: {0}")]
    InvalidFlv(String),

    /// Malformed AMF0 value.
    #[error("Invalid AMF: {0}")]
    InvalidAmf(String),

    /// Unsupported feature or value type.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// The source ended in the middle of a tag.
    #[error("Truncated tag at offset {offset}")]
    Truncated { offset: u64 },

    /// Buffer too small for operation.
    #[error("Buffer underflow: need {need} bytes, have {have}")]
    BufferUnderflow { need: usize, have: usize },

    /// Tag payload does not fit the 24-bit size field.
    #[error("Payload of {size} bytes exceeds the FLV tag limit")]
    PayloadTooLarge { size: usize },
}

impl Error {
    /// Create an invalid FLV error.
    pub fn invalid_flv(msg: impl Into<String>) -> Self {
        Self::InvalidFlv(msg.into())
    }

    /// Create an invalid AMF error.
    pub fn invalid_amf(msg: impl Into<String>) -> Self {
        Self::InvalidAmf(msg.into())
    }

    /// Create an unsupported error.
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }
}
