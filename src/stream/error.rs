//! Session error type.

use crate::transport::TransportError;

/// Result type for stream session operations.
pub type Result<T> = std::result::Result<T, SessionError>;

/// Errors surfaced by stream session commands and ingestion handlers.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// A command was rejected before touching any file.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Appending to the scratch file failed or an inbound unit was malformed.
    /// Fatal: the connection is closed.
    #[error("Ingestion failed: {0}")]
    Ingestion(String),

    /// Seek or pause without an open playback file.
    #[error("Stream is not playing")]
    NotPlaying,

    #[error("Stream is already publishing {0}")]
    AlreadyPublishing(String),

    #[error("Session disposed")]
    Disposed,

    #[error("Media error: {0}")]
    Media(#[from] streamvault_media::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

impl SessionError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn ingestion(msg: impl Into<String>) -> Self {
        Self::Ingestion(msg.into())
    }
}

impl From<streamvault_common::Error> for SessionError {
    fn from(err: streamvault_common::Error) -> Self {
        match err {
            streamvault_common::Error::InvalidInput(msg) => Self::Validation(msg),
            streamvault_common::Error::Io(e) => Self::Io(e),
        }
    }
}
