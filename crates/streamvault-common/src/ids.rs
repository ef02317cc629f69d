//! Typed numeric identifiers.
//!
//! Message streams and output channels are both small integers on the wire;
//! the newtypes keep a channel from being passed where a stream is expected.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a message stream (one per stream session) on a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamId(u32);

impl StreamId {
    /// Wrap a raw stream id.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// The raw numeric value.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl From<u32> for StreamId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of an outbound channel (chunk stream) created by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(u32);

impl ChannelId {
    /// Wrap a raw channel id.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// The raw numeric value.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl From<u32> for ChannelId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_id_roundtrip() {
        let id = StreamId::from(7);
        assert_eq!(id.get(), 7);
        assert_eq!(id.to_string(), "7");
    }

    #[test]
    fn test_ids_order_numerically() {
        assert!(StreamId::new(1) < StreamId::new(2));
        assert!(ChannelId::new(3) > ChannelId::new(2));
    }

    #[test]
    fn test_serde_transparent() {
        let id = ChannelId::new(5);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "5");
    }
}
