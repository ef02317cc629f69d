//! Transport collaborator.
//!
//! The handshake, chunking and command decoding live in the connection layer;
//! a stream session only needs to hand it messages and learn about inbound
//! units. [`Transport`] is that seam.

use async_trait::async_trait;
use bytes::Bytes;
use streamvault_common::{ChannelId, StreamId};
use streamvault_media::{AmfValue, FlvTag};

use crate::stream::StatusEnvelope;

/// Protocol control and user-control messages sent on the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    StreamBegin { stream_id: StreamId },
    StreamIsRecorded { stream_id: StreamId },
    WindowAcknowledgementSize { window_size: u32 },
}

/// Messages a session writes to one of its channels.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    Status(StatusEnvelope),
    Audio(FlvTag),
    Video(FlvTag),
    /// Script data re-tagged with `@setDataFrame`.
    DataFrame { timestamp: u32, values: Vec<AmfValue> },
}

/// User-control events relevant to a stream session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserControlEvent {
    SetBufferLength { stream_id: StreamId, buffer_ms: u32 },
    /// Any other event type, by wire id.
    Other(u16),
}

/// Messages the connection routes to a stream session.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Audio { timestamp: u32, payload: Bytes },
    Video { timestamp: u32, payload: Bytes },
    /// Data message values, command name first.
    Data { timestamp: u32, values: Vec<AmfValue> },
    UserControl(UserControlEvent),
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connection closed")]
    Closed,

    #[error("send failed: {0}")]
    Send(String),
}

/// Connection-side operations a stream session depends on.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a protocol control message on the connection's control stream.
    async fn send_control_message(&self, msg: ControlMessage) -> Result<(), TransportError>;

    /// Send a message on one of the session's channels.
    async fn send_message(&self, channel: ChannelId, msg: OutboundMessage) -> Result<(), TransportError>;

    /// Allocate a new outbound channel.
    fn create_channel(&self) -> ChannelId;

    /// The session owning `stream_id` is being torn down.
    fn message_stream_destroying(&self, stream_id: StreamId);

    /// Close the whole connection after a fatal session error.
    fn close_connection(&self);
}
