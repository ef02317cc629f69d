//! Shared test harness for integration tests.
//!
//! Provides [`FakeTransport`], which records every control message and
//! channel message a session sends, and [`TestHarness`], which pairs it with
//! a temporary record directory.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use streamvault::stream::{FinalizeOutcome, SessionSettings, StreamSession};
use streamvault::transport::{
    ControlMessage, InboundMessage, OutboundMessage, Transport, TransportError,
};
use streamvault_common::paths::RecordStore;
use streamvault_common::{ChannelId, StreamId};
use streamvault_media::TagKind;
use tempfile::TempDir;
use tokio::time::Instant;

/// One message handed to the transport.
#[derive(Debug, Clone)]
pub enum Sent {
    Control(ControlMessage),
    Message {
        channel: ChannelId,
        msg: OutboundMessage,
        at: Instant,
    },
}

/// An audio or video unit written to a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dispatched {
    pub kind: TagKind,
    pub timestamp: u32,
    pub key_frame: bool,
    pub channel: ChannelId,
    pub at: Instant,
}

/// Transport double that records everything it is asked to send.
pub struct FakeTransport {
    sent: Mutex<Vec<Sent>>,
    next_channel: AtomicU32,
    destroyed: Mutex<Vec<StreamId>>,
    closed: AtomicBool,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            // 0-2 are reserved for protocol control, commands and audio/video
            // defaults on a real connection.
            next_channel: AtomicU32::new(3),
            destroyed: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        })
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().clone()
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
        self.destroyed.lock().clear();
    }

    pub fn controls(&self) -> Vec<ControlMessage> {
        self.sent
            .lock()
            .iter()
            .filter_map(|s| match s {
                Sent::Control(msg) => Some(msg.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn status_codes(&self) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .filter_map(|s| match s {
                Sent::Message {
                    msg: OutboundMessage::Status(status),
                    ..
                } => Some(status.code.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn data_frames(&self) -> Vec<OutboundMessage> {
        self.sent
            .lock()
            .iter()
            .filter_map(|s| match s {
                Sent::Message { msg, .. } if matches!(msg, OutboundMessage::DataFrame { .. }) => {
                    Some(msg.clone())
                }
                _ => None,
            })
            .collect()
    }

    pub fn media(&self) -> Vec<Dispatched> {
        media_of(&self.sent.lock())
    }

    /// Media sent before and after the last status with `code`.
    pub fn split_at_status(&self, code: &str) -> (Vec<Dispatched>, Vec<Dispatched>) {
        let sent = self.sent.lock();
        let at = sent
            .iter()
            .rposition(|s| {
                matches!(s, Sent::Message { msg: OutboundMessage::Status(status), .. } if status.code == code)
            })
            .unwrap_or_else(|| panic!("no {code} status sent"));
        (media_of(&sent[..at]), media_of(&sent[at + 1..]))
    }

    /// Instant the last status with `code` was sent.
    pub fn status_sent_at(&self, code: &str) -> Option<Instant> {
        self.sent.lock().iter().rev().find_map(|s| match s {
            Sent::Message {
                msg: OutboundMessage::Status(status),
                at,
                ..
            } if status.code == code => Some(*at),
            _ => None,
        })
    }

    pub fn destroyed(&self) -> Vec<StreamId> {
        self.destroyed.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

fn media_of(sent: &[Sent]) -> Vec<Dispatched> {
    sent.iter()
        .filter_map(|s| match s {
            Sent::Message {
                channel,
                msg: OutboundMessage::Audio(tag) | OutboundMessage::Video(tag),
                at,
            } => Some(Dispatched {
                kind: tag.kind,
                timestamp: tag.timestamp,
                key_frame: tag.is_key_frame(),
                channel: *channel,
                at: *at,
            }),
            _ => None,
        })
        .collect()
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send_control_message(&self, msg: ControlMessage) -> Result<(), TransportError> {
        self.sent.lock().push(Sent::Control(msg));
        Ok(())
    }

    async fn send_message(&self, channel: ChannelId, msg: OutboundMessage) -> Result<(), TransportError> {
        self.sent.lock().push(Sent::Message {
            channel,
            msg,
            at: Instant::now(),
        });
        Ok(())
    }

    fn create_channel(&self) -> ChannelId {
        ChannelId::new(self.next_channel.fetch_add(1, Ordering::AcqRel))
    }

    fn message_stream_destroying(&self, stream_id: StreamId) {
        self.destroyed.lock().push(stream_id);
    }

    fn close_connection(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

/// A fake transport plus a temporary record directory.
pub struct TestHarness {
    pub dir: TempDir,
    pub transport: Arc<FakeTransport>,
    pub store: RecordStore,
}

impl TestHarness {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::new(dir.path(), "flv");
        Self {
            dir,
            transport: FakeTransport::new(),
            store,
        }
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        self.transport.clone()
    }

    pub fn session(&self, id: u32) -> StreamSession {
        self.session_with(id, SessionSettings::default())
    }

    pub fn session_with(&self, id: u32, settings: SessionSettings) -> StreamSession {
        StreamSession::new(StreamId::new(id), self.transport(), self.store.clone(), settings)
    }

    pub fn final_path(&self, name: &str) -> PathBuf {
        self.store.record_paths(name).unwrap().final_file.as_path().to_path_buf()
    }

    pub fn scratch_path(&self, name: &str) -> PathBuf {
        self.store.record_paths(name).unwrap().scratch.as_path().to_path_buf()
    }

    /// Files currently in the record directory.
    pub fn files(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    /// Publish `units` as `name` on a fresh session and tear it down.
    pub async fn record(&self, name: &str, units: Vec<InboundMessage>) -> FinalizeOutcome {
        let session = self.session(100);
        session.publish(name, "record").await.unwrap();
        for unit in units {
            session.handle_message(unit).await.unwrap();
        }
        let outcome = session.dispose().await.unwrap();
        self.transport.clear();
        outcome
    }
}

pub fn video(timestamp: u32, key_frame: bool) -> InboundMessage {
    let header = if key_frame { 0x17 } else { 0x27 };
    InboundMessage::Video {
        timestamp,
        payload: Bytes::from(vec![header, 0x01, 0x00, 0x00, 0x00, (timestamp & 0xFF) as u8]),
    }
}

pub fn audio(timestamp: u32) -> InboundMessage {
    InboundMessage::Audio {
        timestamp,
        payload: Bytes::from_static(&[0xAF, 0x01, 0x21, 0x10]),
    }
}

/// Video every `step_ms` from 0 to `until_ms` inclusive with a key frame
/// every `key_every_ms`, interleaved with audio.
pub fn av_frames(until_ms: u32, step_ms: u32, key_every_ms: u32) -> Vec<InboundMessage> {
    let mut units = Vec::new();
    let mut ts = 0;
    while ts <= until_ms {
        units.push(video(ts, ts % key_every_ms == 0));
        units.push(audio(ts + 1));
        ts += step_ms;
    }
    units
}
