//! Command surface of one message stream.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use streamvault_common::paths::RecordStore;
use streamvault_common::{ChannelId, PublishingType, StreamId};
use streamvault_media::metadata::{ON_METADATA, SET_DATA_FRAME};
use tokio::sync::{watch, Mutex};

use super::playback::PlaybackController;
use super::record::{FinalizeOutcome, RecordController};
use super::state::{MetadataSlot, SessionClock};
use super::{Result, SessionError, StatusEnvelope};
use crate::transport::{ControlMessage, InboundMessage, OutboundMessage, Transport, UserControlEvent};

/// Per-session knobs taken from the `[publish]` and `[playback]` config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    pub allowed_types: Vec<PublishingType>,
    pub window_ack_size: u32,
    /// Buffer length applied until the client sends its own.
    pub default_buffer_ms: Option<u32>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            allowed_types: PublishingType::ALL.to_vec(),
            window_ack_size: 512_000,
            default_buffer_ms: None,
        }
    }
}

/// Called with the stream id once a session has been disposed.
pub type DestroyHook = Box<dyn Fn(StreamId) + Send + Sync>;

/// One message stream of a connection: publish, play, seek, pause and
/// teardown.
pub struct StreamSession {
    stream_id: StreamId,
    transport: Arc<dyn Transport>,
    store: RecordStore,
    settings: SessionSettings,
    control_channel: ChannelId,
    clock: Arc<SessionClock>,
    metadata: Arc<MetadataSlot>,
    buffer_ms: watch::Sender<Option<u32>>,
    recording: Mutex<Option<RecordController>>,
    playback: PlaybackController,
    disposed: AtomicBool,
    on_destroy: Option<DestroyHook>,
}

impl StreamSession {
    pub fn new(
        stream_id: StreamId,
        transport: Arc<dyn Transport>,
        store: RecordStore,
        settings: SessionSettings,
    ) -> Self {
        let control_channel = transport.create_channel();
        let clock = Arc::new(SessionClock::new());
        let metadata = Arc::new(MetadataSlot::new());
        let (buffer_ms, buffer_rx) = watch::channel(settings.default_buffer_ms);
        let playback = PlaybackController::new(
            stream_id,
            transport.clone(),
            control_channel,
            clock.clone(),
            metadata.clone(),
            buffer_rx,
        );

        Self {
            stream_id,
            transport,
            store,
            settings,
            control_channel,
            clock,
            metadata,
            buffer_ms,
            recording: Mutex::new(None),
            playback,
            disposed: AtomicBool::new(false),
            on_destroy: None,
        }
    }

    /// Run `hook` after disposal, e.g. so the owning connection can free
    /// the stream id.
    pub fn with_destroy_hook(mut self, hook: impl Fn(StreamId) + Send + Sync + 'static) -> Self {
        self.on_destroy = Some(Box::new(hook));
        self
    }

    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    pub fn control_channel(&self) -> ChannelId {
        self.control_channel
    }

    pub fn clock(&self) -> &SessionClock {
        &self.clock
    }

    pub fn metadata(&self) -> &MetadataSlot {
        &self.metadata
    }

    pub fn playback(&self) -> &PlaybackController {
        &self.playback
    }

    /// Client buffer length currently applied to playback.
    pub fn buffer_ms(&self) -> Option<u32> {
        *self.buffer_ms.borrow()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    pub async fn is_publishing(&self) -> bool {
        self.recording.lock().await.is_some()
    }

    /// Start recording `stream_name`.
    ///
    /// The name and publishing type are validated before any file is
    /// created.
    pub async fn publish(&self, stream_name: &str, publishing_type: &str) -> Result<()> {
        self.ensure_live()?;
        let stream_name = stream_name.trim();
        if stream_name.is_empty() {
            return Err(SessionError::validation("stream name is empty"));
        }
        let publishing_type: PublishingType = publishing_type.parse()?;
        if !self.settings.allowed_types.contains(&publishing_type) {
            return Err(SessionError::validation(format!(
                "publishing type {publishing_type} is not allowed"
            )));
        }
        let paths = self.store.record_paths(stream_name)?;

        let mut recording = self.recording.lock().await;
        if let Some(current) = recording.as_ref() {
            return Err(SessionError::AlreadyPublishing(current.stream_name().to_string()));
        }
        self.store.ensure_root()?;
        let controller = RecordController::start(
            stream_name,
            publishing_type,
            paths,
            self.clock.clone(),
            self.metadata.clone(),
        )
        .await?;
        *recording = Some(controller);
        drop(recording);

        self.transport
            .send_control_message(ControlMessage::StreamBegin {
                stream_id: self.stream_id,
            })
            .await?;
        self.transport
            .send_control_message(ControlMessage::StreamIsRecorded {
                stream_id: self.stream_id,
            })
            .await?;
        self.send_status(StatusEnvelope::publish_start(stream_name)).await?;

        tracing::info!(
            stream_id = %self.stream_id,
            stream = %stream_name,
            publishing_type = %publishing_type,
            "Publish started"
        );
        Ok(())
    }

    /// Play the finalized recording of `stream_name`.
    ///
    /// Negative `start` values play from the beginning; a positive
    /// `duration` ends playback once `start + duration` is passed.
    pub async fn play(&self, stream_name: &str, start: i64, duration: i64, reset: bool) -> Result<()> {
        self.ensure_live()?;
        let stream_name = stream_name.trim();
        if stream_name.is_empty() {
            return Err(SessionError::validation("stream name is empty"));
        }
        let paths = self.store.record_paths(stream_name)?;
        let start_ms = clamp_ms(start);
        let duration_ms = (duration > 0).then(|| clamp_ms(duration));

        tracing::debug!(stream_id = %self.stream_id, stream = %stream_name, start_ms, ?duration_ms, reset, "Play");
        self.playback
            .play(
                stream_name,
                &paths.final_file,
                start_ms,
                duration_ms,
                self.settings.window_ack_size,
            )
            .await
    }

    pub async fn seek(&self, ms: i64) -> Result<()> {
        self.ensure_live()?;
        self.playback.seek(clamp_ms(ms)).await
    }

    pub async fn pause(&self, is_pause: bool, ms: i64) -> Result<()> {
        self.ensure_live()?;
        self.playback.pause(is_pause, clamp_ms(ms)).await
    }

    /// Route an inbound message.
    ///
    /// Ingestion failures are fatal: the connection is closed before the
    /// error is returned.
    pub async fn handle_message(&self, msg: InboundMessage) -> Result<()> {
        match msg {
            InboundMessage::UserControl(UserControlEvent::SetBufferLength { stream_id, buffer_ms }) => {
                if stream_id != self.stream_id {
                    tracing::trace!(stream_id = %self.stream_id, target = %stream_id, "Buffer length for another stream");
                    return Ok(());
                }
                self.buffer_ms.send_replace(Some(buffer_ms));
                tracing::debug!(stream_id = %self.stream_id, buffer_ms, "Client buffer length set");
                Ok(())
            }
            InboundMessage::UserControl(UserControlEvent::Other(event)) => {
                tracing::trace!(stream_id = %self.stream_id, event, "Ignoring user control event");
                Ok(())
            }
            msg => self.ingest(msg).await,
        }
    }

    async fn ingest(&self, msg: InboundMessage) -> Result<()> {
        let mut recording = self.recording.lock().await;
        let Some(controller) = recording.as_mut() else {
            tracing::trace!(stream_id = %self.stream_id, "Dropping media unit: not publishing");
            return Ok(());
        };

        let result = match msg {
            InboundMessage::Audio { timestamp, payload } => controller.handle_audio(timestamp, payload).await,
            InboundMessage::Video { timestamp, payload } => controller.handle_video(timestamp, payload).await,
            InboundMessage::Data { values, .. } => match values.first().and_then(|v| v.as_str()) {
                Some(SET_DATA_FRAME) | Some(ON_METADATA) => controller.handle_metadata(&values),
                other => {
                    tracing::debug!(stream_id = %self.stream_id, command = ?other, "Ignoring data message");
                    Ok(())
                }
            },
            InboundMessage::UserControl(_) => Ok(()),
        };

        if let Err(e) = result {
            tracing::error!(stream_id = %self.stream_id, "Ingestion failed, closing connection: {}", e);
            self.transport.close_connection();
            return Err(e);
        }
        Ok(())
    }

    /// Tear the stream down on client request.
    pub async fn delete_stream(&self) -> Option<FinalizeOutcome> {
        tracing::debug!(stream_id = %self.stream_id, "DeleteStream");
        self.dispose().await
    }

    /// Finalize any recording, release the playback file and tell the
    /// connection the stream is gone. Only the first call does anything.
    pub async fn dispose(&self) -> Option<FinalizeOutcome> {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return None;
        }

        let recording = self.recording.lock().await.take();
        let outcome = match recording {
            Some(controller) => Some(controller.finalize().await),
            None => None,
        };
        self.playback.close().await;
        self.transport.message_stream_destroying(self.stream_id);
        if let Some(hook) = &self.on_destroy {
            hook(self.stream_id);
        }

        tracing::info!(stream_id = %self.stream_id, ?outcome, "Stream session disposed");
        outcome
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_disposed() {
            Err(SessionError::Disposed)
        } else {
            Ok(())
        }
    }

    async fn send_status(&self, status: StatusEnvelope) -> Result<()> {
        self.transport
            .send_message(self.control_channel, OutboundMessage::Status(status))
            .await?;
        Ok(())
    }
}

fn clamp_ms(ms: i64) -> u32 {
    ms.clamp(0, u32::MAX as i64) as u32
}
