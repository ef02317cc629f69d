//! Timed playback of a finalized recording.
//!
//! Exactly one read loop runs per session. The loop holds the playback
//! source lock for its whole lifetime, so the source mutex doubles as the
//! single-flight lock. Seek and pause-resume restart the loop: the running
//! loop is cancelled, its task is awaited to completion, and only then is a
//! new loop spawned. Commands are serialized by a separate control lock so a
//! racing seek and pause cannot both observe an idle controller.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use streamvault_common::paths::FinalPath;
use streamvault_common::{ChannelId, StreamId};
use streamvault_media::flv::{FlvTag, TagKind};
use streamvault_media::metadata::SET_DATA_FRAME;
use streamvault_media::{AmfValue, FlvDemuxer, StreamMetadata};
use tokio::fs::File;
use tokio::io::BufReader;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::state::{MetadataSlot, SessionClock};
use super::{Result, SessionError, StatusEnvelope};
use crate::transport::{ControlMessage, OutboundMessage, Transport};

type Source = FlvDemuxer<BufReader<File>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Playing,
}

/// Counters describing the loops run by a controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaybackStats {
    pub loops_started: u64,
    /// Most loops ever observed running at the same time.
    pub peak_concurrent: usize,
}

/// Why a read loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopOutcome {
    EndOfFile,
    Cancelled,
    DurationReached,
}

struct PlaySource {
    demuxer: Source,
    audio_channel: ChannelId,
    video_channel: ChannelId,
    /// Units after this timestamp end playback.
    end_ms: Option<u32>,
}

struct RunningLoop {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

struct Shared {
    stream_id: StreamId,
    transport: Arc<dyn Transport>,
    control_channel: ChannelId,
    clock: Arc<SessionClock>,
    metadata: Arc<MetadataSlot>,
    buffer_ms: watch::Receiver<Option<u32>>,
    source: Arc<Mutex<Option<PlaySource>>>,
    active: AtomicUsize,
    peak: AtomicUsize,
    loops_started: AtomicU64,
}

/// Play / seek / pause state machine of one stream session.
pub struct PlaybackController {
    shared: Arc<Shared>,
    running: Mutex<Option<RunningLoop>>,
}

impl PlaybackController {
    pub fn new(
        stream_id: StreamId,
        transport: Arc<dyn Transport>,
        control_channel: ChannelId,
        clock: Arc<SessionClock>,
        metadata: Arc<MetadataSlot>,
        buffer_ms: watch::Receiver<Option<u32>>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                stream_id,
                transport,
                control_channel,
                clock,
                metadata,
                buffer_ms,
                source: Arc::new(Mutex::new(None)),
                active: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                loops_started: AtomicU64::new(0),
            }),
            running: Mutex::new(None),
        }
    }

    pub fn state(&self) -> PlaybackState {
        if self.shared.active.load(Ordering::Acquire) > 0 {
            PlaybackState::Playing
        } else {
            PlaybackState::Idle
        }
    }

    pub fn stats(&self) -> PlaybackStats {
        PlaybackStats {
            loops_started: self.shared.loops_started.load(Ordering::Acquire),
            peak_concurrent: self.shared.peak.load(Ordering::Acquire),
        }
    }

    /// Open `path`, announce playback and start the loop at `start_ms`.
    pub async fn play(
        &self,
        stream_name: &str,
        path: &FinalPath,
        start_ms: u32,
        duration_ms: Option<u32>,
        window_ack_size: u32,
    ) -> Result<()> {
        let mut running = self.running.lock().await;
        stop(&mut running).await;

        let opened = async {
            let file = File::open(path.as_path()).await?;
            Ok::<_, SessionError>(FlvDemuxer::open(BufReader::new(file)).await?)
        };
        let (mut demuxer, header) = match opened.await {
            Ok(opened) => opened,
            Err(e) => {
                // Seek or unpause must not resume the previous file.
                self.release_source().await;
                return Err(e);
            }
        };
        let leading = self.prime_metadata(&mut demuxer).await;

        let transport = &self.shared.transport;
        let control = self.shared.control_channel;
        transport
            .send_message(control, OutboundMessage::Status(StatusEnvelope::play_reset(stream_name)))
            .await?;
        transport
            .send_message(control, OutboundMessage::Status(StatusEnvelope::play_start(stream_name)))
            .await?;
        transport
            .send_control_message(ControlMessage::WindowAcknowledgementSize {
                window_size: window_ack_size,
            })
            .await?;
        if let Some(metadata) = leading {
            transport
                .send_message(control, OutboundMessage::DataFrame {
                    timestamp: 0,
                    values: metadata.data_frame_values(),
                })
                .await?;
        }

        let source = PlaySource {
            demuxer,
            video_channel: transport.create_channel(),
            audio_channel: transport.create_channel(),
            end_ms: duration_ms.map(|d| start_ms.saturating_add(d)),
        };
        *self.shared.source.lock().await = Some(source);

        tracing::info!(
            stream_id = %self.shared.stream_id,
            stream = %stream_name,
            path = %path.as_path().display(),
            has_audio = header.has_audio,
            has_video = header.has_video,
            start_ms,
            "Playback opened"
        );

        *running = Some(self.spawn_loop(start_ms));
        Ok(())
    }

    /// Restart the loop at `ms`.
    pub async fn seek(&self, ms: u32) -> Result<()> {
        let mut running = self.running.lock().await;
        self.ensure_open(&running).await?;

        stop(&mut running).await;
        self.send_status(StatusEnvelope::seek_notify()).await?;
        *running = Some(self.spawn_loop(ms));
        tracing::debug!(stream_id = %self.shared.stream_id, ms, "Seek");
        Ok(())
    }

    /// Stop the loop, or restart it at `ms` when resuming.
    pub async fn pause(&self, is_pause: bool, ms: u32) -> Result<()> {
        let mut running = self.running.lock().await;
        self.ensure_open(&running).await?;

        stop(&mut running).await;
        if is_pause {
            self.send_status(StatusEnvelope::pause_notify()).await?;
        } else {
            self.send_status(StatusEnvelope::unpause_notify()).await?;
            *running = Some(self.spawn_loop(ms));
        }
        tracing::debug!(stream_id = %self.shared.stream_id, is_pause, ms, "Pause");
        Ok(())
    }

    /// Wait until the current loop, if any, has finished on its own.
    pub async fn wait_idle(&self) {
        let mut running = self.running.lock().await;
        if let Some(current) = running.take() {
            join(current.task).await;
        }
    }

    /// Stop the loop and release the playback file.
    pub async fn close(&self) {
        let mut running = self.running.lock().await;
        stop(&mut running).await;
        self.release_source().await;
    }

    async fn release_source(&self) {
        if self.shared.source.lock().await.take().is_some() {
            tracing::debug!(stream_id = %self.shared.stream_id, "Playback file released");
        }
    }

    async fn is_open(&self) -> bool {
        self.shared.source.lock().await.is_some()
    }

    async fn ensure_open(&self, running: &Option<RunningLoop>) -> Result<()> {
        // A live loop holds the source lock for its whole run; a spawned
        // loop implies the file is open.
        if running.is_some() || self.is_open().await {
            Ok(())
        } else {
            Err(SessionError::NotPlaying)
        }
    }

    async fn send_status(&self, status: StatusEnvelope) -> Result<()> {
        self.shared
            .transport
            .send_message(self.shared.control_channel, OutboundMessage::Status(status))
            .await?;
        Ok(())
    }

    /// Install the file's leading metadata as the live metadata so the first
    /// seek can use its index. A file without one clears the live metadata,
    /// and seeks fall back to scanning.
    async fn prime_metadata(&self, demuxer: &mut Source) -> Option<StreamMetadata> {
        let leading = self.read_leading_metadata(demuxer).await;
        match &leading {
            Some(metadata) => {
                self.shared.metadata.replace(metadata.clone());
            }
            None => {
                self.shared.metadata.clear();
            }
        }
        leading
    }

    async fn read_leading_metadata(&self, demuxer: &mut Source) -> Option<StreamMetadata> {
        let probe = async {
            let tag = demuxer.next_tag().await?;
            demuxer.rewind().await?;
            Ok::<_, streamvault_media::Error>(tag)
        };
        let tag = match probe.await {
            Ok(Some(tag)) if tag.kind == TagKind::Script => tag,
            Ok(_) => return None,
            Err(e) => {
                tracing::warn!(stream_id = %self.shared.stream_id, "Failed to read leading metadata: {}", e);
                return None;
            }
        };
        let values = tag.script_values().ok()?;
        StreamMetadata::from_data_values(&values)
    }

    fn spawn_loop(&self, start_ms: u32) -> RunningLoop {
        let cancel = CancellationToken::new();
        let shared = self.shared.clone();
        let token = cancel.clone();
        let task = tokio::spawn(async move { shared.seek_and_play(start_ms, token).await });
        RunningLoop { cancel, task }
    }
}

/// Cancel the running loop and wait for it to release the source lock.
async fn stop(running: &mut Option<RunningLoop>) {
    if let Some(current) = running.take() {
        current.cancel.cancel();
        join(current.task).await;
    }
}

async fn join(task: JoinHandle<()>) {
    if let Err(e) = task.await {
        if e.is_panic() {
            tracing::error!("Playback loop panicked: {}", e);
        }
    }
}

/// Prefix script values with the `@setDataFrame` directive.
fn data_frame(values: Vec<AmfValue>) -> Vec<AmfValue> {
    let mut frame = Vec::with_capacity(values.len() + 1);
    frame.push(AmfValue::string(SET_DATA_FRAME));
    frame.extend(values);
    frame
}

/// Decrements the active-loop count when the loop exits by any path.
struct ActiveLoop<'a>(&'a Shared);

impl<'a> ActiveLoop<'a> {
    fn enter(shared: &'a Shared) -> Self {
        let now = shared.active.fetch_add(1, Ordering::AcqRel) + 1;
        shared.peak.fetch_max(now, Ordering::AcqRel);
        shared.loops_started.fetch_add(1, Ordering::AcqRel);
        Self(shared)
    }
}

impl Drop for ActiveLoop<'_> {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::AcqRel);
    }
}

impl Shared {
    async fn seek_and_play(self: Arc<Self>, start_ms: u32, cancel: CancellationToken) {
        let mut guard = self.source.clone().lock_owned().await;
        let _active = ActiveLoop::enter(&self);

        let Some(source) = guard.as_mut() else {
            return;
        };
        match self.run(source, start_ms, &cancel).await {
            Ok(outcome) => {
                tracing::debug!(stream_id = %self.stream_id, start_ms, ?outcome, "Playback loop finished");
            }
            Err(e) => {
                tracing::warn!(stream_id = %self.stream_id, start_ms, "Playback loop stopped: {}", e);
            }
        }
    }

    async fn run(
        &self,
        source: &mut PlaySource,
        start_ms: u32,
        cancel: &CancellationToken,
    ) -> Result<LoopOutcome> {
        let index = self.metadata.snapshot().and_then(|m| m.keyframes.clone());
        let position = source.demuxer.locate(start_ms, index.as_ref()).await?;
        tracing::trace!(stream_id = %self.stream_id, start_ms, position, "Located seek point");

        let started = Instant::now();
        let mut buffer_ms = self.buffer_ms.clone();
        let mut dispatched: Option<u32> = None;

        loop {
            if cancel.is_cancelled() {
                return Ok(LoopOutcome::Cancelled);
            }
            if source.demuxer.is_eof() {
                return Ok(LoopOutcome::EndOfFile);
            }

            // Backpressure: hold off while the last dispatched unit is at
            // least one buffer length ahead of real time.
            let cap = *buffer_ms.borrow_and_update();
            if let (Some(cap), Some(last)) = (cap, dispatched) {
                let lead = last as i64 - start_ms as i64 - cap as i64;
                let elapsed = started.elapsed().as_millis() as i64;
                if lead >= elapsed {
                    let wake_at = started + Duration::from_millis((lead + 1) as u64);
                    tokio::select! {
                        _ = cancel.cancelled() => return Ok(LoopOutcome::Cancelled),
                        _ = tokio::time::sleep_until(wake_at) => {}
                        Ok(()) = buffer_ms.changed() => {}
                    }
                    continue;
                }
            }

            let tag = match source.demuxer.next_tag().await {
                Ok(Some(tag)) => tag,
                Ok(None) => return Ok(LoopOutcome::EndOfFile),
                Err(e) => {
                    tracing::warn!(
                        stream_id = %self.stream_id,
                        position = source.demuxer.position(),
                        "Unreadable unit, ending playback: {}",
                        e
                    );
                    return Ok(LoopOutcome::EndOfFile);
                }
            };
            if source.end_ms.is_some_and(|end| tag.timestamp > end) {
                return Ok(LoopOutcome::DurationReached);
            }

            let timestamp = tag.timestamp;
            self.dispatch(source, tag).await?;
            self.clock.advance(timestamp);
            dispatched = Some(dispatched.map_or(timestamp, |d| d.max(timestamp)));
        }
    }

    async fn dispatch(&self, source: &PlaySource, tag: FlvTag) -> Result<()> {
        match tag.kind {
            TagKind::Audio => {
                self.transport
                    .send_message(source.audio_channel, OutboundMessage::Audio(tag))
                    .await?
            }
            TagKind::Video => {
                self.transport
                    .send_message(source.video_channel, OutboundMessage::Video(tag))
                    .await?
            }
            TagKind::Script => {
                let values = tag.script_values()?;
                if let Some(metadata) = StreamMetadata::from_data_values(&values) {
                    self.metadata.replace(metadata);
                }
                self.transport
                    .send_message(
                        self.control_channel,
                        OutboundMessage::DataFrame {
                            timestamp: tag.timestamp,
                            values: data_frame(values),
                        },
                    )
                    .await?
            }
        }
        Ok(())
    }
}
