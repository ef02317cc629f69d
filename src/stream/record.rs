//! Ingestion of a published stream into a scratch file, and finalization
//! into the container file.

use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use streamvault_common::paths::RecordPaths;
use streamvault_common::PublishingType;
use streamvault_media::flv::{self, FlvTag};
use streamvault_media::{AmfValue, KeyframeIndex, StreamMetadata};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

use super::state::{MetadataSlot, SessionClock};
use super::{Result, SessionError};

/// Result of [`RecordController::finalize`].
#[derive(Debug, Clone, PartialEq)]
pub enum FinalizeOutcome {
    /// Nothing was recorded; no container file was written.
    Skipped,
    Written {
        path: PathBuf,
        bytes: u64,
        keyframes: usize,
        duration_secs: f64,
    },
    /// Finalization failed; the container file may be missing or partial.
    Failed,
}

/// Records one publish into `<base>.data`, then `<base>.<ext>` at teardown.
pub struct RecordController {
    stream_name: String,
    publishing_type: PublishingType,
    paths: RecordPaths,
    scratch: BufWriter<File>,
    write_offset: u64,
    keyframes: KeyframeIndex,
    /// Highest timestamp ingested; the recording's duration.
    ingest_clock: u32,
    units_written: u64,
    has_audio: bool,
    has_video: bool,
    poisoned: bool,
    clock: Arc<SessionClock>,
    metadata: Arc<MetadataSlot>,
}

impl RecordController {
    /// Create or truncate the scratch file and reset the live metadata.
    pub async fn start(
        stream_name: &str,
        publishing_type: PublishingType,
        paths: RecordPaths,
        clock: Arc<SessionClock>,
        metadata: Arc<MetadataSlot>,
    ) -> Result<Self> {
        let file = File::create(paths.scratch.as_path()).await?;
        metadata.clear();

        tracing::info!(
            stream = %stream_name,
            publishing_type = %publishing_type,
            scratch = %paths.scratch.as_path().display(),
            "Recording started"
        );

        Ok(Self {
            stream_name: stream_name.to_string(),
            publishing_type,
            paths,
            scratch: BufWriter::new(file),
            write_offset: 0,
            keyframes: KeyframeIndex::new(),
            ingest_clock: 0,
            units_written: 0,
            has_audio: false,
            has_video: false,
            poisoned: false,
            clock,
            metadata,
        })
    }

    pub fn stream_name(&self) -> &str {
        &self.stream_name
    }

    pub fn publishing_type(&self) -> PublishingType {
        self.publishing_type
    }

    /// Scratch-relative keyframe index built so far.
    pub fn keyframes(&self) -> &KeyframeIndex {
        &self.keyframes
    }

    /// Bytes appended to the scratch file so far.
    pub fn write_offset(&self) -> u64 {
        self.write_offset
    }

    pub fn has_recorded(&self) -> bool {
        self.units_written > 0
    }

    pub async fn handle_audio(&mut self, timestamp: u32, payload: Bytes) -> Result<()> {
        self.observe(timestamp);
        self.has_audio = true;
        self.append(FlvTag::audio(timestamp, payload)).await
    }

    pub async fn handle_video(&mut self, timestamp: u32, payload: Bytes) -> Result<()> {
        self.observe(timestamp);
        self.has_video = true;
        let tag = FlvTag::video(timestamp, payload);
        if tag.is_key_frame() {
            self.keyframes
                .push(timestamp as f64 / 1000.0, self.write_offset);
        }
        self.append(tag).await
    }

    /// Replace the live metadata with an inbound `@setDataFrame` message.
    pub fn handle_metadata(&mut self, values: &[AmfValue]) -> Result<()> {
        let rest = match values.split_first() {
            Some((AmfValue::String(_), rest)) => rest,
            _ => return Err(SessionError::ingestion("data message without command name")),
        };
        let metadata = StreamMetadata::from_data_values(rest)
            .ok_or_else(|| SessionError::ingestion("data message without metadata object"))?;
        let version = self.metadata.replace(metadata);
        tracing::debug!(stream = %self.stream_name, version, "Metadata replaced");
        Ok(())
    }

    fn observe(&mut self, timestamp: u32) {
        self.ingest_clock = self.ingest_clock.max(timestamp);
        self.clock.advance(timestamp);
    }

    async fn append(&mut self, tag: FlvTag) -> Result<()> {
        if self.poisoned {
            return Err(SessionError::ingestion("scratch file is out of sync"));
        }
        let bytes = match tag.mux() {
            Ok(bytes) => bytes,
            Err(e) => {
                self.poisoned = true;
                return Err(SessionError::ingestion(e.to_string()));
            }
        };
        if let Err(e) = self.scratch.write_all(&bytes).await {
            self.poisoned = true;
            return Err(SessionError::ingestion(format!(
                "write to {} failed: {e}",
                self.paths.scratch.as_path().display()
            )));
        }
        self.write_offset += bytes.len() as u64;
        self.units_written += 1;
        Ok(())
    }

    /// Write the container file from the scratch file. Runs once: it
    /// consumes the controller. Failures are logged and reported as
    /// [`FinalizeOutcome::Failed`], never returned.
    pub async fn finalize(self) -> FinalizeOutcome {
        let stream = self.stream_name.clone();
        let final_path = self.paths.final_file.as_path().to_path_buf();

        if self.poisoned {
            tracing::warn!(
                stream = %stream,
                scratch = %self.paths.scratch.as_path().display(),
                "Skipping finalize of a recording whose ingestion failed"
            );
            return FinalizeOutcome::Failed;
        }

        if !self.has_recorded() {
            let scratch = self.paths.scratch.as_path().to_path_buf();
            drop(self.scratch);
            if let Err(e) = tokio::fs::remove_file(&scratch).await {
                if e.kind() != ErrorKind::NotFound {
                    tracing::warn!(scratch = %scratch.display(), "Failed to remove empty scratch file: {}", e);
                }
            }
            tracing::debug!(stream = %stream, "Nothing recorded, finalize skipped");
            return FinalizeOutcome::Skipped;
        }

        match self.write_final().await {
            Ok(outcome) => {
                tracing::info!(stream = %stream, ?outcome, "Recording finalized");
                outcome
            }
            Err(e) => {
                tracing::error!(
                    stream = %stream,
                    path = %final_path.display(),
                    "Failed to finalize recording: {}",
                    e
                );
                FinalizeOutcome::Failed
            }
        }
    }

    async fn write_final(mut self) -> Result<FinalizeOutcome> {
        self.scratch.flush().await?;
        drop(self.scratch);

        let final_path = self.paths.final_file.as_path().to_path_buf();
        let scratch_path = self.paths.scratch.as_path().to_path_buf();

        let header = flv::write_header(self.has_audio, self.has_video);
        let duration_secs = self.ingest_clock as f64 / 1000.0;
        let base = self
            .metadata
            .snapshot()
            .map(|m| (*m).clone())
            .unwrap_or_default()
            .with_duration(duration_secs);

        // Numbers are fixed width in AMF0, so the tag length does not depend
        // on the offsets it carries.
        let tag_len = base
            .clone()
            .with_keyframes(self.keyframes.clone())
            .to_tag(0)
            .encoded_len();
        let delta = header.len() as u64 + tag_len as u64;
        let metadata = base.with_keyframes(self.keyframes.rebased(delta));
        let tag = metadata.to_tag(0).mux()?;
        debug_assert_eq!(tag.len(), tag_len);

        let mut out = BufWriter::new(File::create(&final_path).await?);
        out.write_all(&header).await?;
        out.write_all(&tag).await?;
        let mut scratch = File::open(&scratch_path).await?;
        let copied = tokio::io::copy(&mut scratch, &mut out).await?;
        out.flush().await?;
        out.get_ref().sync_all().await?;
        drop(scratch);

        tokio::fs::remove_file(&scratch_path).await?;

        Ok(FinalizeOutcome::Written {
            path: final_path,
            bytes: delta + copied,
            keyframes: self.keyframes.len(),
            duration_secs,
        })
    }
}
