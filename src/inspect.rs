//! Offline inspection of finalized recordings.

use serde::Serialize;
use std::path::{Path, PathBuf};
use streamvault_media::flv::TagKind;
use streamvault_media::{AmfValue, FlvDemuxer, KeyframeIndex, Result, StreamMetadata};
use tokio::fs::File;
use tokio::io::BufReader;

/// Summary of a container file.
#[derive(Debug, Clone, Serialize)]
pub struct RecordingReport {
    pub path: PathBuf,
    pub file_size: u64,
    pub has_audio: bool,
    pub has_video: bool,
    /// `duration` from the leading metadata tag, in seconds.
    pub duration_secs: Option<f64>,
    /// Highest tag timestamp in the file.
    pub last_timestamp_ms: u32,
    pub audio_tags: u64,
    pub video_tags: u64,
    pub key_frames: u64,
    pub script_tags: u64,
    pub keyframes: Vec<KeyframeEntry>,
    /// Raw properties of the leading metadata tag.
    pub metadata: Option<AmfValue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct KeyframeEntry {
    pub time_secs: f64,
    pub position: u64,
}

/// An index entry that does not point at a matching video key frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyframeMismatch {
    pub entry: KeyframeEntry,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct KeyframeCheck {
    pub checked: usize,
    pub mismatches: Vec<KeyframeMismatch>,
}

impl KeyframeCheck {
    pub fn is_ok(&self) -> bool {
        self.mismatches.is_empty()
    }
}

async fn open(path: &Path) -> Result<(FlvDemuxer<BufReader<File>>, streamvault_media::FlvHeader)> {
    let file = File::open(path).await?;
    FlvDemuxer::open(BufReader::new(file)).await
}

/// Walk every tag of `path` and summarize it.
pub async fn inspect_file(path: &Path) -> Result<RecordingReport> {
    let (mut demuxer, header) = open(path).await?;
    let mut report = RecordingReport {
        path: path.to_path_buf(),
        file_size: demuxer.len(),
        has_audio: header.has_audio,
        has_video: header.has_video,
        duration_secs: None,
        last_timestamp_ms: 0,
        audio_tags: 0,
        video_tags: 0,
        key_frames: 0,
        script_tags: 0,
        keyframes: Vec::new(),
        metadata: None,
    };

    let mut first = true;
    while let Some(tag) = demuxer.next_tag().await? {
        report.last_timestamp_ms = report.last_timestamp_ms.max(tag.timestamp);
        match tag.kind {
            TagKind::Audio => report.audio_tags += 1,
            TagKind::Video => {
                report.video_tags += 1;
                if tag.is_key_frame() {
                    report.key_frames += 1;
                }
            }
            TagKind::Script => {
                report.script_tags += 1;
                if first {
                    let values = tag.script_values()?;
                    if let Some(metadata) = StreamMetadata::from_data_values(&values) {
                        report.duration_secs = metadata.duration;
                        report.keyframes = entries(metadata.keyframes.as_ref());
                        report.metadata = Some(metadata.to_amf());
                    }
                }
            }
        }
        first = false;
    }

    tracing::debug!(path = %path.display(), tags = report.audio_tags + report.video_tags + report.script_tags, "Inspected recording");
    Ok(report)
}

/// Check that every entry of the leading keyframe index points at the start
/// of a video key-frame tag with a matching timestamp.
pub async fn verify_keyframes(path: &Path) -> Result<KeyframeCheck> {
    let (mut demuxer, _) = open(path).await?;
    let index = match demuxer.next_tag().await? {
        Some(tag) if tag.kind == TagKind::Script => {
            StreamMetadata::from_data_values(&tag.script_values()?).and_then(|m| m.keyframes)
        }
        _ => None,
    };
    let Some(index) = index else {
        return Ok(KeyframeCheck::default());
    };

    let mut check = KeyframeCheck {
        checked: index.len(),
        mismatches: Vec::new(),
    };
    for entry in entries(Some(&index)) {
        if let Some(reason) = check_entry(&mut demuxer, entry).await {
            check.mismatches.push(KeyframeMismatch { entry, reason });
        }
    }
    Ok(check)
}

async fn check_entry(demuxer: &mut FlvDemuxer<BufReader<File>>, entry: KeyframeEntry) -> Option<String> {
    if entry.position < demuxer.first_tag_offset() || entry.position >= demuxer.len() {
        return Some(format!("offset outside file of {} bytes", demuxer.len()));
    }
    if let Err(e) = demuxer.seek(entry.position).await {
        return Some(e.to_string());
    }
    let tag = match demuxer.next_tag().await {
        Ok(Some(tag)) => tag,
        Ok(None) => return Some("no tag at offset".to_string()),
        Err(e) => return Some(e.to_string()),
    };
    if tag.kind != TagKind::Video {
        return Some(format!("{:?} tag at offset", tag.kind));
    }
    if !tag.is_key_frame() {
        return Some(format!("{:?} video frame at offset", tag.frame_type()));
    }
    let expected_ms = (entry.time_secs * 1000.0).round();
    if (tag.timestamp as f64 - expected_ms).abs() > 1.0 {
        return Some(format!("tag timestamp {} ms, index time {} s", tag.timestamp, entry.time_secs));
    }
    None
}

fn entries(index: Option<&KeyframeIndex>) -> Vec<KeyframeEntry> {
    index
        .map(|index| {
            index
                .iter()
                .map(|(time_secs, position)| KeyframeEntry { time_secs, position })
                .collect()
        })
        .unwrap_or_default()
}
