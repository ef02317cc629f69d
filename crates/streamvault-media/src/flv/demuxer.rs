//! Async FLV tag reader with keyframe seeking.

use std::io::{ErrorKind, SeekFrom};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};

use super::{FlvHeader, FlvTag, TagHeader, TagKind, PREVIOUS_TAG_SIZE_LEN, TAG_HEADER_LEN};
use crate::keyframes::KeyframeIndex;
use crate::{Error, Result};

/// Reads FLV tags one at a time from a seekable source.
///
/// The source length is captured when the demuxer is created; the file is
/// expected not to grow while it is being read.
pub struct FlvDemuxer<R> {
    reader: R,
    position: u64,
    len: u64,
    first_tag_offset: u64,
}

impl<R: AsyncRead + AsyncSeek + Unpin> FlvDemuxer<R> {
    /// Attach to a source and read its header.
    pub async fn open(mut reader: R) -> Result<(Self, FlvHeader)> {
        let len = reader.seek(SeekFrom::End(0)).await?;
        reader.seek(SeekFrom::Start(0)).await?;

        let mut fixed = [0u8; 9];
        reader.read_exact(&mut fixed).await.map_err(|e| eof_as_truncated(e, 0))?;
        let header = FlvHeader::parse(&fixed)?;
        let first_tag_offset = header.first_tag_offset();

        let mut demuxer = Self {
            reader,
            position: 9,
            len,
            first_tag_offset,
        };
        demuxer.seek(first_tag_offset).await?;
        Ok((demuxer, header))
    }

    /// Current read offset.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Source length captured at open.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Offset of the first tag, just past the header.
    pub fn first_tag_offset(&self) -> u64 {
        self.first_tag_offset
    }

    pub fn is_eof(&self) -> bool {
        self.position >= self.len
    }

    /// Move the read cursor to an absolute offset.
    pub async fn seek(&mut self, offset: u64) -> Result<()> {
        self.reader.seek(SeekFrom::Start(offset)).await?;
        self.position = offset;
        Ok(())
    }

    /// Position the cursor just past the header.
    pub async fn rewind(&mut self) -> Result<()> {
        self.seek(self.first_tag_offset).await
    }

    /// Read the next tag, or `None` at a clean end of file.
    ///
    /// Tags of unknown type are skipped.
    pub async fn next_tag(&mut self) -> Result<Option<FlvTag>> {
        loop {
            if self.is_eof() {
                return Ok(None);
            }
            let start = self.position;

            let mut fixed = [0u8; TAG_HEADER_LEN];
            self.reader
                .read_exact(&mut fixed)
                .await
                .map_err(|e| eof_as_truncated(e, start))?;
            let header = TagHeader::parse(&fixed);

            let mut payload = vec![0u8; header.data_size as usize];
            self.reader
                .read_exact(&mut payload)
                .await
                .map_err(|e| eof_as_truncated(e, start))?;

            let mut trailer = [0u8; PREVIOUS_TAG_SIZE_LEN];
            self.reader
                .read_exact(&mut trailer)
                .await
                .map_err(|e| eof_as_truncated(e, start))?;
            let previous_size = u32::from_be_bytes(trailer);
            let expected = TAG_HEADER_LEN as u32 + header.data_size;
            if previous_size != expected {
                return Err(Error::invalid_flv(format!(
                    "tag at offset {start}: trailing size {previous_size}, expected {expected}"
                )));
            }

            self.position = start + expected as u64 + PREVIOUS_TAG_SIZE_LEN as u64;

            match TagKind::from_type_id(header.type_id) {
                Some(kind) => {
                    return Ok(Some(FlvTag::new(kind, header.timestamp, payload)));
                }
                None => continue,
            }
        }
    }

    /// Position the cursor at the nearest seek point at or before `target_ms`.
    ///
    /// With an index, the last indexed keyframe whose time is not after the
    /// target is used; an index entry pointing outside the file falls back to
    /// a scan. Without an index, tags are scanned from the start for the last
    /// video key frame not after the target. If no such point exists the
    /// cursor is placed just past the header. Returns the new position.
    pub async fn locate(&mut self, target_ms: u32, index: Option<&KeyframeIndex>) -> Result<u64> {
        if let Some(index) = index {
            match index.locate(target_ms) {
                Some((_, offset)) if offset >= self.first_tag_offset && offset < self.len => {
                    self.seek(offset).await?;
                    return Ok(offset);
                }
                None if !index.is_empty() => {
                    self.rewind().await?;
                    return Ok(self.position);
                }
                _ => {}
            }
        }
        self.scan_to(target_ms).await
    }

    async fn scan_to(&mut self, target_ms: u32) -> Result<u64> {
        self.rewind().await?;
        let mut best = self.first_tag_offset;
        loop {
            let start = self.position;
            let Some(tag) = self.next_tag().await? else {
                break;
            };
            if tag.timestamp > target_ms {
                break;
            }
            if tag.is_key_frame() {
                best = start;
            }
        }
        self.seek(best).await?;
        Ok(best)
    }
}

fn eof_as_truncated(e: std::io::Error, offset: u64) -> Error {
    if e.kind() == ErrorKind::UnexpectedEof {
        Error::Truncated { offset }
    } else {
        Error::Io(e)
    }
}
