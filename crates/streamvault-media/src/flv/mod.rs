//! FLV container muxing and demuxing.
//!
//! Every muxed tag carries its own trailing PreviousTagSize field, so a
//! sequence of muxed tags can be appended after any header (or after nothing,
//! as in the scratch file) and the result is still a valid tag stream.

mod demuxer;

pub use demuxer::FlvDemuxer;

use bytes::{BufMut, Bytes, BytesMut};

use crate::amf::{self, AmfValue};
use crate::{Error, Result};

/// Size of the header written by [`write_header`], including PreviousTagSize0.
pub const HEADER_LEN: u64 = 13;

/// Size of the fixed tag header preceding each tag body.
pub const TAG_HEADER_LEN: usize = 11;

/// Size of the PreviousTagSize field following each tag.
pub const PREVIOUS_TAG_SIZE_LEN: usize = 4;

/// Largest payload the 24-bit size field can describe.
pub const MAX_PAYLOAD_LEN: usize = 0x00FF_FFFF;

const SIGNATURE: &[u8; 3] = b"FLV";
const FLAG_AUDIO: u8 = 0x04;
const FLAG_VIDEO: u8 = 0x01;

/// FLV tag type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagKind {
    Audio,
    Video,
    Script,
}

impl TagKind {
    pub fn type_id(self) -> u8 {
        match self {
            Self::Audio => 8,
            Self::Video => 9,
            Self::Script => 18,
        }
    }

    pub fn from_type_id(id: u8) -> Option<Self> {
        // The top bits carry the filter flag and reserved bits.
        match id & 0x1F {
            8 => Some(Self::Audio),
            9 => Some(Self::Video),
            18 => Some(Self::Script),
            _ => None,
        }
    }
}

/// Video frame type from the high nibble of the first video payload byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    KeyFrame,
    InterFrame,
    DisposableInterFrame,
    GeneratedKeyFrame,
    VideoInfo,
    Unknown(u8),
}

impl FrameType {
    pub fn from_header_byte(byte: u8) -> Self {
        match byte >> 4 {
            1 => Self::KeyFrame,
            2 => Self::InterFrame,
            3 => Self::DisposableInterFrame,
            4 => Self::GeneratedKeyFrame,
            5 => Self::VideoInfo,
            other => Self::Unknown(other),
        }
    }
}

/// Parsed FLV file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlvHeader {
    pub version: u8,
    pub has_audio: bool,
    pub has_video: bool,
    /// Offset of the PreviousTagSize0 field (the header's own length).
    pub data_offset: u32,
}

impl FlvHeader {
    /// Offset of the first tag in the file.
    pub fn first_tag_offset(&self) -> u64 {
        self.data_offset as u64 + PREVIOUS_TAG_SIZE_LEN as u64
    }

    /// Parse the fixed 9-byte header.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 9 {
            return Err(Error::BufferUnderflow {
                need: 9,
                have: data.len(),
            });
        }
        if &data[0..3] != SIGNATURE {
            return Err(Error::invalid_flv("missing FLV signature"));
        }
        let data_offset = u32::from_be_bytes([data[5], data[6], data[7], data[8]]);
        if data_offset < 9 {
            return Err(Error::invalid_flv(format!(
                "header data offset {data_offset} is shorter than the header"
            )));
        }
        Ok(Self {
            version: data[3],
            has_audio: data[4] & FLAG_AUDIO != 0,
            has_video: data[4] & FLAG_VIDEO != 0,
            data_offset,
        })
    }
}

/// Serialize the file header plus PreviousTagSize0.
pub fn write_header(has_audio: bool, has_video: bool) -> Bytes {
    let mut buf = BytesMut::with_capacity(HEADER_LEN as usize);
    buf.put_slice(SIGNATURE);
    buf.put_u8(1);
    let mut flags = 0u8;
    if has_audio {
        flags |= FLAG_AUDIO;
    }
    if has_video {
        flags |= FLAG_VIDEO;
    }
    buf.put_u8(flags);
    buf.put_u32(9);
    buf.put_u32(0);
    buf.freeze()
}

/// One tagged unit: audio, video or script data with a millisecond timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlvTag {
    pub kind: TagKind,
    pub timestamp: u32,
    pub payload: Bytes,
}

impl FlvTag {
    pub fn new(kind: TagKind, timestamp: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            kind,
            timestamp,
            payload: payload.into(),
        }
    }

    pub fn audio(timestamp: u32, payload: impl Into<Bytes>) -> Self {
        Self::new(TagKind::Audio, timestamp, payload)
    }

    pub fn video(timestamp: u32, payload: impl Into<Bytes>) -> Self {
        Self::new(TagKind::Video, timestamp, payload)
    }

    /// Build a script tag from AMF values (e.g. `"onMetaData", {..}`).
    pub fn script(timestamp: u32, values: &[AmfValue]) -> Self {
        Self::new(TagKind::Script, timestamp, amf::encode_all(values).freeze())
    }

    /// Frame type of a video tag, read from the first payload byte only.
    pub fn frame_type(&self) -> Option<FrameType> {
        if self.kind != TagKind::Video {
            return None;
        }
        self.payload.first().map(|b| FrameType::from_header_byte(*b))
    }

    pub fn is_key_frame(&self) -> bool {
        self.frame_type() == Some(FrameType::KeyFrame)
    }

    /// Decode the AMF values of a script tag.
    pub fn script_values(&self) -> Result<Vec<AmfValue>> {
        if self.kind != TagKind::Script {
            return Err(Error::invalid_flv("not a script tag"));
        }
        amf::decode_all(&self.payload)
    }

    /// Length of this tag once muxed, trailing size field included.
    pub fn encoded_len(&self) -> usize {
        TAG_HEADER_LEN + self.payload.len() + PREVIOUS_TAG_SIZE_LEN
    }

    /// Mux this tag into its on-disk representation.
    pub fn mux(&self) -> Result<Bytes> {
        let size = self.payload.len();
        if size > MAX_PAYLOAD_LEN {
            return Err(Error::PayloadTooLarge { size });
        }
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        buf.put_u8(self.kind.type_id());
        put_u24(&mut buf, size as u32);
        put_u24(&mut buf, self.timestamp & 0x00FF_FFFF);
        buf.put_u8((self.timestamp >> 24) as u8);
        put_u24(&mut buf, 0);
        buf.put_slice(&self.payload);
        buf.put_u32((TAG_HEADER_LEN + size) as u32);
        Ok(buf.freeze())
    }
}

/// Decoded fields of an 11-byte tag header.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TagHeader {
    pub type_id: u8,
    pub data_size: u32,
    pub timestamp: u32,
}

impl TagHeader {
    pub(crate) fn parse(h: &[u8; TAG_HEADER_LEN]) -> Self {
        let data_size = u32::from_be_bytes([0, h[1], h[2], h[3]]);
        let timestamp = u32::from_be_bytes([h[7], h[4], h[5], h[6]]);
        Self {
            type_id: h[0],
            data_size,
            timestamp,
        }
    }
}

fn put_u24(buf: &mut BytesMut, value: u32) {
    buf.put_u8((value >> 16) as u8);
    buf.put_u8((value >> 8) as u8);
    buf.put_u8(value as u8);
}
