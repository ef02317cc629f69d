//! Streamvault-Media: FLV container codec and seek index.
//!
//! This crate provides the container layer of the record/playback engine.
//!
//! # Modules
//!
//! - `flv` - FLV header and tag mux, async tag demuxer with keyframe seek
//! - `amf` - AMF0 script-data values carried by metadata tags
//! - `keyframes` - the (seconds, byte offset) keyframe index
//! - `metadata` - typed `onMetaData` record
//!
//! # File layout
//!
//! A finalized recording is laid out as:
//!
//! 1. 13-byte FLV header (signature, flags, data offset, PreviousTagSize0)
//! 2. one script tag carrying `onMetaData` with `duration` and `keyframes`
//! 3. the audio/video tags exactly as muxed during ingestion
//!
//! Keyframe offsets in the metadata point at the first byte of a video
//! key-frame tag in that layout.

pub mod amf;
pub mod error;
pub mod flv;
pub mod keyframes;
pub mod metadata;

pub use amf::AmfValue;
pub use error::{Error, Result};
pub use flv::{FlvDemuxer, FlvHeader, FlvTag, FrameType, TagKind};
pub use keyframes::KeyframeIndex;
pub use metadata::StreamMetadata;
