//! Record and playback engine of a single message stream.
//!
//! A [`StreamSession`] owns the command surface of one stream. Publishing
//! hands inbound units to a [`RecordController`], which appends them to a
//! scratch file and builds the keyframe index; teardown finalizes the
//! recording into the container file exactly once. Playing reads that file
//! back through a [`PlaybackController`], whose read loop is single-flight
//! and restarted by seek and pause.

mod error;
mod playback;
mod record;
mod session;
mod state;
mod status;

pub use error::{Result, SessionError};
pub use playback::{LoopOutcome, PlaybackController, PlaybackState, PlaybackStats};
pub use record::{FinalizeOutcome, RecordController};
pub use session::{DestroyHook, SessionSettings, StreamSession};
pub use state::{MetadataSlot, SessionClock};
pub use status::{codes, StatusEnvelope, StatusLevel};
