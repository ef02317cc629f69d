//! Status envelopes sent in response to stream commands.

use serde::Serialize;
use streamvault_media::AmfValue;

/// Status codes used by stream commands.
pub mod codes {
    pub const PUBLISH_START: &str = "NetStream.Publish.Start";
    pub const PLAY_RESET: &str = "NetStream.Play.Reset";
    pub const PLAY_START: &str = "NetStream.Play.Start";
    pub const SEEK_NOTIFY: &str = "NetStream.Seek.Notify";
    pub const PAUSE_NOTIFY: &str = "NetStream.Pause.Notify";
    pub const UNPAUSE_NOTIFY: &str = "NetStream.Unpause.Notify";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusLevel {
    Status,
    Warning,
    Error,
}

impl StatusLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

/// `{level, code, description, details}` response object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusEnvelope {
    pub level: StatusLevel,
    pub code: String,
    pub description: String,
    pub details: String,
}

impl StatusEnvelope {
    pub fn status(
        code: impl Into<String>,
        description: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        Self {
            level: StatusLevel::Status,
            code: code.into(),
            description: description.into(),
            details: details.into(),
        }
    }

    pub fn publish_start(stream_name: &str) -> Self {
        Self::status(codes::PUBLISH_START, "Stream is now published.", stream_name)
    }

    pub fn play_reset(stream_name: &str) -> Self {
        Self::status(codes::PLAY_RESET, "Resetting and playing stream.", stream_name)
    }

    pub fn play_start(stream_name: &str) -> Self {
        Self::status(codes::PLAY_START, "Started playing.", stream_name)
    }

    pub fn seek_notify() -> Self {
        Self::status(codes::SEEK_NOTIFY, "Seeking stream.", "seek")
    }

    pub fn pause_notify() -> Self {
        Self::status(codes::PAUSE_NOTIFY, "Pausing stream.", "pause")
    }

    pub fn unpause_notify() -> Self {
        Self::status(codes::UNPAUSE_NOTIFY, "Unpausing stream.", "unpause")
    }

    /// Info object form carried by an `onStatus` command.
    pub fn to_amf(&self) -> AmfValue {
        AmfValue::Object(vec![
            ("level".into(), AmfValue::string(self.level.as_str())),
            ("code".into(), AmfValue::string(self.code.clone())),
            ("description".into(), AmfValue::string(self.description.clone())),
            ("details".into(), AmfValue::string(self.details.clone())),
        ])
    }
}
