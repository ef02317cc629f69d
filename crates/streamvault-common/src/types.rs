//! Core type definitions shared by the publish and playback paths.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Publish mode requested by a client in the `publish` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublishingType {
    /// Live publish; the stream is still recorded by the record controller.
    Live,
    /// Record into a fresh file.
    Record,
    /// Accepted on the wire; recorded into a fresh file like `Record`.
    Append,
}

impl PublishingType {
    /// All publishing types understood by the protocol, in wire form.
    pub const ALL: [PublishingType; 3] = [Self::Live, Self::Record, Self::Append];

    /// The wire name of this publishing type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Record => "record",
            Self::Append => "append",
        }
    }
}

impl fmt::Display for PublishingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PublishingType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "live" => Ok(Self::Live),
            "record" => Ok(Self::Record),
            "append" => Ok(Self::Append),
            other => Err(Error::invalid_input(format!(
                "not supported publishing type {other}"
            ))),
        }
    }
}
