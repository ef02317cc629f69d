use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use streamvault_common::PublishingType;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub publish: PublishConfig,

    #[serde(default)]
    pub playback: PlaybackConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Directory holding scratch and finalized recordings
    #[serde(default = "default_record_dir")]
    pub record_dir: PathBuf,

    /// Extension of finalized container files (default: "flv")
    #[serde(default = "default_extension")]
    pub extension: String,
}

fn default_record_dir() -> PathBuf {
    PathBuf::from("./records")
}

fn default_extension() -> String {
    "flv".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            record_dir: default_record_dir(),
            extension: default_extension(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PublishConfig {
    /// Publishing types accepted by the publish command
    #[serde(default = "default_allowed_types")]
    pub allowed_types: Vec<PublishingType>,
}

fn default_allowed_types() -> Vec<PublishingType> {
    PublishingType::ALL.to_vec()
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            allowed_types: default_allowed_types(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlaybackConfig {
    /// Window acknowledgement size announced on play (default: 512000)
    #[serde(default = "default_window_ack_size")]
    pub window_ack_size: u32,

    /// Buffer length in milliseconds applied until the client sets one
    #[serde(default)]
    pub default_buffer_ms: Option<u32>,
}

fn default_window_ack_size() -> u32 {
    512_000
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            window_ack_size: default_window_ack_size(),
            default_buffer_ms: None,
        }
    }
}
