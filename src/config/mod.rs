mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;
use streamvault_common::paths::RecordStore;

use crate::stream::SessionSettings;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = [
        "./streamvault.toml",
        "~/.config/streamvault/config.toml",
        "/etc/streamvault/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    let extension = config.storage.extension.trim();
    if extension.is_empty() {
        anyhow::bail!("Storage extension cannot be empty");
    }
    if extension.contains(['.', '/', '\\']) {
        anyhow::bail!("Storage extension {:?} must be a bare extension", extension);
    }
    if extension == streamvault_common::paths::SCRATCH_EXTENSION {
        anyhow::bail!(
            "Storage extension cannot be {:?}, it is used for scratch files",
            extension
        );
    }

    if config.publish.allowed_types.is_empty() {
        anyhow::bail!("At least one publishing type must be allowed");
    }

    if config.playback.window_ack_size == 0 {
        anyhow::bail!("Playback window_ack_size cannot be 0");
    }

    if !config.storage.record_dir.exists() {
        tracing::warn!("Record directory does not exist yet: {:?}", config.storage.record_dir);
    }

    Ok(())
}

impl Config {
    /// Path mapping for recordings under `[storage]`.
    pub fn record_store(&self) -> RecordStore {
        RecordStore::new(self.storage.record_dir.clone(), self.storage.extension.trim())
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            allowed_types: self.publish.allowed_types.clone(),
            window_ack_size: self.playback.window_ack_size,
            default_buffer_ms: self.playback.default_buffer_ms,
        }
    }
}
