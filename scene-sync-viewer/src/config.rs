use bevy::prelude::Resource;
use constants::sync::{CLICKABLE_DELAY_MS, CONFIG_ENV_VAR, DEFAULT_DOWNLOAD_DIR};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Viewer settings, read once at startup. Missing fields take their defaults.
#[derive(Resource, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ViewerConfig {
    /// Delay before a clickability change takes effect.
    pub clickable_delay_ms: u64,
    /// Where `save_immediately` downloads are written on native builds.
    pub download_dir: PathBuf,
    pub window_title: String,
    /// Show the transfer progress text overlay.
    pub show_overlay: bool,
    /// Read newline-delimited JSON messages from stdin (native only).
    pub stdin_feed: bool,
    /// Forward transfer progress to the host page as notifications.
    pub send_progress_notifications: bool,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            clickable_delay_ms: CLICKABLE_DELAY_MS,
            download_dir: PathBuf::from(DEFAULT_DOWNLOAD_DIR),
            window_title: "Scene Sync Viewer".to_string(),
            show_overlay: true,
            stdin_feed: false,
            send_progress_notifications: true,
        }
    }
}

impl ViewerConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Load from the file named by `SCENE_SYNC_CONFIG`, or defaults if unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var_os(CONFIG_ENV_VAR) {
            Some(path) => Self::load(PathBuf::from(path)),
            None => Ok(Self::default()),
        }
    }

    pub fn clickable_delay(&self) -> Duration {
        Duration::from_millis(self.clickable_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let config = ViewerConfig::from_json(r#"{"clickable_delay_ms": 0, "stdin_feed": true}"#)
            .unwrap();

        assert_eq!(config.clickable_delay(), Duration::ZERO);
        assert!(config.stdin_feed);
        assert_eq!(config.download_dir, PathBuf::from(DEFAULT_DOWNLOAD_DIR));
        assert!(config.show_overlay);
    }

    #[test]
    fn loads_from_disk_and_reports_failures() {
        let path = std::env::temp_dir().join(format!("scene-sync-config-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"window_title": "Robot"}"#).unwrap();
        let config = ViewerConfig::load(&path).unwrap();
        assert_eq!(config.window_title, "Robot");
        std::fs::remove_file(&path).unwrap();

        assert!(matches!(ViewerConfig::load(&path), Err(ConfigError::Io { .. })));
        assert!(matches!(
            ViewerConfig::from_json("{\"show_overlay\": 3}"),
            Err(ConfigError::Parse(_))
        ));
    }
}
