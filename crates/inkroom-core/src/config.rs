//! Client configuration.
//!
//! Defaults, optionally overridden by `~/.config/inkroom/config.toml`
//! (platform config dir), then by `INKROOM_API_URL` / `INKROOM_WS_URL`.

use crate::color::Rgb;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable overriding the API base URL.
pub const API_URL_ENV: &str = "INKROOM_API_URL";
/// Environment variable overriding the relay base URL.
pub const WS_URL_ENV: &str = "INKROOM_WS_URL";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid canvas size {0}x{1}")]
    CanvasSize(u32, u32),
}

/// Result type for configuration.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Settings for joining boards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Root of the REST API (board state, projects).
    pub api_base: String,
    /// Root of the relay endpoint; the board slug is appended.
    pub ws_base: String,
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub background: Rgb,
    /// Quiet period before a note text edit is sent.
    pub text_debounce_ms: u64,
    /// Author name put on strokes; random when unset.
    pub display_name: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: "http://127.0.0.1:8000/api/".to_string(),
            ws_base: "ws://127.0.0.1:8000/ws/board/".to_string(),
            canvas_width: 1280,
            canvas_height: 720,
            background: Rgb::WHITE,
            text_debounce_ms: 500,
            display_name: None,
        }
    }
}

impl ClientConfig {
    /// Default location of the config file.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("inkroom").join("config.toml"))
    }

    /// Parse a TOML document; missing keys keep their defaults.
    pub fn from_toml(text: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a config file.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// Defaults, then the file at `path` (or the default path) if it exists,
    /// then environment overrides.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let path = path.map(Path::to_path_buf).or_else(Self::default_path);
        let mut config = match path {
            Some(ref path) if path.exists() => {
                log::debug!("Loading config from {}", path.display());
                Self::from_file(path)?
            }
            _ => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply overrides from an environment lookup.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(api) = lookup(API_URL_ENV) {
            self.api_base = api;
        }
        if let Some(ws) = lookup(WS_URL_ENV) {
            self.ws_base = ws;
        }
    }

    pub fn text_debounce(&self) -> Duration {
        Duration::from_millis(self.text_debounce_ms)
    }

    /// The configured author name, or a fresh `User-<n>`.
    pub fn author(&self) -> String {
        self.display_name
            .clone()
            .unwrap_or_else(|| format!("User-{}", rand::random::<u16>() % 1000))
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.canvas_width == 0 || self.canvas_height == 0 {
            return Err(ConfigError::CanvasSize(self.canvas_width, self.canvas_height));
        }
        Ok(())
    }
}
