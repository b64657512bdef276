// Configuration module
// Author: kelexine (https://github.com/kelexine)

mod models;

pub use models::*;

use crate::error::{ChatError, Result};
use config::{Config, Environment, File};
use std::path::PathBuf;

/// Bare environment variable consulted when no key is configured otherwise.
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Room for multipart headers, the message field and JSON framing around an image.
const BODY_OVERHEAD_BYTES: usize = 64 * 1024;

impl AppConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Environment variables (highest, prefix `GEMCHAT__`)
    /// 2. Config file (`config_path`, or `~/.gemchat/config.toml`)
    /// 3. Defaults (lowest)
    ///
    /// CLI flags are applied on top by the caller.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let path = config_path
            .map(str::to_owned)
            .unwrap_or_else(Self::default_config_path);

        let config = Config::builder()
            // Start with defaults
            .add_source(Config::try_from(&Self::default())?)
            // Load from config file; an explicit path must exist
            .add_source(File::with_name(&path).required(config_path.is_some()))
            // Override with environment variables (e.g. GEMCHAT__SERVER__PORT)
            .add_source(
                Environment::with_prefix("GEMCHAT")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .map_err(|e| ChatError::Config(e.to_string()))?;

        let mut app_config: AppConfig = config
            .try_deserialize()
            .map_err(|e| ChatError::Config(e.to_string()))?;

        app_config.apply_api_key_env(std::env::var(API_KEY_ENV).ok());
        Ok(app_config)
    }

    /// Use the bare `GEMINI_API_KEY` value when no key was configured.
    pub fn apply_api_key_env(&mut self, value: Option<String>) {
        let configured = self
            .gemini
            .api_key
            .as_ref()
            .map(|k| !k.is_empty())
            .unwrap_or(false);

        if !configured {
            if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
                self.gemini.api_key = Some(ApiKey::new(value));
            }
        }
    }

    /// Effective request body cap: `server.max_body_bytes`, raised when needed
    /// so a base64-encoded image at `upload.max_upload_bytes` still fits.
    pub fn body_limit_bytes(&self) -> usize {
        let encoded = self.upload.max_upload_bytes.div_ceil(3).saturating_mul(4);
        self.server
            .max_body_bytes
            .max(encoded.saturating_add(BODY_OVERHEAD_BYTES))
    }

    fn default_config_path() -> String {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".gemchat")
            .join("config.toml")
            .to_string_lossy()
            .to_string()
    }
}
