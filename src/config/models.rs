//! Configuration data structures for gemchat.
//!
//! This module defines the schema for the application settings, including
//! server parameters, the Gemini session, upload limits and storage.
//!
//! Author: kelexine (<https://github.com/kelexine>)

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// The root configuration object for the application.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// HTTP server settings (host, port, body limit).
    #[serde(default)]
    pub server: ServerConfig,

    /// Gemini conversation session settings.
    #[serde(default)]
    pub gemini: GeminiConfig,

    /// Image upload limits and blob storage location.
    #[serde(default)]
    pub upload: UploadConfig,

    /// Logging and observability settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Settings for the built-in HTTP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The IP address or hostname the server should bind to.
    /// Default: `127.0.0.1`
    #[serde(default = "default_host")]
    pub host: String,

    /// The port number the server should listen on.
    /// Default: `8000`
    #[serde(default = "default_port")]
    pub port: u16,

    /// Hard cap on request body size, enforced before any parsing.
    /// Raised at startup when it cannot hold a base64-encoded image at
    /// `upload.max_upload_bytes`.
    /// Default: `16 MiB`
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Path prefix of the chat routes.
    /// Default: `/chat`
    #[serde(default = "default_route_prefix")]
    pub route_prefix: String,
}

/// Gemini API key. Redacted in `Debug` and wiped on drop.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop, PartialEq, Eq)]
#[serde(transparent)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

// Custom Debug impl that never logs the key
impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey([REDACTED])")
    }
}

/// Settings for the Gemini conversation session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    /// API key. Without one the service starts in degraded mode.
    /// Falls back to the `GEMINI_API_KEY` environment variable.
    #[serde(default)]
    pub api_key: Option<ApiKey>,

    /// Base URL for the Gemini API.
    /// Default: `https://generativelanguage.googleapis.com/v1beta`
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// The Gemini model backing the conversation.
    /// Default: `gemini-2.5-flash`
    #[serde(default = "default_model")]
    pub model: String,

    /// Request timeout in seconds.
    /// Default: `300` (5 minutes)
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Extra attempts for transient API failures (429/5xx).
    /// Default: `3`
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

/// Settings for image uploads and the local blob store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Maximum decoded image size in bytes.
    /// Default: `5 MiB`
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    /// Directory stored files are written under.
    /// Default: `./media`
    #[serde(default = "default_media_root")]
    pub media_root: String,

    /// URL prefix stored files are served from.
    /// Default: `/media/`
    #[serde(default = "default_media_url")]
    pub media_url: String,

    /// Subdirectory of `media_root` for chat uploads.
    /// Default: `chat_uploads`
    #[serde(default = "default_upload_dir")]
    pub upload_dir: String,
}

/// Settings for application logging and output format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Minimum log level (`trace`, `debug`, `info`, `warn`, `error`).
    /// Default: `info`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format for logs (`pretty`, `json`).
    /// Default: `pretty`
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Whether to mask API keys in logged provider errors.
    /// Default: `true`
    #[serde(default = "default_true")]
    pub sanitize_tokens: bool,
}

// Default trait implementations linking to custom logic

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_body_bytes: default_max_body_bytes(),
            route_prefix: default_route_prefix(),
        }
    }
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base_url: default_api_base_url(),
            model: default_model(),
            timeout_seconds: default_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: default_max_upload_bytes(),
            media_root: default_media_root(),
            media_url: default_media_url(),
            upload_dir: default_upload_dir(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            sanitize_tokens: true,
        }
    }
}

// Helper functions for serde defaults and shared constants
fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_max_body_bytes() -> usize {
    16 * 1024 * 1024
}

fn default_route_prefix() -> String {
    "/chat".to_string()
}

fn default_true() -> bool {
    true
}

fn default_api_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_timeout() -> u64 {
    300
}

fn default_max_retries() -> u32 {
    3
}

fn default_max_upload_bytes() -> usize {
    crate::chat::validate::DEFAULT_MAX_UPLOAD_BYTES
}

fn default_media_root() -> String {
    "media".to_string()
}

fn default_media_url() -> String {
    "/media/".to_string()
}

fn default_upload_dir() -> String {
    "chat_uploads".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}
