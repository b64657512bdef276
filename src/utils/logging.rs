//! Structured logging and security-focused trace utilities.
//!
//! This module configures the `tracing` ecosystem for the application,
//! supporting multiple output formats and providing utilities to prevent
//! sensitive data (like Gemini API keys) from leaking into logs.
//!
//! Author: kelexine (<https://github.com/kelexine>)

use crate::config::LoggingConfig;
use crate::error::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static SANITIZE_ENABLED: AtomicBool = AtomicBool::new(true);

/// Prefix shared by Google API keys.
const API_KEY_PREFIX: &str = "AIza";

/// Initializes the global tracing subscriber for the application.
///
/// Supports two output formats:
/// - `json`: Structured JSON logs for production ingestion.
/// - `pretty` (default): Human-readable, colorized output for development.
///
/// Log levels are controlled via the `RUST_LOG` environment variable or
/// the provided `LoggingConfig`.
pub fn init(config: &LoggingConfig) -> Result<()> {
    SANITIZE_ENABLED.store(config.sanitize_tokens, Ordering::Relaxed);

    // Configure filter from environment or config file
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}

/// Sanitizes sensitive information from log messages.
///
/// Every Google API key (`AIza...`) in the input is replaced with a
/// `\[REDACTED_API_KEY\]` placeholder. Provider error bodies and client errors
/// can echo request URLs or headers, so they go through here before logging.
///
/// Returns the input unchanged when sanitization is disabled in the logging config.
pub fn sanitize(input: &str) -> String {
    if !SANITIZE_ENABLED.load(Ordering::Relaxed) {
        return input.to_string();
    }

    let mut result = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find(API_KEY_PREFIX) {
        result.push_str(&rest[..pos]);
        let key = &rest[pos..];
        // Key characters are URL-safe base64
        let end = key
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_'))
            .unwrap_or(key.len());
        result.push_str("[REDACTED_API_KEY]");
        rest = &key[end..];
    }

    result.push_str(rest);
    result
}
