// CLI module for gemchat
// Author: kelexine (https://github.com/kelexine)

use crate::config::AppConfig;
use clap::Parser;

/// gemchat - Multimodal chat endpoint backed by a Gemini conversation session
#[derive(Parser, Debug, Default)]
#[command(name = "gemchat", version, about, long_about = None)]
pub struct Args {
    /// Path to a TOML config file (default: ~/.gemchat/config.toml)
    #[arg(long, short, env = "GEMCHAT_CONFIG")]
    pub config: Option<String>,

    /// Address to bind, overriding the config file
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on, overriding the config file
    #[arg(long, short)]
    pub port: Option<u16>,
}

impl Args {
    /// Apply flag overrides on top of loaded configuration
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
    }
}
