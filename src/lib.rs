// gemchat - Multimodal chat endpoint backed by a Gemini conversation session
// Author: kelexine (https://github.com/kelexine)

pub mod chat;
pub mod cli;
pub mod config;
pub mod error;
pub mod gemini;
pub mod metrics;
pub mod server;
pub mod storage;
pub mod utils;
