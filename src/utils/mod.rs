//! Utility functions and helpers for gemchat.
//!
//! This module provides cross-cutting concerns like structured logging,
//! credential sanitization, and retry logic with backoff.
//!
//! # Submodules
//!
//! - `logging`: Tracing and logging initialization with security filters.
//! - `retry`: Retry mechanisms that respect upstream API hints.
//!
//! Author: kelexine (<https://github.com/kelexine>)

pub mod logging;
pub mod retry;
