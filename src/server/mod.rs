//! Axum-based HTTP server for gemchat.
//!
//! This module sets up the router and handlers for the chat endpoint and its
//! companion routes (health, metrics, stored media).
//!
//! # Components
//!
//! - `handlers`: The chat, health and metrics endpoints, plus panic rendering.
//! - `middleware`: Request ID tracking layers.
//! - `routes`: The router configuration that ties everything together.
//!
//! Author: kelexine (<https://github.com/kelexine>)

mod handlers;
mod middleware;
mod routes;

pub use handlers::{HealthCheck, HealthResponse, HealthStatus};
pub use middleware::REQUEST_ID_HEADER;
pub use routes::{create_router, AppState};
