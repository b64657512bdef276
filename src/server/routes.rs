// HTTP routes configuration
// Author: kelexine (https://github.com/kelexine)

use super::handlers::{chat_send_handler, health_handler, metrics_handler, panic_response};
use super::middleware::request_id_layers;
use crate::chat::SessionGateway;
use crate::config::AppConfig;
use crate::error::{ChatError, Result};
use axum::extract::DefaultBodyLimit;
use axum::{routing::{get, post}, Router};
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub gateway: SessionGateway,
}

pub fn create_router(config: AppConfig, gateway: SessionGateway) -> Result<Router> {
    let prefix = config.server.route_prefix.trim_end_matches('/').to_string();
    if !prefix.is_empty() && !prefix.starts_with('/') {
        return Err(ChatError::Config(format!(
            "server.route_prefix must start with '/': {}",
            config.server.route_prefix
        )));
    }

    let max_body_bytes = config.body_limit_bytes();
    if max_body_bytes > config.server.max_body_bytes {
        info!(
            "Raising body limit to {} bytes to fit {} byte uploads",
            max_body_bytes, config.upload.max_upload_bytes
        );
    }
    let media_root = config.upload.media_root.clone();
    let media_mount = config.upload.media_url.trim_end_matches('/').to_string();

    let state = AppState {
        config: Arc::new(config),
        gateway,
    };

    let (set_request_id, propagate_request_id) = request_id_layers();

    let mut app = Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route(&format!("{}/send/", prefix), post(chat_send_handler))
        .route(&format!("{}/send", prefix), post(chat_send_handler));

    // Serve stored uploads when the media URL is a local path
    if media_mount.starts_with('/') && media_mount.len() > 1 {
        info!("Serving {} from {}", media_mount, media_root);
        app = app.nest_service(&media_mount, ServeDir::new(media_root));
    }

    let app = app
        // Oversized bodies surface as extractor rejections, answered in JSON
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
        .layer(propagate_request_id)
        .layer(set_request_id)
        .with_state(state);

    Ok(app)
}
