// Chat endpoint integration tests
// Author: kelexine (https://github.com/kelexine)

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use base64::Engine;
use gemchat::chat::{SessionGateway, ValidationLimits};
use gemchat::config::AppConfig;
use gemchat::error::{ChatError, Result};
use gemchat::gemini::{ConversationSession, MessagePart, ProviderReply};
use gemchat::server::create_router;
use gemchat::storage::LocalBlobStore;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

// 1x1 PNG
const PNG_B64: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNk+M9QDwADhgGAWjR9awAAAABJRU5ErkJggg==";
const BOUNDARY: &str = "gemchat-test-boundary";

#[derive(Default)]
struct ScriptedSession {
    calls: Mutex<Vec<Vec<MessagePart>>>,
    fail: bool,
}

impl ScriptedSession {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    fn calls(&self) -> Vec<Vec<MessagePart>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConversationSession for ScriptedSession {
    async fn submit(&self, parts: Vec<MessagePart>) -> Result<ProviderReply> {
        self.calls.lock().unwrap().push(parts);
        if self.fail {
            return Err(ChatError::ProviderError(
                "HTTP 429: Resource has been exhausted (key AIzaLeakCheck)".to_string(),
            ));
        }
        Ok(ProviderReply::from_text("Hello from the model"))
    }

    fn model(&self) -> &str {
        "scripted"
    }
}

fn png() -> Vec<u8> {
    base64::engine::general_purpose::STANDARD.decode(PNG_B64).unwrap()
}

fn build_app(
    session: Option<Arc<ScriptedSession>>,
    media_root: &Path,
    configure: impl FnOnce(&mut AppConfig),
) -> Router {
    let mut config = AppConfig::default();
    config.upload.media_root = media_root.to_string_lossy().to_string();
    configure(&mut config);

    let store = Arc::new(LocalBlobStore::new(&config.upload));
    let gateway = SessionGateway::new(
        session.map(|s| s as Arc<dyn ConversationSession>),
        store,
        ValidationLimits::from(&config.upload),
    );
    create_router(config, gateway).unwrap()
}

fn app_with(session: Option<Arc<ScriptedSession>>, media_root: &Path) -> Router {
    build_app(session, media_root, |_| {})
}

fn multipart_body(message: Option<&str>, image: Option<(&str, &str, &[u8])>) -> Vec<u8> {
    let mut body = Vec::new();
    if let Some(message) = message {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"message\"\r\n\r\n{message}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((file_name, content_type, bytes)) = image {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn multipart_request(body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/chat/send/")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn json_request(body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/chat/send/")
        .header(header::CONTENT_TYPE, "application/json")
        .body(body.into())
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn test_multipart_text_message() {
    let media = tempfile::tempdir().unwrap();
    let session = Arc::new(ScriptedSession::default());
    let app = app_with(Some(session.clone()), media.path());

    let (status, body) = send(&app, multipart_request(multipart_body(Some("hello"), None))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"response": "Hello from the model"}));
    assert_eq!(session.calls(), vec![vec![MessagePart::Text("hello".to_string())]]);
}

#[tokio::test]
async fn test_multipart_message_is_trimmed() {
    let media = tempfile::tempdir().unwrap();
    let session = Arc::new(ScriptedSession::default());
    let app = app_with(Some(session.clone()), media.path());

    send(&app, multipart_request(multipart_body(Some("  hi  "), None))).await;
    assert_eq!(session.calls(), vec![vec![MessagePart::Text("hi".to_string())]]);
}

#[tokio::test]
async fn test_multipart_image_is_stored_and_served() {
    let media = tempfile::tempdir().unwrap();
    let session = Arc::new(ScriptedSession::default());
    let app = app_with(Some(session.clone()), media.path());

    let bytes = png();
    let (status, body) = send(
        &app,
        multipart_request(multipart_body(Some("what is this?"), Some(("dot.png", "image/png", bytes.as_slice())))),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["response"], "Hello from the model");
    let image_url = body["image_url"].as_str().unwrap().to_string();
    assert_eq!(image_url, "/media/chat_uploads/dot.png");

    let calls = session.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(
        calls[0],
        vec![
            MessagePart::Text("what is this?".to_string()),
            MessagePart::Image {
                mime_type: "image/png".to_string(),
                bytes: bytes.clone(),
            },
        ]
    );

    let response = app
        .clone()
        .oneshot(Request::get(image_url.as_str()).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let served = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(served.as_ref(), bytes.as_slice());
}

#[tokio::test]
async fn test_multipart_image_only() {
    let media = tempfile::tempdir().unwrap();
    let session = Arc::new(ScriptedSession::default());
    let app = app_with(Some(session.clone()), media.path());

    let bytes = png();
    let (status, _) = send(
        &app,
        multipart_request(multipart_body(None, Some(("dot.png", "image/png", bytes.as_slice())))),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let calls = session.calls();
    assert_eq!(calls[0].len(), 1);
    assert!(matches!(calls[0][0], MessagePart::Image { .. }));
}

#[tokio::test]
async fn test_multipart_rejects_non_image_type() {
    let media = tempfile::tempdir().unwrap();
    let session = Arc::new(ScriptedSession::default());
    let app = app_with(Some(session.clone()), media.path());

    let (status, body) = send(
        &app,
        multipart_request(multipart_body(Some("hi"), Some(("notes.txt", "text/plain", &b"hello"[..])))),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"response": "Invalid file type. Only images are allowed."}));
    assert!(session.calls().is_empty());
}

#[tokio::test]
async fn test_multipart_rejects_undecodable_image() {
    let media = tempfile::tempdir().unwrap();
    let app = app_with(Some(Arc::new(ScriptedSession::default())), media.path());

    let (status, body) = send(
        &app,
        multipart_request(multipart_body(None, Some(("fake.png", "image/png", &b"not really a png"[..])))),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"response": "Failed to process uploaded image."}));
}

#[tokio::test]
async fn test_oversized_upload_is_rejected_every_time() {
    let media = tempfile::tempdir().unwrap();
    let session = Arc::new(ScriptedSession::default());
    let app = app_with(Some(session.clone()), media.path());

    let oversized = vec![0u8; 5 * 1024 * 1024 + 1];
    for _ in 0..2 {
        let (status, body) = send(
            &app,
            multipart_request(multipart_body(Some("big"), Some(("big.png", "image/png", oversized.as_slice())))),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"response": "Image too large (max 5MB)."}));
    }
    assert!(session.calls().is_empty());
}

#[tokio::test]
async fn test_upload_exactly_at_limit_is_accepted() {
    let media = tempfile::tempdir().unwrap();
    let bytes = png();
    let limit = bytes.len();
    let app = build_app(
        Some(Arc::new(ScriptedSession::default())),
        media.path(),
        |config| config.upload.max_upload_bytes = limit,
    );

    let (status, _) = send(
        &app,
        multipart_request(multipart_body(None, Some(("dot.png", "image/png", bytes.as_slice())))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let app = build_app(
        Some(Arc::new(ScriptedSession::default())),
        media.path(),
        |config| config.upload.max_upload_bytes = limit - 1,
    );
    let (status, _) = send(
        &app,
        multipart_request(multipart_body(None, Some(("dot.png", "image/png", bytes.as_slice())))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_json_invalid_base64() {
    let media = tempfile::tempdir().unwrap();
    let session = Arc::new(ScriptedSession::default());
    let app = app_with(Some(session.clone()), media.path());

    let (status, body) = send(&app, json_request(r#"{"image": "not-base64!!"}"#)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"response": "Invalid base64 image data."}));
    assert!(session.calls().is_empty());
}

#[tokio::test]
async fn test_json_invalid_body() {
    let media = tempfile::tempdir().unwrap();
    let app = app_with(Some(Arc::new(ScriptedSession::default())), media.path());

    let (status, body) = send(&app, json_request("{oops")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"response": "Invalid JSON format."}));
}

#[tokio::test]
async fn test_json_data_url_image() {
    let media = tempfile::tempdir().unwrap();
    let session = Arc::new(ScriptedSession::default());
    let app = app_with(Some(session.clone()), media.path());

    let payload = json!({
        "message": "describe",
        "image": format!("data:image/png;base64,{}", PNG_B64),
    });
    let (status, body) = send(&app, json_request(payload.to_string())).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["image_url"], "/media/chat_uploads/uploaded_from_json.png");
    assert_eq!(
        session.calls()[0][1],
        MessagePart::Image {
            mime_type: "image/png".to_string(),
            bytes: png(),
        }
    );
}

#[tokio::test]
async fn test_json_undecodable_image() {
    let media = tempfile::tempdir().unwrap();
    let app = app_with(Some(Arc::new(ScriptedSession::default())), media.path());

    // Valid base64, but not an image
    let payload = json!({ "image": "aGVsbG8gd29ybGQ=" });
    let (status, body) = send(&app, json_request(payload.to_string())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"response": "Failed to decode image."}));
}

#[tokio::test]
async fn test_empty_input_is_soft_failure() {
    let media = tempfile::tempdir().unwrap();
    let session = Arc::new(ScriptedSession::default());
    let app = app_with(Some(session.clone()), media.path());

    let requests = vec![
        json_request(""),
        json_request("{}"),
        json_request(r#"{"message": "   "}"#),
        multipart_request(multipart_body(Some(" \n "), None)),
    ];

    for request in requests {
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"response": "Please send text or an image."}));
    }
    assert!(session.calls().is_empty());
}

#[tokio::test]
async fn test_no_session_is_service_unavailable() {
    let media = tempfile::tempdir().unwrap();
    let app = app_with(None, media.path());

    let requests = vec![
        json_request(r#"{"message": "hello"}"#),
        json_request("{definitely not json"),
        multipart_request(multipart_body(Some("hello"), None)),
    ];

    for request in requests {
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            body,
            json!({"response": "AI service is unavailable due to configuration error."})
        );
    }
}

#[tokio::test]
async fn test_provider_failure_is_generic_500() {
    let media = tempfile::tempdir().unwrap();
    let session = Arc::new(ScriptedSession::failing());
    let app = app_with(Some(session.clone()), media.path());

    let bytes = png();
    let (status, body) = send(
        &app,
        multipart_request(multipart_body(Some("hello"), Some(("dot.png", "image/png", bytes.as_slice())))),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body,
        json!({"response": "Sorry, the AI assistant encountered an error. Please try again."})
    );
    assert!(body.get("image_url").is_none());
    assert_eq!(session.calls().len(), 1);
    assert!(!media.path().join("chat_uploads").join("dot.png").exists());
}

#[tokio::test]
async fn test_upload_over_body_cap_reports_image_limit() {
    let media = tempfile::tempdir().unwrap();
    let session = Arc::new(ScriptedSession::default());
    let app = app_with(Some(session.clone()), media.path());

    let huge = vec![0u8; 17 * 1024 * 1024];
    let (status, body) = send(
        &app,
        multipart_request(multipart_body(Some("big"), Some(("huge.png", "image/png", huge.as_slice())))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"response": "Image too large (max 5MB)."}));

    let payload = json!({
        "message": "big",
        "image": format!("data:image/png;base64,{}", "A".repeat(17 * 1024 * 1024)),
    });
    let (status, body) = send(&app, json_request(payload.to_string())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"response": "Image too large (max 5MB)."}));

    assert!(session.calls().is_empty());
}

#[tokio::test]
async fn test_small_body_cap_is_raised_to_fit_uploads() {
    let media = tempfile::tempdir().unwrap();
    let app = build_app(
        Some(Arc::new(ScriptedSession::default())),
        media.path(),
        |config| {
            config.server.max_body_bytes = 1024;
            config.upload.max_upload_bytes = 1024 * 1024;
        },
    );

    // Fits the raised cap, so the validator measures it
    let over_limit = vec![0u8; 1024 * 1024 + 1];
    let (status, body) = send(
        &app,
        multipart_request(multipart_body(None, Some(("big.png", "image/png", over_limit.as_slice())))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"response": "Image too large (max 1MB)."}));

    // Text well past the configured 1 KiB still goes through
    let payload = json!({ "message": "x".repeat(4096) });
    let (status, _) = send(&app, json_request(payload.to_string())).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_multipart_image_field_without_filename_is_ignored() {
    let media = tempfile::tempdir().unwrap();
    let session = Arc::new(ScriptedSession::default());
    let app = app_with(Some(session.clone()), media.path());

    let body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"message\"\r\n\r\nhello\r\n\
         --{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"\r\n\r\nnot a file\r\n\
         --{BOUNDARY}--\r\n"
    );
    let (status, body) = send(&app, multipart_request(body.into_bytes())).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"response": "Hello from the model"}));
    assert_eq!(session.calls(), vec![vec![MessagePart::Text("hello".to_string())]]);
}

#[tokio::test]
async fn test_route_without_trailing_slash() {
    let media = tempfile::tempdir().unwrap();
    let app = app_with(Some(Arc::new(ScriptedSession::default())), media.path());

    let request = Request::builder()
        .method(Method::POST)
        .uri("/chat/send")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"message": "hi"}"#))
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_get_is_not_allowed() {
    let media = tempfile::tempdir().unwrap();
    let app = app_with(Some(Arc::new(ScriptedSession::default())), media.path());

    let response = app
        .oneshot(Request::get("/chat/send/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_request_id_is_propagated() {
    let media = tempfile::tempdir().unwrap();
    let app = app_with(Some(Arc::new(ScriptedSession::default())), media.path());

    let response = app
        .oneshot(json_request(r#"{"message": "hi"}"#))
        .await
        .unwrap();
    assert!(response.headers().contains_key(gemchat::server::REQUEST_ID_HEADER));
}

#[tokio::test]
async fn test_health_reports_session_state() {
    let media = tempfile::tempdir().unwrap();

    let app = app_with(Some(Arc::new(ScriptedSession::default())), media.path());
    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["checks"]["conversation_session"]["status"], "ok");

    let app = app_with(None, media.path());
    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], "degraded");
}

#[tokio::test]
async fn test_metrics_exposes_chat_counters() {
    let media = tempfile::tempdir().unwrap();
    let app = app_with(Some(Arc::new(ScriptedSession::default())), media.path());

    send(&app, json_request(r#"{"message": "count me"}"#)).await;

    let response = app
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("chat_requests_total"));
}
