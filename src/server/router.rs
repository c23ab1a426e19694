use std::sync::Arc;
use std::time::Instant;

use axum::extract::{DefaultBodyLimit, Request};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::{Router, routing::get};

use super::admin::admin_router;
use super::interactions::interaction_router;
use super::tags::tag_router;
use super::users::user_router;
use super::videos::video_router;
use crate::media::MediaStorage;
use crate::store::Store;

/// Video cap plus thumbnail and multipart framing overhead.
const MAX_BODY_BYTES: usize = 110 * 1024 * 1024;

pub struct AppState {
    pub store: Arc<dyn Store>,
    pub media: Arc<MediaStorage>,
    /// Public base URL for external access (e.g. reverse-proxied deployments).
    pub public_base_url: Option<String>,
}

async fn health() -> &'static str {
    "OK"
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let response = next.run(request).await;

    let latency = start.elapsed();
    let status = response.status();

    tracing::info!(
        "{} {} {} {}ms",
        method,
        uri.path(),
        status.as_u16(),
        latency.as_millis()
    );

    response
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/v1/admin", admin_router())
        .nest("/api/v1", user_router())
        .nest("/api/v1", video_router())
        .nest("/api/v1", interaction_router())
        .nest("/api/v1", tag_router())
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}
