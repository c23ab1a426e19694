use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::auth::RequireAdmin;
use crate::server::AppState;
use crate::server::response::{ApiError, StoreOptionExt, StoreResultExt};
use crate::server::videos::delete_video_blobs;

/// Moderation: removes any video regardless of owner.
pub async fn delete_video(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let video = state
        .store
        .get_video(&id)
        .api_err("Failed to get video")?
        .or_not_found("Video not found")?;

    state
        .store
        .delete_video(&video.id)
        .api_err("Failed to delete video")?;

    delete_video_blobs(&state, &video).await;

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}
