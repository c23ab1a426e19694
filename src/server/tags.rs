use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::get,
};

use crate::server::AppState;
use crate::server::dto::{PaginationParams, TagResponse};
use crate::server::response::{
    ApiError, DEFAULT_PAGE_SIZE, PaginatedResponse, StoreOptionExt, StoreResultExt, paginate,
};
use crate::server::videos::video_to_summary;

pub fn tag_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tags", get(list_tags))
        .route("/tags/{slug}/videos", get(list_tag_videos))
}

pub async fn list_tags(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PaginationParams>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    let cursor = params.cursor.as_deref().unwrap_or("");

    let tags = store
        .list_tags(cursor, DEFAULT_PAGE_SIZE + 1)
        .api_err("Failed to list tags")?;

    let (tags, next_cursor, has_more) =
        paginate(tags, DEFAULT_PAGE_SIZE as usize, |t| t.name.clone());

    let responses = tags
        .into_iter()
        .map(|tag| {
            let video_count = store
                .count_tag_videos(&tag.id)
                .api_err("Failed to count tag videos")?;
            Ok(TagResponse { tag, video_count })
        })
        .collect::<Result<Vec<_>, ApiError>>()?;

    Ok::<_, ApiError>(Json(PaginatedResponse::new(responses, next_cursor, has_more)))
}

pub async fn list_tag_videos(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    Query(params): Query<PaginationParams>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    let cursor = params.cursor.as_deref().unwrap_or("");

    let tag = store
        .get_tag_by_slug(&slug)
        .api_err("Failed to get tag")?
        .or_not_found("Tag not found")?;

    let videos = store
        .list_tag_videos(&tag.id, cursor, DEFAULT_PAGE_SIZE + 1)
        .api_err("Failed to list tag videos")?;

    let (videos, next_cursor, has_more) = paginate(videos, DEFAULT_PAGE_SIZE as usize, |v| {
        v.created_at.to_rfc3339()
    });

    let summaries = videos
        .into_iter()
        .map(|v| video_to_summary(&state, v))
        .collect::<Result<Vec<_>, _>>()?;

    Ok::<_, ApiError>(Json(PaginatedResponse::new(summaries, next_cursor, has_more)))
}
