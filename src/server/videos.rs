use std::sync::Arc;

use axum::{
    Json, Router,
    body::Body,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{delete, get, patch, post},
};
use chrono::Utc;
use tokio_util::io::ReaderStream;
use uuid::Uuid;

use crate::auth::{OptionalUser, RequireUser};
use crate::media::{MediaKind, MediaStorage, content_type_for};
use crate::server::AppState;
use crate::server::access::{check_video_access, require_video_owner};
use crate::server::dto::{
    PaginationParams, SearchParams, UpdateVideoRequest, VideoSummary, WatchResponse,
};
use crate::server::interactions::comment_to_response;
use crate::server::response::{
    ApiError, ApiResponse, DEFAULT_PAGE_SIZE, PaginatedResponse, StoreOptionExt, StoreResultExt,
    paginate,
};
use crate::server::validation::{parse_tag_list, slugify, validate_title};
use crate::store::Store;
use crate::types::{Tag, Video, View, Visibility};

const RELATED_LIMIT: i32 = 5;
const RECOMMENDED_LIMIT: i32 = 5;
/// Below this many recommendations the owner exclusion is dropped.
const RECOMMENDED_BACKFILL_THRESHOLD: usize = 3;
const SEARCH_LIMIT: i32 = 50;

pub fn video_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/videos", post(upload_video))
        .route("/videos", get(list_feed))
        .route("/videos/search", get(search_videos))
        .route("/videos/{id}", get(watch_video))
        .route("/videos/{id}", patch(update_video))
        .route("/videos/{id}", delete(delete_video))
        .route("/videos/{id}/file", get(get_video_file))
        .route("/videos/{id}/thumbnail", get(get_video_thumbnail))
}

/// Attaches owner username, tags, and live counts to a video row.
pub(super) fn video_to_summary(
    state: &Arc<AppState>,
    video: Video,
) -> Result<VideoSummary, ApiError> {
    let store = state.store.as_ref();

    let owner = store
        .get_user(&video.user_id)
        .api_err("Failed to load video owner")?
        .map(|u| u.username)
        .unwrap_or_default();

    let tags = store
        .list_video_tags(&video.id)
        .api_err("Failed to load tags")?;
    let like_count = store
        .count_likes(&video.id, true)
        .api_err("Failed to count likes")?;
    let dislike_count = store
        .count_likes(&video.id, false)
        .api_err("Failed to count dislikes")?;
    let comment_count = store
        .count_comments(&video.id)
        .api_err("Failed to count comments")?;
    let view_count = store
        .count_views(&video.id)
        .api_err("Failed to count views")?;

    Ok(VideoSummary {
        video,
        owner,
        tags,
        like_count,
        dislike_count,
        comment_count,
        view_count,
    })
}

/// Resolves normalized tag names to tag ids, creating missing tags.
pub(super) fn resolve_tag_ids(store: &dyn Store, names: &[String]) -> Result<Vec<String>, ApiError> {
    let mut ids = Vec::with_capacity(names.len());

    for name in names {
        let existing = store
            .get_tag_by_name(name)
            .api_err("Failed to look up tag")?;

        let tag = match existing {
            Some(tag) => tag,
            None => {
                let tag = Tag {
                    id: Uuid::new_v4().to_string(),
                    name: name.clone(),
                    slug: slugify(name),
                    created_at: Utc::now(),
                };
                match store.create_tag(&tag) {
                    Ok(()) => tag,
                    // Lost a race, or the slug collides with a different name.
                    Err(crate::error::Error::AlreadyExists) => store
                        .get_tag_by_name(name)
                        .api_err("Failed to look up tag")?
                        .ok_or_else(|| {
                            ApiError::conflict(format!(
                                "Tag '{name}' conflicts with an existing tag"
                            ))
                        })?,
                    Err(_) => return Err(ApiError::internal("Failed to create tag")),
                }
            }
        };

        ids.push(tag.id);
    }

    Ok(ids)
}

/// Best-effort removal of a video's stored blobs.
pub(super) async fn delete_video_blobs(state: &Arc<AppState>, video: &Video) {
    if let Err(e) = state.media.delete(&video.file_key).await {
        tracing::warn!("Failed to delete video file {}: {e}", video.file_key);
    }
    if let Some(key) = &video.thumbnail_key {
        if let Err(e) = state.media.delete(key).await {
            tracing::warn!("Failed to delete thumbnail {key}: {e}");
        }
    }
}

#[derive(Default)]
struct VideoUpload {
    file: Option<(String, Vec<u8>)>,
    thumbnail: Option<(String, Vec<u8>)>,
    title: Option<String>,
    description: Option<String>,
    visibility: Option<String>,
    tags: Option<String>,
}

async fn parse_video_upload(
    multipart: &mut axum::extract::Multipart,
) -> Result<VideoUpload, ApiError> {
    let mut upload = VideoUpload::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart request: {e}")))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        match name.as_str() {
            "file" | "thumbnail" => {
                let filename = field
                    .file_name()
                    .ok_or_else(|| {
                        ApiError::bad_request(format!("Field '{name}' must be a file"))
                    })?
                    .to_string();
                let data = field.bytes().await.map_err(|e| {
                    ApiError::bad_request(format!("Failed to read '{name}': {e}"))
                })?;
                if name == "file" {
                    upload.file = Some((filename, data.to_vec()));
                } else {
                    upload.thumbnail = Some((filename, data.to_vec()));
                }
            }
            "title" | "description" | "visibility" | "tags" => {
                let value = field.text().await.map_err(|e| {
                    ApiError::bad_request(format!("Failed to read '{name}': {e}"))
                })?;
                match name.as_str() {
                    "title" => upload.title = Some(value),
                    "description" => upload.description = Some(value),
                    "visibility" => upload.visibility = Some(value),
                    _ => upload.tags = Some(value),
                }
            }
            _ => {}
        }
    }

    Ok(upload)
}

pub async fn upload_video(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    mut multipart: axum::extract::Multipart,
) -> impl IntoResponse {
    let upload = parse_video_upload(&mut multipart).await?;

    let (filename, data) = upload
        .file
        .ok_or_else(|| ApiError::bad_request("Missing 'file' field"))?;
    let title = upload
        .title
        .ok_or_else(|| ApiError::bad_request("Missing 'title' field"))?;
    validate_title(&title)?;

    let visibility = match upload.visibility.as_deref() {
        None | Some("") => Visibility::default(),
        Some(raw) => Visibility::parse(raw)
            .map_err(|_| ApiError::bad_request(format!("Invalid visibility: {raw}")))?,
    };

    let tag_names = match upload.tags.as_deref() {
        None | Some("") => Vec::new(),
        Some(raw) => parse_tag_list(raw)?,
    };

    // Validate the thumbnail before the (much larger) video write.
    if let Some((thumb_name, thumb_data)) = &upload.thumbnail {
        MediaStorage::validate(
            MediaKind::Image,
            thumb_name,
            thumb_data.len() as i64,
        )?;
    }

    let file_object = state.media.put(MediaKind::Video, &filename, &data).await?;

    let thumbnail_key = match upload.thumbnail {
        Some((thumb_name, thumb_data)) => {
            match state.media.put(MediaKind::Image, &thumb_name, &thumb_data).await {
                Ok(object) => Some(object.key),
                Err(e) => {
                    let _ = state.media.delete(&file_object.key).await;
                    return Err(e.into());
                }
            }
        }
        None => None,
    };

    let now = Utc::now();
    let video = Video {
        id: Uuid::new_v4().to_string(),
        user_id: auth.user.id.clone(),
        title: title.trim().to_string(),
        description: upload.description.filter(|s| !s.is_empty()),
        file_key: file_object.key,
        thumbnail_key,
        visibility,
        size_bytes: file_object.size,
        created_at: now,
        updated_at: now,
    };

    if let Err(e) = state.store.create_video(&video) {
        tracing::error!("Failed to create video row: {e}");
        delete_video_blobs(&state, &video).await;
        return Err(ApiError::internal("Failed to create video"));
    }

    if !tag_names.is_empty() {
        let tag_ids = resolve_tag_ids(state.store.as_ref(), &tag_names)?;
        state
            .store
            .set_video_tags(&video.id, &tag_ids)
            .api_err("Failed to set tags")?;
    }

    let summary = video_to_summary(&state, video)?;

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(summary))))
}

pub async fn list_feed(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PaginationParams>,
) -> impl IntoResponse {
    let cursor = params.cursor.as_deref().unwrap_or("");

    let videos = state
        .store
        .list_public_videos(cursor, DEFAULT_PAGE_SIZE + 1)
        .api_err("Failed to list videos")?;

    let (videos, next_cursor, has_more) = paginate(videos, DEFAULT_PAGE_SIZE as usize, |v| {
        v.created_at.to_rfc3339()
    });

    let summaries = videos
        .into_iter()
        .map(|v| video_to_summary(&state, v))
        .collect::<Result<Vec<_>, _>>()?;

    Ok::<_, ApiError>(Json(PaginatedResponse::new(summaries, next_cursor, has_more)))
}

pub async fn watch_video(
    viewer: OptionalUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let store = state.store.as_ref();

    let video = store
        .get_video(&id)
        .api_err("Failed to get video")?
        .or_not_found("Video not found")?;

    check_video_access(store, viewer.user.as_ref(), &video)?;

    let view = View {
        user_id: viewer.user.as_ref().map(|u| u.id.clone()),
        video_id: video.id.clone(),
        created_at: Utc::now(),
    };
    if let Err(e) = store.record_view(&view) {
        tracing::warn!("Failed to record view for {}: {e}", video.id);
    }

    let viewer_reaction = match &viewer.user {
        Some(user) => store
            .get_like(&user.id, &video.id)
            .api_err("Failed to load reaction")?
            .map(|l| l.is_like),
        None => None,
    };

    let comments = store
        .list_top_level_comments(&video.id, "", DEFAULT_PAGE_SIZE)
        .api_err("Failed to load comments")?
        .into_iter()
        .map(|c| comment_to_response(&state, c))
        .collect::<Result<Vec<_>, _>>()?;

    let related = store
        .list_related_videos(&video.user_id, &video.id, RELATED_LIMIT)
        .api_err("Failed to load related videos")?;

    let mut recommended = store
        .list_recommended_videos(&video.id, Some(&video.user_id), RECOMMENDED_LIMIT)
        .api_err("Failed to load recommended videos")?;
    if recommended.len() < RECOMMENDED_BACKFILL_THRESHOLD {
        recommended = store
            .list_recommended_videos(&video.id, None, RECOMMENDED_LIMIT)
            .api_err("Failed to load recommended videos")?;
    }

    let related = related
        .into_iter()
        .map(|v| video_to_summary(&state, v))
        .collect::<Result<Vec<_>, _>>()?;
    let recommended = recommended
        .into_iter()
        .map(|v| video_to_summary(&state, v))
        .collect::<Result<Vec<_>, _>>()?;

    let summary = video_to_summary(&state, video)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(WatchResponse {
        video: summary,
        viewer_reaction,
        comments,
        related,
        recommended,
    })))
}

pub(super) async fn stream_blob(state: &Arc<AppState>, key: &str) -> Result<Response, ApiError> {
    let (reader, size) = state.media.open(key).await?;

    let stream = ReaderStream::new(reader);
    let body = Body::from_stream(stream);

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type_for(key))
        .header(header::CONTENT_LENGTH, size)
        .body(body)
        .map_err(|_| ApiError::internal("Failed to build response"))
}

pub async fn get_video_file(
    viewer: OptionalUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let video = state
        .store
        .get_video(&id)
        .api_err("Failed to get video")?
        .or_not_found("Video not found")?;

    check_video_access(state.store.as_ref(), viewer.user.as_ref(), &video)?;

    stream_blob(&state, &video.file_key).await
}

pub async fn get_video_thumbnail(
    viewer: OptionalUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let video = state
        .store
        .get_video(&id)
        .api_err("Failed to get video")?
        .or_not_found("Video not found")?;

    check_video_access(state.store.as_ref(), viewer.user.as_ref(), &video)?;

    let key = video
        .thumbnail_key
        .as_deref()
        .or_not_found("Video has no thumbnail")?;

    stream_blob(&state, key).await
}

pub async fn update_video(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateVideoRequest>,
) -> impl IntoResponse {
    let store = state.store.as_ref();

    let mut video = store
        .get_video(&id)
        .api_err("Failed to get video")?
        .or_not_found("Video not found")?;

    require_video_owner(&auth.user, &video)?;

    if let Some(title) = req.title {
        validate_title(&title)?;
        video.title = title.trim().to_string();
    }
    if let Some(description) = req.description {
        video.description = Some(description).filter(|s| !s.is_empty());
    }
    if let Some(visibility) = req.visibility {
        video.visibility = visibility;
    }
    video.updated_at = Utc::now();

    store
        .update_video(&video)
        .api_err("Failed to update video")?;

    if let Some(tags) = req.tags {
        let names = parse_tag_list(&tags.join(","))?;
        let tag_ids = resolve_tag_ids(store, &names)?;
        store
            .set_video_tags(&video.id, &tag_ids)
            .api_err("Failed to set tags")?;
    }

    let summary = video_to_summary(&state, video)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(summary)))
}

pub async fn delete_video(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let video = state
        .store
        .get_video(&id)
        .api_err("Failed to get video")?
        .or_not_found("Video not found")?;

    require_video_owner(&auth.user, &video)?;

    state
        .store
        .delete_video(&video.id)
        .api_err("Failed to delete video")?;

    delete_video_blobs(&state, &video).await;

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}

pub async fn search_videos(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> impl IntoResponse {
    let query = params.q.as_deref().unwrap_or("").trim().to_string();

    if query.is_empty() {
        return Ok::<_, ApiError>(Json(ApiResponse::success(Vec::<VideoSummary>::new())));
    }

    let videos = state
        .store
        .search_public_videos(&query, SEARCH_LIMIT)
        .api_err("Failed to search videos")?;

    let summaries = videos
        .into_iter()
        .map(|v| video_to_summary(&state, v))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(ApiResponse::success(summaries)))
}
