use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
};
use chrono::Utc;
use uuid::Uuid;

use crate::auth::{OptionalUser, RequireUser};
use crate::server::AppState;
use crate::server::access::check_video_access;
use crate::server::dto::{
    CommentResponse, CreateCommentRequest, PaginationParams, ReactionResponse, ViewResponse,
};
use crate::server::response::{
    ApiError, ApiResponse, DEFAULT_PAGE_SIZE, PaginatedResponse, StoreOptionExt, StoreResultExt,
    paginate,
};
use crate::server::validation::validate_comment_body;
use crate::types::{Comment, Like, User, Video, View};

pub fn interaction_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/videos/{id}/like", post(like_video))
        .route("/videos/{id}/dislike", post(dislike_video))
        .route("/videos/{id}/views", post(record_view))
        .route("/videos/{id}/comments", post(create_comment))
        .route("/videos/{id}/comments", get(list_comments))
        .route("/comments/{id}/replies", get(list_replies))
        .route("/comments/{id}", delete(delete_comment))
}

pub(super) fn comment_to_response(
    state: &Arc<AppState>,
    comment: Comment,
) -> Result<CommentResponse, ApiError> {
    let store = state.store.as_ref();

    let author = store
        .get_user(&comment.user_id)
        .api_err("Failed to load comment author")?
        .map(|u| u.username)
        .unwrap_or_default();

    let reply_count = if comment.parent_id.is_none() {
        store
            .count_comment_replies(&comment.id)
            .api_err("Failed to count replies")?
    } else {
        0
    };

    Ok(CommentResponse {
        comment,
        author,
        reply_count,
    })
}

fn load_visible_video(
    state: &Arc<AppState>,
    viewer: Option<&User>,
    id: &str,
) -> Result<Video, ApiError> {
    let video = state
        .store
        .get_video(id)
        .api_err("Failed to get video")?
        .or_not_found("Video not found")?;

    check_video_access(state.store.as_ref(), viewer, &video)?;

    Ok(video)
}

/// Toggle semantics shared by like and dislike: no row creates one,
/// the same polarity removes it, the opposite polarity flips it.
fn toggle_reaction(
    state: &Arc<AppState>,
    auth: &RequireUser,
    video_id: &str,
    is_like: bool,
) -> Result<ReactionResponse, ApiError> {
    let store = state.store.as_ref();
    let video = load_visible_video(state, Some(&auth.user), video_id)?;

    let existing = store
        .get_like(&auth.user.id, &video.id)
        .api_err("Failed to load reaction")?;

    let action = match existing {
        Some(like) if like.is_like == is_like => {
            store
                .delete_like(&auth.user.id, &video.id)
                .api_err("Failed to remove reaction")?;
            "removed"
        }
        Some(_) => {
            store
                .upsert_like(&Like {
                    user_id: auth.user.id.clone(),
                    video_id: video.id.clone(),
                    is_like,
                    created_at: Utc::now(),
                })
                .api_err("Failed to update reaction")?;
            "switched"
        }
        None => {
            store
                .upsert_like(&Like {
                    user_id: auth.user.id.clone(),
                    video_id: video.id.clone(),
                    is_like,
                    created_at: Utc::now(),
                })
                .api_err("Failed to save reaction")?;
            "created"
        }
    };

    let like_count = store
        .count_likes(&video.id, true)
        .api_err("Failed to count likes")?;
    let dislike_count = store
        .count_likes(&video.id, false)
        .api_err("Failed to count dislikes")?;

    Ok(ReactionResponse {
        action,
        like_count,
        dislike_count,
    })
}

pub async fn like_video(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let response = toggle_reaction(&state, &auth, &id, true)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(response)))
}

pub async fn dislike_video(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let response = toggle_reaction(&state, &auth, &id, false)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(response)))
}

pub async fn record_view(
    viewer: OptionalUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let video = load_visible_video(&state, viewer.user.as_ref(), &id)?;

    let view = View {
        user_id: viewer.user.as_ref().map(|u| u.id.clone()),
        video_id: video.id.clone(),
        created_at: Utc::now(),
    };

    let counted = state
        .store
        .record_view(&view)
        .api_err("Failed to record view")?;

    let view_count = state
        .store
        .count_views(&video.id)
        .api_err("Failed to count views")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(ViewResponse {
        counted,
        view_count,
    })))
}

pub async fn create_comment(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<CreateCommentRequest>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    let video = load_visible_video(&state, Some(&auth.user), &id)?;

    validate_comment_body(&req.body)?;

    if let Some(parent_id) = &req.parent_id {
        let parent = store
            .get_comment(parent_id)
            .api_err("Failed to get parent comment")?
            .or_not_found("Parent comment not found")?;

        if parent.video_id != video.id {
            return Err(ApiError::bad_request(
                "Parent comment belongs to a different video",
            ));
        }
        // Single-level threading only.
        if parent.parent_id.is_some() {
            return Err(ApiError::bad_request(
                "Replies can only be added to top-level comments",
            ));
        }
    }

    let now = Utc::now();
    let comment = Comment {
        id: Uuid::new_v4().to_string(),
        video_id: video.id,
        user_id: auth.user.id.clone(),
        parent_id: req.parent_id,
        body: req.body.trim().to_string(),
        created_at: now,
        updated_at: now,
    };

    store
        .create_comment(&comment)
        .api_err("Failed to create comment")?;

    let response = comment_to_response(&state, comment)?;

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(response))))
}

pub async fn list_comments(
    viewer: OptionalUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<PaginationParams>,
) -> impl IntoResponse {
    let cursor = params.cursor.as_deref().unwrap_or("");
    let video = load_visible_video(&state, viewer.user.as_ref(), &id)?;

    let comments = state
        .store
        .list_top_level_comments(&video.id, cursor, DEFAULT_PAGE_SIZE + 1)
        .api_err("Failed to list comments")?;

    let (comments, next_cursor, has_more) = paginate(comments, DEFAULT_PAGE_SIZE as usize, |c| {
        c.created_at.to_rfc3339()
    });

    let responses = comments
        .into_iter()
        .map(|c| comment_to_response(&state, c))
        .collect::<Result<Vec<_>, _>>()?;

    Ok::<_, ApiError>(Json(PaginatedResponse::new(responses, next_cursor, has_more)))
}

pub async fn list_replies(
    viewer: OptionalUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let store = state.store.as_ref();

    let comment = store
        .get_comment(&id)
        .api_err("Failed to get comment")?
        .or_not_found("Comment not found")?;

    load_visible_video(&state, viewer.user.as_ref(), &comment.video_id)?;

    let replies = store
        .list_comment_replies(&comment.id)
        .api_err("Failed to list replies")?
        .into_iter()
        .map(|c| comment_to_response(&state, c))
        .collect::<Result<Vec<_>, _>>()?;

    Ok::<_, ApiError>(Json(ApiResponse::success(replies)))
}

pub async fn delete_comment(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let store = state.store.as_ref();

    let comment = store
        .get_comment(&id)
        .api_err("Failed to get comment")?
        .or_not_found("Comment not found")?;

    let video = store
        .get_video(&comment.video_id)
        .api_err("Failed to get video")?
        .or_not_found("Video not found")?;

    if comment.user_id != auth.user.id && video.user_id != auth.user.id {
        return Err(ApiError::forbidden(
            "Only the comment author or the video owner can delete a comment",
        ));
    }

    store
        .delete_comment(&comment.id)
        .api_err("Failed to delete comment")?;

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}
