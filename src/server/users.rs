use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, patch, post, put},
};
use chrono::Utc;
use uuid::Uuid;

use crate::auth::{OptionalUser, RequireUser, TokenGenerator};
use crate::media::MediaKind;
use crate::server::AppState;
use crate::server::access::audience_scope;
use crate::server::dto::{
    PaginationParams, ProfileResponse, RegisterRequest, RegisterResponse, UpdateProfileRequest,
};
use crate::server::response::{
    ApiError, ApiResponse, DEFAULT_PAGE_SIZE, PaginatedResponse, StoreOptionExt, StoreResultExt,
    paginate,
};
use crate::server::validation::validate_username;
use crate::server::videos::{stream_blob, video_to_summary};
use crate::types::{Role, Token, User};

pub fn user_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/me", get(get_me))
        .route("/me", patch(update_me))
        .route("/me/avatar", put(upload_avatar))
        .route("/users/{username}", get(get_profile))
        .route("/users/{username}/avatar", get(get_avatar))
        .route("/users/{username}/follow", put(follow_user))
        .route("/users/{username}/follow", delete(unfollow_user))
        .route("/users/{username}/followers", get(list_followers))
        .route("/users/{username}/following", get(list_following))
        .route("/users/{username}/videos", get(list_user_videos))
}

/// Mints a fresh non-admin token bound to a user, retrying on the
/// unlikely lookup-prefix collision.
pub(super) fn mint_user_token(
    state: &Arc<AppState>,
    user_id: &str,
    expires_at: Option<chrono::DateTime<Utc>>,
) -> Result<(String, Token), ApiError> {
    let generator = TokenGenerator::new();

    const MAX_RETRIES: u32 = 3;
    for _ in 0..MAX_RETRIES {
        let (raw_token, lookup, hash) = generator
            .generate()
            .map_err(|_| ApiError::internal("Failed to generate token"))?;

        let token = Token {
            id: Uuid::new_v4().to_string(),
            token_hash: hash,
            token_lookup: lookup,
            is_admin: false,
            user_id: Some(user_id.to_string()),
            created_at: Utc::now(),
            expires_at,
            last_used_at: None,
        };

        match state.store.create_token(&token) {
            Ok(()) => return Ok((raw_token, token)),
            Err(crate::error::Error::TokenLookupCollision) => continue,
            Err(_) => return Err(ApiError::internal("Failed to create token")),
        }
    }

    Err(ApiError::internal("Failed to create token after retries"))
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> impl IntoResponse {
    validate_username(&req.username)?;

    let role = req.role.unwrap_or_default();
    if role == Role::Admin {
        return Err(ApiError::bad_request("Cannot register as admin"));
    }

    if state
        .store
        .get_user_by_username(&req.username)
        .api_err("Failed to check username")?
        .is_some()
    {
        return Err(ApiError::conflict("Username already taken"));
    }

    let now = Utc::now();
    let user = User {
        id: Uuid::new_v4().to_string(),
        username: req.username,
        role,
        display_name: req.display_name,
        bio: req.bio,
        website: req.website,
        avatar_key: None,
        created_at: now,
        updated_at: now,
    };

    // The pre-check races with concurrent registrations; the unique
    // constraint is the authority.
    match state.store.create_user(&user) {
        Ok(()) => {}
        Err(crate::error::Error::AlreadyExists) => {
            return Err(ApiError::conflict("Username already taken"));
        }
        Err(_) => return Err(ApiError::internal("Failed to create user")),
    }

    let (raw_token, token) = mint_user_token(&state, &user.id, None)?;

    Ok::<_, ApiError>((
        StatusCode::CREATED,
        Json(ApiResponse::success(RegisterResponse {
            user,
            token: raw_token,
            token_id: token.id,
        })),
    ))
}

pub async fn get_me(auth: RequireUser) -> impl IntoResponse {
    Json(ApiResponse::success(auth.user))
}

pub async fn update_me(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<UpdateProfileRequest>,
) -> impl IntoResponse {
    let mut user = auth.user;

    // An empty string clears the field.
    if let Some(display_name) = req.display_name {
        user.display_name = Some(display_name).filter(|s| !s.is_empty());
    }
    if let Some(bio) = req.bio {
        user.bio = Some(bio).filter(|s| !s.is_empty());
    }
    if let Some(website) = req.website {
        user.website = Some(website).filter(|s| !s.is_empty());
    }
    user.updated_at = Utc::now();

    state
        .store
        .update_user(&user)
        .api_err("Failed to update profile")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(user)))
}

pub async fn upload_avatar(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    mut multipart: axum::extract::Multipart,
) -> impl IntoResponse {
    let mut upload: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart request: {e}")))?
    {
        if field.name() == Some("avatar") {
            let filename = field
                .file_name()
                .ok_or_else(|| ApiError::bad_request("Avatar field must be a file"))?
                .to_string();
            let data = field
                .bytes()
                .await
                .map_err(|e| ApiError::bad_request(format!("Failed to read avatar: {e}")))?;
            upload = Some((filename, data.to_vec()));
        }
    }

    let (filename, data) =
        upload.ok_or_else(|| ApiError::bad_request("Missing 'avatar' field"))?;

    let object = state
        .media
        .put(MediaKind::Image, &filename, &data)
        .await?;

    let mut user = auth.user;
    let new_key = object.key.clone();
    let old_key = user.avatar_key.replace(object.key);
    user.updated_at = Utc::now();

    if let Err(e) = state.store.update_user(&user) {
        tracing::error!("Failed to save avatar reference: {e}");
        let _ = state.media.delete(&new_key).await;
        return Err(ApiError::internal("Failed to update profile"));
    }

    if let Some(key) = old_key {
        if let Err(e) = state.media.delete(&key).await {
            tracing::warn!("Failed to delete previous avatar {key}: {e}");
        }
    }

    Ok::<_, ApiError>(Json(ApiResponse::success(user)))
}

pub async fn get_avatar(
    State(state): State<Arc<AppState>>,
    Path(username): Path<String>,
) -> impl IntoResponse {
    let user = state
        .store
        .get_user_by_username(&username)
        .api_err("Failed to get user")?
        .or_not_found("User not found")?;

    let key = user
        .avatar_key
        .as_deref()
        .or_not_found("User has no avatar")?;

    stream_blob(&state, key).await
}

pub async fn get_profile(
    viewer: OptionalUser,
    State(state): State<Arc<AppState>>,
    Path(username): Path<String>,
) -> impl IntoResponse {
    let store = state.store.as_ref();

    let user = store
        .get_user_by_username(&username)
        .api_err("Failed to get user")?
        .or_not_found("User not found")?;

    let follower_count = store
        .count_followers(&user.id)
        .api_err("Failed to count followers")?;
    let following_count = store
        .count_following(&user.id)
        .api_err("Failed to count following")?;

    let scope = audience_scope(store, viewer.user.as_ref(), &user.id)?;
    let video_count = store
        .count_user_videos(&user.id, scope)
        .api_err("Failed to count videos")?;

    let is_following = match &viewer.user {
        Some(v) if v.id != user.id => Some(
            store
                .follow_exists(&v.id, &user.id)
                .api_err("Failed to check follow status")?,
        ),
        _ => None,
    };

    Ok::<_, ApiError>(Json(ApiResponse::success(ProfileResponse {
        user,
        follower_count,
        following_count,
        video_count,
        is_following,
    })))
}

pub async fn follow_user(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(username): Path<String>,
) -> impl IntoResponse {
    let target = state
        .store
        .get_user_by_username(&username)
        .api_err("Failed to get user")?
        .or_not_found("User not found")?;

    if target.id == auth.user.id {
        return Err(ApiError::bad_request("Cannot follow yourself"));
    }

    // Idempotent: re-following is a no-op.
    state
        .store
        .create_follow(&auth.user.id, &target.id)
        .api_err("Failed to follow user")?;

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}

pub async fn unfollow_user(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(username): Path<String>,
) -> impl IntoResponse {
    let target = state
        .store
        .get_user_by_username(&username)
        .api_err("Failed to get user")?
        .or_not_found("User not found")?;

    state
        .store
        .delete_follow(&auth.user.id, &target.id)
        .api_err("Failed to unfollow user")?;

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}

pub async fn list_followers(
    State(state): State<Arc<AppState>>,
    Path(username): Path<String>,
    Query(params): Query<PaginationParams>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    let cursor = params.cursor.as_deref().unwrap_or("");

    let user = store
        .get_user_by_username(&username)
        .api_err("Failed to get user")?
        .or_not_found("User not found")?;

    let followers = store
        .list_followers(&user.id, cursor, DEFAULT_PAGE_SIZE + 1)
        .api_err("Failed to list followers")?;

    let (followers, next_cursor, has_more) =
        paginate(followers, DEFAULT_PAGE_SIZE as usize, |u| u.username.clone());

    Ok::<_, ApiError>(Json(PaginatedResponse::new(followers, next_cursor, has_more)))
}

pub async fn list_following(
    State(state): State<Arc<AppState>>,
    Path(username): Path<String>,
    Query(params): Query<PaginationParams>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    let cursor = params.cursor.as_deref().unwrap_or("");

    let user = store
        .get_user_by_username(&username)
        .api_err("Failed to get user")?
        .or_not_found("User not found")?;

    let following = store
        .list_following(&user.id, cursor, DEFAULT_PAGE_SIZE + 1)
        .api_err("Failed to list following")?;

    let (following, next_cursor, has_more) =
        paginate(following, DEFAULT_PAGE_SIZE as usize, |u| u.username.clone());

    Ok::<_, ApiError>(Json(PaginatedResponse::new(following, next_cursor, has_more)))
}

pub async fn list_user_videos(
    viewer: OptionalUser,
    State(state): State<Arc<AppState>>,
    Path(username): Path<String>,
    Query(params): Query<PaginationParams>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    let cursor = params.cursor.as_deref().unwrap_or("");

    let user = store
        .get_user_by_username(&username)
        .api_err("Failed to get user")?
        .or_not_found("User not found")?;

    let scope = audience_scope(store, viewer.user.as_ref(), &user.id)?;

    let videos = store
        .list_user_videos(&user.id, scope, cursor, DEFAULT_PAGE_SIZE + 1)
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
