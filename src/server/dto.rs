use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Comment, Role, Tag, User, Video, Visibility};

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user: User,
    /// The raw bearer token. Shown exactly once.
    pub token: String,
    pub token_id: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    #[serde(flatten)]
    pub user: User,
    pub follower_count: i64,
    pub following_count: i64,
    pub video_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_following: Option<bool>,
}

/// A video plus everything a listing needs: owner, tags, live counts.
#[derive(Debug, Serialize)]
pub struct VideoSummary {
    #[serde(flatten)]
    pub video: Video,
    pub owner: String,
    pub tags: Vec<Tag>,
    pub like_count: i64,
    pub dislike_count: i64,
    pub comment_count: i64,
    pub view_count: i64,
}

#[derive(Debug, Serialize)]
pub struct WatchResponse {
    #[serde(flatten)]
    pub video: VideoSummary,
    /// Some(true) if the caller liked this video, Some(false) if disliked.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub viewer_reaction: Option<bool>,
    pub comments: Vec<CommentResponse>,
    pub related: Vec<VideoSummary>,
    pub recommended: Vec<VideoSummary>,
}

#[derive(Debug, Serialize)]
pub struct CommentResponse {
    #[serde(flatten)]
    pub comment: Comment,
    pub author: String,
    pub reply_count: i64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateVideoRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub visibility: Option<Visibility>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct CreateCommentRequest {
    pub body: String,
    #[serde(default)]
    pub parent_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReactionResponse {
    /// "created", "switched", or "removed".
    pub action: &'static str,
    pub like_count: i64,
    pub dislike_count: i64,
}

#[derive(Debug, Serialize)]
pub struct ViewResponse {
    /// False when an authenticated caller had already viewed this video.
    pub counted: bool,
    pub view_count: i64,
}

#[derive(Debug, Serialize)]
pub struct TagResponse {
    #[serde(flatten)]
    pub tag: Tag,
    pub video_count: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct PaginationParams {
    #[serde(default)]
    pub cursor: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRoleRequest {
    pub role: Role,
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateUserTokenRequest {
    #[serde(default)]
    pub expires_in_seconds: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub id: String,
    pub is_admin: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct CreateTokenResponse {
    pub token: String,
    pub metadata: TokenResponse,
}
