mod schema;
mod sqlite;

pub use sqlite::SqliteStore;

use crate::error::Result;
use crate::types::*;

/// How much of a user's catalog the caller is allowed to see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudienceScope {
    /// The owner themselves: everything.
    Owner,
    /// An accepted follower: public + followers-only.
    Follower,
    /// Anyone else, including anonymous: public only.
    Public,
}

/// Store defines the database interface.
pub trait Store: Send + Sync {
    fn initialize(&self) -> Result<()>;

    // User operations
    fn create_user(&self, user: &User) -> Result<()>;
    fn get_user(&self, id: &str) -> Result<Option<User>>;
    fn get_user_by_username(&self, username: &str) -> Result<Option<User>>;
    fn list_users(&self, cursor: &str, limit: i32) -> Result<Vec<User>>;
    fn update_user(&self, user: &User) -> Result<()>;
    fn delete_user(&self, id: &str) -> Result<bool>;

    // Follow operations
    fn create_follow(&self, follower_id: &str, followee_id: &str) -> Result<bool>;
    fn delete_follow(&self, follower_id: &str, followee_id: &str) -> Result<bool>;
    fn follow_exists(&self, follower_id: &str, followee_id: &str) -> Result<bool>;
    fn list_followers(&self, user_id: &str, cursor: &str, limit: i32) -> Result<Vec<User>>;
    fn list_following(&self, user_id: &str, cursor: &str, limit: i32) -> Result<Vec<User>>;
    fn count_followers(&self, user_id: &str) -> Result<i64>;
    fn count_following(&self, user_id: &str) -> Result<i64>;

    // Token operations
    fn create_token(&self, token: &Token) -> Result<()>;
    fn get_token_by_id(&self, id: &str) -> Result<Option<Token>>;
    fn get_token_by_lookup(&self, lookup: &str) -> Result<Option<Token>>;
    fn list_tokens(&self, cursor: &str, limit: i32) -> Result<Vec<Token>>;
    fn list_user_tokens(&self, user_id: &str) -> Result<Vec<Token>>;
    fn delete_token(&self, id: &str) -> Result<bool>;
    fn update_token_last_used(&self, id: &str) -> Result<()>;

    // Video operations
    fn create_video(&self, video: &Video) -> Result<()>;
    fn get_video(&self, id: &str) -> Result<Option<Video>>;
    fn list_public_videos(&self, cursor: &str, limit: i32) -> Result<Vec<Video>>;
    fn list_user_videos(
        &self,
        user_id: &str,
        scope: AudienceScope,
        cursor: &str,
        limit: i32,
    ) -> Result<Vec<Video>>;
    fn count_user_videos(&self, user_id: &str, scope: AudienceScope) -> Result<i64>;
    fn list_related_videos(
        &self,
        user_id: &str,
        exclude_video_id: &str,
        limit: i32,
    ) -> Result<Vec<Video>>;
    fn list_recommended_videos(
        &self,
        exclude_video_id: &str,
        exclude_user_id: Option<&str>,
        limit: i32,
    ) -> Result<Vec<Video>>;
    fn search_public_videos(&self, query: &str, limit: i32) -> Result<Vec<Video>>;
    fn update_video(&self, video: &Video) -> Result<()>;
    fn delete_video(&self, id: &str) -> Result<bool>;

    // Tag operations
    fn create_tag(&self, tag: &Tag) -> Result<()>;
    fn get_tag_by_name(&self, name: &str) -> Result<Option<Tag>>;
    fn get_tag_by_slug(&self, slug: &str) -> Result<Option<Tag>>;
    fn list_tags(&self, cursor: &str, limit: i32) -> Result<Vec<Tag>>;
    fn count_tag_videos(&self, tag_id: &str) -> Result<i64>;

    // Video-Tag M2M operations
    fn set_video_tags(&self, video_id: &str, tag_ids: &[String]) -> Result<()>;
    fn list_video_tags(&self, video_id: &str) -> Result<Vec<Tag>>;
    fn list_tag_videos(&self, tag_id: &str, cursor: &str, limit: i32) -> Result<Vec<Video>>;

    // Like operations
    fn get_like(&self, user_id: &str, video_id: &str) -> Result<Option<Like>>;
    fn upsert_like(&self, like: &Like) -> Result<()>;
    fn delete_like(&self, user_id: &str, video_id: &str) -> Result<bool>;
    fn count_likes(&self, video_id: &str, is_like: bool) -> Result<i64>;

    // Comment operations
    fn create_comment(&self, comment: &Comment) -> Result<()>;
    fn get_comment(&self, id: &str) -> Result<Option<Comment>>;
    fn list_top_level_comments(
        &self,
        video_id: &str,
        cursor: &str,
        limit: i32,
    ) -> Result<Vec<Comment>>;
    fn list_comment_replies(&self, parent_id: &str) -> Result<Vec<Comment>>;
    fn count_comments(&self, video_id: &str) -> Result<i64>;
    fn count_comment_replies(&self, parent_id: &str) -> Result<i64>;
    fn delete_comment(&self, id: &str) -> Result<bool>;

    // View operations
    fn record_view(&self, view: &View) -> Result<bool>;
    fn count_views(&self, video_id: &str) -> Result<i64>;

    // Admin token check
    fn has_admin_token(&self) -> Result<bool>;

    fn close(&self) -> Result<()>;
}
