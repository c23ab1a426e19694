use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::{AudienceScope, Store};
use super::schema::SCHEMA;
use crate::error::{Error, Result};
use crate::types::*;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns a guard to the underlying database connection.
    /// This allows consuming applications to execute custom SQL.
    pub fn connection(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn()
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // Handle SQLite's default datetime format: "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            tracing::error!("Invalid datetime in database: '{}' - {}", s, e);
            Utc::now()
        })
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn parse_role(s: &str) -> Role {
    Role::parse(s).unwrap_or_else(|_| {
        tracing::error!("Invalid role in database: '{}'", s);
        Role::Consumer
    })
}

fn parse_visibility(s: &str) -> Visibility {
    Visibility::parse(s).unwrap_or_else(|_| {
        tracing::error!("Invalid visibility in database: '{}'", s);
        Visibility::Private
    })
}

/// Escapes LIKE wildcards so user queries match literally.
fn like_pattern(query: &str) -> String {
    let escaped = query
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

const USER_COLS: &str =
    "id, username, role, display_name, bio, website, avatar_key, created_at, updated_at";
const TOKEN_COLS: &str =
    "id, token_hash, token_lookup, is_admin, user_id, created_at, expires_at, last_used_at";
const VIDEO_COLS: &str =
    "id, user_id, title, description, file_key, thumbnail_key, visibility, size_bytes, created_at, updated_at";
const COMMENT_COLS: &str = "id, video_id, user_id, parent_id, body, created_at, updated_at";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        role: parse_role(&row.get::<_, String>(2)?),
        display_name: row.get(3)?,
        bio: row.get(4)?,
        website: row.get(5)?,
        avatar_key: row.get(6)?,
        created_at: parse_datetime(&row.get::<_, String>(7)?),
        updated_at: parse_datetime(&row.get::<_, String>(8)?),
    })
}

fn token_from_row(row: &Row<'_>) -> rusqlite::Result<Token> {
    Ok(Token {
        id: row.get(0)?,
        token_hash: row.get(1)?,
        token_lookup: row.get(2)?,
        is_admin: row.get(3)?,
        user_id: row.get(4)?,
        created_at: parse_datetime(&row.get::<_, String>(5)?),
        expires_at: row.get::<_, Option<String>>(6)?.map(|s| parse_datetime(&s)),
        last_used_at: row.get::<_, Option<String>>(7)?.map(|s| parse_datetime(&s)),
    })
}

fn video_from_row(row: &Row<'_>) -> rusqlite::Result<Video> {
    Ok(Video {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        file_key: row.get(4)?,
        thumbnail_key: row.get(5)?,
        visibility: parse_visibility(&row.get::<_, String>(6)?),
        size_bytes: row.get(7)?,
        created_at: parse_datetime(&row.get::<_, String>(8)?),
        updated_at: parse_datetime(&row.get::<_, String>(9)?),
    })
}

fn tag_from_row(row: &Row<'_>) -> rusqlite::Result<Tag> {
    Ok(Tag {
        id: row.get(0)?,
        name: row.get(1)?,
        slug: row.get(2)?,
        created_at: parse_datetime(&row.get::<_, String>(3)?),
    })
}

fn comment_from_row(row: &Row<'_>) -> rusqlite::Result<Comment> {
    Ok(Comment {
        id: row.get(0)?,
        video_id: row.get(1)?,
        user_id: row.get(2)?,
        parent_id: row.get(3)?,
        body: row.get(4)?,
        created_at: parse_datetime(&row.get::<_, String>(5)?),
        updated_at: parse_datetime(&row.get::<_, String>(6)?),
    })
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

impl Store for SqliteStore {
    fn initialize(&self) -> Result<()> {
        self.conn().execute_batch(SCHEMA)?;
        Ok(())
    }

    // User operations

    fn create_user(&self, user: &User) -> Result<()> {
        let result = self.conn().execute(
            &format!("INSERT INTO users ({USER_COLS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"),
            params![
                user.id,
                user.username,
                user.role.as_str(),
                user.display_name,
                user.bio,
                user.website,
                user.avatar_key,
                format_datetime(&user.created_at),
                format_datetime(&user.updated_at),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_constraint_violation(&e) => Err(Error::AlreadyExists),
            Err(e) => Err(Error::from(e)),
        }
    }

    fn get_user(&self, id: &str) -> Result<Option<User>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {USER_COLS} FROM users WHERE id = ?1"),
            params![id],
            user_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {USER_COLS} FROM users WHERE username = ?1"),
            params![username],
            user_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_users(&self, cursor: &str, limit: i32) -> Result<Vec<User>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {USER_COLS} FROM users WHERE username > ?1 ORDER BY username LIMIT ?2"
        ))?;

        let rows = stmt.query_map(params![cursor, limit], user_from_row)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn update_user(&self, user: &User) -> Result<()> {
        let rows = self.conn().execute(
            "UPDATE users SET role = ?1, display_name = ?2, bio = ?3, website = ?4,
             avatar_key = ?5, updated_at = ?6 WHERE id = ?7",
            params![
                user.role.as_str(),
                user.display_name,
                user.bio,
                user.website,
                user.avatar_key,
                format_datetime(&user.updated_at),
                user.id,
            ],
        )?;

        if rows == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    fn delete_user(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM users WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    // Follow operations

    fn create_follow(&self, follower_id: &str, followee_id: &str) -> Result<bool> {
        let rows = self.conn().execute(
            "INSERT OR IGNORE INTO follows (follower_id, followee_id, created_at)
             VALUES (?1, ?2, ?3)",
            params![follower_id, followee_id, format_datetime(&Utc::now())],
        )?;
        Ok(rows > 0)
    }

    fn delete_follow(&self, follower_id: &str, followee_id: &str) -> Result<bool> {
        let rows = self.conn().execute(
            "DELETE FROM follows WHERE follower_id = ?1 AND followee_id = ?2",
            params![follower_id, followee_id],
        )?;
        Ok(rows > 0)
    }

    fn follow_exists(&self, follower_id: &str, followee_id: &str) -> Result<bool> {
        let conn = self.conn();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM follows WHERE follower_id = ?1 AND followee_id = ?2",
            params![follower_id, followee_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn list_followers(&self, user_id: &str, cursor: &str, limit: i32) -> Result<Vec<User>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM users u
             JOIN follows f ON f.follower_id = u.id
             WHERE f.followee_id = ?1 AND u.username > ?2
             ORDER BY u.username LIMIT ?3",
            qualified_user_cols()
        ))?;

        let rows = stmt.query_map(params![user_id, cursor, limit], user_from_row)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn list_following(&self, user_id: &str, cursor: &str, limit: i32) -> Result<Vec<User>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM users u
             JOIN follows f ON f.followee_id = u.id
             WHERE f.follower_id = ?1 AND u.username > ?2
             ORDER BY u.username LIMIT ?3",
            qualified_user_cols()
        ))?;

        let rows = stmt.query_map(params![user_id, cursor, limit], user_from_row)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn count_followers(&self, user_id: &str) -> Result<i64> {
        let conn = self.conn();
        conn.query_row(
            "SELECT COUNT(*) FROM follows WHERE followee_id = ?1",
            params![user_id],
            |row| row.get(0),
        )
        .map_err(Error::from)
    }

    fn count_following(&self, user_id: &str) -> Result<i64> {
        let conn = self.conn();
        conn.query_row(
            "SELECT COUNT(*) FROM follows WHERE follower_id = ?1",
            params![user_id],
            |row| row.get(0),
        )
        .map_err(Error::from)
    }

    // Token operations

    fn create_token(&self, token: &Token) -> Result<()> {
        let result = self.conn().execute(
            "INSERT INTO tokens (id, token_hash, token_lookup, is_admin, user_id, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                token.id,
                token.token_hash,
                token.token_lookup,
                token.is_admin,
                token.user_id,
                format_datetime(&token.created_at),
                token.expires_at.as_ref().map(format_datetime),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_constraint_violation(&e) => Err(Error::TokenLookupCollision),
            Err(e) => Err(Error::from(e)),
        }
    }

    fn get_token_by_id(&self, id: &str) -> Result<Option<Token>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {TOKEN_COLS} FROM tokens WHERE id = ?1"),
            params![id],
            token_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn get_token_by_lookup(&self, lookup: &str) -> Result<Option<Token>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {TOKEN_COLS} FROM tokens WHERE token_lookup = ?1"),
            params![lookup],
            token_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_tokens(&self, cursor: &str, limit: i32) -> Result<Vec<Token>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {TOKEN_COLS} FROM tokens WHERE id > ?1 ORDER BY id LIMIT ?2"
        ))?;

        let rows = stmt.query_map(params![cursor, limit], token_from_row)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn list_user_tokens(&self, user_id: &str) -> Result<Vec<Token>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {TOKEN_COLS} FROM tokens WHERE user_id = ?1 ORDER BY created_at DESC"
        ))?;

        let rows = stmt.query_map(params![user_id], token_from_row)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn delete_token(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM tokens WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    fn update_token_last_used(&self, id: &str) -> Result<()> {
        self.conn().execute(
            "UPDATE tokens SET last_used_at = ?1 WHERE id = ?2",
            params![format_datetime(&Utc::now()), id],
        )?;
        Ok(())
    }

    // Video operations

    fn create_video(&self, video: &Video) -> Result<()> {
        self.conn().execute(
            &format!(
                "INSERT INTO videos ({VIDEO_COLS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
            ),
            params![
                video.id,
                video.user_id,
                video.title,
                video.description,
                video.file_key,
                video.thumbnail_key,
                video.visibility.as_str(),
                video.size_bytes,
                format_datetime(&video.created_at),
                format_datetime(&video.updated_at),
            ],
        )?;
        Ok(())
    }

    fn get_video(&self, id: &str) -> Result<Option<Video>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {VIDEO_COLS} FROM videos WHERE id = ?1"),
            params![id],
            video_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_public_videos(&self, cursor: &str, limit: i32) -> Result<Vec<Video>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {VIDEO_COLS} FROM videos
             WHERE visibility = 'public' AND (?1 = '' OR created_at < ?1)
             ORDER BY created_at DESC LIMIT ?2"
        ))?;

        let rows = stmt.query_map(params![cursor, limit], video_from_row)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn list_user_videos(
        &self,
        user_id: &str,
        scope: AudienceScope,
        cursor: &str,
        limit: i32,
    ) -> Result<Vec<Video>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {VIDEO_COLS} FROM videos
             WHERE user_id = ?1{} AND (?2 = '' OR created_at < ?2)
             ORDER BY created_at DESC LIMIT ?3",
            scope_clause(scope)
        ))?;

        let rows = stmt.query_map(params![user_id, cursor, limit], video_from_row)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn count_user_videos(&self, user_id: &str, scope: AudienceScope) -> Result<i64> {
        let conn = self.conn();
        conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM videos WHERE user_id = ?1{}",
                scope_clause(scope)
            ),
            params![user_id],
            |row| row.get(0),
        )
        .map_err(Error::from)
    }

    fn list_related_videos(
        &self,
        user_id: &str,
        exclude_video_id: &str,
        limit: i32,
    ) -> Result<Vec<Video>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {VIDEO_COLS} FROM videos
             WHERE user_id = ?1 AND id <> ?2 AND visibility = 'public'
             ORDER BY created_at DESC LIMIT ?3"
        ))?;

        let rows = stmt.query_map(params![user_id, exclude_video_id, limit], video_from_row)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn list_recommended_videos(
        &self,
        exclude_video_id: &str,
        exclude_user_id: Option<&str>,
        limit: i32,
    ) -> Result<Vec<Video>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {VIDEO_COLS} FROM videos
             WHERE visibility = 'public' AND id <> ?1 AND (?2 IS NULL OR user_id <> ?2)
             ORDER BY created_at DESC LIMIT ?3"
        ))?;

        let rows = stmt.query_map(
            params![exclude_video_id, exclude_user_id, limit],
            video_from_row,
        )?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn search_public_videos(&self, query: &str, limit: i32) -> Result<Vec<Video>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            r#"SELECT DISTINCT {} FROM videos v
               JOIN users u ON u.id = v.user_id
               LEFT JOIN video_tags vt ON vt.video_id = v.id
               LEFT JOIN tags t ON t.id = vt.tag_id
               WHERE v.visibility = 'public'
                 AND (v.title LIKE ?1 ESCAPE '\'
                      OR v.description LIKE ?1 ESCAPE '\'
                      OR u.username LIKE ?1 ESCAPE '\'
                      OR t.name LIKE ?1 ESCAPE '\')
               ORDER BY v.created_at DESC LIMIT ?2"#,
            qualified_video_cols()
        ))?;

        let rows = stmt.query_map(params![like_pattern(query), limit], video_from_row)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn update_video(&self, video: &Video) -> Result<()> {
        let rows = self.conn().execute(
            "UPDATE videos SET title = ?1, description = ?2, visibility = ?3,
             thumbnail_key = ?4, updated_at = ?5 WHERE id = ?6",
            params![
                video.title,
                video.description,
                video.visibility.as_str(),
                video.thumbnail_key,
                format_datetime(&video.updated_at),
                video.id,
            ],
        )?;

        if rows == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    fn delete_video(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM videos WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    // Tag operations

    fn create_tag(&self, tag: &Tag) -> Result<()> {
        let result = self.conn().execute(
            "INSERT INTO tags (id, name, slug, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![tag.id, tag.name, tag.slug, format_datetime(&tag.created_at)],
        );

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_constraint_violation(&e) => Err(Error::AlreadyExists),
            Err(e) => Err(Error::from(e)),
        }
    }

    fn get_tag_by_name(&self, name: &str) -> Result<Option<Tag>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, name, slug, created_at FROM tags WHERE name = ?1",
            params![name],
            tag_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn get_tag_by_slug(&self, slug: &str) -> Result<Option<Tag>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, name, slug, created_at FROM tags WHERE slug = ?1",
            params![slug],
            tag_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_tags(&self, cursor: &str, limit: i32) -> Result<Vec<Tag>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, name, slug, created_at FROM tags WHERE name > ?1 ORDER BY name LIMIT ?2",
        )?;

        let rows = stmt.query_map(params![cursor, limit], tag_from_row)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn count_tag_videos(&self, tag_id: &str) -> Result<i64> {
        let conn = self.conn();
        conn.query_row(
            "SELECT COUNT(*) FROM video_tags vt
             JOIN videos v ON v.id = vt.video_id
             WHERE vt.tag_id = ?1 AND v.visibility = 'public'",
            params![tag_id],
            |row| row.get(0),
        )
        .map_err(Error::from)
    }

    // Video-Tag M2M operations

    fn set_video_tags(&self, video_id: &str, tag_ids: &[String]) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        tx.execute(
            "DELETE FROM video_tags WHERE video_id = ?1",
            params![video_id],
        )?;

        for tag_id in tag_ids {
            tx.execute(
                "INSERT INTO video_tags (video_id, tag_id) VALUES (?1, ?2)",
                params![video_id, tag_id],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn list_video_tags(&self, video_id: &str) -> Result<Vec<Tag>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT t.id, t.name, t.slug, t.created_at FROM tags t
             JOIN video_tags vt ON vt.tag_id = t.id
             WHERE vt.video_id = ?1 ORDER BY t.name",
        )?;

        let rows = stmt.query_map(params![video_id], tag_from_row)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn list_tag_videos(&self, tag_id: &str, cursor: &str, limit: i32) -> Result<Vec<Video>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM videos v
             JOIN video_tags vt ON vt.video_id = v.id
             WHERE vt.tag_id = ?1 AND v.visibility = 'public'
               AND (?2 = '' OR v.created_at < ?2)
             ORDER BY v.created_at DESC LIMIT ?3",
            qualified_video_cols()
        ))?;

        let rows = stmt.query_map(params![tag_id, cursor, limit], video_from_row)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    // Like operations

    fn get_like(&self, user_id: &str, video_id: &str) -> Result<Option<Like>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT user_id, video_id, is_like, created_at FROM likes
             WHERE user_id = ?1 AND video_id = ?2",
            params![user_id, video_id],
            |row| {
                Ok(Like {
                    user_id: row.get(0)?,
                    video_id: row.get(1)?,
                    is_like: row.get(2)?,
                    created_at: parse_datetime(&row.get::<_, String>(3)?),
                })
            },
        )
        .optional()
        .map_err(Error::from)
    }

    fn upsert_like(&self, like: &Like) -> Result<()> {
        self.conn().execute(
            "INSERT INTO likes (user_id, video_id, is_like, created_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id, video_id) DO UPDATE SET is_like = excluded.is_like",
            params![
                like.user_id,
                like.video_id,
                like.is_like,
                format_datetime(&like.created_at),
            ],
        )?;
        Ok(())
    }

    fn delete_like(&self, user_id: &str, video_id: &str) -> Result<bool> {
        let rows = self.conn().execute(
            "DELETE FROM likes WHERE user_id = ?1 AND video_id = ?2",
            params![user_id, video_id],
        )?;
        Ok(rows > 0)
    }

    fn count_likes(&self, video_id: &str, is_like: bool) -> Result<i64> {
        let conn = self.conn();
        conn.query_row(
            "SELECT COUNT(*) FROM likes WHERE video_id = ?1 AND is_like = ?2",
            params![video_id, is_like],
            |row| row.get(0),
        )
        .map_err(Error::from)
    }

    // Comment operations

    fn create_comment(&self, comment: &Comment) -> Result<()> {
        self.conn().execute(
            &format!("INSERT INTO comments ({COMMENT_COLS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"),
            params![
                comment.id,
                comment.video_id,
                comment.user_id,
                comment.parent_id,
                comment.body,
                format_datetime(&comment.created_at),
                format_datetime(&comment.updated_at),
            ],
        )?;
        Ok(())
    }

    fn get_comment(&self, id: &str) -> Result<Option<Comment>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {COMMENT_COLS} FROM comments WHERE id = ?1"),
            params![id],
            comment_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_top_level_comments(
        &self,
        video_id: &str,
        cursor: &str,
        limit: i32,
    ) -> Result<Vec<Comment>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {COMMENT_COLS} FROM comments
             WHERE video_id = ?1 AND parent_id IS NULL AND (?2 = '' OR created_at < ?2)
             ORDER BY created_at DESC LIMIT ?3"
        ))?;

        let rows = stmt.query_map(params![video_id, cursor, limit], comment_from_row)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn list_comment_replies(&self, parent_id: &str) -> Result<Vec<Comment>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {COMMENT_COLS} FROM comments WHERE parent_id = ?1 ORDER BY created_at"
        ))?;

        let rows = stmt.query_map(params![parent_id], comment_from_row)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn count_comments(&self, video_id: &str) -> Result<i64> {
        let conn = self.conn();
        conn.query_row(
            "SELECT COUNT(*) FROM comments WHERE video_id = ?1",
            params![video_id],
            |row| row.get(0),
        )
        .map_err(Error::from)
    }

    fn count_comment_replies(&self, parent_id: &str) -> Result<i64> {
        let conn = self.conn();
        conn.query_row(
            "SELECT COUNT(*) FROM comments WHERE parent_id = ?1",
            params![parent_id],
            |row| row.get(0),
        )
        .map_err(Error::from)
    }

    fn delete_comment(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM comments WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    // View operations

    fn record_view(&self, view: &View) -> Result<bool> {
        // The partial unique index dedupes authenticated views; NULL user_id
        // rows never collide, so anonymous views always insert.
        let rows = self.conn().execute(
            "INSERT OR IGNORE INTO views (video_id, user_id, created_at) VALUES (?1, ?2, ?3)",
            params![
                view.video_id,
                view.user_id,
                format_datetime(&view.created_at),
            ],
        )?;
        Ok(rows > 0)
    }

    fn count_views(&self, video_id: &str) -> Result<i64> {
        let conn = self.conn();
        conn.query_row(
            "SELECT COUNT(*) FROM views WHERE video_id = ?1",
            params![video_id],
            |row| row.get(0),
        )
        .map_err(Error::from)
    }

    fn has_admin_token(&self) -> Result<bool> {
        let conn = self.conn();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM tokens WHERE is_admin = 1",
            [],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

fn scope_clause(scope: AudienceScope) -> &'static str {
    match scope {
        AudienceScope::Owner => "",
        AudienceScope::Follower => " AND visibility IN ('public', 'followers')",
        AudienceScope::Public => " AND visibility = 'public'",
    }
}

fn qualified_user_cols() -> String {
    USER_COLS
        .split(", ")
        .map(|c| format!("u.{c}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn qualified_video_cols() -> String {
    VIDEO_COLS
        .split(", ")
        .map(|c| format!("v.{c}"))
        .collect::<Vec<_>>()
        .join(", ")
}
