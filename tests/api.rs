//! End-to-end API tests against a real server process.

mod common;

use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde_json::Value;

use common::TestServer;

async fn register(client: &Client, base_url: &str, username: &str) -> (Value, String) {
    let resp: Value = client
        .post(format!("{}/api/v1/auth/register", base_url))
        .json(&serde_json::json!({"username": username, "role": "creator"}))
        .send()
        .await
        .expect("register")
        .json()
        .await
        .expect("parse register response");

    let token = resp["data"]["token"].as_str().expect("token").to_string();
    let user = resp["data"]["user"].clone();
    (user, token)
}

async fn upload_video(
    client: &Client,
    base_url: &str,
    token: &str,
    title: &str,
    visibility: &str,
    tags: &str,
) -> Value {
    let form = Form::new()
        .part(
            "file",
            Part::bytes(b"fake mp4 payload".to_vec())
                .file_name("clip.mp4")
                .mime_str("video/mp4")
                .expect("mime"),
        )
        .text("title", title.to_string())
        .text("visibility", visibility.to_string())
        .text("tags", tags.to_string());

    let resp = client
        .post(format!("{}/api/v1/videos", base_url))
        .bearer_auth(token)
        .multipart(form)
        .send()
        .await
        .expect("upload video");

    assert_eq!(resp.status(), StatusCode::CREATED);
    let body: Value = resp.json().await.expect("parse upload response");
    body["data"].clone()
}

#[tokio::test]
async fn test_health() {
    let server = TestServer::start().await;
    let resp = reqwest::get(format!("{}/health", server.base_url))
        .await
        .expect("health");
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_register_and_profile() {
    let server = TestServer::start().await;
    let client = Client::new();

    let (user, token) = register(&client, &server.base_url, "alice").await;
    assert_eq!(user["username"], "alice");
    assert_eq!(user["role"], "creator");

    let me: Value = client
        .get(format!("{}/api/v1/me", server.base_url))
        .bearer_auth(&token)
        .send()
        .await
        .expect("get me")
        .json()
        .await
        .expect("parse me");
    assert_eq!(me["data"]["username"], "alice");

    // Duplicate username is a conflict.
    let resp = client
        .post(format!("{}/api/v1/auth/register", server.base_url))
        .json(&serde_json::json!({"username": "alice"}))
        .send()
        .await
        .expect("register duplicate");
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    // Self-registration as admin is rejected.
    let resp = client
        .post(format!("{}/api/v1/auth/register", server.base_url))
        .json(&serde_json::json!({"username": "evil", "role": "admin"}))
        .send()
        .await
        .expect("register admin");
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // Profile update.
    let resp: Value = client
        .patch(format!("{}/api/v1/me", server.base_url))
        .bearer_auth(&token)
        .json(&serde_json::json!({"display_name": "Alice", "bio": "hi"}))
        .send()
        .await
        .expect("update me")
        .json()
        .await
        .expect("parse update");
    assert_eq!(resp["data"]["display_name"], "Alice");

    // Public profile with counts.
    let profile: Value = client
        .get(format!("{}/api/v1/users/alice", server.base_url))
        .send()
        .await
        .expect("get profile")
        .json()
        .await
        .expect("parse profile");
    assert_eq!(profile["data"]["follower_count"], 0);
    assert_eq!(profile["data"]["video_count"], 0);
}

#[tokio::test]
async fn test_upload_watch_and_view_dedupe() {
    let server = TestServer::start().await;
    let client = Client::new();
    let (_, token) = register(&client, &server.base_url, "creator").await;

    let video = upload_video(
        &client,
        &server.base_url,
        &token,
        "First clip",
        "public",
        "Rust, demo",
    )
    .await;
    let video_id = video["id"].as_str().expect("video id");
    assert_eq!(video["title"], "First clip");
    assert_eq!(video["owner"], "creator");
    let tag_names: Vec<&str> = video["tags"]
        .as_array()
        .expect("tags")
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(tag_names, vec!["rust", "demo"]);

    // Shows up in the public feed.
    let feed: Value = client
        .get(format!("{}/api/v1/videos", server.base_url))
        .send()
        .await
        .expect("feed")
        .json()
        .await
        .expect("parse feed");
    assert_eq!(feed["data"][0]["id"].as_str(), Some(video_id));

    // Watching twice as the same user records a single view.
    for _ in 0..2 {
        let watch: Value = client
            .get(format!("{}/api/v1/videos/{}", server.base_url, video_id))
            .bearer_auth(&token)
            .send()
            .await
            .expect("watch")
            .json()
            .await
            .expect("parse watch");
        assert_eq!(watch["data"]["view_count"], 1);
    }

    // Anonymous views always count.
    let resp: Value = client
        .post(format!(
            "{}/api/v1/videos/{}/views",
            server.base_url, video_id
        ))
        .send()
        .await
        .expect("record view")
        .json()
        .await
        .expect("parse view");
    assert_eq!(resp["data"]["counted"], true);
    assert_eq!(resp["data"]["view_count"], 2);
}

#[tokio::test]
async fn test_video_file_streaming() {
    let server = TestServer::start().await;
    let client = Client::new();
    let (_, token) = register(&client, &server.base_url, "creator").await;

    let video = upload_video(&client, &server.base_url, &token, "Clip", "public", "").await;
    let video_id = video["id"].as_str().expect("video id");

    let resp = client
        .get(format!(
            "{}/api/v1/videos/{}/file",
            server.base_url, video_id
        ))
        .send()
        .await
        .expect("stream file");
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok()),
        Some("video/mp4")
    );
    let bytes = resp.bytes().await.expect("file bytes");
    assert_eq!(&bytes[..], b"fake mp4 payload");

    // No thumbnail was uploaded.
    let resp = client
        .get(format!(
            "{}/api/v1/videos/{}/thumbnail",
            server.base_url, video_id
        ))
        .send()
        .await
        .expect("thumbnail request");
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_visibility_tiers() {
    let server = TestServer::start().await;
    let client = Client::new();
    let (_, owner_token) = register(&client, &server.base_url, "owner").await;
    let (_, fan_token) = register(&client, &server.base_url, "fan").await;

    let private = upload_video(
        &client,
        &server.base_url,
        &owner_token,
        "Private clip",
        "private",
        "",
    )
    .await;
    let followers_only = upload_video(
        &client,
        &server.base_url,
        &owner_token,
        "Followers clip",
        "followers",
        "",
    )
    .await;
    let private_id = private["id"].as_str().unwrap();
    let followers_id = followers_only["id"].as_str().unwrap();

    // Anonymous: private is forbidden, followers-only wants authentication.
    let resp = client
        .get(format!("{}/api/v1/videos/{}", server.base_url, private_id))
        .send()
        .await
        .expect("anon private");
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = client
        .get(format!(
            "{}/api/v1/videos/{}",
            server.base_url, followers_id
        ))
        .send()
        .await
        .expect("anon followers");
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    // Authenticated non-follower: both forbidden.
    for id in [private_id, followers_id] {
        let resp = client
            .get(format!("{}/api/v1/videos/{}", server.base_url, id))
            .bearer_auth(&fan_token)
            .send()
            .await
            .expect("stranger watch");
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    // Following unlocks followers-only but not private.
    let resp = client
        .put(format!("{}/api/v1/users/owner/follow", server.base_url))
        .bearer_auth(&fan_token)
        .send()
        .await
        .expect("follow");
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = client
        .get(format!(
            "{}/api/v1/videos/{}",
            server.base_url, followers_id
        ))
        .bearer_auth(&fan_token)
        .send()
        .await
        .expect("follower watch");
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = client
        .get(format!("{}/api/v1/videos/{}", server.base_url, private_id))
        .bearer_auth(&fan_token)
        .send()
        .await
        .expect("follower private watch");
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    // The owner sees everything, and their own catalog lists all of it.
    let catalog: Value = client
        .get(format!("{}/api/v1/users/owner/videos", server.base_url))
        .bearer_auth(&owner_token)
        .send()
        .await
        .expect("owner catalog")
        .json()
        .await
        .expect("parse catalog");
    assert_eq!(catalog["data"].as_array().unwrap().len(), 2);

    // A follower sees followers-only, anonymous sees nothing.
    let catalog: Value = client
        .get(format!("{}/api/v1/users/owner/videos", server.base_url))
        .bearer_auth(&fan_token)
        .send()
        .await
        .expect("fan catalog")
        .json()
        .await
        .expect("parse catalog");
    assert_eq!(catalog["data"].as_array().unwrap().len(), 1);

    let catalog: Value = client
        .get(format!("{}/api/v1/users/owner/videos", server.base_url))
        .send()
        .await
        .expect("anon catalog")
        .json()
        .await
        .expect("parse catalog");
    assert_eq!(catalog["data"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_like_dislike_toggle() {
    let server = TestServer::start().await;
    let client = Client::new();
    let (_, token) = register(&client, &server.base_url, "viewer").await;

    let video = upload_video(&client, &server.base_url, &token, "Clip", "public", "").await;
    let video_id = video["id"].as_str().unwrap();
    let like_url = format!("{}/api/v1/videos/{}/like", server.base_url, video_id);
    let dislike_url = format!("{}/api/v1/videos/{}/dislike", server.base_url, video_id);

    // First like creates.
    let resp: Value = client
        .post(&like_url)
        .bearer_auth(&token)
        .send()
        .await
        .expect("like")
        .json()
        .await
        .expect("parse like");
    assert_eq!(resp["data"]["action"], "created");
    assert_eq!(resp["data"]["like_count"], 1);

    // Same polarity again removes.
    let resp: Value = client
        .post(&like_url)
        .bearer_auth(&token)
        .send()
        .await
        .expect("unlike")
        .json()
        .await
        .expect("parse unlike");
    assert_eq!(resp["data"]["action"], "removed");
    assert_eq!(resp["data"]["like_count"], 0);

    // Like then dislike flips.
    client
        .post(&like_url)
        .bearer_auth(&token)
        .send()
        .await
        .expect("like again");
    let resp: Value = client
        .post(&dislike_url)
        .bearer_auth(&token)
        .send()
        .await
        .expect("dislike")
        .json()
        .await
        .expect("parse dislike");
    assert_eq!(resp["data"]["action"], "switched");
    assert_eq!(resp["data"]["like_count"], 0);
    assert_eq!(resp["data"]["dislike_count"], 1);

    // Anonymous reactions are rejected.
    let resp = client.post(&like_url).send().await.expect("anon like");
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_comment_threading_and_deletion() {
    let server = TestServer::start().await;
    let client = Client::new();
    let (_, owner_token) = register(&client, &server.base_url, "owner").await;
    let (_, other_token) = register(&client, &server.base_url, "other").await;

    let video = upload_video(&client, &server.base_url, &owner_token, "Clip", "public", "").await;
    let video_id = video["id"].as_str().unwrap();
    let comments_url = format!("{}/api/v1/videos/{}/comments", server.base_url, video_id);

    let resp: Value = client
        .post(&comments_url)
        .bearer_auth(&other_token)
        .json(&serde_json::json!({"body": "nice clip"}))
        .send()
        .await
        .expect("comment")
        .json()
        .await
        .expect("parse comment");
    let top_id = resp["data"]["id"].as_str().expect("comment id").to_string();
    assert_eq!(resp["data"]["author"], "other");

    // Reply to the top-level comment.
    let resp: Value = client
        .post(&comments_url)
        .bearer_auth(&owner_token)
        .json(&serde_json::json!({"body": "thanks", "parent_id": top_id}))
        .send()
        .await
        .expect("reply")
        .json()
        .await
        .expect("parse reply");
    let reply_id = resp["data"]["id"].as_str().expect("reply id").to_string();

    // Replies to replies are rejected.
    let resp = client
        .post(&comments_url)
        .bearer_auth(&owner_token)
        .json(&serde_json::json!({"body": "nested", "parent_id": reply_id}))
        .send()
        .await
        .expect("nested reply");
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // Empty bodies are rejected.
    let resp = client
        .post(&comments_url)
        .bearer_auth(&owner_token)
        .json(&serde_json::json!({"body": "   "}))
        .send()
        .await
        .expect("empty comment");
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // Listing shows only the top-level comment with its reply count.
    let list: Value = client
        .get(&comments_url)
        .send()
        .await
        .expect("list comments")
        .json()
        .await
        .expect("parse list");
    let items = list["data"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["reply_count"], 1);

    let replies: Value = client
        .get(format!(
            "{}/api/v1/comments/{}/replies",
            server.base_url, top_id
        ))
        .send()
        .await
        .expect("list replies")
        .json()
        .await
        .expect("parse replies");
    assert_eq!(replies["data"].as_array().unwrap().len(), 1);

    // A third party cannot delete; the video owner can, replies cascade.
    let (_, stranger_token) = register(&client, &server.base_url, "stranger").await;
    let delete_url = format!("{}/api/v1/comments/{}", server.base_url, top_id);

    let resp = client
        .delete(&delete_url)
        .bearer_auth(&stranger_token)
        .send()
        .await
        .expect("stranger delete");
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = client
        .delete(&delete_url)
        .bearer_auth(&owner_token)
        .send()
        .await
        .expect("owner delete");
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let list: Value = client
        .get(&comments_url)
        .send()
        .await
        .expect("list after delete")
        .json()
        .await
        .expect("parse list");
    assert_eq!(list["data"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_follow_graph() {
    let server = TestServer::start().await;
    let client = Client::new();
    let (_, alice_token) = register(&client, &server.base_url, "alice").await;
    let (_, _bob_token) = register(&client, &server.base_url, "bob").await;

    let follow_url = format!("{}/api/v1/users/bob/follow", server.base_url);

    // Following twice stays idempotent.
    for _ in 0..2 {
        let resp = client
            .put(&follow_url)
            .bearer_auth(&alice_token)
            .send()
            .await
            .expect("follow");
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    }

    // Self-follow is rejected.
    let resp = client
        .put(format!("{}/api/v1/users/alice/follow", server.base_url))
        .bearer_auth(&alice_token)
        .send()
        .await
        .expect("self follow");
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let followers: Value = client
        .get(format!("{}/api/v1/users/bob/followers", server.base_url))
        .send()
        .await
        .expect("followers")
        .json()
        .await
        .expect("parse followers");
    let names: Vec<&str> = followers["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["username"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["alice"]);

    let profile: Value = client
        .get(format!("{}/api/v1/users/bob", server.base_url))
        .bearer_auth(&alice_token)
        .send()
        .await
        .expect("profile")
        .json()
        .await
        .expect("parse profile");
    assert_eq!(profile["data"]["follower_count"], 1);
    assert_eq!(profile["data"]["is_following"], true);

    let resp = client
        .delete(&follow_url)
        .bearer_auth(&alice_token)
        .send()
        .await
        .expect("unfollow");
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let followers: Value = client
        .get(format!("{}/api/v1/users/bob/followers", server.base_url))
        .send()
        .await
        .expect("followers after unfollow")
        .json()
        .await
        .expect("parse followers");
    assert_eq!(followers["data"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_search_and_tags() {
    let server = TestServer::start().await;
    let client = Client::new();
    let (_, token) = register(&client, &server.base_url, "casey").await;

    upload_video(
        &client,
        &server.base_url,
        &token,
        "Cranberry harvest timelapse",
        "public",
        "farming",
    )
    .await;
    upload_video(
        &client,
        &server.base_url,
        &token,
        "Hidden clip",
        "private",
        "farming",
    )
    .await;

    // Title match, case-insensitive.
    let results: Value = client
        .get(format!(
            "{}/api/v1/videos/search?q=cranberry",
            server.base_url
        ))
        .send()
        .await
        .expect("search")
        .json()
        .await
        .expect("parse search");
    assert_eq!(results["data"].as_array().unwrap().len(), 1);

    // Private videos never surface, even on a matching tag.
    let results: Value = client
        .get(format!("{}/api/v1/videos/search?q=farming", server.base_url))
        .send()
        .await
        .expect("tag search")
        .json()
        .await
        .expect("parse tag search");
    assert_eq!(results["data"].as_array().unwrap().len(), 1);

    // Owner username matches too.
    let results: Value = client
        .get(format!("{}/api/v1/videos/search?q=casey", server.base_url))
        .send()
        .await
        .expect("owner search")
        .json()
        .await
        .expect("parse owner search");
    assert_eq!(results["data"].as_array().unwrap().len(), 1);

    // Empty query returns an empty list.
    let results: Value = client
        .get(format!("{}/api/v1/videos/search?q=", server.base_url))
        .send()
        .await
        .expect("empty search")
        .json()
        .await
        .expect("parse empty search");
    assert_eq!(results["data"].as_array().unwrap().len(), 0);

    // Tag listing counts only public videos.
    let tags: Value = client
        .get(format!("{}/api/v1/tags", server.base_url))
        .send()
        .await
        .expect("tags")
        .json()
        .await
        .expect("parse tags");
    let farming = tags["data"]
        .as_array()
        .unwrap()
        .iter()
        .find(|t| t["name"] == "farming")
        .expect("farming tag");
    assert_eq!(farming["video_count"], 1);

    let tagged: Value = client
        .get(format!("{}/api/v1/tags/farming/videos", server.base_url))
        .send()
        .await
        .expect("tag videos")
        .json()
        .await
        .expect("parse tag videos");
    assert_eq!(tagged["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_video_update_and_delete() {
    let server = TestServer::start().await;
    let client = Client::new();
    let (_, owner_token) = register(&client, &server.base_url, "owner").await;
    let (_, other_token) = register(&client, &server.base_url, "other").await;

    let video = upload_video(&client, &server.base_url, &owner_token, "Draft", "public", "").await;
    let video_id = video["id"].as_str().unwrap();
    let video_url = format!("{}/api/v1/videos/{}", server.base_url, video_id);

    // Non-owners cannot edit.
    let resp = client
        .patch(&video_url)
        .bearer_auth(&other_token)
        .json(&serde_json::json!({"title": "Hijacked"}))
        .send()
        .await
        .expect("other update");
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp: Value = client
        .patch(&video_url)
        .bearer_auth(&owner_token)
        .json(&serde_json::json!({
            "title": "Final cut",
            "visibility": "private",
            "tags": ["editing", "Film"]
        }))
        .send()
        .await
        .expect("owner update")
        .json()
        .await
        .expect("parse update");
    assert_eq!(resp["data"]["title"], "Final cut");
    assert_eq!(resp["data"]["visibility"], "private");
    let tag_names: Vec<&str> = resp["data"]["tags"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(tag_names, vec!["editing", "film"]);

    // Delete removes the row and the stored blob.
    let resp = client
        .delete(&video_url)
        .bearer_auth(&other_token)
        .send()
        .await
        .expect("other delete");
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = client
        .delete(&video_url)
        .bearer_auth(&owner_token)
        .send()
        .await
        .expect("owner delete");
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = client.get(&video_url).bearer_auth(&owner_token).send().await.expect("get deleted");
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let media_dir = server.data_dir().join("media").join("videos");
    let leftover = std::fs::read_dir(&media_dir)
        .map(|entries| entries.count())
        .unwrap_or(0);
    assert_eq!(leftover, 0, "video blob should be removed");
}

#[tokio::test]
async fn test_upload_validation() {
    let server = TestServer::start().await;
    let client = Client::new();
    let (_, token) = register(&client, &server.base_url, "uploader").await;

    // Unsupported extension.
    let form = Form::new()
        .part("file", Part::bytes(b"data".to_vec()).file_name("program.exe"))
        .text("title", "Bad file");
    let resp = client
        .post(format!("{}/api/v1/videos", server.base_url))
        .bearer_auth(&token)
        .multipart(form)
        .send()
        .await
        .expect("bad extension");
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // Missing title.
    let form = Form::new().part("file", Part::bytes(b"data".to_vec()).file_name("clip.mp4"));
    let resp = client
        .post(format!("{}/api/v1/videos", server.base_url))
        .bearer_auth(&token)
        .multipart(form)
        .send()
        .await
        .expect("missing title");
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // Too many tags.
    let tags = (0..11).map(|i| format!("t{i}")).collect::<Vec<_>>().join(",");
    let form = Form::new()
        .part("file", Part::bytes(b"data".to_vec()).file_name("clip.mp4"))
        .text("title", "Tag overload")
        .text("tags", tags);
    let resp = client
        .post(format!("{}/api/v1/videos", server.base_url))
        .bearer_auth(&token)
        .multipart(form)
        .send()
        .await
        .expect("too many tags");
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // Anonymous uploads are rejected.
    let form = Form::new()
        .part("file", Part::bytes(b"data".to_vec()).file_name("clip.mp4"))
        .text("title", "Anon");
    let resp = client
        .post(format!("{}/api/v1/videos", server.base_url))
        .multipart(form)
        .send()
        .await
        .expect("anon upload");
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_surface() {
    let server = TestServer::start().await;
    let client = Client::new();
    let (user, user_token) = register(&client, &server.base_url, "member").await;
    let user_id = user["id"].as_str().expect("user id");

    // User tokens are not admin tokens.
    let resp = client
        .get(format!("{}/api/v1/admin/users", server.base_url))
        .bearer_auth(&user_token)
        .send()
        .await
        .expect("non-admin list");
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    // Admin tokens cannot act as users.
    let resp = client
        .get(format!("{}/api/v1/me", server.base_url))
        .bearer_auth(&server.admin_token)
        .send()
        .await
        .expect("admin as user");
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let users: Value = client
        .get(format!("{}/api/v1/admin/users", server.base_url))
        .bearer_auth(&server.admin_token)
        .send()
        .await
        .expect("admin list users")
        .json()
        .await
        .expect("parse users");
    assert_eq!(users["data"].as_array().unwrap().len(), 1);

    // Promote the account.
    let resp: Value = client
        .patch(format!(
            "{}/api/v1/admin/users/{}/role",
            server.base_url, user_id
        ))
        .bearer_auth(&server.admin_token)
        .json(&serde_json::json!({"role": "admin"}))
        .send()
        .await
        .expect("role change")
        .json()
        .await
        .expect("parse role change");
    assert_eq!(resp["data"]["role"], "admin");

    // Mint a scoped token for the user.
    let resp: Value = client
        .post(format!(
            "{}/api/v1/admin/users/{}/tokens",
            server.base_url, user_id
        ))
        .bearer_auth(&server.admin_token)
        .json(&serde_json::json!({"expires_in_seconds": 3600}))
        .send()
        .await
        .expect("mint token")
        .json()
        .await
        .expect("parse mint");
    let minted = resp["data"]["token"].as_str().expect("minted token");

    let me: Value = client
        .get(format!("{}/api/v1/me", server.base_url))
        .bearer_auth(minted)
        .send()
        .await
        .expect("me with minted")
        .json()
        .await
        .expect("parse me");
    assert_eq!(me["data"]["username"], "member");

    // Moderation: admin removes someone else's video.
    let video = upload_video(&client, &server.base_url, &user_token, "Spam", "public", "").await;
    let video_id = video["id"].as_str().unwrap();

    let resp = client
        .delete(format!(
            "{}/api/v1/admin/videos/{}",
            server.base_url, video_id
        ))
        .bearer_auth(&server.admin_token)
        .send()
        .await
        .expect("moderate");
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    // Delete the user entirely.
    let resp = client
        .delete(format!("{}/api/v1/admin/users/{}", server.base_url, user_id))
        .bearer_auth(&server.admin_token)
        .send()
        .await
        .expect("delete user");
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = client
        .get(format!("{}/api/v1/me", server.base_url))
        .bearer_auth(&user_token)
        .send()
        .await
        .expect("me after delete");
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_watch_related_and_recommended() {
    let server = TestServer::start().await;
    let client = Client::new();
    let (_, a_token) = register(&client, &server.base_url, "anna").await;
    let (_, b_token) = register(&client, &server.base_url, "ben").await;

    let first = upload_video(&client, &server.base_url, &a_token, "Anna one", "public", "").await;
    upload_video(&client, &server.base_url, &a_token, "Anna two", "public", "").await;
    upload_video(&client, &server.base_url, &b_token, "Ben one", "public", "").await;

    let watch: Value = client
        .get(format!(
            "{}/api/v1/videos/{}",
            server.base_url,
            first["id"].as_str().unwrap()
        ))
        .send()
        .await
        .expect("watch")
        .json()
        .await
        .expect("parse watch");

    let related: Vec<&str> = watch["data"]["related"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v["title"].as_str().unwrap())
        .collect();
    assert_eq!(related, vec!["Anna two"]);

    // Too few other-owner videos, so the backfill kicks in and may
    // include the owner's catalog.
    let recommended = watch["data"]["recommended"].as_array().unwrap();
    assert!(
        recommended
            .iter()
            .any(|v| v["title"].as_str() == Some("Ben one"))
    );
}

#[tokio::test]
async fn test_avatar_upload_and_fetch() {
    let server = TestServer::start().await;
    let client = Client::new();

    let (_, token) = register(&client, &server.base_url, "nadia").await;

    // No avatar yet.
    let resp = client
        .get(format!("{}/api/v1/users/nadia/avatar", server.base_url))
        .send()
        .await
        .expect("fetch missing avatar");
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let form = Form::new().part(
        "avatar",
        Part::bytes(b"fake png payload".to_vec())
            .file_name("face.png")
            .mime_str("image/png")
            .expect("mime"),
    );
    let resp = client
        .put(format!("{}/api/v1/me/avatar", server.base_url))
        .bearer_auth(&token)
        .multipart(form)
        .send()
        .await
        .expect("upload avatar");
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.expect("parse avatar response");
    assert!(body["data"]["avatar_key"].as_str().is_some());

    // Anyone can fetch the avatar through the profile route.
    let resp = client
        .get(format!("{}/api/v1/users/nadia/avatar", server.base_url))
        .send()
        .await
        .expect("fetch avatar");
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers()["content-type"].to_str().unwrap(),
        "image/png"
    );
    let bytes = resp.bytes().await.expect("avatar bytes");
    assert_eq!(bytes.as_ref(), b"fake png payload");

    // Re-uploading replaces the previous image.
    let form = Form::new().part(
        "avatar",
        Part::bytes(b"fake gif payload".to_vec())
            .file_name("face.gif")
            .mime_str("image/gif")
            .expect("mime"),
    );
    let resp = client
        .put(format!("{}/api/v1/me/avatar", server.base_url))
        .bearer_auth(&token)
        .multipart(form)
        .send()
        .await
        .expect("replace avatar");
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = client
        .get(format!("{}/api/v1/users/nadia/avatar", server.base_url))
        .send()
        .await
        .expect("fetch replaced avatar");
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers()["content-type"].to_str().unwrap(),
        "image/gif"
    );

    // Unsupported image extension is rejected.
    let form = Form::new().part(
        "avatar",
        Part::bytes(b"not an image".to_vec())
            .file_name("face.txt")
            .mime_str("text/plain")
            .expect("mime"),
    );
    let resp = client
        .put(format!("{}/api/v1/me/avatar", server.base_url))
        .bearer_auth(&token)
        .multipart(form)
        .send()
        .await
        .expect("upload bad avatar");
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // Unknown user yields 404, not an empty stream.
    let resp = client
        .get(format!("{}/api/v1/users/nobody/avatar", server.base_url))
        .send()
        .await
        .expect("fetch avatar for unknown user");
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_concurrent_registration_conflict() {
    let server = TestServer::start().await;
    let client = Client::new();

    // Whichever request loses the race must see a conflict, never a 500.
    let post = || async {
        client
            .post(format!("{}/api/v1/auth/register", server.base_url))
            .json(&serde_json::json!({"username": "dupe", "role": "creator"}))
            .send()
            .await
            .expect("register")
            .status()
    };
    let (a, b) = tokio::join!(post(), post());

    let mut statuses = [a, b];
    statuses.sort();
    assert_eq!(statuses, [StatusCode::CREATED, StatusCode::CONFLICT]);
}
