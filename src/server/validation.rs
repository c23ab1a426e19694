use crate::server::response::ApiError;

const MAX_USERNAME_LEN: usize = 30;
const MAX_TITLE_LEN: usize = 100;
const MAX_TAG_NAME_LEN: usize = 50;
const MAX_TAGS_PER_VIDEO: usize = 10;
const MAX_COMMENT_LEN: usize = 2000;

fn is_valid_username_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

pub fn validate_username(name: &str) -> Result<(), ApiError> {
    if name.is_empty() {
        return Err(ApiError::bad_request("Username cannot be empty"));
    }
    if name.len() > MAX_USERNAME_LEN {
        return Err(ApiError::bad_request(format!(
            "Username cannot exceed {MAX_USERNAME_LEN} characters"
        )));
    }
    if !name.chars().all(is_valid_username_char) {
        return Err(ApiError::bad_request(
            "Username can only contain alphanumeric characters, hyphens, and underscores",
        ));
    }
    if name.starts_with('-') || name.starts_with('_') {
        return Err(ApiError::bad_request(
            "Username cannot start with a hyphen or underscore",
        ));
    }
    Ok(())
}

pub fn validate_title(title: &str) -> Result<(), ApiError> {
    if title.trim().is_empty() {
        return Err(ApiError::bad_request("Title cannot be empty"));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(ApiError::bad_request(format!(
            "Title cannot exceed {MAX_TITLE_LEN} characters"
        )));
    }
    Ok(())
}

pub fn validate_comment_body(body: &str) -> Result<(), ApiError> {
    if body.trim().is_empty() {
        return Err(ApiError::bad_request("Comment cannot be empty"));
    }
    if body.chars().count() > MAX_COMMENT_LEN {
        return Err(ApiError::bad_request(format!(
            "Comment cannot exceed {MAX_COMMENT_LEN} characters"
        )));
    }
    Ok(())
}

fn validate_tag_name(name: &str) -> Result<(), ApiError> {
    if name.chars().count() > MAX_TAG_NAME_LEN {
        return Err(ApiError::bad_request(format!(
            "Tag name cannot exceed {MAX_TAG_NAME_LEN} characters"
        )));
    }
    if slugify(name).is_empty() {
        return Err(ApiError::bad_request(format!("Invalid tag name: {name}")));
    }
    Ok(())
}

/// Splits a comma-separated tag string into normalized tag names:
/// trimmed, lowercased, deduplicated, order preserved.
pub fn parse_tag_list(raw: &str) -> Result<Vec<String>, ApiError> {
    let mut names: Vec<String> = Vec::new();

    for part in raw.split(',') {
        let name = part.trim().to_lowercase();
        if name.is_empty() {
            continue;
        }
        validate_tag_name(&name)?;
        if !names.contains(&name) {
            names.push(name);
        }
    }

    if names.len() > MAX_TAGS_PER_VIDEO {
        return Err(ApiError::bad_request(format!(
            "A video can have at most {MAX_TAGS_PER_VIDEO} tags"
        )));
    }

    Ok(names)
}

/// Derives a URL-safe slug: lowercase alphanumeric runs joined by hyphens.
#[must_use]
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_separator = false;

    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_separator && !slug.is_empty() {
                slug.push('-');
            }
            pending_separator = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_separator = true;
        }
    }

    slug
}
