use crate::server::response::{ApiError, StoreResultExt};
use crate::store::{AudienceScope, Store};
use crate::types::{User, Video, Visibility};

/// Enforces the visibility rule for a single video.
///
/// Public videos are open to everyone. Private videos are owner-only.
/// Followers-only videos demand authentication, then a follow edge.
pub fn check_video_access(
    store: &dyn Store,
    viewer: Option<&User>,
    video: &Video,
) -> Result<(), ApiError> {
    match video.visibility {
        Visibility::Public => Ok(()),
        Visibility::Private => match viewer {
            Some(user) if user.id == video.user_id => Ok(()),
            _ => Err(ApiError::forbidden("This video is private")),
        },
        Visibility::Followers => {
            let user = viewer.ok_or_else(|| {
                ApiError::unauthorized("Authentication required to watch this video")
            })?;

            if user.id == video.user_id {
                return Ok(());
            }

            if store
                .follow_exists(&user.id, &video.user_id)
                .api_err("Failed to check follow status")?
            {
                Ok(())
            } else {
                Err(ApiError::forbidden(
                    "This video is only available to followers",
                ))
            }
        }
    }
}

/// How much of `owner`'s catalog the viewer may list.
pub fn audience_scope(
    store: &dyn Store,
    viewer: Option<&User>,
    owner_id: &str,
) -> Result<AudienceScope, ApiError> {
    let Some(user) = viewer else {
        return Ok(AudienceScope::Public);
    };

    if user.id == owner_id {
        return Ok(AudienceScope::Owner);
    }

    if store
        .follow_exists(&user.id, owner_id)
        .api_err("Failed to check follow status")?
    {
        Ok(AudienceScope::Follower)
    } else {
        Ok(AudienceScope::Public)
    }
}

pub fn require_video_owner(user: &User, video: &Video) -> Result<(), ApiError> {
    if user.id == video.user_id {
        Ok(())
    } else {
        Err(ApiError::forbidden("Only the video owner can do this"))
    }
}
