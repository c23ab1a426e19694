use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Account role. Carried as data; only the admin token gates behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Consumer,
    Creator,
    Admin,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Role::Consumer => "consumer",
            Role::Creator => "creator",
            Role::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Result<Role, Error> {
        match s {
            "consumer" => Ok(Role::Consumer),
            "creator" => Ok(Role::Creator),
            "admin" => Ok(Role::Admin),
            other => Err(Error::InvalidRole(other.to_string())),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Access policy on a video.
///
/// - `Public`: anyone, including anonymous callers.
/// - `Private`: owner only.
/// - `Followers`: owner plus the owner's followers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Private,
    Followers,
}

impl Visibility {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
            Visibility::Followers => "followers",
        }
    }

    pub fn parse(s: &str) -> Result<Visibility, Error> {
        match s {
            "public" => Ok(Visibility::Public),
            "private" => Ok(Visibility::Private),
            "followers" => Ok(Visibility::Followers),
            other => Err(Error::InvalidVisibility(other.to_string())),
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
