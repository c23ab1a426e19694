use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufReader};
use uuid::Uuid;

const MAX_VIDEO_SIZE: i64 = 100 * 1024 * 1024;
const MAX_IMAGE_SIZE: i64 = 5 * 1024 * 1024;

const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "wmv", "flv", "webm"];
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif"];

#[derive(Debug, Error)]
pub enum MediaStorageError {
    #[error("object not found")]
    NotFound,
    #[error("unsupported file format: .{extension}")]
    UnsupportedFormat { extension: String },
    #[error("file size ({size} bytes) exceeds limit ({limit} bytes)")]
    TooLarge { size: i64, limit: i64 },
    #[error("invalid storage key")]
    InvalidKey,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl MediaStorageError {
    fn from_io(e: std::io::Error) -> Self {
        if e.kind() == ErrorKind::NotFound {
            Self::NotFound
        } else {
            Self::Io(e)
        }
    }
}

/// What class of media a blob is, which decides the allowed
/// extensions and the size cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Image,
}

impl MediaKind {
    #[must_use]
    pub const fn allowed_extensions(self) -> &'static [&'static str] {
        match self {
            MediaKind::Video => VIDEO_EXTENSIONS,
            MediaKind::Image => IMAGE_EXTENSIONS,
        }
    }

    #[must_use]
    pub const fn max_size(self) -> i64 {
        match self {
            MediaKind::Video => MAX_VIDEO_SIZE,
            MediaKind::Image => MAX_IMAGE_SIZE,
        }
    }

    const fn dir(self) -> &'static str {
        match self {
            MediaKind::Video => "videos",
            MediaKind::Image => "images",
        }
    }
}

/// A stored blob: the key to retrieve it later plus integrity metadata.
#[derive(Debug, Clone)]
pub struct MediaObject {
    pub key: String,
    pub size: i64,
    pub checksum: String,
}

/// Filesystem-backed blob storage for uploaded media.
///
/// Keys look like `videos/<uuid>/<filename>`. Writes go to a temp file and
/// are renamed into place so a crashed upload never leaves a partial object.
pub struct MediaStorage {
    base_path: PathBuf,
}

impl MediaStorage {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            base_path: data_dir.join("media"),
        }
    }

    fn object_path(&self, key: &str) -> Result<PathBuf, MediaStorageError> {
        let relative = Path::new(key);
        if relative.components().any(|c| !matches!(c, Component::Normal(_))) {
            return Err(MediaStorageError::InvalidKey);
        }
        Ok(self.base_path.join(relative))
    }

    fn temp_path(&self) -> PathBuf {
        self.base_path.join("tmp").join(Uuid::new_v4().to_string())
    }

    /// Checks extension and size limits for an upload without writing anything.
    pub fn validate(kind: MediaKind, filename: &str, size: i64) -> Result<(), MediaStorageError> {
        let extension = extension_of(filename).ok_or_else(|| {
            MediaStorageError::UnsupportedFormat {
                extension: String::new(),
            }
        })?;

        if !kind.allowed_extensions().contains(&extension.as_str()) {
            return Err(MediaStorageError::UnsupportedFormat { extension });
        }

        if size > kind.max_size() {
            return Err(MediaStorageError::TooLarge {
                size,
                limit: kind.max_size(),
            });
        }

        Ok(())
    }

    pub async fn put(
        &self,
        kind: MediaKind,
        filename: &str,
        data: &[u8],
    ) -> Result<MediaObject, MediaStorageError> {
        Self::validate(kind, filename, data.len() as i64)?;

        let mut hasher = Sha256::new();
        hasher.update(data);
        let checksum = hex::encode(hasher.finalize());

        let key = format!(
            "{}/{}/{}",
            kind.dir(),
            Uuid::new_v4(),
            sanitize_filename(filename)
        );

        let temp_path = self.temp_path();
        if let Some(parent) = temp_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut temp_file = File::create(&temp_path).await?;
        temp_file.write_all(data).await?;
        temp_file.sync_all().await?;

        let final_path = self.object_path(&key)?;
        if let Some(parent) = final_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        fs::rename(&temp_path, &final_path).await?;

        Ok(MediaObject {
            key,
            size: data.len() as i64,
            checksum,
        })
    }

    pub async fn open(&self, key: &str) -> Result<(BufReader<File>, i64), MediaStorageError> {
        let path = self.object_path(key)?;
        let file = File::open(&path).await.map_err(MediaStorageError::from_io)?;

        let metadata = file.metadata().await?;
        let size = metadata.len() as i64;

        Ok((BufReader::new(file), size))
    }

    pub async fn delete(&self, key: &str) -> Result<bool, MediaStorageError> {
        let path = self.object_path(key)?;

        match fs::remove_file(&path).await {
            Ok(()) => {
                // Drop the per-object directory if it is now empty.
                if let Some(parent) = path.parent() {
                    let _ = fs::remove_dir(parent).await;
                }
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(MediaStorageError::Io(e)),
        }
    }
}

/// Lowercased extension without the dot, if the filename has one.
#[must_use]
pub fn extension_of(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
}

fn sanitize_filename(filename: &str) -> String {
    let name: String = filename
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect();

    if name.trim_matches('.').is_empty() {
        "file".to_string()
    } else {
        name
    }
}

/// Content type for a stored key, derived from its extension.
#[must_use]
pub fn content_type_for(key: &str) -> &'static str {
    match extension_of(key).as_deref() {
        Some("mp4") => "video/mp4",
        Some("mov") => "video/quicktime",
        Some("avi") => "video/x-msvideo",
        Some("wmv") => "video/x-ms-wmv",
        Some("flv") => "video/x-flv",
        Some("webm") => "video/webm",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        _ => "application/octet-stream",
    }
}
