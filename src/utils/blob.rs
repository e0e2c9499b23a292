// src/utils/blob.rs

//! Image storage behind an opaque blob-store seam.
//!
//! Handlers only ever see a [`BlobStore`]: upload bytes into a folder and get
//! back a public URL, or delete by key. The key of a stored blob is derived
//! from its URL (`<folder>/<name>` without extension), so the URL is the only
//! thing the database has to remember.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use url::Url;
use uuid::Uuid;

use crate::error::AppError;

/// Decoded image payload ready for storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpload {
    pub bytes: Vec<u8>,
    /// File extension without the dot, e.g. `png`.
    pub extension: String,
}

impl ImageUpload {
    /// Accepts a `data:image/<type>;base64,<payload>` URI or bare base64.
    pub fn from_data_uri(input: &str) -> Result<Self, AppError> {
        let input = input.trim();
        let (declared, payload) = match input.strip_prefix("data:") {
            Some(rest) => {
                let (header, payload) = rest
                    .split_once(',')
                    .ok_or_else(|| AppError::BadRequest("Malformed image data URI".to_string()))?;
                let mime = header.split(';').next().unwrap_or_default();
                let subtype = mime
                    .strip_prefix("image/")
                    .ok_or_else(|| AppError::BadRequest("Only image uploads are supported".to_string()))?;
                (Some(extension_for(subtype)?), payload)
            }
            None => (None, input),
        };

        let bytes = STANDARD
            .decode(payload)
            .map_err(|_| AppError::BadRequest("Image is not valid base64".to_string()))?;
        if bytes.is_empty() {
            return Err(AppError::BadRequest("Image is empty".to_string()));
        }

        let extension = declared
            .or_else(|| sniff_extension(&bytes))
            .unwrap_or("bin")
            .to_string();

        Ok(Self { bytes, extension })
    }
}

fn extension_for(subtype: &str) -> Result<&'static str, AppError> {
    match subtype {
        "png" => Ok("png"),
        "jpeg" | "jpg" => Ok("jpg"),
        "gif" => Ok("gif"),
        "webp" => Ok("webp"),
        other => Err(AppError::BadRequest(format!("Unsupported image type '{}'", other))),
    }
}

fn sniff_extension(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(b"\x89PNG") {
        Some("png")
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("jpg")
    } else if bytes.starts_with(b"GIF8") {
        Some("gif")
    } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some("webp")
    } else {
        None
    }
}

/// Derives the blob key from a stored URL: the last two path segments joined
/// by `/`, with the file extension stripped.
///
/// `https://cdn/x/upload/v1/posts/abcd.jpg` -> `posts/abcd`
pub fn blob_key_from_url(url: &str) -> Option<String> {
    let segments: Vec<String> = match Url::parse(url) {
        Ok(parsed) => parsed
            .path_segments()?
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        Err(_) => url
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
    };

    if segments.len() < 2 {
        return None;
    }
    let folder = &segments[segments.len() - 2];
    let name = segments[segments.len() - 1].split('.').next().unwrap_or_default();
    if name.is_empty() {
        return None;
    }
    Some(format!("{}/{}", folder, name))
}

/// External image storage.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores the image under `folder` and returns its public URL.
    async fn upload(&self, folder: &str, image: &ImageUpload) -> Result<String, AppError>;

    /// Deletes the blob identified by `key` (see [`blob_key_from_url`]).
    /// Deleting a missing blob succeeds.
    async fn delete(&self, key: &str) -> Result<(), AppError>;
}

/// Uploads with a bounded wait. A timeout is an internal error.
pub async fn upload_image(
    store: &dyn BlobStore,
    timeout: Duration,
    folder: &str,
    data_uri: &str,
) -> Result<String, AppError> {
    let image = ImageUpload::from_data_uri(data_uri)?;
    match tokio::time::timeout(timeout, store.upload(folder, &image)).await {
        Ok(result) => result,
        Err(_) => Err(AppError::InternalServerError(format!(
            "blob upload to '{}' timed out after {:?}",
            folder, timeout
        ))),
    }
}

/// Best-effort removal of the blob behind `url`.
///
/// Never fails the caller: an underivable key, a store error or a timeout is
/// logged and reported as `false`.
pub async fn remove_image(store: &dyn BlobStore, timeout: Duration, url: &str) -> bool {
    let Some(key) = blob_key_from_url(url) else {
        tracing::warn!("Cannot derive blob key from '{}'", url);
        return false;
    };

    match tokio::time::timeout(timeout, store.delete(&key)).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            tracing::warn!("Failed to delete blob '{}': {}", key, e);
            false
        }
        Err(_) => {
            tracing::warn!("Deleting blob '{}' timed out after {:?}", key, timeout);
            false
        }
    }
}

/// Blob store writing to a local directory, served by the router under
/// `/uploads`.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
    public_url: String,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>, public_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_url: public_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Keys and folders are single path components of `[A-Za-z0-9_-]`.
fn is_safe_component(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn upload(&self, folder: &str, image: &ImageUpload) -> Result<String, AppError> {
        if !is_safe_component(folder) {
            return Err(AppError::InternalServerError(format!("invalid blob folder '{}'", folder)));
        }

        let dir = self.root.join(folder);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| AppError::InternalServerError(e.to_string()))?;

        let name = format!("{}.{}", Uuid::new_v4().simple(), image.extension);
        tokio::fs::write(dir.join(&name), &image.bytes)
            .await
            .map_err(|e| AppError::InternalServerError(e.to_string()))?;

        tracing::debug!("Stored blob {}/{} ({} bytes)", folder, name, image.bytes.len());
        Ok(format!("{}/uploads/{}/{}", self.public_url, folder, name))
    }

    async fn delete(&self, key: &str) -> Result<(), AppError> {
        let (folder, stem) = key
            .split_once('/')
            .filter(|(f, s)| is_safe_component(f) && is_safe_component(s))
            .ok_or_else(|| AppError::InternalServerError(format!("invalid blob key '{}'", key)))?;

        let mut entries = match tokio::fs::read_dir(self.root.join(folder)).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(AppError::InternalServerError(e.to_string())),
        };

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| AppError::InternalServerError(e.to_string()))?
        {
            let path = entry.path();
            if path.file_stem().and_then(|s| s.to_str()) == Some(stem) {
                tokio::fs::remove_file(&path)
                    .await
                    .map_err(|e| AppError::InternalServerError(e.to_string()))?;
            }
        }
        Ok(())
    }
}
