//! Storage Provider Abstraction
//!
//! Uniform object-store operations over one backend (S3-compatible buckets,
//! Backblaze B2, a GitHub repository, a local directory or an Eagle library).
//!
//! ## Overview
//!
//! Keys are `/`-separated relative paths as returned by the backend. The
//! reconciliation engine keys everything by the exact key string, so
//! providers must return keys in the same form from `list_all_files` and
//! `upload_file`.
//!
//! ## Live Photos
//!
//! A Live Photo is a still image paired with a short video sharing the same
//! base path (`IMG_01.HEIC` + `IMG_01.MOV`). [`pair_live_photos`] implements
//! the default detection used by [`StorageProvider::detect_live_photos`].

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::Result;

/// File extensions treated as still images.
pub const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "heic", "heif", "webp", "avif", "tif", "tiff", "gif",
];

/// File extensions treated as Live Photo companion videos.
pub const VIDEO_EXTENSIONS: &[&str] = &["mov", "mp4"];

/// Object as reported by a storage backend listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageObject {
    pub key: String,
    pub size: Option<i64>,
    pub last_modified: Option<DateTime<Utc>>,
    pub etag: Option<String>,
}

impl StorageObject {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            size: None,
            last_modified: None,
            etag: None,
        }
    }

    pub fn with_size(mut self, size: i64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_etag(mut self, etag: impl Into<String>) -> Self {
        self.etag = Some(etag.into());
        self
    }

    pub fn with_last_modified(mut self, last_modified: DateTime<Utc>) -> Self {
        self.last_modified = Some(last_modified);
        self
    }

    /// `last_modified` rendered as RFC 3339 with millisecond precision.
    pub fn last_modified_iso(&self) -> Option<String> {
        self.last_modified
            .map(|ts| ts.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    /// Lowercased extension of the key's final segment.
    pub fn extension(&self) -> Option<String> {
        key_extension(&self.key)
    }
}

/// Options for [`StorageProvider::upload_file`].
#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
    pub content_type: Option<String>,
}

impl UploadOptions {
    pub fn content_type(content_type: impl Into<String>) -> Self {
        Self {
            content_type: Some(content_type.into()),
        }
    }
}

/// Options for [`StorageProvider::move_file`].
#[derive(Debug, Clone, Default)]
pub struct MoveOptions {
    pub content_type: Option<String>,
}

/// Listing progress callback. Receives the number of objects discovered so far.
pub type ListProgress<'a> = &'a (dyn Fn(usize) + Send + Sync);

/// Storage backend trait
///
/// Providers are stateless per call. Missing objects are reported as
/// `Ok(None)` from [`get_file`](StorageProvider::get_file); every other
/// failure is a [`BridgeError`](crate::error::BridgeError).
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::StorageProvider;
///
/// async fn count_images(provider: &dyn StorageProvider) -> Result<usize> {
///     Ok(provider.list_images().await?.len())
/// }
/// ```
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// List still images only.
    async fn list_images(&self) -> Result<Vec<StorageObject>> {
        let all = self.list_all_files(None).await?;
        Ok(all.into_iter().filter(|o| is_image_key(&o.key)).collect())
    }

    /// List every file under the provider root.
    async fn list_all_files(&self, progress: Option<ListProgress<'_>>)
        -> Result<Vec<StorageObject>>;

    /// Fetch object bytes, `None` when the key does not exist.
    async fn get_file(&self, key: &str) -> Result<Option<Bytes>>;

    /// Write bytes under `key`, returning the stored object's metadata.
    async fn upload_file(
        &self,
        key: &str,
        bytes: Bytes,
        options: UploadOptions,
    ) -> Result<StorageObject>;

    /// Delete `key`. Deleting a missing key is not an error.
    async fn delete_file(&self, key: &str) -> Result<()>;

    /// Move an object. The default copies through `get_file`/`upload_file`
    /// and deletes the source.
    async fn move_file(
        &self,
        source_key: &str,
        destination_key: &str,
        options: MoveOptions,
    ) -> Result<StorageObject> {
        let bytes = self.get_file(source_key).await?.ok_or_else(|| {
            crate::error::BridgeError::OperationFailed(format!(
                "move source '{}' does not exist",
                source_key
            ))
        })?;
        let stored = self
            .upload_file(
                destination_key,
                bytes,
                UploadOptions {
                    content_type: options.content_type,
                },
            )
            .await?;
        self.delete_file(source_key).await?;
        Ok(stored)
    }

    /// Publicly reachable URL for `key`.
    fn generate_public_url(&self, key: &str) -> Result<String>;

    /// Map of still key to its companion video object.
    fn detect_live_photos(&self, objects: &[StorageObject]) -> HashMap<String, StorageObject> {
        pair_live_photos(objects)
    }
}

/// Lowercased extension of the final path segment, if any.
pub fn key_extension(key: &str) -> Option<String> {
    let name = key.rsplit('/').next().unwrap_or(key);
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Key with the extension of its final segment removed.
pub fn key_base_path(key: &str) -> &str {
    let name_start = key.rfind('/').map(|i| i + 1).unwrap_or(0);
    match key[name_start..].rfind('.') {
        Some(dot) if dot > 0 => &key[..name_start + dot],
        _ => key,
    }
}

pub fn is_image_key(key: &str) -> bool {
    key_extension(key).is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

pub fn is_video_key(key: &str) -> bool {
    key_extension(key).is_some_and(|ext| VIDEO_EXTENSIONS.contains(&ext.as_str()))
}

/// Pair stills with videos sharing a case-insensitive base path.
///
/// When several videos match one still, the first in listing order wins.
pub fn pair_live_photos(objects: &[StorageObject]) -> HashMap<String, StorageObject> {
    let mut videos: HashMap<String, &StorageObject> = HashMap::new();
    for object in objects.iter().filter(|o| is_video_key(&o.key)) {
        videos
            .entry(key_base_path(&object.key).to_lowercase())
            .or_insert(object);
    }

    let mut pairs = HashMap::new();
    if videos.is_empty() {
        return pairs;
    }
    for still in objects.iter().filter(|o| is_image_key(&o.key)) {
        let base = key_base_path(&still.key).to_lowercase();
        if let Some(video) = videos.get(&base) {
            pairs.insert(still.key.clone(), (*video).clone());
        }
    }
    pairs
}
