//! # Manifest Builder
//!
//! Turns a storage object into a [`ManifestItem`] with a stable id and a
//! content digest.
//!
//! The pixel pipeline (thumbnails, EXIF) lives outside this crate behind the
//! [`ManifestBuilder`] trait. [`DigestManifestBuilder`] is the built-in
//! implementation: it hashes the bytes and probes format and dimensions.

use crate::error::{Result, SyncError};
use async_trait::async_trait;
use bridge_traits::{StorageObject, StorageProvider};
use core_library::models::{LivePhotoVideo, ManifestItem};
use sha2::{Digest, Sha256};
use std::io::Cursor;
use tracing::{debug, instrument};

/// Produce the manifest item for one still (and its optional video).
#[async_trait]
pub trait ManifestBuilder: Send + Sync {
    async fn build(
        &self,
        provider: &dyn StorageProvider,
        object: &StorageObject,
        live_video: Option<&StorageObject>,
    ) -> Result<ManifestItem>;
}

/// SHA-256 of `bytes`, lowercase hex.
pub fn content_digest(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Photo id for a key: final path segment without its extension.
pub fn derive_photo_id(key: &str) -> String {
    let name = key.rsplit('/').next().unwrap_or(key);
    match name.rfind('.') {
        Some(dot) if dot > 0 => name[..dot].to_string(),
        _ => name.to_string(),
    }
}

/// Attach a companion video to a manifest item.
pub fn attach_live_video(item: &mut ManifestItem, video: &StorageObject) {
    item.live_photo = Some(LivePhotoVideo {
        key: video.key.clone(),
        size: video.size,
    });
}

/// Digest-only builder
#[derive(Debug, Clone, Default)]
pub struct DigestManifestBuilder;

impl DigestManifestBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Manifest item for bytes already in memory.
    pub fn describe(
        &self,
        object: &StorageObject,
        bytes: &[u8],
        live_video: Option<&StorageObject>,
    ) -> ManifestItem {
        let (format, dimensions) = probe_image(bytes);
        let mut item = ManifestItem {
            id: derive_photo_id(&object.key),
            storage_key: object.key.clone(),
            digest: Some(content_digest(bytes)),
            size: object.size.or(Some(bytes.len() as i64)),
            width: dimensions.map(|(w, _)| w),
            height: dimensions.map(|(_, h)| h),
            format: format.or_else(|| object.extension()),
            last_modified: object.last_modified_iso(),
            ..Default::default()
        };
        if let Some(video) = live_video {
            attach_live_video(&mut item, video);
        }
        item
    }
}

#[async_trait]
impl ManifestBuilder for DigestManifestBuilder {
    #[instrument(skip(self, provider, live_video), fields(key = %object.key))]
    async fn build(
        &self,
        provider: &dyn StorageProvider,
        object: &StorageObject,
        live_video: Option<&StorageObject>,
    ) -> Result<ManifestItem> {
        let bytes = provider
            .get_file(&object.key)
            .await?
            .ok_or_else(|| SyncError::not_found("storage object", &object.key))?;
        debug!(bytes = bytes.len(), "Building manifest");
        Ok(self.describe(object, &bytes, live_video))
    }
}

/// Format name and dimensions, when the `image` crate recognises the data.
fn probe_image(bytes: &[u8]) -> (Option<String>, Option<(u32, u32)>) {
    let Ok(reader) = image::ImageReader::new(Cursor::new(bytes)).with_guessed_format() else {
        return (None, None);
    };
    let format = reader
        .format()
        .and_then(|f| f.extensions_str().first().map(|ext| ext.to_string()));
    let dimensions = reader.into_dimensions().ok();
    (format, dimensions)
}
