//! Filesystem connector implementation

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result};
use bridge_traits::storage::{ListProgress, MoveOptions, StorageObject, StorageProvider, UploadOptions};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use core_runtime::config::{EagleSettings, LocalSettings};
use core_runtime::logging::strip_path;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, instrument, warn};

/// Eagle keeps assets under this directory of the library
const EAGLE_IMAGES_DIR: &str = "images";

/// Per-asset sidecar written by Eagle
const EAGLE_METADATA_FILE: &str = "metadata.json";

/// Marker in the file name of Eagle's generated previews
const EAGLE_THUMBNAIL_MARKER: &str = "_thumbnail";

/// Directory layout under the root
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalLayout {
    Plain,
    Eagle,
}

/// Local directory connector
///
/// Keys are `/`-separated paths relative to the root. Etags are derived from
/// size and modification time, so rewriting a file changes its snapshot.
pub struct LocalConnector {
    root: PathBuf,
    layout: LocalLayout,
    base_url: Option<String>,
}

impl LocalConnector {
    pub fn new(settings: &LocalSettings) -> Self {
        Self {
            root: settings.root.clone(),
            layout: LocalLayout::Plain,
            base_url: trim_base(settings.base_url.as_deref()),
        }
    }

    /// Connector over an Eagle library's `images/` directory.
    pub fn eagle(settings: &EagleSettings) -> Self {
        Self {
            root: settings.library_path.join(EAGLE_IMAGES_DIR),
            layout: LocalLayout::Eagle,
            base_url: trim_base(settings.base_url.as_deref()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn layout(&self) -> LocalLayout {
        self.layout
    }

    /// Filesystem path of `key`. Keys that could leave the root are refused.
    fn resolve(&self, key: &str) -> Result<PathBuf> {
        let invalid = |reason: &str| BridgeError::InvalidKey {
            key: key.to_string(),
            reason: reason.to_string(),
        };
        if key.is_empty() {
            return Err(invalid("empty key"));
        }

        let mut path = self.root.clone();
        for segment in key.split('/') {
            if segment.is_empty() || segment == "." || segment == ".." {
                return Err(invalid("key escapes the storage root"));
            }
            if segment.contains('\\') || segment.contains(':') {
                return Err(invalid("key contains a platform path separator"));
            }
            path.push(segment);
        }
        Ok(path)
    }

    fn is_listed(&self, key: &str) -> bool {
        match self.layout {
            LocalLayout::Plain => !key.split('/').any(|segment| segment.starts_with('.')),
            LocalLayout::Eagle => {
                let Some((dir, name)) = key.split_once('/') else {
                    return false;
                };
                dir.ends_with(".info")
                    && !name.contains('/')
                    && !name.starts_with('.')
                    && name != EAGLE_METADATA_FILE
                    && !name.contains(EAGLE_THUMBNAIL_MARKER)
            }
        }
    }

    /// Path of a write target. A key the walk would skip is refused, so every
    /// written file shows up in the next listing.
    fn resolve_listed(&self, key: &str) -> Result<PathBuf> {
        let path = self.resolve(key)?;
        if !self.is_listed(key) {
            let reason = match self.layout {
                LocalLayout::Plain => "hidden path segments are not listed",
                LocalLayout::Eagle => "Eagle assets must sit directly in a '<id>.info' directory",
            };
            return Err(BridgeError::InvalidKey {
                key: key.to_string(),
                reason: reason.to_string(),
            });
        }
        Ok(path)
    }

    fn relative_key(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let segments: Option<Vec<&str>> = relative.components().map(|c| c.as_os_str().to_str()).collect();
        Some(segments?.join("/"))
    }

    async fn stat(&self, key: &str, path: &Path) -> Result<StorageObject> {
        let metadata = fs::metadata(path).await?;
        Ok(object_from_metadata(key, &metadata))
    }
}

#[async_trait]
impl StorageProvider for LocalConnector {
    #[instrument(skip(self, progress), fields(root = %self.root.display(), layout = ?self.layout))]
    async fn list_all_files(
        &self,
        progress: Option<ListProgress<'_>>,
    ) -> Result<Vec<StorageObject>> {
        // An unmounted root must fail the run rather than look like an empty library
        if !fs::try_exists(&self.root).await? {
            return Err(BridgeError::NotAvailable(format!(
                "storage root '{}' does not exist",
                self.root.display()
            )));
        }

        let mut objects = Vec::new();
        let mut pending = vec![self.root.clone()];
        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    pending.push(path);
                    continue;
                }
                if !file_type.is_file() {
                    continue;
                }

                let Some(key) = self.relative_key(&path) else {
                    warn!(path = %path.display(), "Skipping file with a non UTF-8 name");
                    continue;
                };
                if !self.is_listed(&key) {
                    continue;
                }
                let metadata = entry.metadata().await?;
                objects.push(object_from_metadata(&key, &metadata));
            }
            if let Some(progress) = progress {
                progress(objects.len());
            }
        }

        objects.sort_by(|a, b| a.key.cmp(&b.key));
        info!(objects = objects.len(), "Walked storage root");
        Ok(objects)
    }

    async fn get_file(&self, key: &str) -> Result<Option<Bytes>> {
        let path = self.resolve(key)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(Bytes::from(bytes))),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(key, "File not found");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self, bytes, _options), fields(size = bytes.len()))]
    async fn upload_file(
        &self,
        key: &str,
        bytes: Bytes,
        _options: UploadOptions,
    ) -> Result<StorageObject> {
        let path = self.resolve_listed(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Write a hidden sibling and rename so readers never see a partial file
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        let partial = path.with_file_name(format!(".{}.partial", file_name));
        fs::write(&partial, &bytes).await?;
        fs::rename(&partial, &path).await?;

        debug!(file = %strip_path(key), "Wrote file");
        self.stat(key, &path).await
    }

    async fn delete_file(&self, key: &str) -> Result<()> {
        let path = self.resolve(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self, _options))]
    async fn move_file(
        &self,
        source_key: &str,
        destination_key: &str,
        _options: MoveOptions,
    ) -> Result<StorageObject> {
        let source = self.resolve(source_key)?;
        let destination = self.resolve_listed(destination_key)?;
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::rename(&source, &destination).await?;
        self.stat(destination_key, &destination).await
    }

    fn generate_public_url(&self, key: &str) -> Result<String> {
        let path = self.resolve(key)?;
        Ok(match &self.base_url {
            Some(base) => {
                let encoded: Vec<String> = key
                    .split('/')
                    .map(|segment| urlencoding::encode(segment).into_owned())
                    .collect();
                format!("{}/{}", base, encoded.join("/"))
            }
            None => format!("file://{}", path.display()),
        })
    }
}

fn trim_base(base: Option<&str>) -> Option<String> {
    base.map(|b| b.trim_end_matches('/').to_string())
        .filter(|b| !b.is_empty())
}

fn object_from_metadata(key: &str, metadata: &std::fs::Metadata) -> StorageObject {
    let size = metadata.len() as i64;
    let modified: Option<DateTime<Utc>> = metadata.modified().ok().map(DateTime::from);
    let mtime_millis = modified.map(|m| m.timestamp_millis()).unwrap_or_default();

    let mut object = StorageObject::new(key)
        .with_size(size)
        .with_etag(format!("{:x}-{:x}", size, mtime_millis));
    object.last_modified = modified;
    object
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn plain(dir: &TempDir) -> LocalConnector {
        LocalConnector::new(&LocalSettings::new(dir.path()))
    }

    async fn write(root: &Path, relative: &str, bytes: &[u8]) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        fs::write(path, bytes).await.unwrap();
    }

    #[tokio::test]
    async fn test_lists_nested_files_with_slash_keys() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "2024/trip/a.jpg", b"aaa").await;
        write(dir.path(), "b.png", b"b").await;
        write(dir.path(), ".DS_Store", b"junk").await;
        write(dir.path(), ".cache/c.jpg", b"c").await;

        let files = plain(&dir).list_all_files(None).await.unwrap();
        let keys: Vec<_> = files.iter().map(|f| f.key.as_str()).collect();

        assert_eq!(keys, vec!["2024/trip/a.jpg", "b.png"]);
        assert_eq!(files[0].size, Some(3));
        assert!(files[0].etag.is_some());
        assert!(files[0].last_modified.is_some());
    }

    #[tokio::test]
    async fn test_upload_matches_listing() {
        let dir = TempDir::new().unwrap();
        let connector = plain(&dir);

        let stored = connector
            .upload_file("new/dir/c.jpg", Bytes::from_static(b"hello"), UploadOptions::default())
            .await
            .unwrap();
        let listed = connector.list_all_files(None).await.unwrap();

        assert_eq!(listed, vec![stored]);
        assert_eq!(
            connector.get_file("new/dir/c.jpg").await.unwrap().as_deref(),
            Some(&b"hello"[..])
        );
    }

    #[tokio::test]
    async fn test_missing_file_and_delete() {
        let dir = TempDir::new().unwrap();
        let connector = plain(&dir);

        assert!(connector.get_file("nope.jpg").await.unwrap().is_none());
        connector.delete_file("nope.jpg").await.unwrap();

        write(dir.path(), "x.jpg", b"x").await;
        connector.delete_file("x.jpg").await.unwrap();
        assert!(connector.get_file("x.jpg").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rejects_keys_escaping_root() {
        let dir = TempDir::new().unwrap();
        let connector = plain(&dir);

        for key in ["../outside.jpg", "/etc/passwd", "a//b.jpg", "a/./b.jpg", "", "C:\\x.jpg"] {
            assert!(
                matches!(connector.get_file(key).await, Err(BridgeError::InvalidKey { .. })),
                "key {:?} should be rejected",
                key
            );
        }
    }

    #[tokio::test]
    async fn test_missing_root_fails_listing() {
        let dir = TempDir::new().unwrap();
        let connector = LocalConnector::new(&LocalSettings::new(dir.path().join("unmounted")));

        assert!(matches!(
            connector.list_all_files(None).await,
            Err(BridgeError::NotAvailable(_))
        ));
    }

    #[tokio::test]
    async fn test_move_file() {
        let dir = TempDir::new().unwrap();
        let connector = plain(&dir);
        write(dir.path(), "a.jpg", b"a").await;

        let moved = connector
            .move_file("a.jpg", "archive/a.jpg", MoveOptions::default())
            .await
            .unwrap();

        assert_eq!(moved.key, "archive/a.jpg");
        assert!(connector.get_file("a.jpg").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_eagle_layout_lists_asset_files_only() {
        let dir = TempDir::new().unwrap();
        let images = dir.path().join("images");
        write(&images, "K1.info/sunset.jpg", b"img").await;
        write(&images, "K1.info/sunset_thumbnail.png", b"thumb").await;
        write(&images, "K1.info/metadata.json", b"{}").await;
        write(&images, "loose.jpg", b"loose").await;
        write(&images, "K2.info/clip.mov", b"mov").await;

        let connector = LocalConnector::eagle(&EagleSettings {
            library_path: dir.path().to_path_buf(),
            base_url: None,
        });
        let keys: Vec<_> = connector
            .list_all_files(None)
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.key)
            .collect();

        assert_eq!(keys, vec!["K1.info/sunset.jpg", "K2.info/clip.mov"]);
    }

    #[tokio::test]
    async fn test_eagle_upload_outside_info_dir_is_refused() {
        let dir = TempDir::new().unwrap();
        let connector = LocalConnector::eagle(&EagleSettings {
            library_path: dir.path().to_path_buf(),
            base_url: None,
        });

        for key in ["IMG.jpg", "K9.info/nested/IMG.jpg", "K9.info/metadata.json"] {
            assert!(
                matches!(
                    connector
                        .upload_file(key, Bytes::from_static(b"x"), UploadOptions::default())
                        .await,
                    Err(BridgeError::InvalidKey { .. })
                ),
                "key {:?} should be refused",
                key
            );
        }

        let stored = connector
            .upload_file("K9.info/IMG.jpg", Bytes::from_static(b"x"), UploadOptions::default())
            .await
            .unwrap();
        assert_eq!(connector.list_all_files(None).await.unwrap(), vec![stored]);
        assert!(!dir.path().join("images/IMG.jpg").exists());
    }

    #[tokio::test]
    async fn test_move_into_hidden_dir_is_refused() {
        let dir = TempDir::new().unwrap();
        let connector = plain(&dir);
        write(dir.path(), "a.jpg", b"a").await;

        let result = connector
            .move_file("a.jpg", ".trash/a.jpg", MoveOptions::default())
            .await;

        assert!(matches!(result, Err(BridgeError::InvalidKey { .. })));
        assert!(connector.get_file("a.jpg").await.unwrap().is_some());
    }

    #[test]
    fn test_public_url() {
        let mut settings = LocalSettings::new("/srv/photos");
        settings.base_url = Some("https://photos.example.com/".to_string());
        let connector = LocalConnector::new(&settings);

        assert_eq!(
            connector.generate_public_url("2024/my pic.jpg").unwrap(),
            "https://photos.example.com/2024/my%20pic.jpg"
        );
        assert!(connector.generate_public_url("../x.jpg").is_err());
    }
}
