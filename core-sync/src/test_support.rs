//! In-memory storage provider for unit tests.

use async_trait::async_trait;
use bridge_traits::error::Result;
use bridge_traits::storage::ListProgress;
use bridge_traits::{BridgeError, StorageObject, StorageProvider, UploadOptions};
use bytes::Bytes;
use chrono::DateTime;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Default)]
struct State {
    files: BTreeMap<String, (Bytes, StorageObject)>,
    failing_gets: HashSet<String>,
    fail_list: bool,
    writes: u32,
}

/// Objects get an etag derived from their bytes and a last-modified time
/// that advances with every write.
#[derive(Clone, Default)]
pub(crate) struct MemoryProvider {
    state: Arc<Mutex<State>>,
}

impl MemoryProvider {
    pub async fn put(&self, key: &str, bytes: &[u8]) {
        let mut state = self.state.lock().await;
        state.writes += 1;
        let object = StorageObject::new(key)
            .with_size(bytes.len() as i64)
            .with_etag(&crate::manifest::content_digest(bytes)[..12])
            .with_last_modified(
                DateTime::from_timestamp_millis(1_700_000_000_000 + state.writes as i64 * 1_000)
                    .unwrap_or_default(),
            );
        state
            .files
            .insert(key.to_string(), (Bytes::copy_from_slice(bytes), object));
    }

    pub async fn remove(&self, key: &str) {
        self.state.lock().await.files.remove(key);
    }

    pub async fn fail_get(&self, key: &str) {
        self.state.lock().await.failing_gets.insert(key.to_string());
    }

    pub async fn fail_list(&self) {
        self.state.lock().await.fail_list = true;
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.state.lock().await.files.contains_key(key)
    }
}

#[async_trait]
impl StorageProvider for MemoryProvider {
    async fn list_all_files(&self, progress: Option<ListProgress<'_>>) -> Result<Vec<StorageObject>> {
        let state = self.state.lock().await;
        if state.fail_list {
            return Err(BridgeError::OperationFailed("listing unavailable".to_string()));
        }
        let objects: Vec<_> = state.files.values().map(|(_, o)| o.clone()).collect();
        if let Some(progress) = progress {
            progress(objects.len());
        }
        Ok(objects)
    }

    async fn get_file(&self, key: &str) -> Result<Option<Bytes>> {
        let state = self.state.lock().await;
        if state.failing_gets.contains(key) {
            return Err(BridgeError::OperationFailed(format!("get {} failed", key)));
        }
        Ok(state.files.get(key).map(|(bytes, _)| bytes.clone()))
    }

    async fn upload_file(&self, key: &str, bytes: Bytes, _options: UploadOptions) -> Result<StorageObject> {
        self.put(key, &bytes).await;
        let state = self.state.lock().await;
        state
            .files
            .get(key)
            .map(|(_, o)| o.clone())
            .ok_or_else(|| BridgeError::OperationFailed(format!("upload {} lost", key)))
    }

    async fn delete_file(&self, key: &str) -> Result<()> {
        self.remove(key).await;
        Ok(())
    }

    fn generate_public_url(&self, key: &str) -> Result<String> {
        Ok(format!("memory://{}", key))
    }
}
