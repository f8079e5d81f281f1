//! Storage backend selection
//!
//! [`StorageBackend`] is the closed set of backends compiled into this build.
//! It is chosen once from [`StorageConfig`] and then used through the
//! `StorageProvider` trait for the lifetime of the service.

use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::http::HttpClient;
use bridge_traits::storage::{ListProgress, MoveOptions, StorageObject, StorageProvider, UploadOptions};
use bytes::Bytes;
use core_runtime::config::StorageConfig;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::error::{CoreError, Result};

#[cfg(feature = "github")]
use provider_github::GitHubConnector;
#[cfg(feature = "local")]
use provider_local::LocalConnector;
#[cfg(feature = "s3")]
use provider_s3::{S3Connector, S3Flavor};

#[cfg(not(any(feature = "s3", feature = "github", feature = "local")))]
compile_error!("core-service needs at least one storage backend feature: s3, github or local");

pub enum StorageBackend {
    /// AWS S3, Backblaze B2 or another S3-compatible endpoint
    #[cfg(feature = "s3")]
    S3(S3Connector),
    #[cfg(feature = "github")]
    GitHub(GitHubConnector),
    /// Plain directory or Eagle library
    #[cfg(feature = "local")]
    Local(LocalConnector),
}

impl StorageBackend {
    /// Build the backend named by `config`.
    ///
    /// `http` is used by REST-backed backends only.
    ///
    /// # Errors
    ///
    /// - `Config` if the settings fail validation
    /// - `CapabilityMissing` if the backend was not compiled in
    /// - `InitializationFailed` if the backend client cannot be built
    pub async fn from_config(config: &StorageConfig, http: Arc<dyn HttpClient>) -> Result<Self> {
        config.validate()?;
        info!(provider = config.provider_tag(), "Selecting storage backend");

        #[cfg(not(feature = "github"))]
        let _ = &http;

        match config {
            #[cfg(feature = "s3")]
            StorageConfig::S3(settings) => S3Connector::connect(settings, S3Flavor::S3)
                .await
                .map(StorageBackend::S3)
                .map_err(|e| CoreError::InitializationFailed(e.to_string())),
            #[cfg(feature = "s3")]
            StorageConfig::B2(settings) => S3Connector::connect(settings, S3Flavor::B2)
                .await
                .map(StorageBackend::S3)
                .map_err(|e| CoreError::InitializationFailed(e.to_string())),
            #[cfg(feature = "github")]
            StorageConfig::GitHub(settings) => {
                Ok(StorageBackend::GitHub(GitHubConnector::new(http, settings)))
            }
            #[cfg(feature = "local")]
            StorageConfig::Local(settings) => Ok(StorageBackend::Local(LocalConnector::new(settings))),
            #[cfg(feature = "local")]
            StorageConfig::Eagle(settings) => {
                Ok(StorageBackend::Local(LocalConnector::eagle(settings)))
            }
            #[allow(unreachable_patterns)]
            other => Err(CoreError::CapabilityMissing {
                capability: "StorageProvider".to_string(),
                message: format!(
                    "backend '{}' is not compiled into this build",
                    other.provider_tag()
                ),
            }),
        }
    }

    fn provider(&self) -> &dyn StorageProvider {
        match self {
            #[cfg(feature = "s3")]
            StorageBackend::S3(connector) => connector,
            #[cfg(feature = "github")]
            StorageBackend::GitHub(connector) => connector,
            #[cfg(feature = "local")]
            StorageBackend::Local(connector) => connector,
        }
    }
}

#[async_trait]
impl StorageProvider for StorageBackend {
    async fn list_images(&self) -> BridgeResult<Vec<StorageObject>> {
        self.provider().list_images().await
    }

    async fn list_all_files(
        &self,
        progress: Option<ListProgress<'_>>,
    ) -> BridgeResult<Vec<StorageObject>> {
        self.provider().list_all_files(progress).await
    }

    async fn get_file(&self, key: &str) -> BridgeResult<Option<Bytes>> {
        self.provider().get_file(key).await
    }

    async fn upload_file(
        &self,
        key: &str,
        bytes: Bytes,
        options: UploadOptions,
    ) -> BridgeResult<StorageObject> {
        self.provider().upload_file(key, bytes, options).await
    }

    async fn delete_file(&self, key: &str) -> BridgeResult<()> {
        self.provider().delete_file(key).await
    }

    async fn move_file(
        &self,
        source_key: &str,
        destination_key: &str,
        options: MoveOptions,
    ) -> BridgeResult<StorageObject> {
        self.provider()
            .move_file(source_key, destination_key, options)
            .await
    }

    fn generate_public_url(&self, key: &str) -> BridgeResult<String> {
        self.provider().generate_public_url(key)
    }

    fn detect_live_photos(&self, objects: &[StorageObject]) -> HashMap<String, StorageObject> {
        self.provider().detect_live_photos(objects)
    }
}
