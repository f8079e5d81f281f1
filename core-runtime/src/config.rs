//! # Core Configuration Module
//!
//! Provides configuration management for the photo sync core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! holding the catalogue database settings, the storage backend selection,
//! plan quotas and logging. The builder validates everything up front so a
//! misconfigured backend fails before any run starts.
//!
//! ## Storage backends
//!
//! [`StorageConfig`] is a closed, tagged union. The `provider` tag selects the
//! backend once per process:
//!
//! ```json
//! { "provider": "s3", "bucket": "photos", "region": "us-east-1",
//!   "access_key_id": "...", "secret_access_key": "...", "prefix": "library" }
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{CoreConfig, StorageConfig, LocalSettings};
//!
//! let config = CoreConfig::builder()
//!     .database_url("sqlite:///var/lib/photos/catalogue.db")
//!     .storage(StorageConfig::Local(LocalSettings::new("/srv/photos")))
//!     .build()?;
//! ```
//!
//! ## Error Handling
//!
//! Validation failures return [`Error::Config`] with an actionable message:
//!
//! ```
//! use core_runtime::config::CoreConfig;
//!
//! let result = CoreConfig::builder()
//!     .database_url("sqlite::memory:")
//!     .build();
//! assert!(result.is_err());
//! ```

use crate::error::{Error, Result};
use crate::logging::{redact_if_sensitive, LoggingConfig};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Default GitHub branch when none is configured.
pub const DEFAULT_GITHUB_BRANCH: &str = "main";

/// Core configuration for the photo sync core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Catalogue database settings
    pub database: DatabaseSettings,

    /// Storage backend selection
    pub storage: StorageConfig,

    /// Plan quotas enforced by sync and upload
    #[serde(default)]
    pub quota: QuotaConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Catalogue database settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite URL (`sqlite://path/to/db` or `sqlite::memory:`)
    pub url: String,

    /// Maximum pool connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

impl DatabaseSettings {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: default_max_connections(),
        }
    }
}

/// Plan quotas. `None` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    /// Maximum catalogue rows per tenant
    pub max_library_items: Option<u64>,

    /// Maximum objects imported by one sync run
    pub max_imports_per_run: Option<u64>,

    /// Maximum size of a single storage object in bytes
    pub max_object_size_bytes: Option<u64>,
}

impl QuotaConfig {
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn with_max_library_items(mut self, limit: u64) -> Self {
        self.max_library_items = Some(limit);
        self
    }

    pub fn with_max_imports_per_run(mut self, limit: u64) -> Self {
        self.max_imports_per_run = Some(limit);
        self
    }

    pub fn with_max_object_size_bytes(mut self, limit: u64) -> Self {
        self.max_object_size_bytes = Some(limit);
        self
    }

    fn validate(&self) -> Result<()> {
        let fields = [
            ("max_library_items", self.max_library_items),
            ("max_imports_per_run", self.max_imports_per_run),
            ("max_object_size_bytes", self.max_object_size_bytes),
        ];
        for (name, value) in fields {
            if value == Some(0) {
                return Err(Error::Config(format!(
                    "Quota '{}' must be greater than 0. Omit it for no limit.",
                    name
                )));
            }
        }
        Ok(())
    }
}

/// Storage backend selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum StorageConfig {
    S3(S3Settings),
    B2(S3Settings),
    GitHub(GitHubSettings),
    Local(LocalSettings),
    Eagle(EagleSettings),
}

impl StorageConfig {
    /// Backend tag recorded on catalogue rows.
    pub fn provider_tag(&self) -> &'static str {
        match self {
            StorageConfig::S3(_) => "s3",
            StorageConfig::B2(_) => "b2",
            StorageConfig::GitHub(_) => "github",
            StorageConfig::Local(_) => "local",
            StorageConfig::Eagle(_) => "eagle",
        }
    }

    /// Configured root prefix for new uploads, without surrounding slashes.
    pub fn root_prefix(&self) -> Option<String> {
        let raw = match self {
            StorageConfig::S3(s) | StorageConfig::B2(s) => s.prefix.as_deref(),
            StorageConfig::GitHub(g) => g.path.as_deref(),
            StorageConfig::Local(_) | StorageConfig::Eagle(_) => None,
        };
        normalize_prefix(raw)
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            StorageConfig::S3(s) => s.validate("s3"),
            StorageConfig::B2(s) => s.validate("b2"),
            StorageConfig::GitHub(g) => g.validate(),
            StorageConfig::Local(l) => require_path("local", "root", &l.root),
            StorageConfig::Eagle(e) => require_path("eagle", "library_path", &e.library_path),
        }
    }
}

/// Trim slashes and drop empty prefixes.
pub fn normalize_prefix(raw: Option<&str>) -> Option<String> {
    let trimmed = raw?.trim().trim_matches('/');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// S3-compatible bucket settings, shared by AWS S3 and Backblaze B2.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct S3Settings {
    pub bucket: String,
    pub region: String,
    /// Custom endpoint (MinIO, R2, B2). B2 derives one from the region when absent.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(alias = "key_id")]
    pub access_key_id: String,
    #[serde(alias = "application_key")]
    pub secret_access_key: String,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub public_base_url: Option<String>,
    #[serde(default)]
    pub force_path_style: bool,
}

impl S3Settings {
    pub fn new(
        bucket: impl Into<String>,
        region: impl Into<String>,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            region: region.into(),
            endpoint: None,
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            prefix: None,
            public_base_url: None,
            force_path_style: false,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    fn validate(&self, provider: &str) -> Result<()> {
        require_field(provider, "bucket", &self.bucket)?;
        require_field(provider, "region", &self.region)?;
        require_field(provider, "access_key_id", &self.access_key_id)?;
        require_field(provider, "secret_access_key", &self.secret_access_key)?;
        if let Some(endpoint) = &self.endpoint {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err(Error::Config(format!(
                    "{} endpoint '{}' must start with http:// or https://",
                    provider, endpoint
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for S3Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Settings")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("access_key_id", &self.access_key_id)
            .field(
                "secret_access_key",
                &redact_if_sensitive("secret_access_key", &self.secret_access_key),
            )
            .field("prefix", &self.prefix)
            .field("public_base_url", &self.public_base_url)
            .field("force_path_style", &self.force_path_style)
            .finish()
    }
}

/// GitHub repository settings.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitHubSettings {
    pub owner: String,
    pub repo: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    /// Directory inside the repository holding the photos
    #[serde(default)]
    pub path: Option<String>,
    pub token: String,
    /// Defaults to `raw.githubusercontent.com`
    #[serde(default)]
    pub public_base_url: Option<String>,
}

fn default_branch() -> String {
    DEFAULT_GITHUB_BRANCH.to_string()
}

impl GitHubSettings {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            branch: default_branch(),
            path: None,
            token: token.into(),
            public_base_url: None,
        }
    }

    fn validate(&self) -> Result<()> {
        require_field("github", "owner", &self.owner)?;
        require_field("github", "repo", &self.repo)?;
        require_field("github", "branch", &self.branch)?;
        require_field("github", "token", &self.token)
    }
}

impl fmt::Debug for GitHubSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitHubSettings")
            .field("owner", &self.owner)
            .field("repo", &self.repo)
            .field("branch", &self.branch)
            .field("path", &self.path)
            .field("token", &redact_if_sensitive("token", &self.token))
            .field("public_base_url", &self.public_base_url)
            .finish()
    }
}

/// Local directory settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalSettings {
    pub root: PathBuf,
    /// Base URL the directory is served under, if any
    #[serde(default)]
    pub base_url: Option<String>,
}

impl LocalSettings {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            base_url: None,
        }
    }
}

/// Eagle library settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EagleSettings {
    /// Path to the `.library` directory
    pub library_path: PathBuf,
    #[serde(default)]
    pub base_url: Option<String>,
}

fn require_field(provider: &str, field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::Config(format!(
            "Storage provider '{}' requires a non-empty '{}'",
            provider, field
        )));
    }
    Ok(())
}

fn require_path(provider: &str, field: &str, value: &std::path::Path) -> Result<()> {
    if value.as_os_str().is_empty() {
        return Err(Error::Config(format!(
            "Storage provider '{}' requires a non-empty '{}'",
            provider, field
        )));
    }
    Ok(())
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: CoreConfig = serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("Invalid configuration JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Database URL is not empty and the pool has at least one connection
    /// - Storage backend has its required fields
    /// - Quotas, when present, are non-zero
    pub fn validate(&self) -> Result<()> {
        if self.database.url.trim().is_empty() {
            return Err(Error::Config("Database URL cannot be empty".to_string()));
        }

        if self.database.max_connections == 0 {
            return Err(Error::Config(
                "Database max_connections must be greater than 0".to_string(),
            ));
        }

        self.storage.validate()?;
        self.quota.validate()
    }
}

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Default)]
pub struct CoreConfigBuilder {
    database_url: Option<String>,
    max_connections: Option<u32>,
    storage: Option<StorageConfig>,
    quota: QuotaConfig,
    logging: LoggingConfig,
}

impl CoreConfigBuilder {
    /// Sets the SQLite database URL.
    pub fn database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = Some(max);
        self
    }

    /// Sets the storage backend.
    pub fn storage(mut self, storage: StorageConfig) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn quota(mut self, quota: QuotaConfig) -> Self {
        self.quota = quota;
        self
    }

    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = logging;
        self
    }

    /// Builds the configuration, failing on the first invalid setting.
    pub fn build(self) -> Result<CoreConfig> {
        let url = self.database_url.ok_or_else(|| {
            Error::Config("Database URL is required. Use .database_url() to set it.".to_string())
        })?;

        let storage = self.storage.ok_or_else(|| Error::CapabilityMissing {
            capability: "StorageProvider".to_string(),
            message: "No storage backend configured. Use .storage() with one of \
                      s3, b2, github, local or eagle."
                .to_string(),
        })?;

        let config = CoreConfig {
            database: DatabaseSettings {
                url,
                max_connections: self.max_connections.unwrap_or_else(default_max_connections),
            },
            storage,
            quota: self.quota,
            logging: self.logging,
        };

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_storage() -> StorageConfig {
        StorageConfig::Local(LocalSettings::new("/srv/photos"))
    }

    #[test]
    fn test_builder_requires_database_url() {
        let result = CoreConfig::builder().storage(local_storage()).build();

        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Database URL is required"));
    }

    #[test]
    fn test_builder_requires_storage() {
        let result = CoreConfig::builder().database_url("sqlite::memory:").build();

        assert!(matches!(
            result,
            Err(Error::CapabilityMissing { capability, .. }) if capability == "StorageProvider"
        ));
    }

    #[test]
    fn test_builder_with_defaults() {
        let config = CoreConfig::builder()
            .database_url("sqlite::memory:")
            .storage(local_storage())
            .build()
            .unwrap();

        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.quota, QuotaConfig::unlimited());
        assert_eq!(config.storage.provider_tag(), "local");
    }

    #[test]
    fn test_validate_rejects_zero_quota() {
        let result = CoreConfig::builder()
            .database_url("sqlite::memory:")
            .storage(local_storage())
            .quota(QuotaConfig::default().with_max_imports_per_run(0))
            .build();

        assert!(result
            .unwrap_err()
            .to_string()
            .contains("max_imports_per_run"));
    }

    #[test]
    fn test_validate_rejects_empty_bucket() {
        let storage = StorageConfig::S3(S3Settings::new("", "us-east-1", "AKIA", "secret"));
        let result = CoreConfig::builder()
            .database_url("sqlite::memory:")
            .storage(storage)
            .build();

        assert!(result.unwrap_err().to_string().contains("'bucket'"));
    }

    #[test]
    fn test_validate_rejects_bad_endpoint() {
        let storage = StorageConfig::S3(
            S3Settings::new("photos", "auto", "AKIA", "secret").with_endpoint("minio:9000"),
        );
        assert!(storage.validate().is_err());
    }

    #[test]
    fn test_from_json_b2_aliases() {
        let json = r#"{
            "database": { "url": "sqlite::memory:" },
            "storage": {
                "provider": "b2",
                "bucket": "photos",
                "region": "us-west-004",
                "key_id": "004abc",
                "application_key": "K004secret",
                "prefix": "/library/"
            },
            "quota": { "max_library_items": 500 }
        }"#;

        let config = CoreConfig::from_json_str(json).unwrap();
        assert_eq!(config.storage.provider_tag(), "b2");
        assert_eq!(config.storage.root_prefix(), Some("library".to_string()));
        assert_eq!(config.quota.max_library_items, Some(500));
        assert_eq!(config.quota.max_object_size_bytes, None);
        match &config.storage {
            StorageConfig::B2(settings) => assert_eq!(settings.access_key_id, "004abc"),
            other => panic!("unexpected storage {:?}", other),
        }
    }

    #[test]
    fn test_from_json_github_default_branch() {
        let json = r#"{
            "database": { "url": "sqlite::memory:", "max_connections": 2 },
            "storage": { "provider": "github", "owner": "me", "repo": "photos", "token": "ghp_x", "path": "" }
        }"#;

        let config = CoreConfig::from_json_str(json).unwrap();
        match &config.storage {
            StorageConfig::GitHub(settings) => assert_eq!(settings.branch, "main"),
            other => panic!("unexpected storage {:?}", other),
        }
        assert_eq!(config.storage.root_prefix(), None);
    }

    #[test]
    fn test_from_json_rejects_unknown_provider() {
        let json = r#"{
            "database": { "url": "sqlite::memory:" },
            "storage": { "provider": "ftp", "host": "example.com" }
        }"#;

        assert!(CoreConfig::from_json_str(json).is_err());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let settings = S3Settings::new("photos", "us-east-1", "AKIA", "very-secret");
        let rendered = format!("{:?}", settings);
        assert!(!rendered.contains("very-secret"));
        assert!(rendered.contains("[REDACTED]"));

        let github = GitHubSettings::new("me", "photos", "ghp_secret");
        assert!(!format!("{:?}", github).contains("ghp_secret"));
    }
}
