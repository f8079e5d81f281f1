//! GitHub API connector implementation
//!
//! Implements the `StorageProvider` trait over the GitHub REST API.
//!
//! The git trees API carries no modification times, so objects from both
//! listing and upload report `last_modified` as `None`. The blob SHA changes
//! with the content and serves as the etag.

use async_trait::async_trait;
use base64::Engine;
use bridge_traits::error::{BridgeError, Result};
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
use bridge_traits::storage::{ListProgress, StorageObject, StorageProvider, UploadOptions};
use bytes::Bytes;
use core_runtime::config::{normalize_prefix, GitHubSettings};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::error::GitHubError;
use crate::types::{
    ContentMetadata, DeleteContentRequest, PutContentRequest, PutContentResponse, TreeResponse,
};

/// GitHub API base URL
const GITHUB_API_BASE: &str = "https://api.github.com";

/// Raw content host used for public URLs
const RAW_CONTENT_BASE: &str = "https://raw.githubusercontent.com";

const API_VERSION: &str = "2022-11-28";
const USER_AGENT: &str = "photo-sync-core";
const JSON_MEDIA_TYPE: &str = "application/vnd.github+json";
const RAW_MEDIA_TYPE: &str = "application/vnd.github.raw+json";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// GitHub repository connector
///
/// Keys are repository-relative paths. When a `path` is configured only
/// files under it are listed.
///
/// # Example
///
/// ```ignore
/// use provider_github::GitHubConnector;
/// use bridge_traits::storage::StorageProvider;
///
/// let connector = GitHubConnector::new(http_client, &settings);
/// let images = connector.list_images().await?;
/// ```
pub struct GitHubConnector {
    http_client: Arc<dyn HttpClient>,
    owner: String,
    repo: String,
    branch: String,
    path: Option<String>,
    token: String,
    public_base_url: Option<String>,
    api_base: String,
}

impl GitHubConnector {
    pub fn new(http_client: Arc<dyn HttpClient>, settings: &GitHubSettings) -> Self {
        Self {
            http_client,
            owner: settings.owner.clone(),
            repo: settings.repo.clone(),
            branch: settings.branch.clone(),
            path: normalize_prefix(settings.path.as_deref()),
            token: settings.token.clone(),
            public_base_url: settings
                .public_base_url
                .as_ref()
                .map(|u| u.trim_end_matches('/').to_string()),
            api_base: GITHUB_API_BASE.to_string(),
        }
    }

    /// Point at a GitHub Enterprise API root.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn repo_url(&self) -> String {
        format!("{}/repos/{}/{}", self.api_base, self.owner, self.repo)
    }

    fn contents_url(&self, key: &str) -> String {
        format!("{}/contents/{}", self.repo_url(), encode_path(key))
    }

    fn request(&self, method: HttpMethod, url: String, accept: &str) -> HttpRequest {
        HttpRequest::new(method, url)
            .bearer_token(&self.token)
            .header("Accept", accept)
            .header("User-Agent", USER_AGENT)
            .header("X-GitHub-Api-Version", API_VERSION)
            .timeout(REQUEST_TIMEOUT)
    }

    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.http_client
            .execute_with_retry(request, RetryPolicy::default())
            .await
    }

    fn in_scope(&self, key: &str) -> bool {
        match &self.path {
            Some(path) => key
                .strip_prefix(path.as_str())
                .is_some_and(|rest| rest.starts_with('/')),
            None => true,
        }
    }

    /// Blob SHA of `key` on the branch, `None` when the file does not exist.
    async fn existing_sha(&self, key: &str) -> Result<Option<String>> {
        let url = format!(
            "{}?ref={}",
            self.contents_url(key),
            urlencoding::encode(&self.branch)
        );
        let response = self.send(self.request(HttpMethod::Get, url, JSON_MEDIA_TYPE)).await?;
        if response.status == 404 {
            return Ok(None);
        }
        if !response.is_success() {
            return Err(api_error(&response).into());
        }
        let metadata: ContentMetadata = parse(&response, "content metadata")?;
        Ok(Some(metadata.sha))
    }
}

#[async_trait]
impl StorageProvider for GitHubConnector {
    #[instrument(skip(self, progress), fields(repo = %self.repo, branch = %self.branch))]
    async fn list_all_files(
        &self,
        progress: Option<ListProgress<'_>>,
    ) -> Result<Vec<StorageObject>> {
        let url = format!(
            "{}/git/trees/{}?recursive=1",
            self.repo_url(),
            urlencoding::encode(&self.branch)
        );
        let response = self.send(self.request(HttpMethod::Get, url, JSON_MEDIA_TYPE)).await?;
        if !response.is_success() {
            return Err(api_error(&response).into());
        }

        let tree: TreeResponse = parse(&response, "tree")?;
        if tree.truncated {
            return Err(GitHubError::TruncatedTree {
                branch: self.branch.clone(),
            }
            .into());
        }

        let objects: Vec<StorageObject> = tree
            .tree
            .into_iter()
            .filter(|entry| entry.is_blob() && self.in_scope(&entry.path))
            .map(|entry| {
                let mut object = StorageObject::new(entry.path).with_etag(entry.sha);
                object.size = entry.size;
                object
            })
            .collect();
        if let Some(progress) = progress {
            progress(objects.len());
        }

        info!(tree = %tree.sha, objects = objects.len(), "Listed repository tree");
        Ok(objects)
    }

    #[instrument(skip(self))]
    async fn get_file(&self, key: &str) -> Result<Option<Bytes>> {
        let url = format!(
            "{}?ref={}",
            self.contents_url(key),
            urlencoding::encode(&self.branch)
        );
        let response = self.send(self.request(HttpMethod::Get, url, RAW_MEDIA_TYPE)).await?;

        match response.status {
            404 => {
                debug!("File not found");
                Ok(None)
            }
            _ if response.is_success() => Ok(Some(response.body)),
            _ => Err(api_error(&response).into()),
        }
    }

    #[instrument(skip(self, bytes, _options), fields(size = bytes.len()))]
    async fn upload_file(
        &self,
        key: &str,
        bytes: Bytes,
        _options: UploadOptions,
    ) -> Result<StorageObject> {
        validate_key(key)?;
        let sha = self.existing_sha(key).await?;
        if sha.is_some() {
            debug!("Replacing existing file");
        }

        let body = PutContentRequest {
            message: format!("Upload {}", key),
            content: base64::engine::general_purpose::STANDARD.encode(&bytes),
            branch: &self.branch,
            sha,
        };
        let request = self
            .request(HttpMethod::Put, self.contents_url(key), JSON_MEDIA_TYPE)
            .json(&body)?;
        let response = self.send(request).await?;
        if !response.is_success() {
            return Err(api_error(&response).into());
        }

        let written: PutContentResponse = parse(&response, "contents write")?;
        Ok(StorageObject::new(key)
            .with_etag(written.content.sha)
            .with_size(written.content.size.unwrap_or(bytes.len() as i64)))
    }

    #[instrument(skip(self))]
    async fn delete_file(&self, key: &str) -> Result<()> {
        let Some(sha) = self.existing_sha(key).await? else {
            debug!("Nothing to delete");
            return Ok(());
        };

        let body = DeleteContentRequest {
            message: format!("Delete {}", key),
            sha,
            branch: &self.branch,
        };
        let request = self
            .request(HttpMethod::Delete, self.contents_url(key), JSON_MEDIA_TYPE)
            .json(&body)?;
        let response = self.send(request).await?;
        if response.status == 404 {
            warn!("File vanished before delete");
            return Ok(());
        }
        if !response.is_success() {
            return Err(api_error(&response).into());
        }
        Ok(())
    }

    fn generate_public_url(&self, key: &str) -> Result<String> {
        validate_key(key)?;
        let encoded = encode_path(key);
        Ok(match &self.public_base_url {
            Some(base) => format!("{}/{}", base, encoded),
            None => format!(
                "{}/{}/{}/{}/{}",
                RAW_CONTENT_BASE, self.owner, self.repo, self.branch, encoded
            ),
        })
    }
}

fn validate_key(key: &str) -> Result<()> {
    if key.trim().is_empty() || key.starts_with('/') || key.ends_with('/') {
        return Err(BridgeError::InvalidKey {
            key: key.to_string(),
            reason: "repository paths must be relative file paths".to_string(),
        });
    }
    Ok(())
}

fn encode_path(key: &str) -> String {
    key.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn parse<T: serde::de::DeserializeOwned>(response: &HttpResponse, what: &str) -> Result<T> {
    serde_json::from_slice(&response.body).map_err(|e| {
        GitHubError::ParseError(format!("Failed to parse {} response: {}", what, e)).into()
    })
}

fn api_error(response: &HttpResponse) -> GitHubError {
    let message = String::from_utf8_lossy(&response.body).to_string();
    let exhausted = response.header_value("x-ratelimit-remaining") == Some("0");
    if response.status == 429 || (response.status == 403 && exhausted) {
        return GitHubError::RateLimited(message);
    }
    GitHubError::ApiError {
        status_code: response.status,
        message,
    }
}
