//! S3 API connector implementation
//!
//! Implements the `StorageProvider` trait over `aws-sdk-s3`.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::MetadataDirective;
use aws_sdk_s3::Client;
use bridge_traits::error::{BridgeError, Result};
use bridge_traits::storage::{ListProgress, MoveOptions, StorageObject, StorageProvider, UploadOptions};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use core_runtime::config::{normalize_prefix, S3Settings};
use tracing::{debug, info, instrument};

use crate::error::S3Error;

/// Name recorded on the static credentials handed to the SDK
const CREDENTIALS_SOURCE: &str = "photo-sync-config";

/// Which S3-compatible service the bucket lives on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum S3Flavor {
    /// AWS S3 or any endpoint given explicitly (MinIO, R2)
    S3,
    /// Backblaze B2 through its S3-compatible API
    B2,
}

/// Bucket addressing, independent of the SDK client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Target {
    pub bucket: String,
    pub region: String,
    pub endpoint: Option<String>,
    pub flavor: S3Flavor,
    pub public_base_url: Option<String>,
    pub force_path_style: bool,
}

impl S3Target {
    pub fn from_settings(settings: &S3Settings, flavor: S3Flavor) -> Self {
        let endpoint = settings
            .endpoint
            .clone()
            .or_else(|| match flavor {
                S3Flavor::B2 => Some(format!("https://s3.{}.backblazeb2.com", settings.region)),
                S3Flavor::S3 => None,
            })
            .map(|e| e.trim_end_matches('/').to_string());

        Self {
            bucket: settings.bucket.clone(),
            region: settings.region.clone(),
            endpoint,
            flavor,
            public_base_url: settings
                .public_base_url
                .as_ref()
                .map(|u| u.trim_end_matches('/').to_string()),
            force_path_style: settings.force_path_style,
        }
    }

    /// Public URL of `key`.
    ///
    /// A configured public base wins. Otherwise the URL is path-style when the
    /// client is, and virtual-host style on the endpoint (or AWS) when not.
    pub fn public_url(&self, key: &str) -> String {
        let encoded = encode_key(key);
        if let Some(base) = &self.public_base_url {
            return format!("{}/{}", base, encoded);
        }

        match &self.endpoint {
            Some(endpoint) if self.force_path_style => {
                format!("{}/{}/{}", endpoint, self.bucket, encoded)
            }
            Some(endpoint) => {
                let (scheme, host) = endpoint
                    .split_once("://")
                    .unwrap_or(("https", endpoint.as_str()));
                format!("{}://{}.{}/{}", scheme, self.bucket, host, encoded)
            }
            None => format!(
                "https://{}.s3.{}.amazonaws.com/{}",
                self.bucket, self.region, encoded
            ),
        }
    }
}

/// S3 API connector
///
/// One client per configured bucket. Keys are full object keys; when a
/// prefix is configured only keys under `prefix/` are listed.
///
/// # Example
///
/// ```ignore
/// use provider_s3::{S3Connector, S3Flavor};
/// use bridge_traits::storage::StorageProvider;
///
/// let connector = S3Connector::connect(&settings, S3Flavor::S3).await?;
/// let images = connector.list_images().await?;
/// ```
pub struct S3Connector {
    client: Client,
    target: S3Target,
    prefix: Option<String>,
}

impl S3Connector {
    /// Build a client from explicit settings. No request is issued.
    #[instrument(skip(settings), fields(bucket = %settings.bucket, region = %settings.region))]
    pub async fn connect(settings: &S3Settings, flavor: S3Flavor) -> std::result::Result<Self, S3Error> {
        if settings.bucket.trim().is_empty() {
            return Err(S3Error::Config("bucket cannot be empty".to_string()));
        }
        let target = S3Target::from_settings(settings, flavor);

        let credentials = Credentials::new(
            settings.access_key_id.clone(),
            settings.secret_access_key.clone(),
            None,
            None,
            CREDENTIALS_SOURCE,
        );
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(settings.region.clone()))
            .credentials_provider(credentials);
        if let Some(endpoint) = &target.endpoint {
            loader = loader.endpoint_url(endpoint.clone());
        }
        let sdk_config = loader.load().await;

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(target.force_path_style)
            .build();

        info!(endpoint = ?target.endpoint, ?flavor, "S3 client configured");
        Ok(Self {
            client: Client::from_conf(s3_config),
            target,
            prefix: normalize_prefix(settings.prefix.as_deref()),
        })
    }

    pub fn target(&self) -> &S3Target {
        &self.target
    }

    fn list_prefix(&self) -> Option<String> {
        self.prefix.as_ref().map(|p| format!("{}/", p))
    }

    async fn head(&self, key: &str) -> Result<StorageObject> {
        let head = self
            .client
            .head_object()
            .bucket(&self.target.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| S3Error::request("HeadObject", key, e))?;

        let mut object = StorageObject::new(key);
        object.size = head.content_length();
        object.etag = head.e_tag().map(normalize_etag);
        object.last_modified = head.last_modified().and_then(to_chrono);
        Ok(object)
    }
}

#[async_trait]
impl StorageProvider for S3Connector {
    #[instrument(skip(self, progress), fields(bucket = %self.target.bucket))]
    async fn list_all_files(
        &self,
        progress: Option<ListProgress<'_>>,
    ) -> Result<Vec<StorageObject>> {
        let list_prefix = self.list_prefix();
        let mut objects = Vec::new();
        let mut token: Option<String> = None;
        let mut pages = 0u32;

        loop {
            let mut request = self.client.list_objects_v2().bucket(&self.target.bucket);
            if let Some(prefix) = list_prefix.as_deref() {
                request = request.prefix(prefix);
            }
            if let Some(t) = token.as_deref() {
                request = request.continuation_token(t);
            }
            let page = request.send().await.map_err(|e| {
                S3Error::request("ListObjectsV2", list_prefix.clone().unwrap_or_default(), e)
            })?;
            pages += 1;

            for entry in page.contents() {
                let Some(key) = entry.key() else { continue };
                if key.ends_with('/') {
                    continue;
                }
                let mut object = StorageObject::new(key);
                object.size = entry.size();
                object.etag = entry.e_tag().map(normalize_etag);
                object.last_modified = entry.last_modified().and_then(to_chrono);
                objects.push(object);
            }
            if let Some(progress) = progress {
                progress(objects.len());
            }

            token = next_page_token(
                list_prefix.as_deref().unwrap_or_default(),
                page.is_truncated(),
                page.next_continuation_token(),
            )?;
            if token.is_none() {
                break;
            }
        }

        info!(pages, objects = objects.len(), "Listed bucket");
        Ok(objects)
    }

    #[instrument(skip(self))]
    async fn get_file(&self, key: &str) -> Result<Option<Bytes>> {
        let response = self
            .client
            .get_object()
            .bucket(&self.target.bucket)
            .key(key)
            .send()
            .await;

        let output = match response {
            Ok(output) => output,
            Err(error) => {
                let missing = error.as_service_error().is_some_and(|e| e.is_no_such_key())
                    || error.raw_response().is_some_and(|r| r.status().as_u16() == 404);
                if missing {
                    debug!("Object not found");
                    return Ok(None);
                }
                return Err(S3Error::request("GetObject", key, error).into());
            }
        };

        let body = output.body.collect().await.map_err(|e| S3Error::Body {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Ok(Some(body.into_bytes()))
    }

    #[instrument(skip(self, bytes, options), fields(size = bytes.len()))]
    async fn upload_file(
        &self,
        key: &str,
        bytes: Bytes,
        options: UploadOptions,
    ) -> Result<StorageObject> {
        validate_key(key)?;
        self.client
            .put_object()
            .bucket(&self.target.bucket)
            .key(key)
            .set_content_type(options.content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| S3Error::request("PutObject", key, e))?;

        debug!("Uploaded object");
        self.head(key).await
    }

    #[instrument(skip(self))]
    async fn delete_file(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.target.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| S3Error::request("DeleteObject", key, e))?;
        Ok(())
    }

    #[instrument(skip(self, options))]
    async fn move_file(
        &self,
        source_key: &str,
        destination_key: &str,
        options: MoveOptions,
    ) -> Result<StorageObject> {
        validate_key(destination_key)?;
        let mut copy = self
            .client
            .copy_object()
            .bucket(&self.target.bucket)
            .copy_source(format!("{}/{}", self.target.bucket, encode_key(source_key)))
            .key(destination_key);
        if let Some(content_type) = options.content_type {
            copy = copy
                .content_type(content_type)
                .metadata_directive(MetadataDirective::Replace);
        }
        copy.send()
            .await
            .map_err(|e| S3Error::request("CopyObject", source_key, e))?;

        self.delete_file(source_key).await?;
        self.head(destination_key).await
    }

    fn generate_public_url(&self, key: &str) -> Result<String> {
        validate_key(key)?;
        Ok(self.target.public_url(key))
    }
}

fn validate_key(key: &str) -> Result<()> {
    if key.trim().is_empty() || key.ends_with('/') {
        return Err(BridgeError::InvalidKey {
            key: key.to_string(),
            reason: "object keys must name a file".to_string(),
        });
    }
    Ok(())
}

/// Percent-encode each path segment, keeping the separators.
/// Continuation token of the next ListObjectsV2 page, `None` on the last.
/// A truncated page without a token fails the listing.
fn next_page_token(
    prefix: &str,
    is_truncated: Option<bool>,
    token: Option<&str>,
) -> std::result::Result<Option<String>, S3Error> {
    match (is_truncated, token) {
        (Some(true), Some(next)) if !next.is_empty() => Ok(Some(next.to_string())),
        (Some(true), _) => Err(S3Error::Request {
            operation: "ListObjectsV2",
            key: prefix.to_string(),
            message: "truncated page carried no continuation token".to_string(),
        }),
        _ => Ok(None),
    }
}

fn encode_key(key: &str) -> String {
    key.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// S3 returns entity tags wrapped in double quotes.
fn normalize_etag(etag: &str) -> String {
    etag.trim_matches('"').to_string()
}

fn to_chrono(timestamp: &aws_smithy_types::DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(timestamp.to_millis().ok()?)
}
