//! GitHub REST API request and response types
//!
//! Only the fields the connector reads are modelled.

use serde::{Deserialize, Serialize};

/// git trees API response
///
/// See: https://docs.github.com/en/rest/git/trees#get-a-tree
#[derive(Debug, Deserialize)]
pub struct TreeResponse {
    pub sha: String,
    pub tree: Vec<TreeEntry>,
    /// Set when the tree exceeded the API's entry limit
    #[serde(default)]
    pub truncated: bool,
}

/// One entry of a recursive tree
#[derive(Debug, Clone, Deserialize)]
pub struct TreeEntry {
    pub path: String,
    /// `blob`, `tree` or `commit` (submodule)
    #[serde(rename = "type")]
    pub entry_type: String,
    pub sha: String,
    /// Present for blobs only
    #[serde(default)]
    pub size: Option<i64>,
}

impl TreeEntry {
    pub fn is_blob(&self) -> bool {
        self.entry_type == "blob"
    }
}

/// File metadata from the contents API
#[derive(Debug, Clone, Deserialize)]
pub struct ContentMetadata {
    pub path: String,
    pub sha: String,
    #[serde(default)]
    pub size: Option<i64>,
}

/// Body of `PUT /repos/{owner}/{repo}/contents/{path}`
#[derive(Debug, Serialize)]
pub struct PutContentRequest<'a> {
    pub message: String,
    /// Base64-encoded file content
    pub content: String,
    pub branch: &'a str,
    /// Blob SHA of the file being replaced
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha: Option<String>,
}

/// Response of a contents API write
#[derive(Debug, Deserialize)]
pub struct PutContentResponse {
    pub content: ContentMetadata,
}

/// Body of `DELETE /repos/{owner}/{repo}/contents/{path}`
#[derive(Debug, Serialize)]
pub struct DeleteContentRequest<'a> {
    pub message: String,
    pub sha: String,
    pub branch: &'a str,
}
