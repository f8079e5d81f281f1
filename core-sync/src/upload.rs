//! # Upload Key Allocator
//!
//! Collision-free storage keys and photo ids for a batch of uploads.
//!
//! ## Overview
//!
//! Allocation runs entirely in memory before any network call and is
//! deterministic for a given input order:
//!
//! 1. Base path per file: `{root prefix}/{directory}/{filename stem}`.
//!    Files with a `video/` content type or a `mov`/`mp4` extension are
//!    videos, everything else is a still. Stills must carry an image
//!    extension sync catalogues and videos a `mov`/`mp4` one.
//! 2. Stills and videos are deduplicated separately. Repeated base paths
//!    (case-insensitive) get `-1`, `-2`, ... in first-seen order.
//! 3. Every video must pair with a still of the same base path in the batch,
//!    or with a still already in the catalogue. Otherwise the batch is
//!    rejected, naming the file.
//! 4. Each still key is bumped (`IMG` → `IMG-1` → `IMG-2`) until neither the
//!    key nor its derived photo id is taken by the catalogue or an earlier
//!    file. Accepted keys and ids are reserved immediately.
//! 5. A paired video follows its still's final base path.
//!
//! Keys and ids are compared case-insensitively.

use crate::error::{Result, SyncError};
use crate::manifest::derive_photo_id;
use bridge_traits::storage::{key_base_path, IMAGE_EXTENSIONS, VIDEO_EXTENSIONS};
use bytes::Bytes;
use core_library::models::CatalogueRecord;
use std::collections::{HashMap, HashSet};

/// One file of an upload batch
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub filename: String,
    pub bytes: Bytes,
    pub content_type: Option<String>,
    /// Directory below the configured root prefix
    pub directory: Option<String>,
}

impl UploadFile {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
            content_type: None,
            directory: None,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_directory(mut self, directory: impl Into<String>) -> Self {
        self.directory = Some(directory.into());
        self
    }

    pub fn is_video(&self) -> bool {
        if let Some(ct) = &self.content_type {
            if ct.to_ascii_lowercase().starts_with("video/") {
                return true;
            }
        }
        split_name(&self.filename)
            .1
            .is_some_and(|ext| VIDEO_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
    }

    /// Declared content type, or one guessed from the extension.
    pub fn resolved_content_type(&self) -> String {
        if let Some(ct) = &self.content_type {
            return ct.clone();
        }
        let ext = split_name(&self.filename).1.unwrap_or_default();
        mime_guess::from_ext(ext)
            .first_or_octet_stream()
            .essence_str()
            .to_string()
    }
}

/// Destination of a video upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedVideo {
    pub file_index: usize,
    pub storage_key: String,
}

/// A still to upload, with its companion video if the batch has one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedStill {
    pub file_index: usize,
    pub storage_key: String,
    pub photo_id: String,
    pub video: Option<PlannedVideo>,
}

/// A video whose still is already catalogued
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedAttachment {
    pub video: PlannedVideo,
    pub record_id: String,
    pub still_key: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadPlan {
    pub stills: Vec<PlannedStill>,
    pub attachments: Vec<PlannedAttachment>,
}

impl UploadPlan {
    /// Every storage key the plan will write.
    pub fn storage_keys(&self) -> Vec<&str> {
        let mut keys = Vec::new();
        for still in &self.stills {
            keys.push(still.storage_key.as_str());
            if let Some(video) = &still.video {
                keys.push(video.storage_key.as_str());
            }
        }
        keys.extend(self.attachments.iter().map(|a| a.video.storage_key.as_str()));
        keys
    }
}

/// A file after step 1 and 2
struct Candidate {
    file_index: usize,
    base: String,
    extension: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UploadKeyAllocator;

impl UploadKeyAllocator {
    /// Plan keys for `files` against the tenant's `existing` rows.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for an empty batch, a file without a name or
    /// extension, a file whose extension sync would not catalogue, or a video
    /// with no matching still.
    pub fn allocate(
        files: &[UploadFile],
        root_prefix: Option<&str>,
        existing: &[CatalogueRecord],
    ) -> Result<UploadPlan> {
        if files.is_empty() {
            return Err(SyncError::Validation("upload batch is empty".to_string()));
        }

        let mut stills = Vec::new();
        let mut videos = Vec::new();
        for (file_index, file) in files.iter().enumerate() {
            let (stem, extension) = split_name(&file.filename);
            let extension = extension.ok_or_else(|| {
                SyncError::Validation(format!("file '{}' has no extension", file.filename))
            })?;
            if stem.is_empty() {
                return Err(SyncError::Validation(format!(
                    "file '{}' has no name",
                    file.filename
                )));
            }
            let is_video = file.is_video();
            let accepted: &[&str] = if is_video { VIDEO_EXTENSIONS } else { IMAGE_EXTENSIONS };
            if !accepted.contains(&extension.to_lowercase().as_str()) {
                return Err(SyncError::Validation(format!(
                    "file '{}' has unsupported {} extension '{}'",
                    file.filename,
                    if is_video { "video" } else { "image" },
                    extension
                )));
            }
            let candidate = Candidate {
                file_index,
                base: join_path(&[root_prefix.unwrap_or_default(), file.directory.as_deref().unwrap_or_default(), stem]),
                extension: extension.to_string(),
            };
            if is_video {
                videos.push(candidate);
            } else {
                stills.push(candidate);
            }
        }

        dedupe_bases(&mut stills);
        dedupe_bases(&mut videos);

        // Step 3: pairing
        let still_by_base: HashMap<String, usize> = stills
            .iter()
            .enumerate()
            .map(|(i, c)| (c.base.to_lowercase(), i))
            .collect();
        let existing_by_base: HashMap<String, &CatalogueRecord> = existing
            .iter()
            .map(|r| (key_base_path(&r.storage_key).to_lowercase(), r))
            .collect();

        let mut paired: HashMap<usize, &Candidate> = HashMap::new();
        let mut attachments = Vec::new();
        for video in &videos {
            let base = video.base.to_lowercase();
            if let Some(&still) = still_by_base.get(&base) {
                paired.insert(still, video);
            } else if let Some(record) = existing_by_base.get(&base) {
                attachments.push(PlannedAttachment {
                    video: PlannedVideo {
                        file_index: video.file_index,
                        storage_key: format!(
                            "{}.{}",
                            key_base_path(&record.storage_key),
                            video.extension
                        ),
                    },
                    record_id: record.id.clone(),
                    still_key: record.storage_key.clone(),
                });
            } else {
                return Err(SyncError::Validation(format!(
                    "Live Photo video '{}' has no matching still",
                    files[video.file_index].filename
                )));
            }
        }

        // Step 4: global uniqueness
        let mut taken_keys: HashSet<String> = existing
            .iter()
            .map(|r| r.storage_key.to_lowercase())
            .chain(attachments.iter().map(|a| a.video.storage_key.to_lowercase()))
            .collect();
        let mut taken_ids: HashSet<String> =
            existing.iter().map(|r| r.photo_id.to_lowercase()).collect();

        let mut planned = Vec::with_capacity(stills.len());
        for (i, still) in stills.iter().enumerate() {
            let video = paired.get(&i);
            let mut base = still.base.clone();
            let (key, photo_id, video_key) = loop {
                let key = format!("{}.{}", base, still.extension);
                let photo_id = derive_photo_id(&key);
                let video_key = video.map(|v| format!("{}.{}", base, v.extension));
                let free = !taken_keys.contains(&key.to_lowercase())
                    && !taken_ids.contains(&photo_id.to_lowercase())
                    && video_key
                        .as_ref()
                        .map_or(true, |k| !taken_keys.contains(&k.to_lowercase()));
                if free {
                    break (key, photo_id, video_key);
                }
                base = bump_suffix(&base);
            };

            taken_keys.insert(key.to_lowercase());
            taken_ids.insert(photo_id.to_lowercase());
            if let Some(video_key) = &video_key {
                taken_keys.insert(video_key.to_lowercase());
            }

            // Step 5: the video follows the still
            planned.push(PlannedStill {
                file_index: still.file_index,
                storage_key: key,
                photo_id,
                video: video.zip(video_key).map(|(v, storage_key)| PlannedVideo {
                    file_index: v.file_index,
                    storage_key,
                }),
            });
        }

        Ok(UploadPlan {
            stills: planned,
            attachments,
        })
    }
}

/// `(stem, extension)` of the final segment of `filename`.
fn split_name(filename: &str) -> (&str, Option<&str>) {
    let name = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    match name.rfind('.') {
        Some(dot) if dot > 0 && dot + 1 < name.len() => (&name[..dot], Some(&name[dot + 1..])),
        _ => (name, None),
    }
}

/// Join non-empty segments with `/`, trimming their slashes.
fn join_path(segments: &[&str]) -> String {
    segments
        .iter()
        .map(|s| s.trim_matches('/'))
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Suffix repeated base paths with `-N` in first-seen order.
fn dedupe_bases(candidates: &mut [Candidate]) {
    let mut seen: HashMap<String, usize> = HashMap::new();
    for candidate in candidates.iter_mut() {
        let count = seen.entry(candidate.base.to_lowercase()).or_insert(0);
        if *count > 0 {
            candidate.base = format!("{}-{}", candidate.base, count);
        }
        *count += 1;
    }
}

/// Increment a trailing `-N`, or append `-1`.
fn bump_suffix(base: &str) -> String {
    let name_start = base.rfind('/').map(|i| i + 1).unwrap_or(0);
    if let Some((stem, digits)) = base[name_start..].rsplit_once('-') {
        if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
            if let Ok(n) = digits.parse::<u64>() {
                return format!("{}{}-{}", &base[..name_start], stem, n + 1);
            }
        }
    }
    format!("{}-1", base)
}
