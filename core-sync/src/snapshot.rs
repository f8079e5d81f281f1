//! # Snapshot Hashing
//!
//! Cheap drift detection from `(size, etag, lastModified)` without
//! downloading content. Pure functions, no I/O, usable outside the sync
//! engine.

use bridge_traits::StorageObject;
use core_library::models::MetadataSnapshot;

/// `etag::size::lastModified` with every part absent.
const EMPTY_SENTINEL: &str = "::::";

/// Fingerprint of an object's metadata.
///
/// Returns `None` when all three inputs are absent. Two snapshots are equal
/// iff their hashes are equal.
///
/// ```
/// use core_sync::snapshot::metadata_hash;
///
/// assert_eq!(
///     metadata_hash(Some(42), Some("abc"), Some("2024-01-01T00:00:00.000Z")).as_deref(),
///     Some("abc::42::2024-01-01T00:00:00.000Z")
/// );
/// assert_eq!(metadata_hash(None, None, None), None);
/// ```
pub fn metadata_hash(
    size: Option<i64>,
    etag: Option<&str>,
    last_modified: Option<&str>,
) -> Option<String> {
    let serialized = format!(
        "{}::{}::{}",
        etag.unwrap_or_default(),
        size.map(|s| s.to_string()).unwrap_or_default(),
        last_modified.unwrap_or_default()
    );
    if serialized == EMPTY_SENTINEL {
        None
    } else {
        Some(serialized)
    }
}

/// Snapshot of a storage object as listed by the backend.
pub fn snapshot_of(object: &StorageObject) -> MetadataSnapshot {
    let last_modified = object.last_modified_iso();
    let metadata_hash = metadata_hash(
        object.size,
        object.etag.as_deref(),
        last_modified.as_deref(),
    );
    MetadataSnapshot {
        size: object.size,
        etag: object.etag.clone(),
        last_modified,
        metadata_hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    #[test]
    fn test_hash_is_deterministic() {
        let a = metadata_hash(Some(10), Some("e"), Some("t"));
        let b = metadata_hash(Some(10), Some("e"), Some("t"));
        assert_eq!(a, b);
        assert_eq!(metadata_hash(None, None, None), metadata_hash(None, None, None));
    }

    #[test]
    fn test_hash_partial_inputs_are_distinct() {
        assert_eq!(metadata_hash(Some(0), None, None).as_deref(), Some("::0::"));
        assert_eq!(metadata_hash(None, Some("e"), None).as_deref(), Some("e::::"));
        assert_eq!(metadata_hash(None, None, Some("t")).as_deref(), Some("::::t"));
        assert_ne!(
            metadata_hash(Some(1), Some("e"), None),
            metadata_hash(Some(2), Some("e"), None)
        );
    }

    #[test]
    fn test_empty_strings_collapse_to_none() {
        assert_eq!(metadata_hash(None, Some(""), Some("")), None);
    }

    #[test]
    fn test_snapshot_of_object() {
        let ts = DateTime::from_timestamp_millis(1_700_000_000_000).unwrap();
        let object = StorageObject::new("a.jpg")
            .with_size(5)
            .with_etag("e1")
            .with_last_modified(ts);

        let snapshot = snapshot_of(&object);
        assert_eq!(snapshot.size, Some(5));
        assert_eq!(
            snapshot.metadata_hash.as_deref(),
            Some("e1::5::2023-11-14T22:13:20.000Z")
        );
    }

    #[test]
    fn test_snapshot_of_bare_object() {
        let snapshot = snapshot_of(&StorageObject::new("a.jpg"));
        assert_eq!(snapshot, MetadataSnapshot::default());
    }
}
