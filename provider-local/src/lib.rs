//! # Local Provider
//!
//! Implements `StorageProvider` over a directory on the local filesystem.
//!
//! Two layouts are supported:
//! - [`LocalLayout::Plain`]: every file under the root is an object
//! - [`LocalLayout::Eagle`]: an Eagle `.library`, where each asset lives in
//!   its own `images/<id>.info/` directory next to `metadata.json` and a
//!   `_thumbnail` rendition, neither of which is listed

mod connector;

pub use connector::{LocalConnector, LocalLayout};
