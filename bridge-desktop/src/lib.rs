//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop and server hosts
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `HttpClient` using `reqwest` with rustls and retry/backoff
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::ReqwestHttpClient;
//! use std::sync::Arc;
//!
//! let http = Arc::new(ReqwestHttpClient::new()?);
//! let provider = GitHubConnector::new(http, settings);
//! ```

mod http;

pub use http::ReqwestHttpClient;
