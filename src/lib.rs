//! Workspace placeholder crate.
//!
//! This crate exposes feature flags that select which storage backends the
//! `core-service` facade is compiled with (`s3`, `github`, `local`). Host
//! applications can depend on `photo-sync-workspace` and enable the backends
//! they need without wiring each provider crate individually.

#[cfg(any(feature = "s3", feature = "github", feature = "local"))]
pub use core_service;
