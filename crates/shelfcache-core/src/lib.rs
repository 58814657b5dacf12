//! Client library for a library-management backend that keeps working
//! when the backend does not.
//!
//! - [`api`]: HTTP client and error classification
//! - [`cache`]: collections with a persisted fallback snapshot
//! - [`library`]: one collection per backend namespace
//! - [`models`]: entity types and bundled seed data
//! - [`status`]: backend health and uptime
//! - [`poll`]: fixed-interval refresh tasks

pub mod api;
pub mod cache;
pub mod library;
pub mod models;
pub mod poll;
pub mod status;

pub use api::{ApiClient, ApiError};
pub use cache::{
    CachedCollection, FileStore, Loaded, MemoryStore, Remote, SnapshotStore, Source, Verb,
};
pub use library::{Library, RefreshSummary};
