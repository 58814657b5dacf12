//! Local caching for offline data access.
//!
//! `CachedCollection` fronts one backend collection (a namespace such as
//! `authors` or `loaned`). Every successful read or write persists the
//! collection as a JSON snapshot through a `SnapshotStore`. When the
//! backend is unreachable, reads fall back to that snapshot, then to the
//! bundled seed, then to an empty list. Snapshots never expire; the next
//! successful read replaces them.

pub mod collection;
pub mod error;
pub mod remote;
pub mod storage;

#[cfg(test)]
pub(crate) mod testing;

pub use collection::{CachedCollection, Loaded, Source};
pub use error::CacheError;
pub use remote::{Remote, Verb};
pub use storage::{snapshot_key, FileStore, MemoryStore, SnapshotStore, STORAGE_KEY_PREFIX};
