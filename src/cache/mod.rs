//! Cache module for storing catalog data locally
//!
//! This module provides a cache manager that persists API responses in a
//! key-value store, keyed by category, language and entity id, with
//! per-category freshness windows. Reads report whether an entry is fresh or
//! stale so callers can fall back to stale data when the remote source is
//! unavailable.

pub mod codec;
pub mod key;
mod manager;
pub mod policy;
pub mod store;

pub use key::{CacheCategory, CacheKey, CacheScope, KeyError, Language};
pub use manager::{CacheError, CacheManager, CachedData, EntryInfo, InvalidationScope, Lookup};
pub use policy::{FreshnessPolicy, MaxAge};
pub use store::{FileStore, KeyValueStore, MemoryStore, StoreError};
