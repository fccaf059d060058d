//! Cache manager coordinating keys, freshness and storage
//!
//! Provides a `CacheManager` that stores serializable data in a
//! [`KeyValueStore`] as a payload/timestamp pair per entry, checks entries
//! against the [`FreshnessPolicy`], and supports invalidation by category,
//! language, or everything at once.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

use super::codec::{self, CodecError};
use super::key::{
    legacy_keys, CacheCategory, CacheKey, CacheScope, KeyError, Language, TIMESTAMP_SUFFIX,
};
use super::policy::{FreshnessPolicy, MaxAge, HOUR_MILLIS};
use super::store::{KeyValueStore, StoreError};

/// Prefix of card-list keys written before keys carried a language
/// (`cached_cards_<setId>`)
const LEGACY_CARDS_PREFIX: &str = "cached_cards_";

/// Errors raised by cache operations
#[derive(Debug, Error)]
pub enum CacheError {
    /// Underlying store failed
    #[error("Cache storage error: {0}")]
    Store(#[from] StoreError),

    /// Entry could not be encoded or decoded
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Scope does not produce a valid key
    #[error("Invalid cache key: {0}")]
    Key(#[from] KeyError),
}

/// Result of reading from cache, including metadata about cache freshness
#[derive(Debug, Clone)]
pub struct CachedData<T> {
    /// The cached data
    pub data: T,
    /// When the data was originally cached
    pub cached_at: DateTime<Utc>,
    /// Whether the cache entry has expired
    pub is_expired: bool,
}

/// Outcome of a typed cache read
///
/// Distinguishes "nothing usable cached" from "the store is broken" for
/// callers that care; [`CacheManager::get_cached`] folds both into `None`.
#[derive(Debug)]
pub enum Lookup<T> {
    /// Entry present and within its maximum age
    Fresh(CachedData<T>),
    /// Entry present but older than its maximum age
    Stale(CachedData<T>),
    /// No valid entry (missing payload, missing or unparsable timestamp)
    Miss,
    /// Store read or payload decode failed
    Failed(CacheError),
}

impl<T> Lookup<T> {
    /// The data if the entry is fresh
    pub fn fresh(self) -> Option<T> {
        match self {
            Lookup::Fresh(cached) => Some(cached.data),
            _ => None,
        }
    }

    /// The entry if one was read, fresh or stale
    pub fn into_cached(self) -> Option<CachedData<T>> {
        match self {
            Lookup::Fresh(cached) | Lookup::Stale(cached) => Some(cached),
            Lookup::Miss | Lookup::Failed(_) => None,
        }
    }
}

/// Which entries an invalidation removes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidationScope {
    /// Every cache entry in every language
    Everything,
    /// Every entry of one category, in every language
    Category(CacheCategory),
    /// Every entry stored under one language
    Language(Language),
}

impl InvalidationScope {
    /// Whether a stored key belongs to this scope
    fn matches(&self, raw: &str) -> bool {
        if let Some(key) = CacheKey::parse(raw) {
            return match self {
                InvalidationScope::Everything => true,
                InvalidationScope::Category(category) => key.category() == *category,
                InvalidationScope::Language(language) => key.language() == language,
            };
        }

        match self {
            InvalidationScope::Everything => CacheCategory::ALL.iter().any(|c| is_legacy_key(*c, raw)),
            InvalidationScope::Category(category) => is_legacy_key(*category, raw),
            // Legacy keys carry no language
            InvalidationScope::Language(_) => false,
        }
    }
}

fn is_legacy_key(category: CacheCategory, raw: &str) -> bool {
    legacy_keys(category).iter().any(|k| k == raw)
        || (category == CacheCategory::Cards && raw.starts_with(LEGACY_CARDS_PREFIX))
}

/// Diagnostic snapshot of one cache category
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryInfo {
    /// Whether any entry of the category is stored
    pub present: bool,
    /// Age of the newest entry in whole hours
    pub age_hours: Option<i64>,
    /// Whether the newest entry is within its maximum age
    pub is_valid: bool,
    /// Number of stored entries
    pub entries: usize,
}

impl EntryInfo {
    fn absent() -> Self {
        Self {
            present: false,
            age_hours: None,
            is_valid: false,
            entries: 0,
        }
    }
}

/// Manages reading and writing cached data in a key-value store
///
/// Each entry is two store keys: the JSON payload under the composed
/// [`CacheKey`] and its write time under `<key>_timestamp`. An entry without
/// a readable timestamp is never served. Cloning is cheap; clones share the
/// same store.
#[derive(Clone)]
pub struct CacheManager {
    store: Arc<dyn KeyValueStore>,
    policy: FreshnessPolicy,
}

impl fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheManager")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl CacheManager {
    /// Creates a CacheManager with the default freshness policy
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_policy(store, FreshnessPolicy::default())
    }

    /// Creates a CacheManager with a custom freshness policy
    pub fn with_policy(store: Arc<dyn KeyValueStore>, policy: FreshnessPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &FreshnessPolicy {
        &self.policy
    }

    /// Reads an entry and reports its freshness
    pub async fn lookup<T: DeserializeOwned>(
        &self,
        category: CacheCategory,
        scope: &CacheScope,
    ) -> Lookup<T> {
        match CacheKey::new(category, scope) {
            Ok(key) => self.lookup_key(&key).await,
            Err(e) => Lookup::Failed(e.into()),
        }
    }

    /// Reads the entry stored under an already composed key
    pub async fn lookup_key<T: DeserializeOwned>(&self, key: &CacheKey) -> Lookup<T> {
        let cached_at = match self.store.get(&key.timestamp_key()).await {
            Ok(Some(raw)) => match codec::decode_timestamp(&raw) {
                Ok(at) => at,
                Err(e) => {
                    tracing::debug!(key = %key, error = %e, "ignoring entry with bad timestamp");
                    return Lookup::Miss;
                }
            },
            Ok(None) => return Lookup::Miss,
            Err(e) => return Lookup::Failed(e.into()),
        };

        let raw = match self.store.get(key.data_key()).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return Lookup::Miss,
            Err(e) => return Lookup::Failed(e.into()),
        };

        let data = match codec::decode_payload::<T>(&raw) {
            Ok(data) => data,
            Err(e) => return Lookup::Failed(e.into()),
        };

        let max_age = self.policy.max_age_for(key.category());
        let is_expired = !max_age.admits(age_millis(cached_at, Utc::now()));
        let cached = CachedData {
            data,
            cached_at,
            is_expired,
        };

        if is_expired {
            Lookup::Stale(cached)
        } else {
            Lookup::Fresh(cached)
        }
    }

    /// Returns the cached payload if a fresh entry exists
    ///
    /// Absence, expiry, storage failures and corrupt payloads all yield
    /// `None`; failures are logged.
    pub async fn get_cached<T: DeserializeOwned>(
        &self,
        category: CacheCategory,
        scope: &CacheScope,
    ) -> Option<T> {
        match self.lookup(category, scope).await {
            Lookup::Fresh(cached) => {
                tracing::debug!(%category, language = %scope.language, "cache hit");
                Some(cached.data)
            }
            Lookup::Stale(_) => {
                tracing::debug!(%category, language = %scope.language, "cache entry expired");
                None
            }
            Lookup::Miss => {
                tracing::debug!(%category, language = %scope.language, "cache miss");
                None
            }
            Lookup::Failed(e) => {
                tracing::warn!(%category, language = %scope.language, error = %e, "cache read failed, treating as miss");
                None
            }
        }
    }

    /// Writes a payload and its timestamp
    ///
    /// The previous timestamp is removed before the payload is written, so an
    /// interrupted write leaves an entry that reads as a miss. Failures are
    /// logged and returned.
    pub async fn set_cached<T: Serialize + ?Sized>(
        &self,
        category: CacheCategory,
        scope: &CacheScope,
        payload: &T,
    ) -> Result<(), CacheError> {
        let result = self.write_entry(category, scope, payload).await;
        if let Err(ref e) = result {
            tracing::warn!(%category, language = %scope.language, error = %e, "cache write failed");
        }
        result
    }

    async fn write_entry<T: Serialize + ?Sized>(
        &self,
        category: CacheCategory,
        scope: &CacheScope,
        payload: &T,
    ) -> Result<(), CacheError> {
        let key = CacheKey::new(category, scope)?;
        let encoded = codec::encode_payload(payload)?;
        let timestamp_key = key.timestamp_key();

        self.store.remove(&timestamp_key).await?;
        self.store.set(key.data_key(), &encoded).await?;
        self.store
            .set(&timestamp_key, &codec::encode_timestamp(Utc::now()))
            .await?;

        tracing::debug!(key = %key, bytes = encoded.len(), "cache write");
        Ok(())
    }

    /// Whether the entry under `key` was written less than `max_age` ago
    ///
    /// False when the timestamp is absent, unparsable, or cannot be read.
    pub async fn is_valid(&self, key: &CacheKey, max_age: MaxAge) -> bool {
        match self.store.get(&key.timestamp_key()).await {
            Ok(Some(raw)) => codec::decode_timestamp(&raw)
                .map(|at| max_age.admits(age_millis(at, Utc::now())))
                .unwrap_or(false),
            Ok(None) => false,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "failed to read cache timestamp");
                false
            }
        }
    }

    /// Removes every entry in `scope`
    ///
    /// Keys are enumerated from the store at call time and removed in one
    /// batch. Returns the number of store keys removed.
    pub async fn invalidate(&self, scope: &InvalidationScope) -> Result<usize, CacheError> {
        let result = self.remove_matching(scope).await;
        match &result {
            Ok(removed) => tracing::info!(?scope, removed, "cache invalidated"),
            Err(e) => tracing::warn!(?scope, error = %e, "cache invalidation failed"),
        }
        result
    }

    async fn remove_matching(&self, scope: &InvalidationScope) -> Result<usize, CacheError> {
        let mut doomed: Vec<String> = self
            .store
            .all_keys()
            .await?
            .into_iter()
            .filter(|key| scope.matches(key))
            .collect();

        if doomed.is_empty() {
            return Ok(0);
        }

        doomed.sort();
        doomed.dedup();
        self.store.multi_remove(&doomed).await?;
        Ok(doomed.len())
    }

    /// Drops every cache entry so the next reads go to the remote source
    pub async fn force_refresh(&self) -> Result<usize, CacheError> {
        self.invalidate(&InvalidationScope::Everything).await
    }

    /// Snapshot of what is cached, per category
    ///
    /// Every category is reported. With a language only that language's
    /// entries are considered. Store failures are logged and reported as
    /// absent entries.
    pub async fn cache_info(
        &self,
        language: Option<&Language>,
    ) -> BTreeMap<CacheCategory, EntryInfo> {
        let mut info: BTreeMap<CacheCategory, EntryInfo> = CacheCategory::ALL
            .into_iter()
            .map(|category| (category, EntryInfo::absent()))
            .collect();

        let keys = match self.store.all_keys().await {
            Ok(keys) => keys,
            Err(e) => {
                tracing::warn!(error = %e, "failed to list cache keys");
                return info;
            }
        };

        let mut newest: BTreeMap<CacheCategory, (DateTime<Utc>, usize)> = BTreeMap::new();
        for raw in keys.iter().filter(|k| k.ends_with(TIMESTAMP_SUFFIX)) {
            let Some(key) = CacheKey::parse(raw) else {
                continue;
            };
            if language.is_some_and(|lang| lang != key.language()) {
                continue;
            }

            let written_at = match self.store.get(raw).await {
                Ok(Some(value)) => codec::decode_timestamp(&value).ok(),
                Ok(None) => None,
                Err(e) => {
                    tracing::warn!(key = %raw, error = %e, "failed to read cache timestamp");
                    None
                }
            };
            let Some(written_at) = written_at else {
                continue;
            };

            let slot = newest
                .entry(key.category())
                .or_insert((written_at, 0));
            slot.0 = slot.0.max(written_at);
            slot.1 += 1;
        }

        let now = Utc::now();
        for (category, (written_at, entries)) in newest {
            let age = age_millis(written_at, now);
            info.insert(
                category,
                EntryInfo {
                    present: true,
                    age_hours: Some(age.max(0) / HOUR_MILLIS as i64),
                    is_valid: self.policy.max_age_for(category).admits(age),
                    entries,
                },
            );
        }

        info
    }
}

fn age_millis(written_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - written_at).num_milliseconds()
}
