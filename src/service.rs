//! Read-through data service
//!
//! Every catalog read goes through the cache first. On a miss (or an expired
//! entry) the remote source is called and its result written back before it
//! is returned. Concurrent reads of the same entry share one remote fetch.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::cache::key::validate_entity_id;
use crate::cache::{
    CacheCategory, CacheError, CacheKey, CacheManager, CacheScope, CachedData, InvalidationScope,
    KeyError, Language, Lookup,
};
use crate::data::{self, Card, CardSet, CatalogSource, ExchangeRate, ExchangeRateSource, Series, SourceError};
use crate::settings::{Preferences, SettingsError};

/// Errors surfaced to callers of the data service
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Remote source failed and no usable cached data was available
    #[error("Failed to fetch from remote source: {0}")]
    Remote(#[from] SourceError),

    /// Request parameters do not form a valid cache key
    #[error("Invalid request: {0}")]
    Key(#[from] KeyError),

    /// Preferences could not be read or written
    #[error(transparent)]
    Settings(#[from] SettingsError),

    /// Cache maintenance operation failed
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Exchange rates were requested but no rate source is configured
    #[error("No exchange rate source configured")]
    NoRateSource,
}

/// Behavior switches for the data service
#[derive(Debug, Clone, Default)]
pub struct ServiceConfig {
    /// Serve an expired cache entry when the remote fetch fails
    pub serve_stale_on_fetch_error: bool,
}

/// Catalog access combining the cache with the remote source
pub struct DataService {
    cache: CacheManager,
    source: Arc<dyn CatalogSource>,
    rates: Option<Arc<dyn ExchangeRateSource>>,
    preferences: Preferences,
    config: ServiceConfig,
    /// One gate per cache key with a fetch in progress
    in_flight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl DataService {
    pub fn new(
        cache: CacheManager,
        source: Arc<dyn CatalogSource>,
        preferences: Preferences,
        config: ServiceConfig,
    ) -> Self {
        Self {
            cache,
            source,
            rates: None,
            preferences,
            config,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Adds a source for exchange rates
    pub fn with_rate_source(mut self, rates: Arc<dyn ExchangeRateSource>) -> Self {
        self.rates = Some(rates);
        self
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    pub fn preferences(&self) -> &Preferences {
        &self.preferences
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// All series available in `language`
    pub async fn series(&self, language: &Language) -> Result<Vec<Series>, ServiceError> {
        self.read_through(CacheCategory::Series, CacheScope::language(language.clone()), || {
            self.source.list_series(language)
        })
        .await
    }

    /// All sets available in `language`, as returned by the source
    pub async fn sets(&self, language: &Language) -> Result<Vec<CardSet>, ServiceError> {
        self.read_through(CacheCategory::Sets, CacheScope::language(language.clone()), || {
            self.source.list_sets(language)
        })
        .await
    }

    /// Cards of one set
    pub async fn cards_in_set(
        &self,
        set_id: &str,
        language: &Language,
    ) -> Result<Vec<Card>, ServiceError> {
        self.read_through(
            CacheCategory::Cards,
            CacheScope::entity(language.clone(), set_id),
            || self.source.list_cards_in_set(set_id, language),
        )
        .await
    }

    /// Exchange rate for a currency pair such as "USD-BRL"
    pub async fn exchange_rate(
        &self,
        pair: &str,
        language: &Language,
    ) -> Result<ExchangeRate, ServiceError> {
        let rates = self.rates.as_ref().ok_or(ServiceError::NoRateSource)?;
        self.read_through(
            CacheCategory::ExchangeRate,
            CacheScope::entity(language.clone(), pair),
            || rates.fetch_rate(pair),
        )
        .await
    }

    /// One card with full details (not cached)
    pub async fn card(&self, card_id: &str, language: &Language) -> Result<Card, ServiceError> {
        validate_entity_id(card_id)?;
        Ok(self.source.get_card(card_id, language).await?)
    }

    /// One set with its card briefs (not cached)
    pub async fn set(&self, set_id: &str, language: &Language) -> Result<CardSet, ServiceError> {
        validate_entity_id(set_id)?;
        Ok(self.source.get_set(set_id, language).await?)
    }

    /// Sets with cards, newest first
    pub async fn available_sets(&self, language: &Language) -> Result<Vec<CardSet>, ServiceError> {
        Ok(data::available_sets(self.sets(language).await?))
    }

    /// Available sets belonging to one series
    pub async fn sets_in_series(
        &self,
        series_id: &str,
        language: &Language,
    ) -> Result<Vec<CardSet>, ServiceError> {
        let sets = self.available_sets(language).await?;
        Ok(sets.into_iter().filter(|s| s.belongs_to(series_id)).collect())
    }

    /// Series chosen by the user for `language`
    pub async fn selected_series(&self, language: &Language) -> Result<Vec<Series>, ServiceError> {
        let selected = self.preferences.selected_series(language).await?;
        let series = self.series(language).await?;
        Ok(series
            .into_iter()
            .filter(|s| selected.contains(&s.id))
            .collect())
    }

    /// Available sets chosen by the user for `language`; all of them when
    /// nothing is selected
    pub async fn selected_sets(&self, language: &Language) -> Result<Vec<CardSet>, ServiceError> {
        let sets = self.available_sets(language).await?;
        match self.preferences.selected_expansions(language).await? {
            Some(selected) => Ok(sets
                .into_iter()
                .filter(|s| selected.contains(&s.id))
                .collect()),
            None => Ok(sets),
        }
    }

    /// Cards of a set whose name contains `query` (case-insensitive)
    pub async fn search_cards(
        &self,
        set_id: &str,
        query: &str,
        language: &Language,
    ) -> Result<Vec<Card>, ServiceError> {
        let cards = self.cards_in_set(set_id, language).await?;
        Ok(cards.into_iter().filter(|c| c.name_matches(query)).collect())
    }

    /// Active language from preferences
    pub async fn active_language(&self) -> Result<Language, ServiceError> {
        Ok(self.preferences.language().await?)
    }

    /// Makes `language` the active language
    ///
    /// When the language changes, entries cached under the previous language
    /// are dropped. A failed invalidation is logged and does not fail the
    /// switch. Returns the previous language.
    pub async fn switch_language(&self, language: &Language) -> Result<Language, ServiceError> {
        let previous = self.preferences.language().await?;
        self.preferences.set_language(language).await?;

        if &previous != language {
            tracing::info!(from = %previous, to = %language, "language changed");
            // Errors are already logged by the cache manager
            let _ = self
                .cache
                .invalidate(&InvalidationScope::Language(previous.clone()))
                .await;
        }
        Ok(previous)
    }

    /// Cache-first read with remote fallback and write-back
    async fn read_through<T, F, Fut>(
        &self,
        category: CacheCategory,
        scope: CacheScope,
        fetch: F,
    ) -> Result<T, ServiceError>
    where
        T: Serialize + DeserializeOwned + Send,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, SourceError>>,
    {
        let key = CacheKey::new(category, &scope)?;

        if let Lookup::Fresh(cached) = self.cache.lookup_key::<T>(&key).await {
            tracing::debug!(key = %key, "cache hit");
            return Ok(cached.data);
        }

        let gate = self.gate(&key).await;
        let result = {
            let _guard = gate.lock().await;
            self.fetch_and_store(&key, &scope, fetch).await
        };
        self.release(&key, gate).await;
        result
    }

    async fn fetch_and_store<T, F, Fut>(
        &self,
        key: &CacheKey,
        scope: &CacheScope,
        fetch: F,
    ) -> Result<T, ServiceError>
    where
        T: Serialize + DeserializeOwned + Send,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, SourceError>>,
    {
        // Another caller may have filled the entry while we waited for the gate
        let stale: Option<CachedData<T>> = match self.cache.lookup_key::<T>(key).await {
            Lookup::Fresh(cached) => {
                tracing::debug!(key = %key, "cache filled by concurrent fetch");
                return Ok(cached.data);
            }
            Lookup::Stale(cached) => Some(cached),
            Lookup::Miss => None,
            Lookup::Failed(e) => {
                tracing::warn!(key = %key, error = %e, "cache read failed, fetching remote");
                None
            }
        };

        tracing::debug!(key = %key, stale = stale.is_some(), "fetching from remote source");
        match fetch().await {
            Ok(data) => {
                // Write failures are logged by the cache manager; the caller
                // still gets the fresh data
                let _ = self.cache.set_cached(key.category(), scope, &data).await;
                Ok(data)
            }
            Err(e) => match stale {
                Some(cached) if self.config.serve_stale_on_fetch_error => {
                    tracing::warn!(
                        key = %key,
                        error = %e,
                        cached_at = %cached.cached_at,
                        "remote fetch failed, serving expired cache entry"
                    );
                    Ok(cached.data)
                }
                _ => {
                    tracing::error!(key = %key, error = %e, "remote fetch failed");
                    Err(e.into())
                }
            },
        }
    }

    async fn gate(&self, key: &CacheKey) -> Arc<Mutex<()>> {
        let mut in_flight = self.in_flight.lock().await;
        in_flight
            .entry(key.data_key().to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn release(&self, key: &CacheKey, gate: Arc<Mutex<()>>) {
        let mut in_flight = self.in_flight.lock().await;
        // The map and this caller hold the only references: nobody is waiting
        if Arc::strong_count(&gate) <= 2 {
            in_flight.remove(key.data_key());
        }
    }
}
