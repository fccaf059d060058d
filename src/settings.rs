//! Persisted user preferences
//!
//! The active language and the per-language series/expansion selections live
//! in the same key-value store as the cache, outside the `cached_` namespace,
//! so cache invalidation never touches them.

use std::sync::Arc;

use thiserror::Error;

use crate::cache::key::validate_entity_id;
use crate::cache::{KeyError, KeyValueStore, Language, StoreError};

/// Store key holding the active language
const LANGUAGE_KEY: &str = "language";

/// Series selected when the user has not chosen any
pub const DEFAULT_SERIES: &[&str] = &["sv"];

/// Errors raised while reading or writing preferences
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Underlying store failed
    #[error("Settings storage error: {0}")]
    Store(#[from] StoreError),

    /// Stored selection could not be (de)serialized
    #[error("Settings serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Language or id is not valid
    #[error(transparent)]
    Key(#[from] KeyError),
}

fn series_key(language: &Language) -> String {
    format!("selectedSeries_{}", language)
}

fn expansions_key(language: &Language) -> String {
    format!("selectedExpansions_{}", language)
}

/// Reads and writes user preferences
#[derive(Clone)]
pub struct Preferences {
    store: Arc<dyn KeyValueStore>,
}

impl Preferences {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Active language, or the default when none (or an invalid one) is stored
    pub async fn language(&self) -> Result<Language, SettingsError> {
        match self.store.get(LANGUAGE_KEY).await? {
            Some(code) => Ok(Language::parse(&code).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "ignoring stored language");
                Language::default()
            })),
            None => Ok(Language::default()),
        }
    }

    pub async fn set_language(&self, language: &Language) -> Result<(), SettingsError> {
        self.store.set(LANGUAGE_KEY, language.as_str()).await?;
        Ok(())
    }

    /// Series ids selected for `language` (defaults to [`DEFAULT_SERIES`])
    pub async fn selected_series(&self, language: &Language) -> Result<Vec<String>, SettingsError> {
        match self.read_ids(&series_key(language)).await? {
            Some(ids) => Ok(ids),
            None => Ok(DEFAULT_SERIES.iter().map(|s| s.to_string()).collect()),
        }
    }

    /// Replaces the series selection for `language`
    ///
    /// Selected expansions that no longer belong to a selected series are
    /// dropped from the expansion selection.
    pub async fn set_selected_series(
        &self,
        language: &Language,
        series_ids: &[String],
    ) -> Result<(), SettingsError> {
        self.write_ids(&series_key(language), series_ids).await?;

        if let Some(expansions) = self.selected_expansions(language).await? {
            let kept: Vec<String> = expansions
                .into_iter()
                .filter(|set_id| series_ids.iter().any(|s| set_id.starts_with(s.as_str())))
                .collect();
            self.write_ids(&expansions_key(language), &kept).await?;
        }
        Ok(())
    }

    /// Expansion ids selected for `language`; `None` means "all expansions"
    pub async fn selected_expansions(
        &self,
        language: &Language,
    ) -> Result<Option<Vec<String>>, SettingsError> {
        self.read_ids(&expansions_key(language)).await
    }

    pub async fn set_selected_expansions(
        &self,
        language: &Language,
        set_ids: &[String],
    ) -> Result<(), SettingsError> {
        self.write_ids(&expansions_key(language), set_ids).await
    }

    /// Forgets the expansion selection so every expansion is shown
    pub async fn clear_selected_expansions(&self, language: &Language) -> Result<(), SettingsError> {
        self.store.remove(&expansions_key(language)).await?;
        Ok(())
    }

    async fn read_ids(&self, key: &str) -> Result<Option<Vec<String>>, SettingsError> {
        match self.store.get(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn write_ids(&self, key: &str, ids: &[String]) -> Result<(), SettingsError> {
        for id in ids {
            validate_entity_id(id)?;
        }
        let raw = serde_json::to_string(ids)?;
        self.store.set(key, &raw).await?;
        Ok(())
    }
}
