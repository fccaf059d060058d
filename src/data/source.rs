//! Remote data-source seams
//!
//! The data service only talks to remote data through these traits, so the
//! HTTP client can be swapped for a fake in tests.

use async_trait::async_trait;
use thiserror::Error;

use super::{Card, CardSet, ExchangeRate, Series};
use crate::cache::Language;

/// Errors that can occur when fetching remote data
#[derive(Debug, Error)]
pub enum SourceError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// Failed to parse JSON response
    #[error("Failed to parse JSON response: {0}")]
    ParseError(#[from] serde_json::Error),

    /// API answered with a non-success status
    #[error("API error (HTTP {status}): {message}")]
    Status { status: u16, message: String },

    /// Requested entity does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Source cannot serve requests at all
    #[error("Source unavailable: {0}")]
    Unavailable(String),
}

/// Remote catalog of series, sets and cards
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Lists every series available in `language`
    async fn list_series(&self, language: &Language) -> Result<Vec<Series>, SourceError>;

    /// Lists every set available in `language`
    async fn list_sets(&self, language: &Language) -> Result<Vec<CardSet>, SourceError>;

    /// Lists the cards of one set
    async fn list_cards_in_set(
        &self,
        set_id: &str,
        language: &Language,
    ) -> Result<Vec<Card>, SourceError>;

    /// Fetches one card with all its details
    async fn get_card(&self, card_id: &str, language: &Language) -> Result<Card, SourceError>;

    /// Fetches one set with its card briefs
    async fn get_set(&self, set_id: &str, language: &Language) -> Result<CardSet, SourceError>;
}

/// Remote provider of currency exchange rates
#[async_trait]
pub trait ExchangeRateSource: Send + Sync {
    /// Fetches the current rate for a currency pair such as "USD-BRL"
    async fn fetch_rate(&self, pair: &str) -> Result<ExchangeRate, SourceError>;
}
