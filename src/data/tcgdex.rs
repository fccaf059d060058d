//! TCGdex card-data API client
//!
//! This module fetches series, sets and cards from the TCGdex REST API
//! (`https://api.tcgdex.net/v2/{lang}/...`) and parses them into catalog
//! models.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;

use super::source::{CatalogSource, SourceError};
use super::{Card, CardSet, Series};
use crate::cache::Language;

/// Base URL for the TCGdex API
pub const TCGDEX_BASE_URL: &str = "https://api.tcgdex.net/v2";

/// Number of card detail requests kept in flight at once
const DETAIL_CONCURRENCY: usize = 8;

/// Client for fetching catalog data from the TCGdex API
#[derive(Debug, Clone)]
pub struct TcgdexClient {
    client: Client,
    base_url: String,
    card_details: bool,
}

impl Default for TcgdexClient {
    fn default() -> Self {
        Self::new()
    }
}

impl TcgdexClient {
    /// Create a new TcgdexClient with default settings
    pub fn new() -> Self {
        Self::with_client(Client::new(), TCGDEX_BASE_URL)
    }

    /// Create a new TcgdexClient with a custom HTTP client and base URL
    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            card_details: false,
        }
    }

    /// Create a new TcgdexClient against a custom base URL (mirrors, tests)
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    /// Create a new TcgdexClient whose requests time out after `timeout`
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self, SourceError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url))
    }

    /// Fetch full card records when listing a set instead of the briefs
    /// embedded in the set
    pub fn with_card_details(mut self, enabled: bool) -> Self {
        self.card_details = enabled;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, language: &Language, path: &str) -> String {
        format!("{}/{}/{}", self.base_url, language, path)
    }

    /// GET a path and parse the JSON body
    async fn fetch_json<T: DeserializeOwned>(
        &self,
        language: &Language,
        path: &str,
    ) -> Result<T, SourceError> {
        let url = self.url(language, path);
        tracing::debug!(%url, "requesting");

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        let text = response.text().await?;

        if status == StatusCode::NOT_FOUND {
            return Err(SourceError::NotFound(path.to_string()));
        }
        if !status.is_success() {
            return Err(SourceError::Status {
                status: status.as_u16(),
                message: text.chars().take(200).collect(),
            });
        }

        Ok(serde_json::from_str(&text)?)
    }

    /// Lists the cards of a set by filtering the full card index
    ///
    /// Used when a set record arrives without its card briefs.
    async fn cards_from_index(
        &self,
        set_id: &str,
        language: &Language,
    ) -> Result<Vec<Card>, SourceError> {
        let all: Vec<Card> = self.fetch_json(language, "cards").await?;
        let prefix = format!("{}-", set_id);
        Ok(all.into_iter().filter(|c| c.id.starts_with(&prefix)).collect())
    }

    /// Replaces card briefs with full records, keeping a brief when its
    /// detail request fails
    async fn with_details(&self, briefs: Vec<Card>, language: &Language) -> Vec<Card> {
        stream::iter(briefs)
            .map(|brief| async move {
                match self.get_card(&brief.id, language).await {
                    Ok(full) => full,
                    Err(e) => {
                        tracing::warn!(card = %brief.id, error = %e, "card details unavailable, using brief");
                        brief
                    }
                }
            })
            .buffered(DETAIL_CONCURRENCY)
            .collect()
            .await
    }
}

#[async_trait]
impl CatalogSource for TcgdexClient {
    async fn list_series(&self, language: &Language) -> Result<Vec<Series>, SourceError> {
        self.fetch_json(language, "series").await
    }

    async fn list_sets(&self, language: &Language) -> Result<Vec<CardSet>, SourceError> {
        self.fetch_json(language, "sets").await
    }

    async fn list_cards_in_set(
        &self,
        set_id: &str,
        language: &Language,
    ) -> Result<Vec<Card>, SourceError> {
        let set = self.get_set(set_id, language).await?;
        let briefs = if set.cards.is_empty() && set.has_cards() {
            self.cards_from_index(set_id, language).await?
        } else {
            set.cards
        };

        if self.card_details {
            Ok(self.with_details(briefs, language).await)
        } else {
            Ok(briefs)
        }
    }

    async fn get_card(&self, card_id: &str, language: &Language) -> Result<Card, SourceError> {
        self.fetch_json(language, &format!("cards/{}", card_id)).await
    }

    async fn get_set(&self, set_id: &str, language: &Language) -> Result<CardSet, SourceError> {
        self.fetch_json(language, &format!("sets/{}", set_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pt() -> Language {
        Language::parse("pt").unwrap()
    }

    const SET_SV01: &str = r#"{
        "id": "sv01",
        "name": "Escarlate e Violeta",
        "cardCount": {"total": 2, "official": 2},
        "releaseDate": "2023-03-31",
        "serie": {"id": "sv", "name": "Escarlate e Violeta"},
        "cards": [
            {"id": "sv01-001", "localId": "001", "name": "Pineco", "image": "https://assets.tcgdex.net/pt/sv/sv01/001"},
            {"id": "sv01-002", "localId": "002", "name": "Forretress ex"}
        ]
    }"#;

    #[test]
    fn test_new_uses_public_api() {
        assert_eq!(TcgdexClient::new().base_url(), TCGDEX_BASE_URL);
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let client = TcgdexClient::with_base_url("http://localhost:1234/v2/");
        assert_eq!(client.url(&pt(), "series"), "http://localhost:1234/v2/pt/series");
    }

    #[tokio::test]
    async fn test_list_series_parses_response() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/pt/series")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"[{"id": "sv", "name": "Escarlate e Violeta", "logo": "x"}, {"id": "swsh", "name": "Espada e Escudo"}]"#)
            .create_async()
            .await;

        let client = TcgdexClient::with_base_url(server.url());
        let series = client.list_series(&pt()).await.expect("Should list series");

        mock.assert_async().await;
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].id, "sv");
        assert_eq!(series[1].logo, None);
    }

    #[tokio::test]
    async fn test_list_sets_uses_language_path() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/en/sets")
            .with_status(200)
            .with_body(r#"[{"id": "sv01", "name": "Scarlet & Violet", "cardCount": {"total": 258, "official": 198}}]"#)
            .create_async()
            .await;

        let client = TcgdexClient::with_base_url(server.url());
        let sets = client
            .list_sets(&Language::parse("en").unwrap())
            .await
            .expect("Should list sets");

        mock.assert_async().await;
        assert_eq!(sets[0].name, "Scarlet & Violet");
        assert_eq!(sets[0].card_count.total, 258);
    }

    #[tokio::test]
    async fn test_list_cards_in_set_uses_embedded_briefs() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/pt/sets/sv01")
            .with_status(200)
            .with_body(SET_SV01)
            .create_async()
            .await;

        let client = TcgdexClient::with_base_url(server.url());
        let cards = client.list_cards_in_set("sv01", &pt()).await.unwrap();

        mock.assert_async().await;
        let ids: Vec<&str> = cards.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["sv01-001", "sv01-002"]);
    }

    #[tokio::test]
    async fn test_list_cards_falls_back_to_card_index() {
        let mut server = mockito::Server::new_async().await;
        let set_mock = server
            .mock("GET", "/pt/sets/sv02")
            .with_status(200)
            .with_body(r#"{"id": "sv02", "name": "Evoluções em Paldea", "cardCount": {"total": 279, "official": 193}}"#)
            .create_async()
            .await;
        let index_mock = server
            .mock("GET", "/pt/cards")
            .with_status(200)
            .with_body(
                r#"[
                    {"id": "sv02-001", "localId": "001", "name": "Tarountula"},
                    {"id": "sv020-001", "localId": "001", "name": "Other"},
                    {"id": "sv01-001", "localId": "001", "name": "Pineco"}
                ]"#,
            )
            .create_async()
            .await;

        let client = TcgdexClient::with_base_url(server.url());
        let cards = client.list_cards_in_set("sv02", &pt()).await.unwrap();

        set_mock.assert_async().await;
        index_mock.assert_async().await;
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].id, "sv02-001");
    }

    #[tokio::test]
    async fn test_card_details_replace_briefs_and_keep_failures() {
        let mut server = mockito::Server::new_async().await;
        let _set_mock = server
            .mock("GET", "/pt/sets/sv01")
            .with_status(200)
            .with_body(SET_SV01)
            .create_async()
            .await;
        let _first_card = server
            .mock("GET", "/pt/cards/sv01-001")
            .with_status(200)
            .with_body(r#"{"id": "sv01-001", "localId": "001", "name": "Pineco", "hp": 60, "rarity": "Common"}"#)
            .create_async()
            .await;
        let _second_card = server
            .mock("GET", "/pt/cards/sv01-002")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let client = TcgdexClient::with_base_url(server.url()).with_card_details(true);
        let cards = client.list_cards_in_set("sv01", &pt()).await.unwrap();

        assert_eq!(cards.len(), 2);
        assert_eq!(cards[0].hp, Some(60));
        assert_eq!(cards[1].name, "Forretress ex");
        assert_eq!(cards[1].hp, None);
    }

    #[tokio::test]
    async fn test_missing_card_is_not_found() {
        let mut server = mockito::Server::new_async().await;
        let _missing = server
            .mock("GET", "/pt/cards/zz-999")
            .with_status(404)
            .with_body(r#"{"error": "not found"}"#)
            .create_async()
            .await;

        let client = TcgdexClient::with_base_url(server.url());
        let result = client.get_card("zz-999", &pt()).await;

        assert!(matches!(result, Err(SourceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_server_error_maps_to_status() {
        let mut server = mockito::Server::new_async().await;
        let _unavailable = server
            .mock("GET", "/pt/series")
            .with_status(503)
            .with_body("maintenance")
            .create_async()
            .await;

        let client = TcgdexClient::with_base_url(server.url());
        match client.list_series(&pt()).await {
            Err(SourceError::Status { status, message }) => {
                assert_eq!(status, 503);
                assert_eq!(message, "maintenance");
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_body_is_parse_error() {
        let mut server = mockito::Server::new_async().await;
        let _broken = server
            .mock("GET", "/pt/sets")
            .with_status(200)
            .with_body("<html>")
            .create_async()
            .await;

        let client = TcgdexClient::with_base_url(server.url());
        let result = client.list_sets(&pt()).await;

        assert!(matches!(result, Err(SourceError::ParseError(_))));
    }
}
