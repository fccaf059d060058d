//! Core data models for the card catalog
//!
//! This module contains the catalog entities returned by the remote card-data
//! API (series, sets and cards) and the remote source seams used by the data
//! service.

pub mod source;
pub mod tcgdex;

pub use source::{CatalogSource, ExchangeRateSource, SourceError};
pub use tcgdex::{TcgdexClient, TCGDEX_BASE_URL};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::Language;

/// Host serving card artwork
const ASSETS_BASE_URL: &str = "https://assets.tcgdex.net";

/// A top-level grouping of expansions (e.g. Scarlet & Violet)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Series {
    /// Unique identifier (e.g. "sv")
    pub id: String,
    /// Localized display name
    pub name: String,
    /// Logo URL, if the API provides one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
}

/// Short reference to a series embedded in a set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesRef {
    pub id: String,
    pub name: String,
}

/// Number of cards in a set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardCount {
    /// All cards including secret rares
    #[serde(default)]
    pub total: u32,
    /// Cards in the official numbering
    #[serde(default)]
    pub official: u32,
}

/// A released expansion belonging to a series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardSet {
    /// Unique identifier (e.g. "sv01")
    pub id: String,
    /// Localized display name
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(default)]
    pub card_count: CardCount,
    /// Release date, present on full set records
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_date: Option<NaiveDate>,
    /// Owning series, present on full set records
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serie: Option<SeriesRef>,
    /// Card briefs, present on full set records
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cards: Vec<Card>,
}

impl CardSet {
    /// Whether this set has any cards available in the current language
    pub fn has_cards(&self) -> bool {
        self.card_count.total > 0
    }

    /// Whether this set belongs to the given series
    ///
    /// Uses the embedded series reference when present and falls back to
    /// the id prefix convention (`sv01` belongs to `sv`).
    pub fn belongs_to(&self, series_id: &str) -> bool {
        match &self.serie {
            Some(serie) => serie.id == series_id,
            None => self.id.starts_with(series_id),
        }
    }
}

/// Short reference to a set embedded in a card
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetRef {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_count: Option<CardCount>,
}

/// A single card, identified by `<setId>-<localId>`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: String,
    /// Number within its set (e.g. "001", "TG05")
    pub local_id: String,
    pub name: String,
    /// Artwork base URL without quality/extension
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rarity: Option<String>,
    /// Pokemon, Trainer or Energy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hp: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub types: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub illustrator: Option<String>,
    /// National Pokedex numbers
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dex_id: Vec<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set: Option<SetRef>,
}

/// Artwork resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageQuality {
    High,
    Low,
}

impl ImageQuality {
    pub fn as_str(self) -> &'static str {
        match self {
            ImageQuality::High => "high",
            ImageQuality::Low => "low",
        }
    }
}

impl Card {
    /// Id of the set this card belongs to
    pub fn set_id(&self) -> &str {
        if let Some(set) = &self.set {
            return &set.id;
        }
        self.id
            .rsplit_once('-')
            .map(|(set_id, _)| set_id)
            .unwrap_or(&self.id)
    }

    /// Case-insensitive name match
    pub fn name_matches(&self, query: &str) -> bool {
        self.name.to_lowercase().contains(&query.to_lowercase())
    }

    /// URL of the card artwork at the given quality
    ///
    /// Uses the `image` base from the API when present. Otherwise the URL is
    /// built from the assets host, assuming the series id is the alphabetic
    /// prefix of the set id.
    pub fn image_url(&self, quality: ImageQuality, language: &Language) -> String {
        let file = format!("{}.webp", quality.as_str());

        if let Some(image) = &self.image {
            let has_quality = ["high", "low", "medium"]
                .iter()
                .any(|q| image.ends_with(&format!("/{}.webp", q)));
            if has_quality {
                return image.clone();
            }
            return format!("{}/{}", image.trim_end_matches('/'), file);
        }

        let set_id = self.set_id();
        let series_id: String = set_id
            .chars()
            .take_while(|c| c.is_ascii_alphabetic())
            .collect();
        format!(
            "{}/{}/{}/{}/{}/{}",
            ASSETS_BASE_URL, language, series_id, set_id, self.local_id, file
        )
    }
}

/// Currency exchange rate used for price display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRate {
    /// Currency pair such as "USD-BRL"
    pub pair: String,
    /// Units of the quote currency per unit of the base currency
    pub rate: f64,
    /// When this rate was fetched
    pub fetched_at: DateTime<Utc>,
}

/// Keeps sets that have cards, newest release first (undated sets last)
pub fn available_sets(sets: Vec<CardSet>) -> Vec<CardSet> {
    let mut available: Vec<CardSet> = sets.into_iter().filter(CardSet::has_cards).collect();
    available.sort_by(|a, b| b.release_date.cmp(&a.release_date));
    available
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pt() -> Language {
        Language::parse("pt").unwrap()
    }

    fn card(id: &str, local_id: &str, name: &str) -> Card {
        Card {
            id: id.to_string(),
            local_id: local_id.to_string(),
            name: name.to_string(),
            image: None,
            rarity: None,
            category: None,
            hp: None,
            types: Vec::new(),
            stage: None,
            suffix: None,
            illustrator: None,
            dex_id: Vec::new(),
            set: None,
        }
    }

    fn set(id: &str, total: u32, release: Option<(i32, u32, u32)>) -> CardSet {
        CardSet {
            id: id.to_string(),
            name: id.to_uppercase(),
            logo: None,
            symbol: None,
            card_count: CardCount { total, official: total },
            release_date: release.and_then(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d)),
            serie: None,
            cards: Vec::new(),
        }
    }

    #[test]
    fn test_set_deserializes_from_api_shape() {
        let json = r#"{
            "id": "sv01",
            "name": "Escarlate e Violeta",
            "logo": "https://assets.tcgdex.net/pt/sv/sv01/logo",
            "cardCount": {"total": 258, "official": 198, "reverse": 0},
            "releaseDate": "2023-03-31",
            "serie": {"id": "sv", "name": "Escarlate e Violeta"},
            "legal": {"standard": true}
        }"#;

        let set: CardSet = serde_json::from_str(json).expect("Failed to deserialize set");

        assert_eq!(set.id, "sv01");
        assert_eq!(set.card_count.total, 258);
        assert_eq!(set.release_date, NaiveDate::from_ymd_opt(2023, 3, 31));
        assert_eq!(set.serie.as_ref().map(|s| s.id.as_str()), Some("sv"));
        assert!(set.cards.is_empty());
    }

    #[test]
    fn test_set_brief_without_card_count_has_no_cards() {
        let set: CardSet = serde_json::from_str(r#"{"id": "xy0", "name": "Kalos"}"#).unwrap();
        assert!(!set.has_cards());
    }

    #[test]
    fn test_card_deserializes_full_record() {
        let json = r#"{
            "id": "sv01-001",
            "localId": "001",
            "name": "Pineco",
            "image": "https://assets.tcgdex.net/pt/sv/sv01/001",
            "category": "Pokemon",
            "hp": 60,
            "types": ["Grass"],
            "stage": "Basic",
            "illustrator": "Amelicart",
            "dexId": [204],
            "rarity": "Common",
            "set": {"id": "sv01", "name": "Escarlate e Violeta", "cardCount": {"total": 258, "official": 198}}
        }"#;

        let card: Card = serde_json::from_str(json).expect("Failed to deserialize card");

        assert_eq!(card.local_id, "001");
        assert_eq!(card.hp, Some(60));
        assert_eq!(card.types, vec!["Grass".to_string()]);
        assert_eq!(card.dex_id, vec![204]);
        assert_eq!(card.set_id(), "sv01");
    }

    #[test]
    fn test_set_id_falls_back_to_card_id_prefix() {
        assert_eq!(card("sv03.5-025", "025", "Pikachu").set_id(), "sv03.5");
        assert_eq!(card("orphan", "1", "X").set_id(), "orphan");
    }

    #[test]
    fn test_name_matches_is_case_insensitive() {
        let pikachu = card("sv01-062", "062", "Pikachu ex");
        assert!(pikachu.name_matches("PIKA"));
        assert!(pikachu.name_matches(""));
        assert!(!pikachu.name_matches("raichu"));
    }

    #[test]
    fn test_image_url_appends_quality_to_api_base() {
        let mut c = card("sv01-001", "001", "Pineco");
        c.image = Some("https://assets.tcgdex.net/pt/sv/sv01/001".to_string());
        assert_eq!(
            c.image_url(ImageQuality::High, &pt()),
            "https://assets.tcgdex.net/pt/sv/sv01/001/high.webp"
        );

        c.image = Some("https://assets.tcgdex.net/pt/sv/sv01/001/".to_string());
        assert_eq!(
            c.image_url(ImageQuality::Low, &pt()),
            "https://assets.tcgdex.net/pt/sv/sv01/001/low.webp"
        );
    }

    #[test]
    fn test_image_url_keeps_complete_url() {
        let mut c = card("sv01-001", "001", "Pineco");
        c.image = Some("https://assets.tcgdex.net/pt/sv/sv01/001/medium.webp".to_string());
        assert_eq!(
            c.image_url(ImageQuality::High, &pt()),
            "https://assets.tcgdex.net/pt/sv/sv01/001/medium.webp"
        );
    }

    #[test]
    fn test_image_url_built_without_api_base() {
        let c = card("swsh3-136", "136", "Charizard");
        let en = Language::parse("en").unwrap();
        assert_eq!(
            c.image_url(ImageQuality::High, &en),
            "https://assets.tcgdex.net/en/swsh/swsh3/136/high.webp"
        );
    }

    #[test]
    fn test_available_sets_filters_and_sorts() {
        let sets = vec![
            set("sv01", 258, Some((2023, 3, 31))),
            set("sv00", 0, Some((2023, 1, 1))),
            set("svp", 100, None),
            set("sv02", 279, Some((2023, 6, 9))),
        ];

        let ids: Vec<String> = available_sets(sets).into_iter().map(|s| s.id).collect();

        assert_eq!(ids, vec!["sv02", "sv01", "svp"]);
    }

    #[test]
    fn test_belongs_to_prefers_series_reference() {
        let mut s = set("mep", 10, None);
        assert!(!s.belongs_to("me01"));
        s.serie = Some(SeriesRef {
            id: "me".to_string(),
            name: "Mega Evolution".to_string(),
        });
        assert!(s.belongs_to("me"));
        assert!(set("sv01", 1, None).belongs_to("sv"));
    }
}
