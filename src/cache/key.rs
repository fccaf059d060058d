//! Cache key composition
//!
//! Every storage slot used by the cache is derived here from a
//! `(category, language, entity id)` triple. Keys have the canonical form
//! `<base>:<language>[:<entity>]` with a `<key>_timestamp` companion holding
//! the write time. Languages and entity ids are validated so that `:` and `_`
//! can only appear where this module puts them, which keeps distinct triples
//! from ever sharing a key.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Separator between key segments
const SEGMENT_DELIMITER: char = ':';

/// Suffix appended to a data key to form its timestamp key
pub const TIMESTAMP_SUFFIX: &str = "_timestamp";

/// Maximum accepted length of an entity id
const MAX_ENTITY_ID_LEN: usize = 64;

/// Errors raised when a key cannot be composed
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyError {
    /// Language code is not a valid short code
    #[error("Invalid language code: '{0}'")]
    InvalidLanguage(String),

    /// Entity id contains characters outside the allowed set or is too long
    #[error("Invalid entity id: '{0}' (allowed: letters, digits, '.', '-'; max 64 chars)")]
    InvalidEntityId(String),

    /// Category requires an entity id but none was given
    #[error("Cache category '{0}' requires an entity id")]
    MissingEntityId(CacheCategory),

    /// Category does not take an entity id but one was given
    #[error("Cache category '{0}' does not take an entity id")]
    UnexpectedEntityId(CacheCategory),
}

/// Kinds of data held in the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheCategory {
    Series,
    Sets,
    Cards,
    ExchangeRate,
}

/// How a category uses the entity-id segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntityRule {
    Forbidden,
    Optional,
    Required,
}

impl CacheCategory {
    /// All categories, in display order
    pub const ALL: [CacheCategory; 4] = [
        CacheCategory::Series,
        CacheCategory::Sets,
        CacheCategory::Cards,
        CacheCategory::ExchangeRate,
    ];

    /// Base storage key shared by every entry of this category
    pub fn base_key(self) -> &'static str {
        match self {
            CacheCategory::Series => "cached_series",
            CacheCategory::Sets => "cached_sets",
            CacheCategory::Cards => "cached_cards",
            CacheCategory::ExchangeRate => "cached_exchange_rate",
        }
    }

    /// Short name used in diagnostics output
    pub fn name(self) -> &'static str {
        match self {
            CacheCategory::Series => "series",
            CacheCategory::Sets => "sets",
            CacheCategory::Cards => "cards",
            CacheCategory::ExchangeRate => "exchange_rate",
        }
    }

    fn entity_rule(self) -> EntityRule {
        match self {
            CacheCategory::Series | CacheCategory::Sets => EntityRule::Forbidden,
            CacheCategory::Cards => EntityRule::Required,
            CacheCategory::ExchangeRate => EntityRule::Optional,
        }
    }

    /// Whether entries of this category must be scoped by an entity id
    pub fn requires_entity(self) -> bool {
        self.entity_rule() == EntityRule::Required
    }

    fn from_base_key(base: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.base_key() == base)
    }
}

impl fmt::Display for CacheCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A validated language code such as `pt`, `en` or `pt-br`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Language(String);

impl Language {
    /// Parses and normalizes (lower-cases) a language code
    pub fn parse(code: &str) -> Result<Self, KeyError> {
        let normalized = code.trim().to_ascii_lowercase();
        let mut parts = normalized.splitn(2, '-');
        let primary = parts.next().unwrap_or_default();
        let region = parts.next();

        let primary_ok = (2..=3).contains(&primary.len())
            && primary.chars().all(|c| c.is_ascii_lowercase());
        let region_ok = region
            .map(|r| (2..=4).contains(&r.len()) && r.chars().all(|c| c.is_ascii_lowercase()))
            .unwrap_or(true);

        if primary_ok && region_ok {
            Ok(Self(normalized))
        } else {
            Err(KeyError::InvalidLanguage(code.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Language {
    fn default() -> Self {
        Self("pt".to_string())
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Language {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Language {
    type Error = KeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Language> for String {
    fn from(language: Language) -> Self {
        language.0
    }
}

/// Checks that an entity id only uses characters that cannot be confused with
/// key delimiters
pub fn validate_entity_id(id: &str) -> Result<(), KeyError> {
    let valid = !id.is_empty()
        && id.len() <= MAX_ENTITY_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');

    if valid {
        Ok(())
    } else {
        Err(KeyError::InvalidEntityId(id.to_string()))
    }
}

/// Parameters scoping a cache entry within its category
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheScope {
    pub language: Language,
    pub entity_id: Option<String>,
}

impl CacheScope {
    /// Scope for an unscoped entry in the given language
    pub fn language(language: Language) -> Self {
        Self {
            language,
            entity_id: None,
        }
    }

    /// Scope for an entry tied to an entity (e.g. a set id)
    pub fn entity(language: Language, entity_id: impl Into<String>) -> Self {
        Self {
            language,
            entity_id: Some(entity_id.into()),
        }
    }
}

/// A composed, validated cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    category: CacheCategory,
    language: Language,
    entity_id: Option<String>,
    key: String,
}

impl CacheKey {
    /// Builds the key for `category` within `scope`
    pub fn new(category: CacheCategory, scope: &CacheScope) -> Result<Self, KeyError> {
        match (category.entity_rule(), &scope.entity_id) {
            (EntityRule::Required, None) => return Err(KeyError::MissingEntityId(category)),
            (EntityRule::Forbidden, Some(_)) => {
                return Err(KeyError::UnexpectedEntityId(category))
            }
            (_, Some(id)) => validate_entity_id(id)?,
            (_, None) => {}
        }

        let mut key = format!(
            "{}{}{}",
            category.base_key(),
            SEGMENT_DELIMITER,
            scope.language
        );
        if let Some(id) = &scope.entity_id {
            key.push(SEGMENT_DELIMITER);
            key.push_str(id);
        }

        Ok(Self {
            category,
            language: scope.language.clone(),
            entity_id: scope.entity_id.clone(),
            key,
        })
    }

    /// Parses a stored key (data or timestamp) back into its parts
    ///
    /// Returns `None` for keys outside the cache namespace, including the
    /// legacy unpartitioned base keys.
    pub fn parse(raw: &str) -> Option<Self> {
        let data_key = raw.strip_suffix(TIMESTAMP_SUFFIX).unwrap_or(raw);
        let mut segments = data_key.split(SEGMENT_DELIMITER);

        let category = CacheCategory::from_base_key(segments.next()?)?;
        let language = Language::parse(segments.next()?).ok()?;
        let entity_id = segments.next().map(str::to_string);
        if segments.next().is_some() {
            return None;
        }

        let scope = CacheScope {
            language,
            entity_id,
        };
        let key = Self::new(category, &scope).ok()?;
        // Reject non-canonical spellings such as upper-case languages
        (key.key == data_key).then_some(key)
    }

    pub fn category(&self) -> CacheCategory {
        self.category
    }

    pub fn language(&self) -> &Language {
        &self.language
    }

    pub fn entity_id(&self) -> Option<&str> {
        self.entity_id.as_deref()
    }

    /// Storage key holding the payload
    pub fn data_key(&self) -> &str {
        &self.key
    }

    /// Storage key holding the write timestamp
    pub fn timestamp_key(&self) -> String {
        timestamp_key_for(&self.key)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

/// Timestamp companion of an arbitrary data key
pub fn timestamp_key_for(key: &str) -> String {
    format!("{}{}", key, TIMESTAMP_SUFFIX)
}

/// Legacy unpartitioned keys for a category (`cached_series` and its
/// timestamp). Older stores wrote these before keys carried a language.
pub fn legacy_keys(category: CacheCategory) -> [String; 2] {
    [
        category.base_key().to_string(),
        timestamp_key_for(category.base_key()),
    ]
}
