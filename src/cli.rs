//! Command-line interface parsing for cardex
//!
//! This module parses CLI arguments with clap and turns the global flags into
//! a [`Config`] used to assemble the store, cache, remote client and service.

use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser, Subcommand};
use thiserror::Error;

use crate::cache::{CacheCategory, FreshnessPolicy, KeyError, Language, MaxAge};
use crate::data::TCGDEX_BASE_URL;
use crate::service::ServiceConfig;

/// Default HTTP timeout for remote requests
pub const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// Error types for CLI argument handling
#[derive(Debug, Error)]
pub enum CliError {
    /// The --lang value is not a language code
    #[error("Invalid language: {0}")]
    InvalidLanguage(#[from] KeyError),

    /// The --timeout value is zero
    #[error("Invalid timeout: must be at least one second")]
    InvalidTimeout,

    /// A --*-ttl-hours value is too large to represent
    #[error("Invalid {0} TTL: {1} hours is too large")]
    InvalidTtl(CacheCategory, u64),

    /// Unknown cache category name
    #[error("Invalid category: '{0}'. Valid categories: series, sets, cards, exchange_rate")]
    InvalidCategory(String),
}

#[derive(Parser, Debug)]
#[command(name = "cardex")]
#[command(about = "Browse trading-card series, sets and cards with a local cache")]
#[command(version)]
pub struct Cli {
    /// Language for catalog data (defaults to the saved language, then "pt")
    #[arg(long, global = true, value_name = "CODE")]
    pub lang: Option<String>,

    /// Directory holding the cache file (defaults to the platform cache dir)
    #[arg(long, global = true, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Keep the cache in memory only for this run
    #[arg(long, global = true)]
    pub no_persist: bool,

    /// Serve expired cached data when the remote API is unreachable
    #[arg(long, global = true)]
    pub serve_stale: bool,

    /// Base URL of the TCGdex API
    #[arg(long, global = true, value_name = "URL")]
    pub api_url: Option<String>,

    /// HTTP timeout in seconds
    #[arg(long, global = true, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Fetch full card records when listing a set
    #[arg(long, global = true)]
    pub card_details: bool,

    /// Maximum age of cached series, in hours
    #[arg(long, global = true, value_name = "HOURS")]
    pub series_ttl_hours: Option<u64>,

    /// Maximum age of cached set lists, in hours
    #[arg(long, global = true, value_name = "HOURS")]
    pub sets_ttl_hours: Option<u64>,

    /// Maximum age of cached card lists, in hours
    #[arg(long, global = true, value_name = "HOURS")]
    pub cards_ttl_hours: Option<u64>,

    /// Maximum age of cached exchange rates, in hours
    #[arg(long, global = true, value_name = "HOURS")]
    pub rate_ttl_hours: Option<u64>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List series (only the selected ones unless --all)
    Series {
        #[arg(long)]
        all: bool,
    },

    /// List sets with cards, newest first
    Sets {
        /// Only sets of this series
        #[arg(long, value_name = "ID")]
        series: Option<String>,

        /// Ignore the saved expansion selection
        #[arg(long)]
        all: bool,
    },

    /// List the cards of a set
    Cards {
        set_id: String,

        /// Only cards whose name contains TEXT
        #[arg(long, value_name = "TEXT")]
        search: Option<String>,
    },

    /// Show one card
    Card { card_id: String },

    /// Show or change the active language
    Language { code: Option<String> },

    /// Save the series selection for the active language
    SelectSeries {
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Save the expansion selection for the active language (no ids: all)
    SelectSets { ids: Vec<String> },

    /// Inspect or manage the local cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum CacheAction {
    /// Show what is cached and how old it is
    Info,

    /// Remove cached entries
    Clear {
        /// Only this category (series, sets, cards, exchange_rate)
        #[arg(long, value_name = "CATEGORY")]
        category: Option<String>,

        /// Only entries of the active language
        #[arg(long, conflicts_with = "category")]
        language_only: bool,
    },

    /// Drop everything and re-fetch series and sets
    Refresh,
}

/// Runtime configuration derived from CLI arguments
#[derive(Debug, Clone)]
pub struct Config {
    /// Language forced by --lang; `None` uses the saved preference
    pub language: Option<Language>,
    pub cache_dir: Option<PathBuf>,
    pub persist: bool,
    pub api_url: String,
    pub timeout: Duration,
    pub card_details: bool,
    pub policy: FreshnessPolicy,
    pub service: ServiceConfig,
    pub json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            language: None,
            cache_dir: None,
            persist: true,
            api_url: TCGDEX_BASE_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            card_details: false,
            policy: FreshnessPolicy::default(),
            service: ServiceConfig::default(),
            json: false,
        }
    }
}

impl Config {
    /// Creates a Config from parsed CLI arguments.
    ///
    /// # Returns
    /// * `Ok(Config)` with defaults filled in
    /// * `Err(CliError)` if the language, timeout or a TTL is invalid
    pub fn from_cli(cli: &Cli) -> Result<Self, CliError> {
        let mut config = Config::default();

        if let Some(code) = &cli.lang {
            config.language = Some(Language::parse(code)?);
        }
        if let Some(secs) = cli.timeout {
            if secs == 0 {
                return Err(CliError::InvalidTimeout);
            }
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(url) = &cli.api_url {
            config.api_url = url.clone();
        }

        let overrides = [
            (CacheCategory::Series, cli.series_ttl_hours),
            (CacheCategory::Sets, cli.sets_ttl_hours),
            (CacheCategory::Cards, cli.cards_ttl_hours),
            (CacheCategory::ExchangeRate, cli.rate_ttl_hours),
        ];
        for (category, hours) in overrides {
            if let Some(hours) = hours {
                let max_age = MaxAge::checked_hours(hours)
                    .ok_or(CliError::InvalidTtl(category, hours))?;
                config.policy = config.policy.with_max_age(category, max_age);
            }
        }

        config.cache_dir = cli.cache_dir.clone();
        config.persist = !cli.no_persist;
        config.card_details = cli.card_details;
        config.service.serve_stale_on_fetch_error = cli.serve_stale;
        config.json = cli.json;
        Ok(config)
    }
}

/// Parses a cache category name as printed by `cache info`
pub fn parse_category_arg(s: &str) -> Result<CacheCategory, CliError> {
    let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
    CacheCategory::ALL
        .into_iter()
        .find(|c| c.name() == wanted)
        .ok_or_else(|| CliError::InvalidCategory(s.to_string()))
}

/// Default log filter for a -v count, used when RUST_LOG is unset
pub fn log_filter(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "cardex=info",
        2 => "cardex=debug",
        _ => "trace",
    }
}
