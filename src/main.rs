//! cardex - browse trading-card catalogs from the terminal
//!
//! Lists series, sets and cards from the TCGdex API in the user's language.
//! Responses are cached locally so repeated lookups work without the network.

use std::error::Error;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use serde::Serialize;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cardex::cache::{
    CacheCategory, CacheManager, EntryInfo, FileStore, InvalidationScope, KeyValueStore, Language,
    MemoryStore,
};
use cardex::cli::{self, CacheAction, Cli, Command, Config};
use cardex::data::{Card, CardSet, ImageQuality, Series, TcgdexClient};
use cardex::service::DataService;
use cardex::settings::Preferences;

/// Sets up stderr logging; RUST_LOG wins over -v
fn init_logging(verbose: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli::log_filter(verbose)));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}

/// Opens the persistent store, falling back to memory when no cache
/// directory is available
fn open_store(config: &Config) -> Arc<dyn KeyValueStore> {
    if !config.persist {
        return Arc::new(MemoryStore::new());
    }
    let store = match &config.cache_dir {
        Some(dir) => Some(FileStore::in_dir(dir)),
        None => FileStore::new(),
    };
    match store {
        Some(store) => {
            tracing::debug!(path = %store.path().display(), "using cache file");
            Arc::new(store)
        }
        None => {
            tracing::warn!("no cache directory available, cache will not persist");
            Arc::new(MemoryStore::new())
        }
    }
}

fn build_service(config: &Config) -> Result<DataService, Box<dyn Error>> {
    let store = open_store(config);
    let client = TcgdexClient::with_timeout(&config.api_url, config.timeout)?
        .with_card_details(config.card_details);

    Ok(DataService::new(
        CacheManager::with_policy(store.clone(), config.policy.clone()),
        Arc::new(client),
        Preferences::new(store),
        config.service.clone(),
    ))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), Box<dyn Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_series(series: &[Series]) {
    if series.is_empty() {
        println!("No series found.");
    }
    for s in series {
        println!("{:<10} {}", s.id, s.name);
    }
}

fn print_sets(sets: &[CardSet]) {
    if sets.is_empty() {
        println!("No sets found.");
    }
    for set in sets {
        let released = set
            .release_date
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<10} {:<40} {:>4} cards  {}",
            set.id, set.name, set.card_count.total, released
        );
    }
}

fn print_cards(cards: &[Card]) {
    if cards.is_empty() {
        println!("No cards found.");
    }
    for card in cards {
        println!(
            "{:<14} {:<30} {}",
            card.id,
            card.name,
            card.rarity.as_deref().unwrap_or("")
        );
    }
}

fn print_card(card: &Card, language: &Language) {
    println!("{} ({})", card.name, card.id);
    println!("  Set:         {}", card.set_id());
    if let Some(category) = &card.category {
        println!("  Category:    {}", category);
    }
    if let Some(rarity) = &card.rarity {
        println!("  Rarity:      {}", rarity);
    }
    if let Some(hp) = card.hp {
        println!("  HP:          {}", hp);
    }
    if !card.types.is_empty() {
        println!("  Types:       {}", card.types.join(", "));
    }
    if let Some(illustrator) = &card.illustrator {
        println!("  Illustrator: {}", illustrator);
    }
    println!("  Image:       {}", card.image_url(ImageQuality::High, language));
}

fn print_cache_info(language: &Language, info: &std::collections::BTreeMap<CacheCategory, EntryInfo>) {
    println!("Cache ({})", language);
    for (category, entry) in info {
        if !entry.present {
            println!("  {:<14} empty", category.name());
            continue;
        }
        let age = entry
            .age_hours
            .map(|h| format!("{}h old", h))
            .unwrap_or_default();
        let state = if entry.is_valid { "fresh" } else { "expired" };
        println!(
            "  {:<14} {:>3} entries  {:<10} {}",
            category.name(),
            entry.entries,
            age,
            state
        );
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let config = Config::from_cli(&cli)?;
    let service = build_service(&config)?;

    let language = match &config.language {
        Some(language) => language.clone(),
        None => service.active_language().await?,
    };
    tracing::debug!(%language, "active language");

    match cli.command {
        Command::Series { all } => {
            let series = if all {
                service.series(&language).await?
            } else {
                service.selected_series(&language).await?
            };
            if config.json {
                print_json(&series)?;
            } else {
                print_series(&series);
            }
        }
        Command::Sets { series, all } => {
            let sets = match (&series, all) {
                (Some(series_id), _) => service.sets_in_series(series_id, &language).await?,
                (None, true) => service.available_sets(&language).await?,
                (None, false) => service.selected_sets(&language).await?,
            };
            if config.json {
                print_json(&sets)?;
            } else {
                print_sets(&sets);
            }
        }
        Command::Cards { set_id, search } => {
            let cards = match &search {
                Some(query) => service.search_cards(&set_id, query, &language).await?,
                None => service.cards_in_set(&set_id, &language).await?,
            };
            if config.json {
                print_json(&cards)?;
            } else {
                print_cards(&cards);
            }
        }
        Command::Card { card_id } => {
            let card = service.card(&card_id, &language).await?;
            if config.json {
                print_json(&card)?;
            } else {
                print_card(&card, &language);
            }
        }
        Command::Language { code: None } => {
            let active = service.active_language().await?;
            println!("{}", active);
        }
        Command::Language { code: Some(code) } => {
            let new = Language::parse(&code)?;
            let previous = service.switch_language(&new).await?;
            if previous == new {
                println!("Language is already {}", new);
            } else {
                println!("Language changed from {} to {}", previous, new);
            }
        }
        Command::SelectSeries { ids } => {
            service
                .preferences()
                .set_selected_series(&language, &ids)
                .await?;
            println!("Selected series for {}: {}", language, ids.join(", "));
        }
        Command::SelectSets { ids } => {
            if ids.is_empty() {
                service.preferences().clear_selected_expansions(&language).await?;
                println!("Showing all sets for {}", language);
            } else {
                service
                    .preferences()
                    .set_selected_expansions(&language, &ids)
                    .await?;
                println!("Selected sets for {}: {}", language, ids.join(", "));
            }
        }
        Command::Cache { action } => run_cache_action(&service, &language, action, config.json).await?,
    }

    Ok(())
}

async fn run_cache_action(
    service: &DataService,
    language: &Language,
    action: CacheAction,
    json: bool,
) -> Result<(), Box<dyn Error>> {
    match action {
        CacheAction::Info => {
            let info = service.cache().cache_info(Some(language)).await;
            if json {
                print_json(&info)?;
            } else {
                print_cache_info(language, &info);
            }
        }
        CacheAction::Clear {
            category,
            language_only,
        } => {
            let scope = match (&category, language_only) {
                (Some(name), _) => InvalidationScope::Category(cli::parse_category_arg(name)?),
                (None, true) => InvalidationScope::Language(language.clone()),
                (None, false) => InvalidationScope::Everything,
            };
            let removed = service.cache().invalidate(&scope).await?;
            println!("Removed {} cache keys", removed);
        }
        CacheAction::Refresh => {
            service.cache().force_refresh().await?;
            let (series, sets) =
                futures::join!(service.series(language), service.sets(language));
            println!(
                "Refreshed {} series and {} sets for {}",
                series?.len(),
                sets?.len(),
                language
            );
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
