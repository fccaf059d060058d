//! Integration tests for the cardex binary
//!
//! Runs the built binary against a temporary cache directory and, where
//! remote data is needed, a local mock of the TCGdex API.

use std::path::Path;
use std::process::Command;

/// Address nothing listens on, for simulating an unreachable API
const DEAD_API: &str = "http://127.0.0.1:9";

const SETS_BODY: &str = r#"[
    {"id": "sv01", "name": "Escarlate e Violeta", "cardCount": {"total": 258, "official": 198}, "releaseDate": "2023-03-31"},
    {"id": "sv02", "name": "Evoluções em Paldea", "cardCount": {"total": 279, "official": 193}, "releaseDate": "2023-06-09"},
    {"id": "sv00", "name": "Vazio", "cardCount": {"total": 0, "official": 0}}
]"#;

/// Helper to run the CLI with given args and capture output
fn run_cli(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_cardex"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute cardex")
}

fn run_in(dir: &Path, args: &[&str]) -> std::process::Output {
    let dir = dir.to_str().expect("temp dir should be valid UTF-8");
    let mut full = vec!["--cache-dir", dir];
    full.extend_from_slice(args);
    run_cli(&full)
}

fn stdout(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn test_help_flag_exits_successfully() {
    let output = run_cli(&["--help"]);
    assert!(output.status.success(), "Expected --help to exit successfully");
    let help = stdout(&output);
    assert!(help.contains("cardex"), "Help should mention cardex");
    assert!(help.contains("sets"), "Help should list the sets command");
    assert!(help.contains("cache"), "Help should list the cache command");
}

#[test]
fn test_missing_subcommand_fails() {
    let output = run_cli(&[]);
    assert!(!output.status.success());
}

#[test]
fn test_invalid_language_prints_error_and_exits() {
    let output = run_cli(&["--no-persist", "--lang", "pt_BR", "series"]);
    assert!(!output.status.success(), "Expected invalid language to fail");
    assert!(
        stderr(&output).contains("Invalid language"),
        "Should print error about the language: {}",
        stderr(&output)
    );
}

#[test]
fn test_invalid_cache_category_prints_error() {
    let output = run_cli(&["--no-persist", "cache", "clear", "--category", "decks"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Invalid category"));
}

#[test]
fn test_language_choice_persists_between_runs() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");

    let first = run_in(dir.path(), &["language"]);
    assert!(first.status.success());
    assert_eq!(stdout(&first).trim(), "pt");

    let switch = run_in(dir.path(), &["language", "en"]);
    assert!(switch.status.success(), "stderr: {}", stderr(&switch));
    assert!(stdout(&switch).contains("from pt to en"));

    let after = run_in(dir.path(), &["language"]);
    assert_eq!(stdout(&after).trim(), "en");
}

#[test]
fn test_cache_info_json_reports_every_category() {
    let output = run_cli(&["--no-persist", "--json", "cache", "info"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let info: serde_json::Value =
        serde_json::from_str(&stdout(&output)).expect("cache info should be JSON");
    for category in ["series", "sets", "cards", "exchange_rate"] {
        assert_eq!(info[category]["present"], false, "{} should be empty", category);
    }
}

#[test]
fn test_second_run_is_served_from_cache() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let mut server = mockito::Server::new();
    let mock = server
        .mock("GET", "/pt/series")
        .with_status(200)
        .with_body(r#"[{"id": "sv", "name": "Escarlate e Violeta"}, {"id": "swsh", "name": "Espada e Escudo"}]"#)
        .expect(1)
        .create();
    let url = server.url();

    let first = run_in(dir.path(), &["--api-url", &url, "series", "--all"]);
    assert!(first.status.success(), "stderr: {}", stderr(&first));
    let second = run_in(dir.path(), &["--api-url", &url, "series", "--all"]);
    assert!(second.status.success(), "stderr: {}", stderr(&second));

    mock.assert();
    assert_eq!(stdout(&first), stdout(&second));
    assert!(stdout(&second).contains("Espada e Escudo"));
}

#[test]
fn test_default_series_selection_is_scarlet_violet() {
    let mut server = mockito::Server::new();
    let _series = server
        .mock("GET", "/pt/series")
        .with_status(200)
        .with_body(r#"[{"id": "sv", "name": "Escarlate e Violeta"}, {"id": "swsh", "name": "Espada e Escudo"}]"#)
        .create();

    let output = run_cli(&["--no-persist", "--api-url", &server.url(), "series"]);

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("Escarlate e Violeta"));
    assert!(!stdout(&output).contains("Espada e Escudo"));
}

#[test]
fn test_unreachable_api_without_cache_fails() {
    let output = run_cli(&["--no-persist", "--api-url", DEAD_API, "--timeout", "2", "sets"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Error"));
}

#[test]
fn test_expired_sets_served_only_with_serve_stale() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let mut server = mockito::Server::new();
    let _sets = server
        .mock("GET", "/pt/sets")
        .with_status(200)
        .with_body(SETS_BODY)
        .create();

    let warm = run_in(dir.path(), &["--api-url", &server.url(), "sets", "--all"]);
    assert!(warm.status.success(), "stderr: {}", stderr(&warm));
    let listing = stdout(&warm);
    assert!(listing.find("sv02") < listing.find("sv01"), "newest set first");
    assert!(!listing.contains("sv00"), "empty sets are hidden");

    let offline = ["--api-url", DEAD_API, "--timeout", "2", "--sets-ttl-hours", "0"];

    let mut strict_args = offline.to_vec();
    strict_args.extend(["sets", "--all"]);
    let strict = run_in(dir.path(), &strict_args);
    assert!(!strict.status.success(), "expired cache must not be served by default");

    let mut stale_args = offline.to_vec();
    stale_args.extend(["--serve-stale", "sets", "--all"]);
    let stale = run_in(dir.path(), &stale_args);
    assert!(stale.status.success(), "stderr: {}", stderr(&stale));
    assert_eq!(stdout(&stale), listing);
}

#[test]
fn test_cache_clear_reports_removed_keys() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let mut server = mockito::Server::new();
    let _sets = server
        .mock("GET", "/pt/sets")
        .with_status(200)
        .with_body(SETS_BODY)
        .create();

    let warm = run_in(dir.path(), &["--api-url", &server.url(), "sets"]);
    assert!(warm.status.success(), "stderr: {}", stderr(&warm));

    let clear = run_in(dir.path(), &["cache", "clear"]);
    assert!(clear.status.success());
    assert!(stdout(&clear).contains("Removed 2 cache keys"));

    let info = run_in(dir.path(), &["--json", "cache", "info"]);
    let info: serde_json::Value = serde_json::from_str(&stdout(&info)).unwrap();
    assert_eq!(info["sets"]["present"], false);
}

#[cfg(test)]
mod unit_tests {
    //! Unit tests for CLI parsing that don't require running the binary

    use clap::Parser;
    use cardex::cache::CacheCategory;
    use cardex::cli::{parse_category_arg, CacheAction, Cli, Command, Config};

    #[test]
    fn test_cli_language_without_code() {
        let cli = Cli::parse_from(["cardex", "language"]);
        assert_eq!(cli.command, Command::Language { code: None });
    }

    #[test]
    fn test_cli_select_sets_collects_ids() {
        let cli = Cli::parse_from(["cardex", "select-sets", "sv01", "sv02"]);
        assert_eq!(
            cli.command,
            Command::SelectSets {
                ids: vec!["sv01".to_string(), "sv02".to_string()]
            }
        );
    }

    #[test]
    fn test_cli_cache_refresh() {
        let cli = Cli::parse_from(["cardex", "cache", "refresh"]);
        assert_eq!(
            cli.command,
            Command::Cache {
                action: CacheAction::Refresh
            }
        );
    }

    #[test]
    fn test_cli_clear_category_conflicts_with_language_only() {
        let result = Cli::try_parse_from([
            "cardex",
            "cache",
            "clear",
            "--category",
            "sets",
            "--language-only",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_category_arg_exchange_rate() {
        assert_eq!(
            parse_category_arg("exchange_rate").unwrap(),
            CacheCategory::ExchangeRate
        );
    }

    #[test]
    fn test_config_from_cli_card_details() {
        let cli = Cli::parse_from(["cardex", "cards", "sv01", "--card-details"]);
        let config = Config::from_cli(&cli).unwrap();
        assert!(config.card_details);
    }
}
