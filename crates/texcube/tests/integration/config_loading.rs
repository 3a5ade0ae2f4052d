use std::path::Path;

use texcube::config::Config;

use super::FIXTURES_PATH;

#[test]
fn test_load_valid_config() {
    let path = format!("{FIXTURES_PATH}/configs/valid_full.toml");
    let config = Config::from_file(&path).expect("Failed to load config");

    assert!(config.engines.contains_key("pdflatex"));
    assert!(config.engines.contains_key("lualatex"));
    assert_eq!(config.default_passes, 3);
    assert_eq!(config.max_passes, 4);
    assert_eq!(config.log_limit_bytes, 4096);

    let pdflatex = config.get_engine("pdflatex").unwrap();
    assert_eq!(pdflatex.env.get("openout_any").map(String::as_str), Some("p"));
    assert_eq!(
        pdflatex.expand_args("main.tex").last().map(String::as_str),
        Some("main.tex")
    );
}

#[test]
fn test_load_minimal_config() {
    let path = format!("{FIXTURES_PATH}/configs/valid_minimal.toml");
    let config = Config::from_file(&path).expect("Failed to load config");

    assert!(config.engines.contains_key("test"));
    assert_eq!(config.default_timeout_seconds, 20);
    assert_eq!(config.log_limit_bytes, 50 * 1024);
}

#[test]
fn test_load_rejects_shell_escape_engine() {
    let path = format!("{FIXTURES_PATH}/configs/invalid_shell_escape.toml");
    assert!(Config::from_file(&path).is_err());
}

#[test]
fn test_load_rejects_engine_without_entry() {
    let path = format!("{FIXTURES_PATH}/configs/invalid_no_entry.toml");
    assert!(Config::from_file(&path).is_err());
}

#[test]
fn test_load_rejects_inverted_pass_bounds() {
    let path = format!("{FIXTURES_PATH}/configs/invalid_passes.toml");
    assert!(Config::from_file(&path).is_err());
}

#[test]
fn test_load_missing_file() {
    assert!(Config::from_file("/nonexistent/texcube.toml").is_err());
    assert!(Config::load(Some(Path::new("/nonexistent/texcube.toml"))).is_err());
}

#[test]
fn test_layered_load_keeps_default_engine() {
    let path = format!("{FIXTURES_PATH}/configs/valid_minimal.toml");
    let config = Config::load(Some(Path::new(&path))).expect("Failed to load config");

    assert!(config.engines.contains_key("pdflatex"));
    assert!(config.engines.contains_key("test"));
}
