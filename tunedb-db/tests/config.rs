mod common;

use std::time::Duration;

use common::*;
use tempfile::TempDir;
use tunedb_db::tunedb_types::{Type, Value};
use tunedb_db::*;

#[test]
fn defaults_apply_to_missing_keys() {
    let config = DbConfig::from_toml_str("").unwrap();
    assert_eq!(config, DbConfig::default());
    assert_eq!(config.path, default_library_path());
    assert_eq!(config.timeout_duration(), Duration::from_secs(5));
    assert_eq!(config.time_format, "%Y-%m-%d %H:%M:%S");
    assert!(!config.format_raw_length);
}

#[test]
fn parses_every_key() {
    let config = DbConfig::from_toml_str(
        r#"
        path = "/tmp/library.db"
        timeout = 0.5
        time_format = "%Y"
        format_raw_length = true
        "#,
    )
    .unwrap();
    assert_eq!(config.path.to_str(), Some("/tmp/library.db"));
    assert_eq!(config.timeout_duration(), Duration::from_millis(500));
    assert_eq!(config.date_type().pattern(), "%Y");
    assert_eq!(config.duration_type().format(&Value::Real(61.0)), "61");
}

#[test]
fn invalid_values_are_config_errors() {
    let err = DbConfig::from_toml_str("timeout = \"soon\"").unwrap_err();
    assert!(matches!(err, DbError::Config(_)), "{err:?}");
}

#[test]
fn out_of_range_timeouts_are_clamped() {
    let config = DbConfig::from_toml_str("timeout = -3.0").unwrap();
    assert_eq!(config.timeout_duration(), Duration::ZERO);

    for huge in ["1e30", "inf"] {
        let config = DbConfig::from_toml_str(&format!("timeout = {huge}")).unwrap();
        assert_eq!(config.timeout_duration(), MAX_TIMEOUT, "{huge}");
    }
    let config = DbConfig::from_toml_str("timeout = nan").unwrap();
    assert_eq!(config.timeout_duration(), Duration::ZERO);
}

#[test]
fn huge_timeout_still_opens() {
    let dir = TempDir::new().unwrap();
    let config = DbConfig::from_toml_str("timeout = 1e30").unwrap();
    let db = DatabaseBuilder::new(dir.path().join("library.db"))
        .timeout(config.timeout_duration())
        .register::<Track>()
        .open()
        .unwrap();
    assert_eq!(db.timeout(), MAX_TIMEOUT);
    assert_eq!(db.all::<Track>().unwrap().len(), 0);
}

#[test]
fn load_reads_file_and_opens_database() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("from-config.db");
    let config_path = dir.path().join("config.toml");
    std::fs::write(
        &config_path,
        format!("path = {:?}\ntimeout = 2.0\n", db_path.to_str().unwrap()),
    )
    .unwrap();

    let config = DbConfig::load(&config_path).unwrap();
    assert_eq!(config.path, db_path);

    let db = DatabaseBuilder::from_config(&config).register::<Track>().open().unwrap();
    assert_eq!(db.path(), db_path);
    assert_eq!(db.timeout(), Duration::from_secs(2));
    assert!(db_path.exists());
}

#[test]
fn missing_config_file_is_io_error() {
    let dir = TempDir::new().unwrap();
    let err = DbConfig::load(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, DbError::Io(_)), "{err:?}");
}
