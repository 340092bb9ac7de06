// Tests for configuration loading

use std::fs;

use sigscan::hash::{Label, Precedence, ScanConfig, ScanError};
use tempfile::TempDir;

use super::*;

#[test]
fn test_load_full_config() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(
        &path,
        "concurrency = 3\nchunk_size = 8192\nprecedence = \"legacy-first\"\nregistry = \"/tmp/sigs.txt\"\n",
    )
    .unwrap();

    let config = ScanConfig::load(&path).unwrap();

    assert_eq!(config.concurrency, 3);
    assert_eq!(config.chunk_size, 8192);
    assert_eq!(config.precedence, Precedence::LegacyFirst);
    assert_eq!(config.registry.as_deref(), Some(std::path::Path::new("/tmp/sigs.txt")));
}

#[test]
fn test_partial_config_keeps_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "precedence = \"strongest-first\"\n").unwrap();

    let config = ScanConfig::load(&path).unwrap();

    assert_eq!(config.chunk_size, ScanConfig::default().chunk_size);
    assert!(config.registry.is_none());
}

#[test]
fn test_bad_precedence_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "precedence = \"alphabetical\"\n").unwrap();

    assert!(matches!(ScanConfig::load(&path), Err(ScanError::InvalidConfig { .. })));
}

#[test]
fn test_discover_explicit_missing_file() {
    let dir = TempDir::new().unwrap();
    let result = ScanConfig::discover(Some(&dir.path().join("absent.toml")));

    assert!(matches!(result, Err(ScanError::FileNotFound { .. })));
}

#[test]
fn test_config_builds_working_engine() {
    let dir = TempDir::new().unwrap();
    let registry_path = dir.path().join("sigs.txt");
    fs::write(&registry_path, format!("{}  Worm\n{}  Virus\n", HELLO_MD5, HELLO_SHA256)).unwrap();

    let scan_dir = dir.path().join("scan");
    fs::create_dir(&scan_dir).unwrap();
    write_file(&scan_dir, "hello.txt", b"hello world");

    let config = ScanConfig {
        concurrency: 2,
        chunk_size: 4096,
        precedence: Precedence::LegacyFirst,
        registry: Some(registry_path),
    };
    let engine = config.build_engine(config.load_registry().unwrap());
    let report = engine.scan_all(&scan_dir).unwrap();

    assert_eq!(engine.concurrency(), 2);
    assert_eq!(report.results[0].label, Label::Worm);
}

#[test]
fn test_invalid_registry_is_fatal() {
    let dir = TempDir::new().unwrap();
    let registry_path = dir.path().join("sigs.txt");
    fs::write(&registry_path, "1234  Worm\n").unwrap();

    let config = ScanConfig {
        registry: Some(registry_path),
        ..ScanConfig::default()
    };

    assert!(config.load_registry().is_err());
}
