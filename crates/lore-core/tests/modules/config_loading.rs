//! Startup configuration loaded from disk and validated.

#![cfg(test)]

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use lore_core::{Error, InstallerConfig, LoreConfig};
use tempfile::TempDir;

#[test]
fn test_full_file_with_overrides_validates() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("lore.toml");
    fs::write(
        &path,
        r#"
[storage]
root = "/var/lib/lore"

[embedding]
model = "mxbai-embed-large"
dimension = 1024

[retrieval]
top_k = 8

[sandbox]
execution_timeout_secs = 5

[sandbox.installer]
kind = "command"
program = "npm"
args = ["install", "--prefix", "{target}", "{package}"]
"#,
    )?;

    let mut config = LoreConfig::load_from_file(&path)?;
    let overrides: HashMap<&str, &str> = HashMap::from([("LORE_EMBEDDING_DIMENSION", "512")]);
    config.apply_overrides(|name| overrides.get(name).map(|value| (*value).to_owned()))?;
    config.validate()?;

    assert_eq!(config.storage.root, PathBuf::from("/var/lib/lore"));
    assert_eq!(config.embedding.model, "mxbai-embed-large");
    assert_eq!(config.embedding.dimension, 512);
    assert_eq!(config.retrieval.top_k, 8);
    assert_eq!(config.retrieval.chunk_size, 1000);
    assert_eq!(config.sandbox.execution_timeout_secs, 5);
    assert!(matches!(
        config.sandbox.installer,
        InstallerConfig::Command { ref program, .. } if program == "npm"
    ));
    Ok(())
}

#[test]
fn test_missing_file_is_config_error() {
    let temp_dir = TempDir::new().unwrap();
    let result = LoreConfig::load_from_file(&temp_dir.path().join("absent.toml"));
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn test_malformed_file_is_toml_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("broken.toml");
    fs::write(&path, "[storage\nroot = ").unwrap();
    assert!(matches!(
        LoreConfig::load_from_file(&path),
        Err(Error::Toml(_))
    ));
}
