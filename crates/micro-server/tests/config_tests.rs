//! Configuration layering over temp project directories.

use std::fs;
use std::path::Path;

use micro_protocol::Origin;
use micro_server::{ConfigLoader, ServerConfig};
use tempfile::TempDir;

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

#[test]
fn empty_project_uses_defaults() {
    let dir = TempDir::new().unwrap();
    let mut loader = ConfigLoader::new();
    let config = loader.load(dir.path(), "config", None).unwrap();

    assert_eq!(config, ServerConfig::default());
    assert_eq!(config.env, "local");
    assert!(loader.loaded_files().is_empty());
}

#[test]
fn single_file_overlay_wins_over_directory() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "config.toml", "port = 9000\n");
    write(dir.path(), "config/config.default.toml", "port = 1\n");

    let mut loader = ConfigLoader::new();
    let config = loader.load(dir.path(), "config", Some("prod")).unwrap();

    assert_eq!(config.port, 9000);
    assert_eq!(config.env, "prod");
    assert_eq!(loader.loaded_files().len(), 1);
}

#[test]
fn env_layer_merges_over_default_layer() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "config/config.default.toml",
        r#"
        port = 3000
        api_prefix = "/api"

        [upload]
        max_bytes = 1024

        [restriction]
        token = "default-token"
        "#,
    );
    write(
        dir.path(),
        "config/config.local.toml",
        r#"
        [restriction]
        token = "local-token"

        [[origin_rules]]
        path = "report"
        excludes = ["socket"]
        "#,
    );
    write(dir.path(), "config/config.prod.toml", "port = 80\n");

    let mut loader = ConfigLoader::new();
    let config = loader.load(dir.path(), "config", None).unwrap();

    assert_eq!(config.port, 3000);
    assert_eq!(config.api_prefix, "/api");
    assert_eq!(config.upload.max_bytes, 1024);
    assert!(config.upload.enabled);
    assert_eq!(config.restriction.token.as_deref(), Some("local-token"));
    assert_eq!(config.origin_rules.len(), 1);
    assert_eq!(config.origin_rules[0].excludes, vec![Origin::Socket]);
    assert_eq!(loader.loaded_files().len(), 2);
}

#[test]
fn default_layer_can_select_env() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "config/config.default.toml", "env = \"staging\"\n");
    write(dir.path(), "config/config.staging.toml", "hostname = \"127.0.0.1\"\n");

    let mut loader = ConfigLoader::new();
    let config = loader.load(dir.path(), "config", None).unwrap();

    assert_eq!(config.env, "staging");
    assert_eq!(config.hostname, "127.0.0.1");
}

#[test]
fn malformed_layer_is_skipped() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "config/config.default.toml", "port = = broken");
    write(dir.path(), "config/config.local.toml", "port = 4000\n");

    let mut loader = ConfigLoader::new();
    let config = loader.load(dir.path(), "config", None).unwrap();

    assert_eq!(config.port, 4000);
    assert_eq!(loader.loaded_files().len(), 1);
}

#[test]
fn ill_typed_merge_is_an_error() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "config.toml", "port = \"eighty\"\n");

    let mut loader = ConfigLoader::new();
    assert!(loader.load(dir.path(), "config", None).is_err());
}
