//! Layered server configuration.
//!
//! Layers are TOML files overlaid on the built-in defaults:
//!
//! - `{config_dir}.toml`, when it exists as a file, is the only overlay
//! - otherwise `{config_dir}/config.default.toml` then
//!   `{config_dir}/config.{env}.toml`
//!
//! Tables merge key by key; scalars and arrays replace. A layer that cannot
//! be read or parsed is logged and skipped.

use std::path::{Path, PathBuf};

use micro_transport::{SocketConfig, TransportConfig};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::middleware::OriginRule;

pub const DEFAULT_ENV: &str = "local";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to serialize defaults: {0}")]
    Defaults(#[from] toml::ser::Error),

    #[error("invalid configuration: {0}")]
    Invalid(#[source] toml::de::Error),
}

/// Multipart upload settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub enabled: bool,
    pub max_bytes: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_bytes: 10 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticFilesConfig {
    pub enabled: bool,
    /// Relative to the project directory
    pub dir: PathBuf,
}

impl Default for StaticFilesConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: PathBuf::from("client"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SocketSettings {
    pub enabled: bool,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_connections: Option<usize>,
}

impl Default for SocketSettings {
    fn default() -> Self {
        let socket = SocketConfig::default();
        Self {
            enabled: true,
            path: socket.path,
            max_connections: socket.max_connections,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestrictionConfig {
    /// Token required by `$`-tagged entries. Unset means no check.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    pub enabled: bool,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Complete server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub hostname: String,
    /// Relative to the project directory
    pub services_dir: PathBuf,
    /// Field names lifted into the payload's header fields
    pub allow_headers: Vec<String>,
    pub api_prefix: String,
    pub upload: UploadConfig,
    pub static_files: StaticFilesConfig,
    pub socket: SocketSettings,
    pub restriction: RestrictionConfig,
    pub cors: CorsConfig,
    pub env: String,
    pub origin_rules: Vec<OriginRule>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            hostname: "0.0.0.0".into(),
            services_dir: PathBuf::from("services"),
            allow_headers: vec!["token".into(), "accessKey".into(), "signature".into()],
            api_prefix: String::new(),
            upload: UploadConfig::default(),
            static_files: StaticFilesConfig::default(),
            socket: SocketSettings::default(),
            restriction: RestrictionConfig::default(),
            cors: CorsConfig::default(),
            env: DEFAULT_ENV.into(),
            origin_rules: Vec::new(),
        }
    }
}

impl ServerConfig {
    pub fn services_path(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(&self.services_dir)
    }

    /// Settings for the transport server, with paths resolved against
    /// `project_dir`.
    pub fn transport_config(&self, project_dir: &Path) -> TransportConfig {
        TransportConfig {
            port: self.port,
            hostname: self.hostname.clone(),
            api_prefix: self.api_prefix.clone(),
            allow_headers: self.allow_headers.clone(),
            upload_enabled: self.upload.enabled,
            max_body_bytes: self.upload.max_bytes,
            static_dir: self
                .static_files
                .enabled
                .then(|| project_dir.join(&self.static_files.dir)),
            socket: self.socket.enabled.then(|| SocketConfig {
                path: self.socket.path.clone(),
                max_connections: self.socket.max_connections,
                ..SocketConfig::default()
            }),
            enable_cors: self.cors.enabled,
        }
    }
}

/// Resolves and merges the configuration layers of a project.
#[derive(Debug, Default)]
pub struct ConfigLoader {
    loaded: Vec<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Files that were merged by the last [`load`](Self::load), in order.
    pub fn loaded_files(&self) -> &[PathBuf] {
        &self.loaded
    }

    /// Load the configuration for `project_dir`.
    ///
    /// `env` selects `config.{env}.toml`; when `None`, the `env` set by the
    /// default layer is used, falling back to `local`. An explicit `env`
    /// always wins over what the files say.
    pub fn load(
        &mut self,
        project_dir: &Path,
        config_dir: &str,
        env: Option<&str>,
    ) -> Result<ServerConfig, ConfigError> {
        self.loaded.clear();

        let mut merged = default_table()?;
        if let Some(env) = env {
            merged.insert("env".into(), toml::Value::String(env.into()));
        }

        let single = project_dir.join(format!("{}.toml", config_dir.trim_end_matches('/')));
        if single.is_file() {
            self.apply(&mut merged, &single);
        } else {
            let dir = project_dir.join(config_dir);
            self.apply(&mut merged, &dir.join("config.default.toml"));

            let selected = env
                .map(str::to_string)
                .or_else(|| merged.get("env").and_then(|v| v.as_str()).map(str::to_string))
                .unwrap_or_else(|| DEFAULT_ENV.into());
            self.apply(&mut merged, &dir.join(format!("config.{selected}.toml")));
        }

        if let Some(env) = env {
            merged.insert("env".into(), toml::Value::String(env.into()));
        }

        toml::Value::Table(merged)
            .try_into()
            .map_err(ConfigError::Invalid)
    }

    fn apply(&mut self, merged: &mut toml::Table, path: &Path) {
        if !path.exists() {
            return;
        }
        match read_layer(path) {
            Ok(layer) => {
                merge_tables(merged, layer);
                info!("Loaded {}", path.display());
                self.loaded.push(path.to_path_buf());
            }
            Err(e) => warn!("Skipping configuration layer: {e}"),
        }
    }
}

fn default_table() -> Result<toml::Table, ConfigError> {
    match toml::Value::try_from(ServerConfig::default())? {
        toml::Value::Table(table) => Ok(table),
        _ => Ok(toml::Table::new()),
    }
}

/// Read one TOML layer.
pub fn read_layer(path: &Path) -> Result<toml::Table, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    content.parse::<toml::Table>().map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Deep-merge `overlay` into `base`.
pub fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}
