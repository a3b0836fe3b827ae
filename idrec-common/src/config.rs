//! Configuration loading and root folder resolution
//!
//! Every setting resolves in priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! A missing or unreadable config file is never fatal: it is logged and the
//! defaults apply.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::db::StoreOptions;
use crate::{Error, Result};

/// Environment variable naming the root folder
pub const ROOT_FOLDER_ENV: &str = "IDREC_ROOT_FOLDER";

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_DATABASE_FILE: &str = "identity.db";
pub const DEFAULT_TRANSACTION_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 2000;
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Contents of `config.toml`; every key is optional
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TomlConfig {
    pub root_folder: Option<PathBuf>,
    pub bind_addr: Option<String>,
    pub port: Option<u16>,
    pub database_file: Option<String>,
    pub transaction_timeout_ms: Option<u64>,
    pub busy_timeout_ms: Option<u64>,
    pub max_connections: Option<u32>,
}

impl TomlConfig {
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }
}

/// Values supplied on the command line (or their env fallbacks)
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub root_folder: Option<PathBuf>,
    pub config_file: Option<PathBuf>,
    pub bind_addr: Option<String>,
    pub port: Option<u16>,
}

/// Fully resolved service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub root_folder: PathBuf,
    pub database_path: PathBuf,
    pub bind_addr: String,
    pub port: u16,
    /// Upper bound on one engine operation, storage waits included
    pub transaction_timeout: Duration,
    pub store: StoreOptions,
}

impl ServiceConfig {
    /// Resolve from overrides, the environment and the config file
    pub fn resolve(overrides: &ConfigOverrides) -> Self {
        let toml = load_toml_config(overrides.config_file.as_deref()).unwrap_or_default();
        Self::from_sources(overrides, &toml)
    }

    /// Resolve against an already-loaded config file
    pub fn from_sources(overrides: &ConfigOverrides, toml: &TomlConfig) -> Self {
        let root_folder = resolve_root_folder(overrides.root_folder.as_deref(), ROOT_FOLDER_ENV, toml);
        let database_file = toml
            .database_file
            .clone()
            .unwrap_or_else(|| DEFAULT_DATABASE_FILE.to_string());

        Self {
            database_path: root_folder.join(database_file),
            root_folder,
            bind_addr: overrides
                .bind_addr
                .clone()
                .or_else(|| toml.bind_addr.clone())
                .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            port: overrides.port.or(toml.port).unwrap_or(DEFAULT_PORT),
            transaction_timeout: Duration::from_millis(
                toml.transaction_timeout_ms
                    .unwrap_or(DEFAULT_TRANSACTION_TIMEOUT_MS),
            ),
            store: StoreOptions {
                busy_timeout: Duration::from_millis(
                    toml.busy_timeout_ms.unwrap_or(DEFAULT_BUSY_TIMEOUT_MS),
                ),
                max_connections: toml.max_connections.unwrap_or(DEFAULT_MAX_CONNECTIONS).max(1),
            },
        }
    }
}

/// Root folder by priority: CLI argument, environment, config file, default
pub fn resolve_root_folder(cli_arg: Option<&Path>, env_var_name: &str, toml: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &toml.root_folder {
        return path.clone();
    }

    default_root_folder()
}

/// Load the config file: an explicit path, else the first platform default
/// that exists. Failures are logged and yield `None`.
pub fn load_toml_config(explicit: Option<&Path>) -> Option<TomlConfig> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => default_config_path()?,
    };

    match TomlConfig::from_file(&path) {
        Ok(config) => {
            info!("Loaded config file: {}", path.display());
            Some(config)
        }
        Err(e) => {
            warn!("Ignoring config file {}: {}", path.display(), e);
            None
        }
    }
}

/// `~/.config/idrec/config.toml`, then `/etc/idrec/config.toml` on Linux
fn default_config_path() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("idrec").join("config.toml"));
    if let Some(path) = user_config.filter(|p| p.exists()) {
        return Some(path);
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/idrec/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// OS-dependent default data folder
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("idrec"))
        .unwrap_or_else(|| PathBuf::from("./idrec_data"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_partial_toml() {
        let config = TomlConfig::parse("port = 8080\nbusy_timeout_ms = 250\n").unwrap();
        assert_eq!(config.port, Some(8080));
        assert_eq!(config.busy_timeout_ms, Some(250));
        assert_eq!(config.bind_addr, None);
    }

    #[test]
    fn test_parse_rejects_wrong_types() {
        let err = TomlConfig::parse("port = \"eighty\"").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_cli_overrides_beat_file_values() {
        let toml = TomlConfig {
            root_folder: Some(PathBuf::from("/srv/from-file")),
            port: Some(9000),
            bind_addr: Some("0.0.0.0".into()),
            ..TomlConfig::default()
        };
        let overrides = ConfigOverrides {
            root_folder: Some(PathBuf::from("/srv/from-cli")),
            port: Some(9100),
            ..ConfigOverrides::default()
        };

        let config = ServiceConfig::from_sources(&overrides, &toml);
        assert_eq!(config.root_folder, PathBuf::from("/srv/from-cli"));
        assert_eq!(config.database_path, PathBuf::from("/srv/from-cli/identity.db"));
        assert_eq!(config.port, 9100);
        assert_eq!(config.bind_addr, "0.0.0.0");
    }

    #[test]
    fn test_defaults_fill_missing_values() {
        let overrides = ConfigOverrides {
            root_folder: Some(PathBuf::from("/tmp/idrec")),
            ..ConfigOverrides::default()
        };
        let config = ServiceConfig::from_sources(&overrides, &TomlConfig::default());
        assert_eq!(config.bind_addr, DEFAULT_BIND_ADDR);
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.transaction_timeout, Duration::from_millis(5000));
        assert_eq!(config.store.busy_timeout, Duration::from_millis(2000));
        assert_eq!(config.store.max_connections, 5);
    }
}
