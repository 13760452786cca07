//! Service configuration resolution
//!
//! Each setting resolves as command-line argument (clap also reads the
//! matching environment variable) → TOML file → built-in default.

use evreg_common::config::{resolve_root_folder, TomlConfig, ROOT_FOLDER_ENV};
use std::path::{Path, PathBuf};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 5730;

/// Values supplied on the command line (or via clap `env` fallbacks)
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub root_folder: Option<PathBuf>,
    pub database: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub csv_dir: Option<PathBuf>,
    pub user_storage_limit: Option<i64>,
}

/// Fully resolved service configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub root_folder: PathBuf,
    pub database_path: PathBuf,
    pub csv_dir: PathBuf,
    pub host: String,
    pub port: u16,
    /// Bytes a user may hold before new uploads are refused
    pub user_storage_limit: Option<i64>,
    pub log_level: String,
}

impl ServiceConfig {
    pub fn resolve(cli: &CliOverrides, toml_config: &TomlConfig) -> Self {
        let root_folder =
            resolve_root_folder(cli.root_folder.as_deref(), ROOT_FOLDER_ENV, toml_config);

        let database_path = cli
            .database
            .clone()
            .or_else(|| toml_config.database_path.clone())
            .unwrap_or_else(|| root_folder.join("evreg.db"));

        let csv_dir = cli
            .csv_dir
            .clone()
            .or_else(|| toml_config.csv_dir.clone())
            .unwrap_or_else(|| default_csv_dir(&root_folder));

        let host = cli
            .host
            .clone()
            .or_else(|| toml_config.host.clone())
            .unwrap_or_else(|| DEFAULT_HOST.to_string());

        let port = cli.port.or(toml_config.port).unwrap_or(DEFAULT_PORT);

        let user_storage_limit = cli.user_storage_limit.or(toml_config.user_storage_limit);

        Self {
            root_folder,
            database_path,
            csv_dir,
            host,
            port,
            user_storage_limit,
            log_level: toml_config.logging.level.clone(),
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn default_csv_dir(root_folder: &Path) -> PathBuf {
    root_folder.join("data").join("csv")
}
