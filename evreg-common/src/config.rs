//! Bootstrap configuration loading and root folder resolution
//!
//! Bootstrap settings come from a small TOML file. Every field is optional;
//! services merge them with command-line arguments and environment variables
//! using the priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. OS-dependent compiled default (fallback)

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable naming the root folder
pub const ROOT_FOLDER_ENV: &str = "EVREG_ROOT_FOLDER";

/// Bootstrap configuration loaded from TOML file
///
/// These settings cannot change during runtime. Runtime settings live in the
/// database `settings` table.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    /// Folder holding the database and default data directories
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// Path to SQLite database file (defaults to `<root>/evreg.db`)
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// HTTP bind host
    #[serde(default)]
    pub host: Option<String>,

    /// HTTP server port
    #[serde(default)]
    pub port: Option<u16>,

    /// Directory scanned by CSV referral processing
    #[serde(default)]
    pub csv_dir: Option<PathBuf>,

    /// Per-user upload storage quota in bytes (unlimited when unset)
    #[serde(default)]
    pub user_storage_limit: Option<i64>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Parse TOML configuration text
pub fn parse_toml_config(content: &str) -> Result<TomlConfig> {
    toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
}

/// Load the bootstrap TOML configuration
///
/// An explicitly named file must exist and parse. Without one, the platform
/// default locations are checked and a missing file yields the all-default
/// configuration.
pub fn load_toml_config(explicit: Option<&Path>) -> Result<TomlConfig> {
    let path = match explicit {
        Some(path) => {
            if !path.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            path.to_path_buf()
        }
        None => match default_config_path() {
            Some(path) => path,
            None => return Ok(TomlConfig::default()),
        },
    };

    let content = std::fs::read_to_string(&path)
        .map_err(|e| Error::Config(format!("Read TOML failed ({}): {}", path.display(), e)))?;
    let config = parse_toml_config(&content)?;
    tracing::debug!(path = %path.display(), "Loaded TOML configuration");
    Ok(config)
}

/// First existing configuration file for the platform
fn default_config_path() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("evreg").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/evreg/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Resolve the root folder
///
/// `cli_arg` is the command-line value; the environment variable and the
/// TOML file are consulted only when it is absent.
pub fn resolve_root_folder(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    toml_config: &TomlConfig,
) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    // Priority 3: TOML config file
    if let Some(path) = &toml_config.root_folder {
        return path.clone();
    }

    // Priority 4: OS-dependent compiled default
    default_root_folder()
}

/// Get OS-dependent default root folder path
pub fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/evreg (or /var/lib/evreg for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("evreg"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/evreg"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("evreg"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/evreg"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("evreg"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\evreg"))
    } else {
        PathBuf::from("./evreg_data")
    }
}

/// Create a directory (and parents) if it does not exist yet
pub fn ensure_directory_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
        tracing::info!(path = %path.display(), "Created directory");
    }
    Ok(())
}
