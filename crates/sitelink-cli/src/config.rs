//! Configuration – reads/writes `~/.sitelink/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Persisted daemon configuration stored in `~/.sitelink/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// TCP port for the HTTP/WebSocket gateway.
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// SQLite database path for the model registry.
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Upper bound on one registry lookup during ingest, in milliseconds.
    /// A lookup that exceeds this is reported to the sensor as a transient
    /// failure.
    #[serde(default = "default_lookup_timeout_ms")]
    pub lookup_timeout_ms: u64,
}

fn default_http_port() -> u16 {
    3000
}
fn default_db_path() -> String {
    sitelink_dir_for_home(&home())
        .join("registry.db")
        .display()
        .to_string()
}
fn default_lookup_timeout_ms() -> u64 {
    2000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: default_http_port(),
            db_path: default_db_path(),
            lookup_timeout_ms: default_lookup_timeout_ms(),
        }
    }
}

fn home() -> String {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string())
}

/// Build the `.sitelink` directory path for the given home directory.
/// Extracted for testability without mutating environment variables.
pub(crate) fn sitelink_dir_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".sitelink")
}

/// Return the path to `~/.sitelink/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(&home())
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    sitelink_dir_for_home(home).join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

/// Load the config from a specific path.
pub(crate) fn load_from(path: &PathBuf) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `SITELINK_*` environment variable overrides to `cfg`.
///
/// Supported variables:
///
/// | Variable | Config field |
/// |---|---|
/// | `SITELINK_HTTP_PORT` | `http_port` |
/// | `SITELINK_DB_PATH` | `db_path` |
/// | `SITELINK_LOOKUP_TIMEOUT_MS` | `lookup_timeout_ms` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("SITELINK_HTTP_PORT")
        && let Ok(port) = v.parse::<u16>()
    {
        cfg.http_port = port;
    }
    if let Ok(v) = std::env::var("SITELINK_DB_PATH") {
        cfg.db_path = v;
    }
    if let Ok(v) = std::env::var("SITELINK_LOOKUP_TIMEOUT_MS")
        && let Ok(ms) = v.parse::<u64>()
    {
        cfg.lookup_timeout_ms = ms;
    }
}

/// Save the config to disk, creating `~/.sitelink/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

/// Save the config to a specific path.
pub(crate) fn save_to(cfg: &Config, path: &PathBuf) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }
    let raw = toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    fs::write(path, raw).map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))
}
