//! Server configuration loading from file and environment variables.

use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;
use thiserror::Error;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// How MCP messages reach the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// HTTP: `POST /mcp` plus the `GET /sse` / `POST /messages` pair.
    #[default]
    Http,
    /// Newline-delimited JSON-RPC on stdin/stdout.
    Stdio,
}

impl FromStr for Transport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" | "sse" => Ok(Transport::Http),
            "stdio" => Ok(Transport::Stdio),
            other => Err(format!("unknown transport: {other}")),
        }
    }
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub transport: Transport,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file, or `:memory:`.
    #[serde(default = "default_db_path")]
    pub path: String,

    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "captains_log=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    8000
}

fn default_db_path() -> String {
    "captains_log.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_pool_max_size() -> u32 {
    8
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            transport: Transport::default(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            pool_max_size: default_pool_max_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl DatabaseConfig {
    pub fn runtime_settings(&self) -> captains_db::DbRuntimeSettings {
        captains_db::DbRuntimeSettings {
            busy_timeout_ms: self.busy_timeout_ms,
            pool_max_size: self.pool_max_size,
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `CAPTAINS_HOST` overrides `server.host`
/// - `CAPTAINS_PORT` overrides `server.port`
/// - `CAPTAINS_TRANSPORT` overrides `server.transport` (`http` or `stdio`)
/// - `CAPTAINS_DB_PATH` overrides `database.path`
/// - `CAPTAINS_DB_BUSY_TIMEOUT_MS` overrides `database.busy_timeout_ms`
/// - `CAPTAINS_DB_POOL_MAX_SIZE` overrides `database.pool_max_size`
/// - `CAPTAINS_LOG_LEVEL` overrides `logging.level`
/// - `CAPTAINS_LOG_JSON` overrides `logging.json` (set to "true" to enable)
///
/// Unparsable override values are ignored.
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |name| std::env::var(name).ok());

    Ok(config)
}

fn apply_env_overrides(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    fn parsed<T: FromStr>(var: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
        let value = var(name)?;
        match value.parse() {
            Ok(parsed) => Some(parsed),
            Err(_) => {
                tracing::warn!(variable = name, value = %value, "ignoring unparsable override");
                None
            }
        }
    }

    if let Some(host) = parsed(&var, "CAPTAINS_HOST") {
        config.server.host = host;
    }
    if let Some(port) = parsed(&var, "CAPTAINS_PORT") {
        config.server.port = port;
    }
    if let Some(transport) = parsed(&var, "CAPTAINS_TRANSPORT") {
        config.server.transport = transport;
    }
    if let Some(db_path) = var("CAPTAINS_DB_PATH") {
        config.database.path = db_path;
    }
    if let Some(timeout) = parsed(&var, "CAPTAINS_DB_BUSY_TIMEOUT_MS") {
        config.database.busy_timeout_ms = timeout;
    }
    if let Some(size) = parsed(&var, "CAPTAINS_DB_POOL_MAX_SIZE") {
        config.database.pool_max_size = size;
    }
    if let Some(level) = var("CAPTAINS_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = var("CAPTAINS_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_without_file() {
        let config = Config::default();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.server.transport, Transport::Http);
        assert_eq!(config.database.path, "captains_log.db");
        assert_eq!(config.database.pool_max_size, 8);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("absent.toml");
        let config = load_config(path.to_str()).expect("missing file is not an error");
        assert_eq!(config.database.busy_timeout_ms, 5_000);
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let config: Config = toml::from_str(
            r#"
            [server]
            port = 9100
            transport = "stdio"

            [database]
            path = ":memory:"
            "#,
        )
        .expect("valid toml");

        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.transport, Transport::Stdio);
        assert_eq!(config.server.host, default_host());
        assert_eq!(config.database.path, ":memory:");
        assert_eq!(config.database.pool_max_size, 8);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn invalid_toml_is_an_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[server\nport = ").expect("write");
        let err = load_config(path.to_str()).expect_err("bad toml");
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn env_overrides_apply_and_bad_values_are_ignored() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("CAPTAINS_PORT", "9200"),
            ("CAPTAINS_HOST", "not-an-ip"),
            ("CAPTAINS_TRANSPORT", "STDIO"),
            ("CAPTAINS_DB_PATH", "/tmp/log.db"),
            ("CAPTAINS_LOG_JSON", "1"),
            ("CAPTAINS_DB_POOL_MAX_SIZE", "not-a-number"),
        ]);
        let mut config = Config::default();
        apply_env_overrides(&mut config, |name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(config.server.port, 9200);
        assert_eq!(config.server.host, default_host());
        assert_eq!(config.server.transport, Transport::Stdio);
        assert_eq!(config.database.path, "/tmp/log.db");
        assert!(config.logging.json);
        assert_eq!(config.database.pool_max_size, 8);
    }
}
