//! # Server Configuration
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     KASA_PORT=5000  KASA_STORE_BACKEND=rest  SUPABASE_URL=...          │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     --config <path>, $KASA_CONFIG, or                                  │
//! │     ~/.config/kasa-pos/kasa.toml (Linux)                               │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     sqlite store at ./kasa.db, port 5000                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [server]
//! bind_addr = "0.0.0.0"
//! port = 5000
//!
//! [store]
//! backend = "sqlite"         # sqlite | rest | memory
//! sqlite_path = "kasa.db"
//! rest_url = "https://<project>.supabase.co"
//! rest_key = "<anon key>"
//! rest_return_representation = true
//! call_timeout_ms = 10000
//! max_retries = 3
//! initial_backoff_ms = 200
//! max_backoff_ms = 2000
//!
//! [auth]
//! jwt_secret = "change-me"
//! token_lifetime_secs = 43200
//!
//! [logging]
//! format = "pretty"          # pretty | compact
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use kasa_db::RetryConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Upper bound on `store.max_retries`.
pub const MAX_RETRIES_LIMIT: u32 = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// =============================================================================
// Sections
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

impl Default for ServerSettings {
    fn default() -> Self {
        ServerSettings {
            bind_addr: default_bind_addr(),
            port: default_port(),
        }
    }
}

impl ServerSettings {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

/// Which storage backend the engine runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    Sqlite,
    Rest,
    Memory,
}

impl std::fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreBackend::Sqlite => write!(f, "sqlite"),
            StoreBackend::Rest => write!(f, "rest"),
            StoreBackend::Memory => write!(f, "memory"),
        }
    }
}

impl std::str::FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sqlite" => Ok(StoreBackend::Sqlite),
            "rest" | "supabase" | "postgrest" => Ok(StoreBackend::Rest),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(ConfigError::Invalid(format!(
                "Unknown store backend: '{}'. Valid options: sqlite, rest, memory",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    #[serde(default)]
    pub backend: StoreBackend,

    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: PathBuf,

    #[serde(default)]
    pub rest_url: Option<String>,

    #[serde(default)]
    pub rest_key: Option<String>,

    /// Ask PostgREST to return written rows. Off models backends that
    /// return nothing on insert.
    #[serde(default = "default_true")]
    pub rest_return_representation: bool,

    /// Bound on a single store call (milliseconds).
    #[serde(default = "default_call_timeout")]
    pub call_timeout_ms: u64,

    /// Retries for transient failures. 0 disables retrying.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("kasa.db")
}
fn default_true() -> bool {
    true
}
fn default_call_timeout() -> u64 {
    10_000
}
fn default_max_retries() -> u32 {
    3
}
fn default_initial_backoff() -> u64 {
    200
}
fn default_max_backoff() -> u64 {
    2_000
}

impl Default for StoreSettings {
    fn default() -> Self {
        StoreSettings {
            backend: StoreBackend::default(),
            sqlite_path: default_sqlite_path(),
            rest_url: None,
            rest_key: None,
            rest_return_representation: true,
            call_timeout_ms: default_call_timeout(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

impl StoreSettings {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            call_timeout: self.call_timeout(),
            max_retries: self.max_retries,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSettings {
    /// HS256 signing secret.
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,

    #[serde(default = "default_token_lifetime")]
    pub token_lifetime_secs: i64,
}

/// Development-only secret; `validate` warns when it is still in use.
pub const DEV_JWT_SECRET: &str = "kasa-dev-secret";

fn default_jwt_secret() -> String {
    DEV_JWT_SECRET.to_string()
}

fn default_token_lifetime() -> i64 {
    12 * 60 * 60
}

impl Default for AuthSettings {
    fn default() -> Self {
        AuthSettings {
            jwt_secret: default_jwt_secret(),
            token_lifetime_secs: default_token_lifetime(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default)]
    pub format: LogFormat,
}

// =============================================================================
// Server Configuration
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub store: StoreSettings,

    #[serde(default)]
    pub auth: AuthSettings,

    #[serde(default)]
    pub logging: LoggingSettings,
}

impl ServerConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (`path`, `$KASA_CONFIG`, or the platform config dir)
    /// 3. Environment variables
    pub fn load(path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let explicit = path.or_else(|| std::env::var("KASA_CONFIG").ok().map(PathBuf::from));
        let mut config = match explicit {
            // an explicitly named file must exist
            Some(path) => Self::from_file(&path)?,
            None => match Self::default_config_path().filter(|p| p.exists()) {
                Some(path) => Self::from_file(&path)?,
                None => {
                    debug!("No config file found, using defaults");
                    Self::default()
                }
            },
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        info!(?path, "Loading server config from file");
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store.backend == StoreBackend::Rest {
            let has = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
            if !has(&self.store.rest_url) || !has(&self.store.rest_key) {
                return Err(ConfigError::Invalid(
                    "rest backend needs store.rest_url and store.rest_key (SUPABASE_URL / SUPABASE_KEY)".into(),
                ));
            }
        }
        if self.store.max_retries > MAX_RETRIES_LIMIT {
            return Err(ConfigError::Invalid(format!(
                "store.max_retries must be at most {}",
                MAX_RETRIES_LIMIT
            )));
        }
        if self.store.call_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "store.call_timeout_ms must be greater than 0".into(),
            ));
        }
        if self.auth.token_lifetime_secs <= 0 {
            return Err(ConfigError::Invalid(
                "auth.token_lifetime_secs must be greater than 0".into(),
            ));
        }
        if self.auth.jwt_secret == DEV_JWT_SECRET {
            warn!("Using the development JWT secret; set KASA_JWT_SECRET in production");
        }
        Ok(())
    }

    /// Applies overrides from `lookup` (the process environment outside
    /// tests).
    fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        // KASA_PORT wins over the platform-provided PORT
        for key in ["PORT", "KASA_PORT"] {
            if let Some(port) = lookup(key) {
                match port.parse::<u16>() {
                    Ok(p) => self.server.port = p,
                    Err(_) => warn!(key, value = %port, "Ignoring non-numeric port"),
                }
            }
        }

        if let Some(addr) = lookup("KASA_BIND_ADDR") {
            self.server.bind_addr = addr;
        }

        if let Some(backend) = lookup("KASA_STORE_BACKEND") {
            match backend.parse() {
                Ok(parsed) => {
                    debug!(backend = %backend, "Overriding store backend from environment");
                    self.store.backend = parsed;
                }
                Err(e) => warn!(error = %e, "Ignoring KASA_STORE_BACKEND"),
            }
        }

        if let Some(path) = lookup("KASA_SQLITE_PATH") {
            self.store.sqlite_path = PathBuf::from(path);
        }

        if let Some(url) = lookup("SUPABASE_URL") {
            self.store.rest_url = Some(url);
        }

        if let Some(key) = lookup("SUPABASE_KEY") {
            self.store.rest_key = Some(key);
        }

        if let Some(secret) = lookup("KASA_JWT_SECRET") {
            self.auth.jwt_secret = secret;
        }

        if let Some(format) = lookup("KASA_LOG_FORMAT") {
            match format.to_lowercase().as_str() {
                "pretty" => self.logging.format = LogFormat::Pretty,
                "compact" => self.logging.format = LogFormat::Compact,
                _ => warn!(format = %format, "Unknown log format in environment"),
            }
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "kasa", "kasa-pos")
            .map(|dirs| dirs.config_dir().join("kasa.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.server.bind_address(), "0.0.0.0:5000");
        assert_eq!(config.store.backend, StoreBackend::Sqlite);
        assert_eq!(config.store.retry_config().max_retries, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file() {
        let config = ServerConfig::from_toml(
            r#"
            [store]
            backend = "memory"
            max_retries = 5

            [logging]
            format = "compact"
            "#,
        )
        .unwrap();
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.store.max_retries, 5);
        assert_eq!(config.store.call_timeout_ms, 10_000);
        assert_eq!(config.logging.format, LogFormat::Compact);
        assert_eq!(config.server.port, 5000);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = ServerConfig::default();
        config.apply_env_overrides(env(&[
            ("PORT", "8080"),
            ("KASA_PORT", "9090"),
            ("KASA_STORE_BACKEND", "supabase"),
            ("SUPABASE_URL", "https://demo.supabase.co"),
            ("SUPABASE_KEY", "anon"),
            ("KASA_JWT_SECRET", "s3cret"),
        ]));

        assert_eq!(config.server.port, 9090);
        assert_eq!(config.store.backend, StoreBackend::Rest);
        assert_eq!(config.auth.jwt_secret, "s3cret");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rest_needs_url_and_key() {
        let mut config = ServerConfig::default();
        config.store.backend = StoreBackend::Rest;
        config.store.rest_url = Some("https://demo.supabase.co".into());
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_retry_and_timeout_bounds() {
        let mut config = ServerConfig::default();
        config.store.max_retries = 11;
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.store.call_timeout_ms = 0;
        assert!(config.validate().is_err());
    }
}
