//! Server configuration loading from file and environment variables.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// Name of the connection string the server reads at startup.
pub const SCHOOL_DB: &str = "SchoolDb";

/// Environment name that enables the interactive API documentation.
pub const DEVELOPMENT: &str = "Development";

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// HTTP to HTTPS redirection settings.
    #[serde(default)]
    pub https_redirection: HttpsRedirectionConfig,

    /// Named connection strings (`[ConnectionStrings]` in TOML).
    #[serde(default, rename = "ConnectionStrings")]
    pub connection_strings: BTreeMap<String, String>,

    /// Database settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Authorization settings.
    #[serde(default)]
    pub auth: AuthConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Plain HTTP port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Runtime environment name, e.g. "Development" or "Production".
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Optional TLS listener.
    #[serde(default)]
    pub tls: Option<TlsConfig>,
}

/// TLS listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TlsConfig {
    /// HTTPS port.
    #[serde(default = "default_tls_port")]
    pub port: u16,

    /// Path to the PEM certificate chain.
    pub cert_path: PathBuf,

    /// Path to the PEM private key.
    pub key_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpsRedirectionConfig {
    /// Port used in redirect locations. Falls back to `server.tls.port`.
    #[serde(default)]
    pub port: Option<u16>,

    /// Redirect status: 301, 302, 307 or 308.
    #[serde(default = "default_redirect_status")]
    pub status_code: u16,

    /// Honor `X-Forwarded-Proto: https` on the plain listener. Enable only
    /// behind a reverse proxy that sets the header itself.
    #[serde(default)]
    pub trust_forwarded_proto: bool,
}

/// What the startup sequence does when the migration step fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationFailurePolicy {
    /// Log the failure and keep starting the server.
    #[default]
    Continue,
    /// Stop startup with an error.
    Abort,
}

impl FromStr for MigrationFailurePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "continue" => Ok(Self::Continue),
            "abort" => Ok(Self::Abort),
            _ => Err(ConfigError::InvalidValue {
                key: "database.on_migration_failure",
                value: s.to_string(),
            }),
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite busy timeout in milliseconds.
    #[serde(default = "default_db_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Maximum pooled SQLite connections.
    #[serde(default = "default_db_pool_max_size")]
    pub pool_max_size: u32,

    /// How long to wait for a pooled connection, in milliseconds.
    #[serde(default = "default_db_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default)]
    pub on_migration_failure: MigrationFailurePolicy,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "school_server=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

/// Authorization configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    /// Bearer tokens accepted on protected routes. Empty leaves them open.
    #[serde(default)]
    pub api_keys: Vec<String>,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    5000
}

fn default_tls_port() -> u16 {
    5001
}

fn default_environment() -> String {
    "Production".to_string()
}

fn default_redirect_status() -> u16 {
    307
}

fn default_db_busy_timeout_ms() -> u64 {
    5_000
}

fn default_db_pool_max_size() -> u32 {
    8
}

fn default_db_connect_timeout_ms() -> u64 {
    5_000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            environment: default_environment(),
            tls: None,
        }
    }
}

impl Default for HttpsRedirectionConfig {
    fn default() -> Self {
        Self {
            port: None,
            status_code: default_redirect_status(),
            trust_forwarded_proto: false,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            busy_timeout_ms: default_db_busy_timeout_ms(),
            pool_max_size: default_db_pool_max_size(),
            connect_timeout_ms: default_db_connect_timeout_ms(),
            on_migration_failure: MigrationFailurePolicy::default(),
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

impl Config {
    /// Looks up a named connection string. Blank values count as missing.
    pub fn connection_string(&self, name: &str) -> Option<&str> {
        self.connection_strings
            .get(name)
            .map(String::as_str)
            .filter(|value| !value.trim().is_empty())
    }

    pub fn set_connection_string(&mut self, name: &str, value: impl Into<String>) {
        self.connection_strings.insert(name.to_string(), value.into());
    }

    /// Whether the runtime environment is `Development` (case-insensitive).
    pub fn is_development(&self) -> bool {
        self.server.environment.eq_ignore_ascii_case(DEVELOPMENT)
    }

    /// The port HTTPS redirects point at, if one can be determined.
    pub fn https_port(&self) -> Option<u16> {
        self.https_redirection
            .port
            .or_else(|| self.server.tls.as_ref().map(|tls| tls.port))
    }

    /// Applies environment variable overrides read through `env`.
    ///
    /// - `ConnectionStrings__SchoolDb` overrides `ConnectionStrings.SchoolDb`
    /// - `SCHOOL_ENVIRONMENT` overrides `server.environment`
    /// - `SCHOOL_HOST` / `SCHOOL_PORT` override `server.host` / `server.port`
    /// - `SCHOOL_HTTPS_PORT` overrides `https_redirection.port`
    /// - `SCHOOL_TRUST_FORWARDED_PROTO` overrides `https_redirection.trust_forwarded_proto`
    /// - `SCHOOL_DB_POOL_MAX_SIZE` / `SCHOOL_DB_BUSY_TIMEOUT_MS` override `database.*`
    /// - `SCHOOL_ON_MIGRATION_FAILURE` overrides `database.on_migration_failure`
    /// - `SCHOOL_LOG_LEVEL` / `SCHOOL_LOG_JSON` override `logging.*`
    /// - `SCHOOL_API_KEYS` (comma-separated) overrides `auth.api_keys`
    ///
    /// Values that do not parse are ignored with a warning.
    pub fn apply_env<F>(&mut self, env: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = env(&format!("ConnectionStrings__{SCHOOL_DB}")) {
            self.set_connection_string(SCHOOL_DB, value);
        }
        if let Some(environment) = env("SCHOOL_ENVIRONMENT") {
            self.server.environment = environment;
        }
        if let Some(host) = env("SCHOOL_HOST") {
            parse_into("SCHOOL_HOST", &host, &mut self.server.host);
        }
        if let Some(port) = env("SCHOOL_PORT") {
            parse_into("SCHOOL_PORT", &port, &mut self.server.port);
        }
        if let Some(port) = env("SCHOOL_HTTPS_PORT") {
            let mut parsed = 0u16;
            if parse_into("SCHOOL_HTTPS_PORT", &port, &mut parsed) {
                self.https_redirection.port = Some(parsed);
            }
        }
        if let Some(trust) = env("SCHOOL_TRUST_FORWARDED_PROTO") {
            self.https_redirection.trust_forwarded_proto = trust == "true" || trust == "1";
        }
        if let Some(size) = env("SCHOOL_DB_POOL_MAX_SIZE") {
            parse_into("SCHOOL_DB_POOL_MAX_SIZE", &size, &mut self.database.pool_max_size);
        }
        if let Some(ms) = env("SCHOOL_DB_BUSY_TIMEOUT_MS") {
            parse_into("SCHOOL_DB_BUSY_TIMEOUT_MS", &ms, &mut self.database.busy_timeout_ms);
        }
        if let Some(policy) = env("SCHOOL_ON_MIGRATION_FAILURE") {
            parse_into(
                "SCHOOL_ON_MIGRATION_FAILURE",
                &policy,
                &mut self.database.on_migration_failure,
            );
        }
        if let Some(level) = env("SCHOOL_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(json) = env("SCHOOL_LOG_JSON") {
            self.logging.json = json == "true" || json == "1";
        }
        if let Some(keys) = env("SCHOOL_API_KEYS") {
            self.auth.api_keys = keys
                .split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_string)
                .collect();
        }
    }

    /// Rejects combinations no later stage can act on.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for an unsupported redirect status
    /// or a zero pool size.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(self.https_redirection.status_code, 301 | 302 | 307 | 308) {
            return Err(ConfigError::InvalidValue {
                key: "https_redirection.status_code",
                value: self.https_redirection.status_code.to_string(),
            });
        }
        if self.database.pool_max_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "database.pool_max_size",
                value: "0".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_into<T: FromStr>(var: &str, raw: &str, target: &mut T) -> bool {
    match raw.trim().parse() {
        Ok(parsed) => {
            *target = parsed;
            true
        }
        Err(_) => {
            tracing::warn!(variable = var, value = raw, "ignoring unparsable override");
            false
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

    /// A setting holds a value the server cannot use.
    #[error("invalid value '{value}' for {key}")]
    InvalidValue { key: &'static str, value: String },
}

/// Loads configuration from a TOML file, then applies process environment
/// overrides (see [`Config::apply_env`]).
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed, or
/// if the merged configuration fails validation.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

/// Like [`load_config`] but reads overrides through `env` instead of the
/// process environment.
///
/// # Errors
///
/// See [`load_config`].
pub fn load_config_with_env<F>(path: Option<&str>, env: F) -> Result<Config, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
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

    config.apply_env(env);
    config.validate()?;

    Ok(config)
}
