//! Application configuration management

use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => bail!("unknown log format `{}` (expected pretty or json)", other),
        }
    }
}

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Database URL (`sqlite://...`, `sqlite::memory:`) or a plain file path
    pub database_url: String,

    /// Pool size; in-memory databases always use a single connection
    pub max_connections: u32,

    /// How long to wait for a pooled connection
    pub acquire_timeout: Duration,

    /// How long SQLite waits on a locked database before failing
    pub busy_timeout: Duration,

    /// `table.column` entries hidden from reads by default
    pub omit: Vec<String>,

    /// Default time allowed to start a transaction
    pub tx_max_wait: Duration,

    /// Default time allowed for a transaction to finish
    pub tx_timeout: Duration,

    pub log_format: LogFormat,

    /// Tracing filter directive
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite://./data/careerdb.db".to_string(),
            max_connections: 10,
            acquire_timeout: Duration::from_secs(10),
            busy_timeout: Duration::from_millis(5000),
            omit: vec!["users.password".to_string()],
            tx_max_wait: Duration::from_millis(2000),
            tx_timeout: Duration::from_millis(5000),
            log_format: LogFormat::Pretty,
            log_filter: "careerdb=info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`, falling back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        // Prefer DATABASE_PATH, fall back to DATABASE_URL
        let database_url = lookup("DATABASE_PATH")
            .or_else(|| lookup("DATABASE_URL"))
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(defaults.database_url);

        let max_connections: u32 = parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", defaults.max_connections)?;
        if max_connections == 0 {
            bail!("DATABASE_MAX_CONNECTIONS must be at least 1");
        }

        let omit = match lookup("DATABASE_OMIT") {
            Some(list) => list
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            None => defaults.omit,
        };

        Ok(Self {
            database_url,

            max_connections,

            acquire_timeout: Duration::from_secs(parse_or(
                &lookup,
                "DATABASE_ACQUIRE_TIMEOUT_SECS",
                defaults.acquire_timeout.as_secs(),
            )?),

            busy_timeout: Duration::from_millis(parse_or(
                &lookup,
                "DATABASE_BUSY_TIMEOUT_MS",
                defaults.busy_timeout.as_millis() as u64,
            )?),

            omit,

            tx_max_wait: Duration::from_millis(parse_or(
                &lookup,
                "TX_MAX_WAIT_MS",
                defaults.tx_max_wait.as_millis() as u64,
            )?),

            tx_timeout: Duration::from_millis(parse_or(
                &lookup,
                "TX_TIMEOUT_MS",
                defaults.tx_timeout.as_millis() as u64,
            )?),

            log_format: match lookup("LOG_FORMAT") {
                Some(v) => v.parse()?,
                None => defaults.log_format,
            },

            log_filter: lookup("RUST_LOG").unwrap_or(defaults.log_filter),
        })
    }

    /// Whether the database lives in memory only
    pub fn is_in_memory(&self) -> bool {
        self.database_url.contains(":memory:") || self.database_url.contains("mode=memory")
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {}: `{}`", key, raw)),
        None => Ok(default),
    }
}
