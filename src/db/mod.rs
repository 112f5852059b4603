//! Database connection and operations
//!
//! [`Database`] is the explicitly constructed handle every repository comes
//! from. It owns the SQLite pool and the read settings shared by all
//! repositories; clone it freely and call [`Database::close`] on shutdown.

pub mod connection;
pub mod schema_sync;
pub mod sqlite_helpers;
pub mod transaction;

use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use tokio::time::Instant;

use crate::config::Config;
use crate::entities::{
    self, Certification, Education, Employment, Job, Profile, Project, Skill, User,
};
use crate::error::{DbError, Result};
use crate::orm::{Entity, OmitRules, QueryContext, Repository};

pub use connection::ConnHandle;
pub use schema_sync::SchemaSyncResult;
pub use transaction::{IsolationLevel, Transaction, TransactionOptions};

/// Database wrapper providing connection pool access
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
    ctx: Arc<QueryContext>,
    tx_defaults: TransactionOptions,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("connections", &self.pool.size())
            .field("tx_defaults", &self.tx_defaults)
            .finish()
    }
}

impl Database {
    /// Connect to `url` with default settings
    pub async fn connect(url: &str) -> Result<Self> {
        let config = Config {
            database_url: url.to_string(),
            ..Config::default()
        };
        Self::connect_with_config(&config).await
    }

    /// Create a new database connection pool
    pub async fn connect_with_config(config: &Config) -> Result<Self> {
        let ctx = Self::query_context(config)?;
        let pool = Self::pool_options(config)
            .connect_with(Self::connect_options(config)?)
            .await?;

        tracing::info!(
            url = %config.database_url,
            max_connections = pool.options().get_max_connections(),
            "Connected to database"
        );

        Ok(Self::from_parts(pool, ctx, config))
    }

    /// Create a new database connection pool with retry logic
    /// Retries every `retry_interval` until successful
    pub async fn connect_with_retry(config: &Config, retry_interval: Duration) -> Result<Self> {
        let ctx = Self::query_context(config)?;
        let options = Self::connect_options(config)?;
        loop {
            match Self::pool_options(config).connect_with(options.clone()).await {
                Ok(pool) => {
                    tracing::info!(url = %config.database_url, "Connected to database");
                    return Ok(Self::from_parts(pool, ctx, config));
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        "Database connection failed. Retrying in {} seconds...",
                        retry_interval.as_secs()
                    );
                    tokio::time::sleep(retry_interval).await;
                }
            }
        }
    }

    fn from_parts(pool: SqlitePool, ctx: QueryContext, config: &Config) -> Self {
        Self {
            pool,
            ctx: Arc::new(ctx),
            tx_defaults: TransactionOptions {
                max_wait: config.tx_max_wait,
                timeout: config.tx_timeout,
                ..TransactionOptions::default()
            },
        }
    }

    fn query_context(config: &Config) -> Result<QueryContext> {
        let omit = OmitRules::resolve(&config.omit, &entities::schemas())?;
        Ok(QueryContext::new(omit))
    }

    fn connect_options(config: &Config) -> Result<SqliteConnectOptions> {
        let url = config.database_url.as_str();
        let options = if url.starts_with("sqlite:") {
            SqliteConnectOptions::from_str(url)?
        } else {
            SqliteConnectOptions::new().filename(url)
        };

        let mut options = options
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(config.busy_timeout);

        if !config.is_in_memory() {
            if let Some(parent) = options.get_filename().parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)
                        .map_err(|e| DbError::Connection(sqlx::Error::Io(e)))?;
                }
            }
            options = options
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal);
        }

        Ok(options)
    }

    fn pool_options(config: &Config) -> SqlitePoolOptions {
        let options = SqlitePoolOptions::new().acquire_timeout(config.acquire_timeout);
        if config.is_in_memory() {
            // Every connection to :memory: is a separate database; keep one alive.
            options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            options.max_connections(config.max_connections)
        }
    }

    /// Get the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close every connection. Operations started afterwards fail with a
    /// connection error.
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::info!("Database closed");
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    /// Create missing tables, columns and indexes
    pub async fn sync_schema(&self) -> SchemaSyncResult {
        schema_sync::sync_all_entity_schemas(&self.pool).await
    }

    /// Get a repository for any entity
    pub fn repository<E: Entity>(&self) -> Repository<E> {
        Repository::new(ConnHandle::Pool(self.pool.clone()), self.ctx.clone())
    }

    /// Get a users repository
    pub fn users(&self) -> Repository<User> {
        self.repository()
    }

    /// Get a profiles repository
    pub fn profiles(&self) -> Repository<Profile> {
        self.repository()
    }

    /// Get a skills repository
    pub fn skills(&self) -> Repository<Skill> {
        self.repository()
    }

    /// Get an employments repository
    pub fn employments(&self) -> Repository<Employment> {
        self.repository()
    }

    /// Get an educations repository
    pub fn educations(&self) -> Repository<Education> {
        self.repository()
    }

    /// Get a projects repository
    pub fn projects(&self) -> Repository<Project> {
        self.repository()
    }

    /// Get a certifications repository
    pub fn certifications(&self) -> Repository<Certification> {
        self.repository()
    }

    /// Get a jobs repository
    pub fn jobs(&self) -> Repository<Job> {
        self.repository()
    }

    /// Default options for [`begin`](Self::begin) and [`transaction`](Self::transaction)
    pub fn transaction_defaults(&self) -> TransactionOptions {
        self.tx_defaults
    }

    /// Start a transaction with the configured defaults
    pub async fn begin(&self) -> Result<Transaction> {
        self.begin_with(self.tx_defaults).await
    }

    /// Start a transaction.
    ///
    /// Waiting longer than `max_wait` for a connection fails with a timeout.
    pub async fn begin_with(&self, options: TransactionOptions) -> Result<Transaction> {
        let tx = tokio::time::timeout(options.max_wait, self.pool.begin())
            .await
            .map_err(|_| {
                DbError::Timeout(format!(
                    "could not start a transaction within {} ms",
                    options.max_wait.as_millis()
                ))
            })??;

        tracing::debug!(
            isolation_level = ?options.isolation_level,
            timeout_ms = options.timeout.as_millis() as u64,
            "Transaction started"
        );
        Ok(Transaction::new(
            tx,
            Instant::now() + options.timeout,
            self.ctx.clone(),
        ))
    }

    /// Run `body` in a transaction with the configured defaults.
    pub async fn transaction<T, F, Fut>(&self, body: F) -> Result<T>
    where
        F: FnOnce(Transaction) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.transaction_with(self.tx_defaults, body).await
    }

    /// Run `body` in a transaction: commit when it returns `Ok`, roll back
    /// when it returns `Err` or outlives the timeout.
    pub async fn transaction_with<T, F, Fut>(&self, options: TransactionOptions, body: F) -> Result<T>
    where
        F: FnOnce(Transaction) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let tx = self.begin_with(options).await?;
        let outcome = tokio::time::timeout_at(tx.deadline(), body(tx.clone())).await;

        match outcome {
            Ok(Ok(value)) => {
                tx.commit().await?;
                Ok(value)
            }
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "Transaction body failed, rolling back");
                tx.abort().await;
                Err(e)
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = options.timeout.as_millis() as u64,
                    "Transaction timed out, rolling back"
                );
                tx.abort().await;
                Err(DbError::Timeout("transaction timeout exceeded".to_string()))
            }
        }
    }
}
