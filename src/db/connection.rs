//! Connection handles shared by repositories
//!
//! A repository either draws a connection from the pool for each operation or
//! runs on the single connection of an open transaction.

use std::future::Future;
use std::sync::Arc;

use sqlx::pool::PoolConnection;
use sqlx::{Sqlite, SqliteConnection, SqlitePool};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::Instant;

use crate::error::{DbError, Result};

/// Open transaction shared between a [`Transaction`](super::Transaction) and
/// the repositories created from it. `None` once committed or rolled back.
pub(crate) type SharedTx = Arc<Mutex<Option<sqlx::Transaction<'static, Sqlite>>>>;

#[derive(Clone)]
pub enum ConnHandle {
    Pool(SqlitePool),
    Tx { tx: SharedTx, deadline: Instant },
}

impl std::fmt::Debug for ConnHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnHandle::Pool(pool) => f.debug_tuple("Pool").field(&pool.size()).finish(),
            ConnHandle::Tx { deadline, .. } => f.debug_struct("Tx").field("deadline", deadline).finish(),
        }
    }
}

/// A connection checked out for one repository operation.
pub enum ConnGuard {
    Pooled(PoolConnection<Sqlite>),
    Tx(OwnedMutexGuard<Option<sqlx::Transaction<'static, Sqlite>>>),
}

impl ConnHandle {
    pub async fn acquire(&self) -> Result<ConnGuard> {
        match self {
            ConnHandle::Pool(pool) => Ok(ConnGuard::Pooled(pool.acquire().await?)),
            ConnHandle::Tx { tx, .. } => {
                let guard = tx.clone().lock_owned().await;
                if guard.is_none() {
                    return Err(DbError::TransactionClosed);
                }
                Ok(ConnGuard::Tx(guard))
            }
        }
    }

    /// Run one repository operation, bounded by the transaction deadline
    /// when running inside a transaction.
    pub async fn run<T, F>(&self, op: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match self {
            ConnHandle::Pool(_) => op.await,
            ConnHandle::Tx { deadline, .. } => {
                if Instant::now() >= *deadline {
                    return Err(DbError::Timeout("transaction timeout exceeded".to_string()));
                }
                tokio::time::timeout_at(*deadline, op)
                    .await
                    .map_err(|_| DbError::Timeout("transaction timeout exceeded".to_string()))?
            }
        }
    }

    pub fn in_transaction(&self) -> bool {
        matches!(self, ConnHandle::Tx { .. })
    }
}

impl ConnGuard {
    pub fn connection(&mut self) -> Result<&mut SqliteConnection> {
        match self {
            ConnGuard::Pooled(conn) => Ok(&mut **conn),
            ConnGuard::Tx(guard) => match &mut **guard {
                Some(tx) => Ok(&mut **tx),
                None => Err(DbError::TransactionClosed),
            },
        }
    }
}
