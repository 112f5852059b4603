//! Scoped transactions
//!
//! A [`Transaction`] owns one connection for its lifetime. Repositories taken
//! from it run on that connection, bounded by the transaction deadline.
//! Dropping the last handle without committing rolls everything back.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use super::connection::{ConnHandle, SharedTx};
use crate::entities::{
    Certification, Education, Employment, Job, Profile, Project, Skill, User,
};
use crate::error::{DbError, Result};
use crate::orm::{Entity, QueryContext, Repository};

/// Isolation level requested for a transaction.
///
/// SQLite transactions are serializable, which satisfies every level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    #[default]
    Serializable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionOptions {
    /// Time allowed to start the transaction
    pub max_wait: Duration,
    /// Time allowed from start to commit
    pub timeout: Duration,
    pub isolation_level: IsolationLevel,
}

impl Default for TransactionOptions {
    fn default() -> Self {
        Self {
            max_wait: Duration::from_millis(2000),
            timeout: Duration::from_millis(5000),
            isolation_level: IsolationLevel::default(),
        }
    }
}

impl TransactionOptions {
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_isolation_level(mut self, level: IsolationLevel) -> Self {
        self.isolation_level = level;
        self
    }
}

/// Handle to an open transaction. Clones share the same transaction.
#[derive(Clone)]
pub struct Transaction {
    tx: SharedTx,
    deadline: Instant,
    ctx: Arc<QueryContext>,
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("deadline", &self.deadline)
            .finish()
    }
}

impl Transaction {
    pub(crate) fn new(
        tx: sqlx::Transaction<'static, sqlx::Sqlite>,
        deadline: Instant,
        ctx: Arc<QueryContext>,
    ) -> Self {
        Self {
            tx: Arc::new(Mutex::new(Some(tx))),
            deadline,
            ctx,
        }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Repository for any entity, bound to this transaction
    pub fn repository<E: Entity>(&self) -> Repository<E> {
        Repository::new(
            ConnHandle::Tx {
                tx: self.tx.clone(),
                deadline: self.deadline,
            },
            self.ctx.clone(),
        )
    }

    pub fn users(&self) -> Repository<User> {
        self.repository()
    }

    pub fn profiles(&self) -> Repository<Profile> {
        self.repository()
    }

    pub fn skills(&self) -> Repository<Skill> {
        self.repository()
    }

    pub fn employments(&self) -> Repository<Employment> {
        self.repository()
    }

    pub fn educations(&self) -> Repository<Education> {
        self.repository()
    }

    pub fn projects(&self) -> Repository<Project> {
        self.repository()
    }

    pub fn certifications(&self) -> Repository<Certification> {
        self.repository()
    }

    pub fn jobs(&self) -> Repository<Job> {
        self.repository()
    }

    /// Commit every change made through this transaction.
    ///
    /// Fails with a timeout, and rolls back, once the deadline has passed.
    pub async fn commit(self) -> Result<()> {
        let tx = self.take().await?;
        if Instant::now() >= self.deadline {
            rollback_quietly(tx).await;
            return Err(DbError::Timeout("transaction timeout exceeded".to_string()));
        }
        tx.commit().await?;
        tracing::debug!("Transaction committed");
        Ok(())
    }

    pub async fn rollback(self) -> Result<()> {
        let tx = self.take().await?;
        tx.rollback().await?;
        tracing::debug!("Transaction rolled back");
        Ok(())
    }

    /// Whether the transaction is still open
    pub async fn is_open(&self) -> bool {
        self.tx.lock().await.is_some()
    }

    async fn take(&self) -> Result<sqlx::Transaction<'static, sqlx::Sqlite>> {
        let mut slot = tokio::time::timeout_at(self.deadline, self.tx.lock())
            .await
            .map_err(|_| DbError::Timeout("transaction timeout exceeded".to_string()))?;
        slot.take().ok_or(DbError::TransactionClosed)
    }

    /// Roll back whatever is still open, ignoring an already closed slot.
    pub(crate) async fn abort(&self) {
        let tx = self.tx.lock().await.take();
        if let Some(tx) = tx {
            rollback_quietly(tx).await;
        }
    }
}

async fn rollback_quietly(tx: sqlx::Transaction<'static, sqlx::Sqlite>) {
    if let Err(e) = tx.rollback().await {
        tracing::warn!(error = %e, "Transaction rollback failed");
    }
}
