//! Error taxonomy for the data-access layer
//!
//! Every repository operation returns [`DbError`]. Storage failures coming out
//! of sqlx are classified so callers can tell a missed lookup from a unique
//! collision, a malformed request, or a backend that is temporarily unavailable.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T, E = DbError> = std::result::Result<T, E>;

/// Which kind of constraint the storage engine rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    Unique,
    ForeignKey,
    NotNull,
    Check,
}

impl ConstraintKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConstraintKind::Unique => "unique",
            ConstraintKind::ForeignKey => "foreign key",
            ConstraintKind::NotNull => "not null",
            ConstraintKind::Check => "check",
        }
    }
}

#[derive(Debug, Error)]
pub enum DbError {
    /// A unique lookup (or a required relation) matched no row.
    #[error("{entity} not found")]
    NotFound { entity: &'static str },

    /// The storage engine rejected a write.
    #[error("{} constraint failed on {}: {message}", kind.as_str(), fields.join(", "))]
    ConstraintViolation {
        kind: ConstraintKind,
        /// Column names reported by the engine (e.g. `["email"]`); empty for
        /// foreign-key failures, which SQLite does not attribute to a column.
        fields: Vec<String>,
        message: String,
    },

    /// The request itself is malformed; nothing was sent to storage.
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("connection error: {0}")]
    Connection(#[source] sqlx::Error),

    /// A repository handle outlived the transaction it was created from.
    #[error("transaction is already closed")]
    TransactionClosed,

    /// Backend failure that fits no other category.
    #[error("storage error: {0}")]
    Storage(#[source] sqlx::Error),
}

impl DbError {
    pub fn validation(message: impl Into<String>) -> Self {
        DbError::Validation(message.into())
    }

    /// Whether retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DbError::Timeout(_) | DbError::Connection(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DbError::NotFound { .. })
    }

    /// True for a unique violation that involves `field`.
    pub fn is_unique_violation_on(&self, field: &str) -> bool {
        match self {
            DbError::ConstraintViolation {
                kind: ConstraintKind::Unique,
                fields,
                ..
            } => fields.iter().any(|f| f == field),
            _ => false,
        }
    }
}

// SQLite extended result codes, see https://www.sqlite.org/rescode.html
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;
const SQLITE_CONSTRAINT_CHECK: i32 = 275;
const SQLITE_CONSTRAINT_FOREIGNKEY: i32 = 787;
const SQLITE_CONSTRAINT_NOTNULL: i32 = 1299;
const SQLITE_CONSTRAINT_PRIMARYKEY: i32 = 1555;
const SQLITE_CONSTRAINT_UNIQUE: i32 = 2067;

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::NotFound { entity: "row" },
            sqlx::Error::PoolTimedOut => {
                DbError::Timeout("timed out acquiring a pooled connection".to_string())
            }
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => DbError::Connection(err),
            sqlx::Error::Database(ref db_err) => {
                let code = db_err
                    .code()
                    .and_then(|c| c.parse::<i32>().ok())
                    .unwrap_or_default();
                let message = db_err.message().to_string();

                let kind = match code {
                    SQLITE_CONSTRAINT_UNIQUE | SQLITE_CONSTRAINT_PRIMARYKEY => {
                        Some(ConstraintKind::Unique)
                    }
                    SQLITE_CONSTRAINT_FOREIGNKEY => Some(ConstraintKind::ForeignKey),
                    SQLITE_CONSTRAINT_NOTNULL => Some(ConstraintKind::NotNull),
                    SQLITE_CONSTRAINT_CHECK => Some(ConstraintKind::Check),
                    _ => None,
                };

                if let Some(kind) = kind {
                    return DbError::ConstraintViolation {
                        kind,
                        fields: constraint_fields(&message),
                        message,
                    };
                }

                // Busy/locked carry extended codes in the low byte.
                match code & 0xff {
                    SQLITE_BUSY | SQLITE_LOCKED => DbError::Timeout(message),
                    _ => DbError::Storage(err),
                }
            }
            other => DbError::Storage(other),
        }
    }
}

/// Extract column names from messages like
/// `UNIQUE constraint failed: users.email, users.name`.
fn constraint_fields(message: &str) -> Vec<String> {
    let Some((_, targets)) = message.split_once(": ") else {
        return Vec::new();
    };

    targets
        .split(',')
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(|t| t.rsplit('.').next().unwrap_or(t).to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constraint_fields_single() {
        assert_eq!(
            constraint_fields("UNIQUE constraint failed: users.email"),
            vec!["email".to_string()]
        );
    }

    #[test]
    fn test_constraint_fields_composite() {
        assert_eq!(
            constraint_fields("UNIQUE constraint failed: skills.user_id, skills.name"),
            vec!["user_id".to_string(), "name".to_string()]
        );
    }

    #[test]
    fn test_constraint_fields_foreign_key() {
        assert!(constraint_fields("FOREIGN KEY constraint failed").is_empty());
    }

    #[test]
    fn test_unique_violation_on() {
        let err = DbError::ConstraintViolation {
            kind: ConstraintKind::Unique,
            fields: vec!["email".to_string()],
            message: "UNIQUE constraint failed: users.email".to_string(),
        };
        assert!(err.is_unique_violation_on("email"));
        assert!(!err.is_unique_violation_on("name"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_pool_timeout_is_retryable() {
        let err = DbError::from(sqlx::Error::PoolTimedOut);
        assert!(matches!(err, DbError::Timeout(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        assert!(DbError::from(sqlx::Error::RowNotFound).is_not_found());
    }
}
