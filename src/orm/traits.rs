//! Core traits for the ORM layer
//!
//! `DatabaseEntity`, `FromSqlRow`, `FieldAccess` and `RelationLoader` are
//! implemented by `#[derive(Entity)]` from `careerdb-macros`. The create and
//! update inputs of each entity implement `InsertValues` and `ChangeSet` by hand.

use futures::future::BoxFuture;
use sqlx::SqliteConnection;
use sqlx::sqlite::SqliteRow;

use super::context::QueryContext;
use super::relations::Include;
use super::value::{ColumnKind, SqlValue};
use crate::error::{DbError, Result};

/// Foreign key target of a column.
#[derive(Debug, Clone, Copy)]
pub struct ForeignKeyDef {
    pub table: &'static str,
    pub column: &'static str,
}

/// Column definition for schema generation and request validation.
#[derive(Debug, Clone, Copy)]
pub struct ColumnDef {
    /// Column name in the database
    pub name: &'static str,
    pub kind: ColumnKind,
    /// Whether the column can be NULL
    pub nullable: bool,
    /// Whether this is the primary key
    pub is_primary_key: bool,
    pub is_unique: bool,
    pub references: Option<ForeignKeyDef>,
    /// Default value expression used when the column is added to an existing table
    pub default: Option<&'static str>,
}

impl ColumnDef {
    /// Generate the column definition SQL
    pub fn to_sql(&self) -> String {
        let mut sql = format!("{} {}", self.name, self.kind.sql_type());

        if self.is_primary_key {
            sql.push_str(" PRIMARY KEY");
        }

        if !self.nullable && !self.is_primary_key {
            sql.push_str(" NOT NULL");
        }

        if self.is_unique && !self.is_primary_key {
            sql.push_str(" UNIQUE");
        }

        if let Some(default) = self.default {
            sql.push_str(&format!(" DEFAULT {}", default));
        }

        if let Some(fk) = self.references {
            sql.push_str(&format!(" REFERENCES {}({})", fk.table, fk.column));
        }

        sql
    }
}

/// Shape of a relation between two entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    /// The target holds a foreign key to this entity; at most one row.
    HasOne,
    /// The target holds a foreign key to this entity.
    HasMany,
    /// This entity holds a foreign key to the target.
    BelongsTo,
}

impl RelationKind {
    pub fn is_to_many(&self) -> bool {
        matches!(self, RelationKind::HasMany)
    }

    /// Owned relations are deleted together with their parent.
    pub fn is_owned(&self) -> bool {
        matches!(self, RelationKind::HasOne | RelationKind::HasMany)
    }
}

/// Relation metadata.
///
/// Rows are related when `target.foreign_column = this.local_column`.
#[derive(Debug, Clone, Copy)]
pub struct RelationDef {
    pub name: &'static str,
    pub kind: RelationKind,
    pub target: fn() -> &'static EntitySchema,
    pub local_column: &'static str,
    pub foreign_column: &'static str,
}

/// Static description of an entity's table.
#[derive(Debug)]
pub struct EntitySchema {
    /// The SQL table name (e.g., "users")
    pub table: &'static str,
    /// Display name used in errors (e.g., "User")
    pub name: &'static str,
    /// The primary key column name
    pub primary_key: &'static str,
    pub columns: &'static [ColumnDef],
    pub relations: &'static [RelationDef],
    /// Column stamped on insert, if any
    pub created_at: Option<&'static str>,
    /// Column stamped on insert and every update, if any
    pub updated_at: Option<&'static str>,
}

impl EntitySchema {
    pub fn column(&self, name: &str) -> Option<&'static ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Look up a column, failing validation when it does not exist.
    pub fn require_column(&self, name: &str) -> Result<&'static ColumnDef> {
        self.column(name).ok_or_else(|| {
            DbError::validation(format!("unknown field `{}` on {}", name, self.name))
        })
    }

    pub fn relation(&self, name: &str) -> Option<&'static RelationDef> {
        self.relations.iter().find(|r| r.name == name)
    }

    pub fn require_relation(&self, name: &str) -> Result<&'static RelationDef> {
        self.relation(name).ok_or_else(|| {
            DbError::validation(format!("unknown relation `{}` on {}", name, self.name))
        })
    }

    /// Look up a column usable as a unique key (primary key or UNIQUE).
    pub fn require_unique(&self, name: &str) -> Result<&'static ColumnDef> {
        let column = self.require_column(name)?;
        if column.is_primary_key || column.is_unique {
            Ok(column)
        } else {
            Err(DbError::validation(format!(
                "`{}` is not a unique field of {}",
                name, self.name
            )))
        }
    }

    /// List of all column names in the table
    pub fn column_names(&self) -> Vec<&'static str> {
        self.columns.iter().map(|c| c.name).collect()
    }

    /// Generate CREATE TABLE IF NOT EXISTS SQL
    pub fn create_table_sql(&self) -> String {
        let column_defs: Vec<String> = self.columns.iter().map(|c| c.to_sql()).collect();

        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n  {}\n)",
            self.table,
            column_defs.join(",\n  ")
        )
    }

    /// Indexes on foreign key columns that are not already unique
    pub fn index_sql(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| c.references.is_some() && !c.is_unique && !c.is_primary_key)
            .map(|c| {
                format!(
                    "CREATE INDEX IF NOT EXISTS idx_{}_{} ON {} ({})",
                    self.table, c.name, self.table, c.name
                )
            })
            .collect()
    }
}

/// Metadata about a database entity (table).
///
/// Implemented by `#[derive(Entity)]` macro.
pub trait DatabaseEntity: Sized + Send + Sync {
    /// The SQL table name (e.g., "users")
    const TABLE_NAME: &'static str;

    /// Display name (e.g., "User")
    const ENTITY_NAME: &'static str;

    fn schema() -> &'static EntitySchema;
}

/// Trait for decoding a database row into an entity.
///
/// Relation fields are left unloaded.
pub trait FromSqlRow: Sized {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error>;
}

/// Read a column value from a decoded entity by name.
pub trait FieldAccess {
    /// Returns None if the column doesn't exist on this entity.
    fn field_value(&self, column: &str) -> Option<SqlValue>;
}

/// Trait for loading requested relations onto already-fetched entities.
///
/// Implemented by `#[derive(Entity)]`. Loads in bulk: one query per relation
/// for the whole slice, never one per entity.
pub trait RelationLoader: Sized {
    fn load_relations<'a>(
        entities: &'a mut [Self],
        include: &'a Include,
        conn: &'a mut SqliteConnection,
        ctx: &'a QueryContext,
    ) -> BoxFuture<'a, Result<()>>;
}

/// Column values of a create input, with defaults applied.
///
/// Timestamps are never part of the input; the repository stamps them.
/// The primary key is included only when the caller chose one.
pub trait InsertValues: Send + Sync {
    fn insert_values(&self) -> Vec<(&'static str, SqlValue)>;

    fn validate(&self) -> Result<()> {
        Ok(())
    }
}

/// Column assignments of a partial update. Unset fields are left untouched.
pub trait ChangeSet: Send + Sync {
    fn assignments(&self) -> Vec<(&'static str, SqlValue)>;

    fn validate(&self) -> Result<()> {
        Ok(())
    }
}

/// Everything a [`Repository`](super::Repository) needs from an entity type.
pub trait Entity:
    DatabaseEntity
    + FromSqlRow
    + FieldAccess
    + RelationLoader
    + Clone
    + std::fmt::Debug
    + Unpin
    + 'static
{
    type Create: InsertValues;
    type Update: ChangeSet;
}

/// Result of bulk writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct BatchPayload {
    pub count: u64,
}

/// Sort direction for ORDER BY clauses.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum OrderDirection {
    /// Ascending order (A-Z, 1-9, oldest-newest)
    #[default]
    Asc,
    /// Descending order (Z-A, 9-1, newest-oldest)
    Desc,
}

impl OrderDirection {
    /// Convert to SQL order string
    pub fn to_sql(&self) -> &'static str {
        match self {
            OrderDirection::Asc => "ASC",
            OrderDirection::Desc => "DESC",
        }
    }

    pub fn reversed(&self) -> Self {
        match self {
            OrderDirection::Asc => OrderDirection::Desc,
            OrderDirection::Desc => OrderDirection::Asc,
        }
    }
}

/// Placement of NULLs in an ordering.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum NullsOrder {
    First,
    Last,
}

impl NullsOrder {
    pub fn to_sql(&self) -> &'static str {
        match self {
            NullsOrder::First => "NULLS FIRST",
            NullsOrder::Last => "NULLS LAST",
        }
    }
}

/// One ordering term.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub direction: OrderDirection,
    /// `None` keeps SQLite's default (NULLs sort as the smallest value)
    pub nulls: Option<NullsOrder>,
}

impl OrderBy {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: OrderDirection::Asc,
            nulls: None,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: OrderDirection::Desc,
            nulls: None,
        }
    }

    pub fn nulls_first(mut self) -> Self {
        self.nulls = Some(NullsOrder::First);
        self
    }

    pub fn nulls_last(mut self) -> Self {
        self.nulls = Some(NullsOrder::Last);
        self
    }

    /// Effective null placement, resolving SQLite's default.
    pub fn effective_nulls(&self) -> NullsOrder {
        match (self.nulls, self.direction) {
            (Some(n), _) => n,
            (None, OrderDirection::Asc) => NullsOrder::First,
            (None, OrderDirection::Desc) => NullsOrder::Last,
        }
    }

    /// The same term read backwards.
    pub fn reversed(&self) -> Self {
        let nulls = match self.effective_nulls() {
            NullsOrder::First => NullsOrder::Last,
            NullsOrder::Last => NullsOrder::First,
        };
        Self {
            field: self.field.clone(),
            direction: self.direction.reversed(),
            nulls: Some(nulls),
        }
    }
}
