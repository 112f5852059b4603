//! Bound values and column type conversions
//!
//! SQLite has no native UUID, boolean or timestamp types. Everything that
//! crosses the storage boundary goes through [`SqlValue`], and every Rust field
//! type an entity may use implements [`ColumnValue`] to describe how it is
//! stored and decoded.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::Row;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Sqlite, query::Query};

use crate::db::sqlite_helpers::{bool_to_int, datetime_to_str, int_to_bool, str_to_datetime};

/// Storage class of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Integer,
    Float,
    /// Stored as INTEGER 0/1
    Boolean,
    /// Stored as fixed-width RFC 3339 TEXT
    DateTime,
}

impl ColumnKind {
    /// SQLite column type used in CREATE TABLE
    pub fn sql_type(&self) -> &'static str {
        match self {
            ColumnKind::Text | ColumnKind::DateTime => "TEXT",
            ColumnKind::Integer | ColumnKind::Boolean => "INTEGER",
            ColumnKind::Float => "REAL",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnKind::Integer | ColumnKind::Float)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ColumnKind::Text => "text",
            ColumnKind::Integer => "integer",
            ColumnKind::Float => "float",
            ColumnKind::Boolean => "boolean",
            ColumnKind::DateTime => "datetime",
        }
    }
}

/// Represents a SQL value that can be bound to a query.
///
/// Used by filters, inputs and aggregates to collect values for
/// parameterized queries.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SqlValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Whether this value may be compared against a column of `kind`.
    pub fn fits(&self, kind: ColumnKind) -> bool {
        match (self, kind) {
            (SqlValue::Null, _) => true,
            (SqlValue::String(_), ColumnKind::Text | ColumnKind::DateTime) => true,
            (SqlValue::Int(_), ColumnKind::Integer | ColumnKind::Float) => true,
            (SqlValue::Float(_), ColumnKind::Float) => true,
            (SqlValue::Bool(_), ColumnKind::Boolean) => true,
            _ => false,
        }
    }

    /// Key used to group rows by a foreign key.
    pub fn key(&self) -> Option<String> {
        match self {
            SqlValue::String(s) => Some(s.clone()),
            SqlValue::Int(i) => Some(i.to_string()),
            _ => None,
        }
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::String(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::String(v)
    }
}

impl From<&String> for SqlValue {
    fn from(v: &String) -> Self {
        SqlValue::String(v.clone())
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::Int(v as i64)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Float(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(v: DateTime<Utc>) -> Self {
        SqlValue::String(datetime_to_str(v))
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

/// Bind this value to a sqlx query
pub fn bind_value<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &'q SqlValue,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        SqlValue::String(s) => query.bind(s.as_str()),
        SqlValue::Int(i) => query.bind(*i),
        SqlValue::Float(f) => query.bind(*f),
        SqlValue::Bool(b) => query.bind(bool_to_int(*b)),
        SqlValue::Null => query.bind(None::<String>),
    }
}

/// Bind every value in order.
pub fn bind_all<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    values: &'q [SqlValue],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for value in values {
        query = bind_value(query, value);
    }
    query
}

/// Decode a column of a known kind into a [`SqlValue`].
pub fn decode_value(
    row: &SqliteRow,
    column: &str,
    kind: ColumnKind,
) -> Result<SqlValue, sqlx::Error> {
    let value = match kind {
        ColumnKind::Text | ColumnKind::DateTime => row
            .try_get::<Option<String>, _>(column)?
            .map(SqlValue::String),
        ColumnKind::Integer => row.try_get::<Option<i64>, _>(column)?.map(SqlValue::Int),
        ColumnKind::Boolean => row
            .try_get::<Option<i64>, _>(column)?
            .map(|i| SqlValue::Bool(int_to_bool(i))),
        ColumnKind::Float => row.try_get::<Option<f64>, _>(column)?.map(SqlValue::Float),
    };
    Ok(value.unwrap_or(SqlValue::Null))
}

/// Decode a column straight into the field type of an entity.
pub fn decode_column<T: ColumnValue>(row: &SqliteRow, column: &str) -> Result<T, sqlx::Error> {
    let value = decode_value(row, column, T::KIND)?;
    T::from_value(value).map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: e.into(),
    })
}

/// A Rust type that can be stored in a single column.
pub trait ColumnValue: Sized {
    const KIND: ColumnKind;
    const NULLABLE: bool = false;

    fn to_value(&self) -> SqlValue;

    fn from_value(value: SqlValue) -> anyhow::Result<Self>;
}

fn unexpected<T>(expected: ColumnKind, got: &SqlValue) -> anyhow::Result<T> {
    Err(anyhow::anyhow!(
        "expected {} value, got {:?}",
        expected.name(),
        got
    ))
}

impl ColumnValue for String {
    const KIND: ColumnKind = ColumnKind::Text;

    fn to_value(&self) -> SqlValue {
        SqlValue::String(self.clone())
    }

    fn from_value(value: SqlValue) -> anyhow::Result<Self> {
        match value {
            SqlValue::String(s) => Ok(s),
            other => unexpected(Self::KIND, &other),
        }
    }
}

impl ColumnValue for i32 {
    const KIND: ColumnKind = ColumnKind::Integer;

    fn to_value(&self) -> SqlValue {
        SqlValue::Int(*self as i64)
    }

    fn from_value(value: SqlValue) -> anyhow::Result<Self> {
        match value {
            SqlValue::Int(i) => Ok(i32::try_from(i)?),
            other => unexpected(Self::KIND, &other),
        }
    }
}

impl ColumnValue for i64 {
    const KIND: ColumnKind = ColumnKind::Integer;

    fn to_value(&self) -> SqlValue {
        SqlValue::Int(*self)
    }

    fn from_value(value: SqlValue) -> anyhow::Result<Self> {
        match value {
            SqlValue::Int(i) => Ok(i),
            other => unexpected(Self::KIND, &other),
        }
    }
}

impl ColumnValue for f64 {
    const KIND: ColumnKind = ColumnKind::Float;

    fn to_value(&self) -> SqlValue {
        SqlValue::Float(*self)
    }

    fn from_value(value: SqlValue) -> anyhow::Result<Self> {
        match value {
            SqlValue::Float(f) => Ok(f),
            SqlValue::Int(i) => Ok(i as f64),
            other => unexpected(Self::KIND, &other),
        }
    }
}

impl ColumnValue for bool {
    const KIND: ColumnKind = ColumnKind::Boolean;

    fn to_value(&self) -> SqlValue {
        SqlValue::Bool(*self)
    }

    fn from_value(value: SqlValue) -> anyhow::Result<Self> {
        match value {
            SqlValue::Bool(b) => Ok(b),
            other => unexpected(Self::KIND, &other),
        }
    }
}

impl ColumnValue for DateTime<Utc> {
    const KIND: ColumnKind = ColumnKind::DateTime;

    fn to_value(&self) -> SqlValue {
        SqlValue::String(datetime_to_str(*self))
    }

    fn from_value(value: SqlValue) -> anyhow::Result<Self> {
        match value {
            SqlValue::String(s) => str_to_datetime(&s),
            other => unexpected(Self::KIND, &other),
        }
    }
}

impl<T: ColumnValue> ColumnValue for Option<T> {
    const KIND: ColumnKind = T::KIND;
    const NULLABLE: bool = true;

    fn to_value(&self) -> SqlValue {
        match self {
            Some(v) => v.to_value(),
            None => SqlValue::Null,
        }
    }

    fn from_value(value: SqlValue) -> anyhow::Result<Self> {
        match value {
            SqlValue::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}
