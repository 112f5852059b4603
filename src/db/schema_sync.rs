//! Automatic schema synchronization from entity definitions
//!
//! - Compares entity schemas to the current database schema
//! - Creates missing tables and foreign key indexes
//! - Adds missing columns
//! - Does NOT handle column renames or type changes (requires DB wipe)

use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use crate::orm::{ColumnDef, EntitySchema};

/// Result of a schema sync operation
#[derive(Debug, Default, serde::Serialize)]
pub struct SchemaSyncResult {
    pub tables_created: Vec<String>,
    pub columns_added: Vec<(String, String)>, // (table, column)
    pub indexes_created: Vec<String>,
    pub errors: Vec<String>,
}

impl SchemaSyncResult {
    fn merge(&mut self, other: SchemaSyncResult) {
        self.tables_created.extend(other.tables_created);
        self.columns_added.extend(other.columns_added);
        self.indexes_created.extend(other.indexes_created);
        self.errors.extend(other.errors);
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Check if a table exists in the database
async fn table_exists(pool: &SqlitePool, table_name: &str) -> Result<bool, sqlx::Error> {
    let result: Option<(String,)> =
        sqlx::query_as("SELECT name FROM sqlite_master WHERE type='table' AND name = ?")
            .bind(table_name)
            .fetch_optional(pool)
            .await?;

    Ok(result.is_some())
}

/// Get existing columns for a table
async fn get_table_columns(
    pool: &SqlitePool,
    table_name: &str,
) -> Result<Vec<String>, sqlx::Error> {
    let rows: Vec<(i32, String, String, i32, Option<String>, i32)> =
        sqlx::query_as(&format!("PRAGMA table_info({})", table_name))
            .fetch_all(pool)
            .await?;

    Ok(rows.into_iter().map(|(_, name, _, _, _, _)| name).collect())
}

async fn index_exists(pool: &SqlitePool, index_name: &str) -> Result<bool, sqlx::Error> {
    let result: Option<(String,)> =
        sqlx::query_as("SELECT name FROM sqlite_master WHERE type='index' AND name = ?")
            .bind(index_name)
            .fetch_optional(pool)
            .await?;

    Ok(result.is_some())
}

/// Sync a single entity's table to the database
pub async fn sync_entity(
    pool: &SqlitePool,
    schema: &EntitySchema,
) -> Result<SchemaSyncResult, sqlx::Error> {
    let mut result = SchemaSyncResult::default();
    let table_name = schema.table;

    if !table_exists(pool, table_name).await? {
        let create_sql = schema.create_table_sql();
        debug!("Creating table {}: {}", table_name, create_sql);

        match sqlx::query(&create_sql).execute(pool).await {
            Ok(_) => {
                info!("Created table: {}", table_name);
                result.tables_created.push(table_name.to_string());
            }
            Err(e) => {
                let msg = format!("Failed to create table {}: {}", table_name, e);
                warn!("{}", msg);
                result.errors.push(msg);
                return Ok(result);
            }
        }
    } else {
        let existing_columns = get_table_columns(pool, table_name).await?;

        for col_def in schema.columns {
            if existing_columns.iter().any(|c| c == col_def.name) {
                continue;
            }

            let alter_sql = match generate_add_column_sql(table_name, col_def) {
                Ok(sql) => sql,
                Err(msg) => {
                    warn!("{}", msg);
                    result.errors.push(msg);
                    continue;
                }
            };
            debug!("Adding column to {}: {}", table_name, alter_sql);

            match sqlx::query(&alter_sql).execute(pool).await {
                Ok(_) => {
                    info!("Added column {}.{}", table_name, col_def.name);
                    result
                        .columns_added
                        .push((table_name.to_string(), col_def.name.to_string()));
                }
                Err(e) => {
                    let msg = format!(
                        "Failed to add column {}.{}: {}",
                        table_name, col_def.name, e
                    );
                    warn!("{}", msg);
                    result.errors.push(msg);
                }
            }
        }
    }

    for (index_name, index_sql) in schema_indexes(schema) {
        if index_exists(pool, &index_name).await? {
            continue;
        }
        match sqlx::query(&index_sql).execute(pool).await {
            Ok(_) => {
                debug!("Created index {}", index_name);
                result.indexes_created.push(index_name);
            }
            Err(e) => {
                let msg = format!("Failed to create index {}: {}", index_name, e);
                warn!("{}", msg);
                result.errors.push(msg);
            }
        }
    }

    Ok(result)
}

fn schema_indexes(schema: &EntitySchema) -> Vec<(String, String)> {
    schema
        .index_sql()
        .into_iter()
        .filter_map(|sql| {
            let name = sql.split_whitespace().nth(5)?.to_string();
            Some((name, sql))
        })
        .collect()
}

/// Generate ALTER TABLE ADD COLUMN SQL
///
/// SQLite cannot add PRIMARY KEY or UNIQUE columns, and NOT NULL columns
/// need a default.
fn generate_add_column_sql(table_name: &str, col: &ColumnDef) -> Result<String, String> {
    if col.is_primary_key || col.is_unique {
        return Err(format!(
            "Cannot add key column {}.{} to an existing table",
            table_name, col.name
        ));
    }

    let mut sql = format!(
        "ALTER TABLE {} ADD COLUMN {} {}",
        table_name,
        col.name,
        col.kind.sql_type()
    );

    if let Some(default) = col.default {
        if !col.nullable {
            sql.push_str(" NOT NULL");
        }
        sql.push_str(&format!(" DEFAULT {}", default));
    } else if !col.nullable {
        let default_val = match col.kind.sql_type() {
            "INTEGER" => "0",
            "REAL" => "0.0",
            _ => "''",
        };
        sql.push_str(&format!(" NOT NULL DEFAULT {}", default_val));
    }

    if let Some(fk) = col.references {
        sql.push_str(&format!(" REFERENCES {}({})", fk.table, fk.column));
    }

    Ok(sql)
}

/// Sync all entity tables to the database, parents first.
pub async fn sync_all_entity_schemas(pool: &SqlitePool) -> SchemaSyncResult {
    let mut total_result = SchemaSyncResult::default();

    for schema in crate::entities::schemas() {
        match sync_entity(pool, schema).await {
            Ok(result) => total_result.merge(result),
            Err(e) => {
                total_result
                    .errors
                    .push(format!("Error syncing {}: {}", schema.name, e));
            }
        }
    }

    total_result
}
