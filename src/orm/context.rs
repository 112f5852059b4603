//! Per-database read settings shared by every repository

use std::collections::{HashMap, HashSet};

use super::traits::EntitySchema;
use crate::error::{DbError, Result};

/// Columns hidden from reads unless a query asks for them.
#[derive(Debug, Clone, Default)]
pub struct OmitRules {
    by_table: HashMap<&'static str, HashSet<&'static str>>,
}

impl OmitRules {
    /// Resolve `table.column` entries against the known schemas.
    ///
    /// Only nullable columns can be omitted: an omitted column is read back
    /// as NULL.
    pub fn resolve<S: AsRef<str>>(entries: &[S], schemas: &[&'static EntitySchema]) -> Result<Self> {
        let mut rules = Self::default();
        for entry in entries {
            let entry = entry.as_ref().trim();
            if entry.is_empty() {
                continue;
            }
            let (table, column) = entry.split_once('.').ok_or_else(|| {
                DbError::validation(format!("omit entry `{}` must be `table.column`", entry))
            })?;
            let schema = schemas
                .iter()
                .find(|s| s.table == table)
                .ok_or_else(|| DbError::validation(format!("unknown table `{}` in omit rules", table)))?;
            let column = omittable(schema, column)?;
            rules.by_table.entry(schema.table).or_default().insert(column);
        }
        Ok(rules)
    }

    /// Columns of `schema` to omit, after applying per-query overrides.
    ///
    /// An override of `true` hides a column, `false` reveals it.
    pub fn columns_for(
        &self,
        schema: &'static EntitySchema,
        overrides: &[(String, bool)],
    ) -> Result<Vec<&'static str>> {
        let mut columns: HashSet<&'static str> =
            self.by_table.get(schema.table).cloned().unwrap_or_default();
        for (field, hide) in overrides {
            let column = omittable(schema, field)?;
            if *hide {
                columns.insert(column);
            } else {
                columns.remove(column);
            }
        }
        Ok(schema
            .columns
            .iter()
            .map(|c| c.name)
            .filter(|name| columns.contains(name))
            .collect())
    }

    pub fn is_empty(&self) -> bool {
        self.by_table.values().all(|c| c.is_empty())
    }
}

fn omittable(schema: &'static EntitySchema, field: &str) -> Result<&'static str> {
    let column = schema.require_column(field)?;
    if !column.nullable {
        return Err(DbError::validation(format!(
            "`{}.{}` is required and cannot be omitted",
            schema.table, column.name
        )));
    }
    Ok(column.name)
}

/// Settings every read needs, shared by repositories of one database.
#[derive(Debug, Clone, Default)]
pub struct QueryContext {
    pub omit: OmitRules,
}

impl QueryContext {
    pub fn new(omit: OmitRules) -> Self {
        Self { omit }
    }
}
