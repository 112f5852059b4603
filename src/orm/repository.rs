//! Repository pattern for entity data access
//!
//! [`Repository<E>`] is the one CRUD surface shared by every entity. It works
//! the same against the pool and inside a transaction; see
//! [`Database::begin`](crate::db::Database::begin).
//!
//! # Example Usage
//!
//! ```rust,ignore
//! let users = db.users();
//!
//! // Verified users, newest first, with their skills
//! let page = users
//!     .query()
//!     .filter(Filter::eq("is_verified", true))
//!     .order_by(OrderBy::desc("created_at"))
//!     .include(Include::new().with("skills"))
//!     .take(20)
//!     .fetch_all()
//!     .await?;
//!
//! // Count users without a profile
//! let count = users.count_query().filter(Filter::absent("profile")).execute().await?;
//! ```

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use futures::future::BoxFuture;
use sqlx::{Connection, SqliteConnection};

use super::builder::{EntityQuery, clamp_limit, clamp_offset};
use super::context::QueryContext;
use super::filter::Filter;
use super::relations::{Include, RELATION_CHUNK_SIZE, distinct_by, paginate};
use super::traits::{
    BatchPayload, ChangeSet, ColumnDef, Entity, EntitySchema, InsertValues, OrderBy,
};
use super::value::{SqlValue, bind_all, decode_value};
use crate::db::connection::ConnHandle;
use crate::db::sqlite_helpers::{in_list_sql, new_id, now, placeholders};
use crate::error::{DbError, Result};

/// A value of a unique column identifying at most one row.
#[derive(Debug, Clone, PartialEq)]
pub struct UniqueKey {
    pub field: String,
    pub value: SqlValue,
}

impl UniqueKey {
    pub fn new(field: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Primary key lookup.
    pub fn id(id: impl Into<String>) -> Self {
        Self::new("id", id.into())
    }
}

/// Arguments of `find_many`, `find_first` and their variants.
#[derive(Debug, Clone, Default)]
pub struct FindManyArgs {
    pub filter: Option<Filter>,
    pub order_by: Vec<OrderBy>,
    /// Page starts at this row (inclusive)
    pub cursor: Option<UniqueKey>,
    /// Negative pages backwards from the cursor (or from the end)
    pub take: Option<i64>,
    pub skip: Option<u64>,
    /// Keep the first row of each distinct combination of these fields
    pub distinct: Vec<String>,
    pub include: Include,
    /// Per-query omission overrides; `true` hides, `false` reveals
    pub omit: Vec<(String, bool)>,
}

/// Generic repository over one entity.
pub struct Repository<E: Entity> {
    pub(crate) conn: ConnHandle,
    pub(crate) ctx: Arc<QueryContext>,
    _marker: PhantomData<fn() -> E>,
}

impl<E: Entity> Clone for Repository<E> {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
            ctx: self.ctx.clone(),
            _marker: PhantomData,
        }
    }
}

impl<E: Entity> std::fmt::Debug for Repository<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("entity", &E::ENTITY_NAME)
            .field("conn", &self.conn)
            .finish()
    }
}

impl<E: Entity> Repository<E> {
    pub(crate) fn new(conn: ConnHandle, ctx: Arc<QueryContext>) -> Self {
        Self {
            conn,
            ctx,
            _marker: PhantomData,
        }
    }

    /// Start a fluent find query.
    pub fn query(&self) -> FindQuery<'_, E> {
        FindQuery::new(self)
    }

    /// Start a fluent count query.
    pub fn count_query(&self) -> CountQuery<'_, E> {
        CountQuery::new(self)
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub async fn find_unique(&self, key: UniqueKey) -> Result<Option<E>> {
        self.find_unique_with(key, Include::new()).await
    }

    /// Unique lookup loading `include` on the result.
    pub async fn find_unique_with(&self, key: UniqueKey, include: Include) -> Result<Option<E>> {
        let column = self.unique_column(&key)?;
        self.find_first(FindManyArgs {
            filter: Some(Filter::eq(column.name, key.value)),
            include,
            ..Default::default()
        })
        .await
    }

    pub async fn find_unique_or_throw(&self, key: UniqueKey) -> Result<E> {
        self.find_unique(key).await?.ok_or(DbError::NotFound {
            entity: E::ENTITY_NAME,
        })
    }

    pub async fn find_first(&self, mut args: FindManyArgs) -> Result<Option<E>> {
        args.take = Some(match args.take {
            Some(t) if t < 0 => -1,
            _ => 1,
        });
        Ok(self.find_many(args).await?.into_iter().next())
    }

    pub async fn find_first_or_throw(&self, args: FindManyArgs) -> Result<E> {
        self.find_first(args).await?.ok_or(DbError::NotFound {
            entity: E::ENTITY_NAME,
        })
    }

    pub async fn find_many(&self, args: FindManyArgs) -> Result<Vec<E>> {
        let schema = E::schema();
        args.include.validate(schema)?;
        for field in &args.distinct {
            schema.require_column(field)?;
        }

        self.conn
            .run(async {
                let mut guard = self.conn.acquire().await?;
                let conn = guard.connection()?;

                if args.include.is_empty() {
                    return self.read(conn, &args).await;
                }

                // One read transaction for the rows and every relation.
                let mut tx = conn.begin().await?;
                let mut rows = self.read(&mut tx, &args).await?;
                E::load_relations(&mut rows, &args.include, &mut tx, &self.ctx).await?;
                tx.commit().await?;
                Ok(rows)
            })
            .await
    }

    async fn read(&self, conn: &mut SqliteConnection, args: &FindManyArgs) -> Result<Vec<E>> {
        let omitted = self.ctx.omit.columns_for(E::schema(), &args.omit)?;
        let backwards = args.take.is_some_and(|t| t < 0);

        let mut query = EntityQuery::<E>::new();
        if let Some(filter) = &args.filter {
            query = query.filter(filter)?;
        }
        query = query.order_by(&args.order_by)?.omit(omitted);
        if backwards {
            query = query.reverse();
        }

        if let Some(cursor) = &args.cursor {
            match self.cursor_position(conn, &query, cursor).await? {
                Some(position) => query = query.starting_at(&position),
                None => return Ok(Vec::new()),
            }
        }

        if !args.distinct.is_empty() {
            // Distinct is resolved in memory, before skip and take.
            let mut rows = query.fetch_all(conn).await?;
            if backwards {
                rows.reverse();
            }
            return Ok(paginate(distinct_by(rows, &args.distinct), args.skip, args.take));
        }

        if let Some(take) = args.take {
            query = query.limit(clamp_limit(take));
        }
        if let Some(skip) = args.skip {
            query = query.offset(clamp_offset(skip));
        }

        let mut rows = query.fetch_all(conn).await?;
        if backwards {
            rows.reverse();
        }
        Ok(rows)
    }

    /// Ordering values of the cursor row, or `None` when it does not exist.
    async fn cursor_position(
        &self,
        conn: &mut SqliteConnection,
        query: &EntityQuery<E>,
        cursor: &UniqueKey,
    ) -> Result<Option<Vec<SqlValue>>> {
        let schema = E::schema();
        let column = self.unique_column(cursor)?;

        let columns: Vec<&'static ColumnDef> = query
            .effective_order()
            .iter()
            .map(|o| schema.require_column(&o.field))
            .collect::<Result<_>>()?;
        let projection = columns
            .iter()
            .map(|c| c.name)
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = ?",
            projection, schema.table, column.name
        );
        tracing::debug!(sql = %sql, "Resolving cursor");

        let row = bind_all(sqlx::query(&sql), std::slice::from_ref(&cursor.value))
            .fetch_optional(&mut *conn)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };

        let position = columns
            .iter()
            .map(|c| decode_value(&row, c.name, c.kind))
            .collect::<Result<Vec<_>, sqlx::Error>>()?;
        Ok(Some(position))
    }

    /// Number of rows matching `filter`.
    pub async fn count(&self, filter: Filter) -> Result<i64> {
        let query = EntityQuery::<E>::new().filter(&filter)?;
        self.conn
            .run(async {
                let mut guard = self.conn.acquire().await?;
                query.count(guard.connection()?).await
            })
            .await
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    pub async fn create(&self, data: E::Create) -> Result<E> {
        data.validate()?;
        let values = self.prepare_insert(data.insert_values())?;
        let omitted = self.ctx.omit.columns_for(E::schema(), &[])?;
        let sql = format!(
            "{} RETURNING {}",
            insert_sql(E::schema(), &values, ""),
            returning_sql(E::schema(), &omitted)
        );
        let binds: Vec<SqlValue> = values.into_iter().map(|(_, v)| v).collect();

        self.conn
            .run(async {
                let mut guard = self.conn.acquire().await?;
                tracing::debug!(sql = %sql, "Creating {}", E::ENTITY_NAME);
                let row = bind_all(sqlx::query(&sql), &binds)
                    .fetch_one(guard.connection()?)
                    .await?;
                Ok(E::from_row(&row)?)
            })
            .await
    }

    /// Insert every row in one transaction.
    ///
    /// With `skip_duplicates`, rows that collide with a unique constraint are
    /// skipped; otherwise the first collision aborts the whole batch.
    pub async fn create_many(&self, data: Vec<E::Create>, skip_duplicates: bool) -> Result<BatchPayload> {
        let schema = E::schema();
        let mut statements: Vec<(String, Vec<SqlValue>)> = Vec::with_capacity(data.len());
        for item in &data {
            item.validate()?;
            let values = self.prepare_insert(item.insert_values())?;
            let suffix = if skip_duplicates { " ON CONFLICT DO NOTHING" } else { "" };
            let sql = insert_sql(schema, &values, suffix);
            statements.push((sql, values.into_iter().map(|(_, v)| v).collect()));
        }

        self.conn
            .run(async {
                let mut guard = self.conn.acquire().await?;
                let mut tx = guard.connection()?.begin().await?;
                let mut count = 0;
                for (sql, binds) in &statements {
                    tracing::debug!(sql = %sql, "Creating {}", E::ENTITY_NAME);
                    count += bind_all(sqlx::query(sql), binds)
                        .execute(&mut *tx)
                        .await?
                        .rows_affected();
                }
                tx.commit().await?;
                tracing::debug!(entity = E::ENTITY_NAME, count, "Created batch");
                Ok(BatchPayload { count })
            })
            .await
    }

    /// Apply a partial update to the row identified by `key`.
    pub async fn update(&self, key: UniqueKey, data: E::Update) -> Result<E> {
        let column = self.unique_column(&key)?;
        data.validate()?;
        let (set_sql, mut binds) = self.prepare_update(data.assignments())?;
        binds.push(key.value);

        let schema = E::schema();
        let omitted = self.ctx.omit.columns_for(schema, &[])?;
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ? RETURNING {}",
            schema.table,
            set_sql,
            column.name,
            returning_sql(schema, &omitted)
        );

        self.conn
            .run(async {
                let mut guard = self.conn.acquire().await?;
                tracing::debug!(sql = %sql, "Updating {}", E::ENTITY_NAME);
                let row = bind_all(sqlx::query(&sql), &binds)
                    .fetch_optional(guard.connection()?)
                    .await?
                    .ok_or(DbError::NotFound {
                        entity: E::ENTITY_NAME,
                    })?;
                Ok(E::from_row(&row)?)
            })
            .await
    }

    /// Apply the same partial update to every row matching `filter`.
    pub async fn update_many(&self, filter: Filter, data: E::Update) -> Result<BatchPayload> {
        data.validate()?;
        let query = EntityQuery::<E>::new().filter(&filter)?;
        let (set_sql, mut binds) = self.prepare_update(data.assignments())?;
        binds.extend(query.values().iter().cloned());

        let schema = E::schema();
        let sql = format!(
            "UPDATE {} SET {} WHERE {} IN ({})",
            schema.table,
            set_sql,
            schema.primary_key,
            query.build_key_subquery()
        );

        self.conn
            .run(async {
                let mut guard = self.conn.acquire().await?;
                tracing::debug!(sql = %sql, "Updating many {}", E::ENTITY_NAME);
                let result = bind_all(sqlx::query(&sql), &binds)
                    .execute(guard.connection()?)
                    .await?;
                Ok(BatchPayload {
                    count: result.rows_affected(),
                })
            })
            .await
    }

    /// Create the row identified by `key`, or update it when it exists.
    ///
    /// A single `INSERT ... ON CONFLICT DO UPDATE` statement, so concurrent
    /// upserts of the same key never both create.
    pub async fn upsert(&self, key: UniqueKey, create: E::Create, update: E::Update) -> Result<E> {
        let column = self.unique_column(&key)?;
        create.validate()?;
        update.validate()?;

        let mut values = create.insert_values();
        match values.iter().find(|(name, _)| *name == column.name) {
            Some((_, value)) if *value != key.value => {
                return Err(DbError::validation(format!(
                    "upsert key `{}` does not match the create data",
                    column.name
                )));
            }
            Some(_) => {}
            None => values.push((column.name, key.value.clone())),
        }
        let values = self.prepare_insert(values)?;
        let (set_sql, set_binds) = self.prepare_update(update.assignments())?;

        let schema = E::schema();
        let omitted = self.ctx.omit.columns_for(schema, &[])?;
        let conflict = format!(" ON CONFLICT({}) DO UPDATE SET {}", column.name, set_sql);
        let sql = format!(
            "{} RETURNING {}",
            insert_sql(schema, &values, &conflict),
            returning_sql(schema, &omitted)
        );
        let mut binds: Vec<SqlValue> = values.into_iter().map(|(_, v)| v).collect();
        binds.extend(set_binds);

        self.conn
            .run(async {
                let mut guard = self.conn.acquire().await?;
                tracing::debug!(sql = %sql, "Upserting {}", E::ENTITY_NAME);
                let row = bind_all(sqlx::query(&sql), &binds)
                    .fetch_one(guard.connection()?)
                    .await?;
                Ok(E::from_row(&row)?)
            })
            .await
    }

    /// Delete the row identified by `key` and everything it owns.
    pub async fn delete(&self, key: UniqueKey) -> Result<E> {
        let column = self.unique_column(&key)?;
        let schema = E::schema();
        let omitted = self.ctx.omit.columns_for(schema, &[])?;
        let sql = format!(
            "DELETE FROM {} WHERE {} = ? RETURNING {}",
            schema.table,
            column.name,
            returning_sql(schema, &omitted)
        );

        self.conn
            .run(async {
                let mut guard = self.conn.acquire().await?;
                let mut tx = guard.connection()?.begin().await?;
                defer_foreign_keys(&mut tx).await?;

                tracing::debug!(sql = %sql, "Deleting {}", E::ENTITY_NAME);
                let row = bind_all(sqlx::query(&sql), std::slice::from_ref(&key.value))
                    .fetch_optional(&mut *tx)
                    .await?
                    .ok_or(DbError::NotFound {
                        entity: E::ENTITY_NAME,
                    })?;
                let deleted = E::from_row(&row)?;

                let mut owned: HashMap<&'static str, Vec<SqlValue>> = HashMap::new();
                for relation in schema.relations.iter().filter(|r| r.kind.is_owned()) {
                    if let Some(value) = deleted.field_value(relation.local_column) {
                        owned.entry(relation.local_column).or_default().push(value);
                    }
                }
                delete_owned(&mut tx, schema, &owned).await?;

                tx.commit().await?;
                Ok(deleted)
            })
            .await
    }

    /// Delete every row matching `filter` and everything those rows own.
    pub async fn delete_many(&self, filter: Filter) -> Result<BatchPayload> {
        let schema = E::schema();
        let query = EntityQuery::<E>::new().filter(&filter)?;
        let mut returned = owned_key_columns(schema);
        if !returned.contains(&schema.primary_key) {
            returned.push(schema.primary_key);
        }
        let sql = format!(
            "DELETE FROM {} WHERE {} IN ({}) RETURNING {}",
            schema.table,
            schema.primary_key,
            query.build_key_subquery(),
            returned.join(", ")
        );

        self.conn
            .run(async {
                let mut guard = self.conn.acquire().await?;
                let mut tx = guard.connection()?.begin().await?;
                defer_foreign_keys(&mut tx).await?;

                tracing::debug!(sql = %sql, "Deleting many {}", E::ENTITY_NAME);
                let rows = bind_all(sqlx::query(&sql), query.values())
                    .fetch_all(&mut *tx)
                    .await?;
                let owned = collect_columns(schema, &returned, &rows)?;
                delete_owned(&mut tx, schema, &owned).await?;

                tx.commit().await?;
                Ok(BatchPayload {
                    count: rows.len() as u64,
                })
            })
            .await
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    /// Validate a unique key and return its column.
    fn unique_column(&self, key: &UniqueKey) -> Result<&'static ColumnDef> {
        let column = E::schema().require_unique(&key.field)?;
        if key.value.is_null() {
            return Err(DbError::validation(format!(
                "unique key `{}` cannot be null",
                column.name
            )));
        }
        if !key.value.fits(column.kind) {
            return Err(DbError::validation(format!(
                "value {:?} does not match {} field `{}`",
                key.value,
                column.kind.name(),
                column.name
            )));
        }
        Ok(column)
    }

    /// Add the generated id and timestamps to create data.
    fn prepare_insert(
        &self,
        mut values: Vec<(&'static str, SqlValue)>,
    ) -> Result<Vec<(&'static str, SqlValue)>> {
        let schema = E::schema();
        for (name, value) in &values {
            let column = schema.require_column(name)?;
            if !value.fits(column.kind) {
                return Err(DbError::validation(format!(
                    "value {:?} does not match {} field `{}`",
                    value,
                    column.kind.name(),
                    column.name
                )));
            }
        }

        if !values.iter().any(|(name, _)| *name == schema.primary_key) {
            values.insert(0, (schema.primary_key, SqlValue::String(new_id())));
        }
        let now = now();
        for stamp in [schema.created_at, schema.updated_at].into_iter().flatten() {
            values.retain(|(name, _)| *name != stamp);
            values.push((stamp, SqlValue::from(now)));
        }
        Ok(values)
    }

    /// Render SET assignments, refreshing `updated_at`.
    fn prepare_update(
        &self,
        assignments: Vec<(&'static str, SqlValue)>,
    ) -> Result<(String, Vec<SqlValue>)> {
        let schema = E::schema();
        let mut sets: Vec<String> = Vec::new();
        let mut binds: Vec<SqlValue> = Vec::new();

        for (name, value) in assignments {
            let column = schema.require_column(name)?;
            if column.is_primary_key || Some(column.name) == schema.created_at {
                return Err(DbError::validation(format!(
                    "`{}` cannot be updated",
                    column.name
                )));
            }
            if value.is_null() && !column.nullable {
                return Err(DbError::validation(format!(
                    "`{}` is required and cannot be set to null",
                    column.name
                )));
            }
            if !value.fits(column.kind) {
                return Err(DbError::validation(format!(
                    "value {:?} does not match {} field `{}`",
                    value,
                    column.kind.name(),
                    column.name
                )));
            }
            sets.push(format!("{} = ?", column.name));
            binds.push(value);
        }

        if let Some(stamp) = schema.updated_at {
            sets.push(format!("{} = ?", stamp));
            binds.push(SqlValue::from(now()));
        }

        if sets.is_empty() {
            // Nothing to change; keep the statement valid so it still reports the row.
            sets.push(format!("{} = {}", schema.primary_key, schema.primary_key));
        }

        Ok((sets.join(", "), binds))
    }
}

/// `INSERT INTO table (cols) VALUES (?, ...)` followed by `suffix`.
fn insert_sql(schema: &EntitySchema, values: &[(&'static str, SqlValue)], suffix: &str) -> String {
    let columns: Vec<&str> = values.iter().map(|(name, _)| *name).collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({}){}",
        schema.table,
        columns.join(", "),
        placeholders(values.len()),
        suffix
    )
}

/// RETURNING list with omitted columns projected as NULL.
fn returning_sql(schema: &EntitySchema, omitted: &[&'static str]) -> String {
    schema
        .columns
        .iter()
        .map(|c| {
            if omitted.contains(&c.name) {
                format!("NULL AS {}", c.name)
            } else {
                c.name.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Foreign key checks run at commit, so parents can go before their children.
async fn defer_foreign_keys(conn: &mut SqliteConnection) -> Result<()> {
    sqlx::query("PRAGMA defer_foreign_keys = ON")
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Local columns referenced by owned relations of `schema`.
fn owned_key_columns(schema: &EntitySchema) -> Vec<&'static str> {
    let mut columns: Vec<&'static str> = Vec::new();
    for relation in schema.relations.iter().filter(|r| r.kind.is_owned()) {
        if !columns.contains(&relation.local_column) {
            columns.push(relation.local_column);
        }
    }
    columns
}

fn collect_columns(
    schema: &EntitySchema,
    columns: &[&'static str],
    rows: &[sqlx::sqlite::SqliteRow],
) -> Result<HashMap<&'static str, Vec<SqlValue>>> {
    let mut collected: HashMap<&'static str, Vec<SqlValue>> = HashMap::new();
    for name in columns {
        let column = schema.require_column(name)?;
        let values = rows
            .iter()
            .map(|row| decode_value(row, column.name, column.kind))
            .collect::<Result<Vec<_>, sqlx::Error>>()?;
        collected.insert(column.name, values);
    }
    Ok(collected)
}

/// Delete the rows owned by already-deleted parents of `schema`, recursively.
///
/// `parents` holds the deleted parents' values of each local column an
/// owned relation joins on.
fn delete_owned<'a>(
    conn: &'a mut SqliteConnection,
    schema: &'static EntitySchema,
    parents: &'a HashMap<&'static str, Vec<SqlValue>>,
) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        for relation in schema.relations.iter().filter(|r| r.kind.is_owned()) {
            let Some(keys) = parents.get(relation.local_column) else {
                continue;
            };
            let keys: Vec<SqlValue> = keys.iter().filter(|k| !k.is_null()).cloned().collect();
            if keys.is_empty() {
                continue;
            }

            let target = (relation.target)();
            let returned = owned_key_columns(target);
            let mut children: HashMap<&'static str, Vec<SqlValue>> = HashMap::new();
            let mut deleted = 0usize;

            for chunk in keys.chunks(RELATION_CHUNK_SIZE) {
                let mut sql = format!(
                    "DELETE FROM {} WHERE {}",
                    target.table,
                    in_list_sql(relation.foreign_column, chunk.len())
                );
                if returned.is_empty() {
                    tracing::debug!(sql = %sql, "Cascading delete");
                    deleted += bind_all(sqlx::query(&sql), chunk)
                        .execute(&mut *conn)
                        .await?
                        .rows_affected() as usize;
                } else {
                    sql.push_str(&format!(" RETURNING {}", returned.join(", ")));
                    tracing::debug!(sql = %sql, "Cascading delete");
                    let rows = bind_all(sqlx::query(&sql), chunk)
                        .fetch_all(&mut *conn)
                        .await?;
                    deleted += rows.len();
                    for (name, values) in collect_columns(target, &returned, &rows)? {
                        children.entry(name).or_default().extend(values);
                    }
                }
            }

            tracing::debug!(
                parent = schema.name,
                relation = relation.name,
                deleted,
                "Cascaded delete"
            );

            if !children.is_empty() {
                delete_owned(&mut *conn, target, &children).await?;
            }
        }
        Ok(())
    })
}

/// Query builder for finding entities
///
/// Wraps [`FindManyArgs`] and provides a fluent interface for building queries.
pub struct FindQuery<'a, E: Entity> {
    repo: &'a Repository<E>,
    args: FindManyArgs,
}

impl<'a, E: Entity> FindQuery<'a, E> {
    pub fn new(repo: &'a Repository<E>) -> Self {
        Self {
            repo,
            args: FindManyArgs::default(),
        }
    }

    /// Add a filter, combined with earlier filters under AND
    pub fn filter(mut self, filter: Filter) -> Self {
        self.args.filter = Some(match self.args.filter.take() {
            Some(existing) => existing.and_also(filter),
            None => filter,
        });
        self
    }

    /// Add ordering
    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.args.order_by.push(order);
        self
    }

    pub fn cursor(mut self, cursor: UniqueKey) -> Self {
        self.args.cursor = Some(cursor);
        self
    }

    pub fn take(mut self, take: i64) -> Self {
        self.args.take = Some(take);
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.args.skip = Some(skip);
        self
    }

    pub fn distinct(mut self, field: impl Into<String>) -> Self {
        self.args.distinct.push(field.into());
        self
    }

    pub fn include(mut self, include: Include) -> Self {
        self.args.include = include;
        self
    }

    /// Hide (`true`) or reveal (`false`) a column for this query
    pub fn omit(mut self, field: impl Into<String>, hide: bool) -> Self {
        self.args.omit.push((field.into(), hide));
        self
    }

    pub fn into_args(self) -> FindManyArgs {
        self.args
    }

    /// Execute and fetch all results
    pub async fn fetch_all(self) -> Result<Vec<E>> {
        self.repo.find_many(self.args).await
    }

    /// Execute and fetch one optional result
    pub async fn fetch_optional(self) -> Result<Option<E>> {
        self.repo.find_first(self.args).await
    }

    /// Execute and fetch exactly one result (errors if not found)
    pub async fn fetch_one(self) -> Result<E> {
        self.repo.find_first_or_throw(self.args).await
    }
}

/// Query builder for counting entities
pub struct CountQuery<'a, E: Entity> {
    repo: &'a Repository<E>,
    filter: Option<Filter>,
}

impl<'a, E: Entity> CountQuery<'a, E> {
    pub fn new(repo: &'a Repository<E>) -> Self {
        Self { repo, filter: None }
    }

    /// Add a filter, combined with earlier filters under AND
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and_also(filter),
            None => filter,
        });
        self
    }

    /// Execute the count query
    pub async fn execute(self) -> Result<i64> {
        self.repo.count(self.filter.unwrap_or_default()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{Skill, User};
    use crate::orm::DatabaseEntity;

    #[test]
    fn test_insert_sql() {
        let values = vec![("id", SqlValue::from("a")), ("name", SqlValue::from("Go"))];
        assert_eq!(
            insert_sql(Skill::schema(), &values, " ON CONFLICT DO NOTHING"),
            "INSERT INTO skills (id, name) VALUES (?, ?) ON CONFLICT DO NOTHING"
        );
    }

    #[test]
    fn test_returning_sql_projects_omitted_as_null() {
        let sql = returning_sql(User::schema(), &["password"]);
        assert!(sql.starts_with("id, name, email, NULL AS password, is_verified"));
    }

    #[test]
    fn test_owned_key_columns() {
        assert_eq!(owned_key_columns(User::schema()), vec!["id"]);
        assert!(owned_key_columns(Skill::schema()).is_empty());
    }
}
