//! SQL query builder for repository reads
//!
//! Builds parameterized SQL for SELECT and COUNT statements from a
//! [`Filter`] tree, an ordering and pagination bounds. Identifiers always come
//! from the static [`EntitySchema`]; every caller-provided value is bound.

use sqlx::SqliteConnection;

use super::filter::{FieldFilter, Filter, QueryMode, RelationCondition};
use super::traits::{ColumnDef, DatabaseEntity, EntitySchema, FromSqlRow, NullsOrder, OrderBy, OrderDirection};
use super::value::{ColumnKind, SqlValue, bind_all};
use crate::db::sqlite_helpers::in_list_sql;
use crate::error::{DbError, Result};

/// Alias of the root table in every generated statement.
pub const ROOT_ALIAS: &str = "t0";

/// Compiles filter trees into WHERE fragments.
///
/// Values are collected in placeholder order. Relation conditions become
/// correlated subqueries, each with a fresh table alias.
#[derive(Debug)]
pub struct FilterCompiler {
    values: Vec<SqlValue>,
    next_alias: usize,
}

impl Default for FilterCompiler {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterCompiler {
    pub fn new() -> Self {
        Self {
            values: Vec::new(),
            next_alias: 1,
        }
    }

    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    pub fn into_values(self) -> Vec<SqlValue> {
        self.values
    }

    pub fn push_value(&mut self, value: SqlValue) {
        self.values.push(value);
    }

    fn alias(&mut self) -> String {
        let alias = format!("t{}", self.next_alias);
        self.next_alias += 1;
        alias
    }

    /// Compile `filter` against `schema`, with the table reachable as `alias`.
    pub fn compile(&mut self, schema: &EntitySchema, alias: &str, filter: &Filter) -> Result<String> {
        match filter {
            Filter::Field { field, filter } => {
                let column = schema.require_column(field)?;
                self.compile_field(column, alias, filter)
            }
            Filter::And(items) => {
                if items.is_empty() {
                    return Ok("1=1".to_string());
                }
                let parts = items
                    .iter()
                    .map(|f| self.compile(schema, alias, f).map(|sql| format!("({})", sql)))
                    .collect::<Result<Vec<_>>>()?;
                Ok(parts.join(" AND "))
            }
            Filter::Or(items) => {
                if items.is_empty() {
                    return Ok("1=0".to_string());
                }
                let parts = items
                    .iter()
                    .map(|f| self.compile(schema, alias, f).map(|sql| format!("({})", sql)))
                    .collect::<Result<Vec<_>>>()?;
                Ok(parts.join(" OR "))
            }
            Filter::Not(inner) => {
                let sql = self.compile(schema, alias, inner)?;
                Ok(format!("NOT ({})", sql))
            }
            Filter::Relation {
                relation,
                condition,
            } => self.compile_relation(schema, alias, relation, condition),
        }
    }

    fn compile_relation(
        &mut self,
        schema: &EntitySchema,
        alias: &str,
        name: &str,
        condition: &RelationCondition,
    ) -> Result<String> {
        let relation = schema.require_relation(name)?;
        let to_many = relation.kind.is_to_many();
        if condition.is_to_many() != to_many {
            return Err(DbError::validation(format!(
                "relation `{}` on {} is {}; use {} conditions",
                name,
                schema.name,
                if to_many { "to-many" } else { "to-one" },
                if to_many { "some/every/none" } else { "is/isNot" },
            )));
        }

        let target = (relation.target)();
        let child = self.alias();
        let scope = format!(
            "SELECT 1 FROM {} {} WHERE {}.{} = {}.{}",
            target.table, child, child, relation.foreign_column, alias, relation.local_column
        );

        let sql = match condition {
            RelationCondition::Some(f) | RelationCondition::Is(Some(f)) => {
                let inner = self.compile(target, &child, f)?;
                format!("EXISTS ({} AND ({}))", scope, inner)
            }
            RelationCondition::Every(f) => {
                let inner = self.compile(target, &child, f)?;
                format!("NOT EXISTS ({} AND NOT COALESCE(({}), 0))", scope, inner)
            }
            RelationCondition::None(f) | RelationCondition::IsNot(Some(f)) => {
                let inner = self.compile(target, &child, f)?;
                format!("NOT EXISTS ({} AND ({}))", scope, inner)
            }
            RelationCondition::Is(None) => format!("NOT EXISTS ({})", scope),
            RelationCondition::IsNot(None) => format!("EXISTS ({})", scope),
        };
        Ok(sql)
    }

    fn compile_field(&mut self, column: &ColumnDef, alias: &str, filter: &FieldFilter) -> Result<String> {
        let expr = format!("{}.{}", alias, column.name);
        self.compile_condition(&expr, column, filter)
    }

    /// Compile conditions on an arbitrary expression typed like `column`.
    pub(crate) fn compile_condition(
        &mut self,
        expr: &str,
        column: &ColumnDef,
        filter: &FieldFilter,
    ) -> Result<String> {
        let folded = filter.mode == QueryMode::Insensitive && column.kind == ColumnKind::Text;
        let lhs = if folded { format!("LOWER({})", expr) } else { expr.to_string() };
        let rhs = if folded { "LOWER(?)" } else { "?" };

        let mut parts: Vec<String> = Vec::new();

        if let Some(value) = &filter.equals {
            if value.is_null() {
                parts.push(format!("{} IS NULL", expr));
            } else {
                self.check_value(column, value)?;
                parts.push(format!("{} = {}", lhs, rhs));
                self.values.push(value.clone());
            }
        }

        if let Some(value) = &filter.not {
            if value.is_null() {
                parts.push(format!("{} IS NOT NULL", expr));
            } else {
                self.check_value(column, value)?;
                parts.push(format!("{} <> {}", lhs, rhs));
                self.values.push(value.clone());
            }
        }

        if let Some(list) = &filter.in_list {
            self.check_list(column, list, "in")?;
            if list.is_empty() {
                parts.push("1=0".to_string());
            } else {
                let items = vec![rhs; list.len()].join(", ");
                parts.push(format!("{} IN ({})", lhs, items));
                self.values.extend(list.iter().cloned());
            }
        }

        if let Some(list) = &filter.not_in {
            self.check_list(column, list, "notIn")?;
            if !list.is_empty() {
                let items = vec![rhs; list.len()].join(", ");
                parts.push(format!("{} NOT IN ({})", lhs, items));
                self.values.extend(list.iter().cloned());
            }
        }

        let ranges = [
            (&filter.lt, "<", "lt"),
            (&filter.lte, "<=", "lte"),
            (&filter.gt, ">", "gt"),
            (&filter.gte, ">=", "gte"),
        ];
        for (bound, op, name) in ranges {
            let Some(value) = bound else { continue };
            if value.is_null() {
                return Err(DbError::validation(format!(
                    "`{}` on `{}` cannot be null",
                    name, column.name
                )));
            }
            if column.kind == ColumnKind::Boolean {
                return Err(DbError::validation(format!(
                    "`{}` is not supported on boolean field `{}`",
                    name, column.name
                )));
            }
            self.check_value(column, value)?;
            parts.push(format!("{} {} ?", expr, op));
            self.values.push(value.clone());
        }

        let patterns = [
            (&filter.contains, "contains"),
            (&filter.starts_with, "startsWith"),
            (&filter.ends_with, "endsWith"),
        ];
        for (pattern, name) in patterns {
            let Some(pattern) = pattern else { continue };
            if column.kind != ColumnKind::Text {
                return Err(DbError::validation(format!(
                    "`{}` requires a text field, `{}` is {}",
                    name,
                    column.name,
                    column.kind.name()
                )));
            }
            let sql = match name {
                "contains" => format!("instr({}, {}) > 0", lhs, rhs),
                "startsWith" => format!("instr({}, {}) = 1", lhs, rhs),
                _ => {
                    self.values.push(SqlValue::String(pattern.clone()));
                    format!("substr({lhs}, length({lhs}) - length(?) + 1) = {rhs}")
                }
            };
            parts.push(sql);
            self.values.push(SqlValue::String(pattern.clone()));
        }

        if parts.is_empty() {
            return Ok("1=1".to_string());
        }
        Ok(parts.join(" AND "))
    }

    fn check_value(&self, column: &ColumnDef, value: &SqlValue) -> Result<()> {
        if value.fits(column.kind) {
            Ok(())
        } else {
            Err(DbError::validation(format!(
                "value {:?} does not match {} field `{}`",
                value,
                column.kind.name(),
                column.name
            )))
        }
    }

    fn check_list(&self, column: &ColumnDef, list: &[SqlValue], name: &str) -> Result<()> {
        for value in list {
            if value.is_null() {
                return Err(DbError::validation(format!(
                    "`{}` on `{}` cannot contain null",
                    name, column.name
                )));
            }
            self.check_value(column, value)?;
        }
        Ok(())
    }
}

/// OFFSET for a caller supplied `skip`, saturating at `i64::MAX`.
pub fn clamp_offset(skip: u64) -> i64 {
    i64::try_from(skip).unwrap_or(i64::MAX)
}

/// LIMIT for the magnitude of a caller supplied `take`, saturating at `i64::MAX`.
pub fn clamp_limit(take: i64) -> i64 {
    i64::try_from(take.unsigned_abs()).unwrap_or(i64::MAX)
}

/// Render one ORDER BY term for the column reachable as `expr`.
pub fn order_term_sql(expr: &str, order: &OrderBy) -> String {
    match order.nulls {
        Some(nulls) => format!("{} {} {}", expr, order.direction.to_sql(), nulls.to_sql()),
        None => format!("{} {}", expr, order.direction.to_sql()),
    }
}

/// Keyset predicate selecting the cursor row and every row after it under
/// `order`.
///
/// `order` must end in a non-null unique column so the ordering is total.
/// NULL placement follows each term's effective null ordering.
pub fn keyset_predicate(
    alias: &str,
    order: &[OrderBy],
    cursor: &[SqlValue],
    values: &mut Vec<SqlValue>,
) -> String {
    let mut branches: Vec<String> = Vec::new();

    for i in 0..=order.len() {
        let mut parts: Vec<String> = Vec::new();
        for (term, value) in order.iter().zip(cursor).take(i) {
            let expr = format!("{}.{}", alias, term.field);
            if value.is_null() {
                parts.push(format!("{} IS NULL", expr));
            } else {
                parts.push(format!("{} = ?", expr));
                values.push(value.clone());
            }
        }

        if let (Some(term), Some(value)) = (order.get(i), cursor.get(i)) {
            let expr = format!("{}.{}", alias, term.field);
            let nulls = term.effective_nulls();
            let after = match (value.is_null(), nulls) {
                // Nothing sorts after NULL when NULLs come last.
                (true, NullsOrder::Last) => None,
                (true, NullsOrder::First) => Some(format!("{} IS NOT NULL", expr)),
                (false, _) => {
                    let op = match term.direction {
                        OrderDirection::Asc => ">",
                        OrderDirection::Desc => "<",
                    };
                    values.push(value.clone());
                    Some(match nulls {
                        NullsOrder::Last => format!("({} {} ? OR {} IS NULL)", expr, op, expr),
                        NullsOrder::First => format!("{} {} ?", expr, op),
                    })
                }
            };
            match after {
                Some(after) => parts.push(after),
                None => {
                    // Drop the equality values pushed for this branch.
                    let pushed = order
                        .iter()
                        .zip(cursor)
                        .take(i)
                        .filter(|(_, v)| !v.is_null())
                        .count();
                    values.truncate(values.len() - pushed);
                    continue;
                }
            }
        }

        if parts.is_empty() {
            continue;
        }
        branches.push(format!("({})", parts.join(" AND ")));
    }

    if branches.is_empty() {
        return "1=0".to_string();
    }
    format!("({})", branches.join(" OR "))
}

/// A query builder for database entities.
///
/// Builds parameterized SQL queries for SELECT operations with
/// filtering, sorting, and pagination support.
pub struct EntityQuery<E: DatabaseEntity> {
    _phantom: std::marker::PhantomData<E>,
    where_clauses: Vec<String>,
    compiler: FilterCompiler,
    order: Vec<OrderBy>,
    reversed: bool,
    limit: Option<i64>,
    offset: Option<i64>,
    omitted: Vec<&'static str>,
}

impl<E: DatabaseEntity + FromSqlRow> EntityQuery<E> {
    /// Create a new query builder for the entity type.
    pub fn new() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
            where_clauses: Vec::new(),
            compiler: FilterCompiler::new(),
            order: Vec::new(),
            reversed: false,
            limit: None,
            offset: None,
            omitted: Vec::new(),
        }
    }

    /// Add a filter to the query.
    pub fn filter(mut self, filter: &Filter) -> Result<Self> {
        let sql = self.compiler.compile(E::schema(), ROOT_ALIAS, filter)?;
        if sql != "1=1" {
            self.where_clauses.push(sql);
        }
        Ok(self)
    }

    /// Restrict `column` to a list of keys.
    pub fn where_in(mut self, column: &'static str, keys: &[SqlValue]) -> Self {
        let expr = format!("{}.{}", ROOT_ALIAS, column);
        self.where_clauses.push(in_list_sql(&expr, keys.len()));
        for key in keys {
            self.compiler.push_value(key.clone());
        }
        self
    }

    /// Add sorting to the query.
    pub fn order_by(mut self, order: &[OrderBy]) -> Result<Self> {
        let schema = E::schema();
        for term in order {
            schema.require_column(&term.field)?;
            self.order.push(term.clone());
        }
        Ok(self)
    }

    /// Read the ordering backwards (used for negative `take`).
    pub fn reverse(mut self) -> Self {
        self.reversed = !self.reversed;
        self
    }

    /// The ordering actually applied: requested terms, then the primary key.
    pub fn effective_order(&self) -> Vec<OrderBy> {
        let pk = E::schema().primary_key;
        let mut order: Vec<OrderBy> = Vec::with_capacity(self.order.len() + 1);
        for term in &self.order {
            if !order.iter().any(|o| o.field == term.field) {
                order.push(term.clone());
            }
        }
        if !order.iter().any(|o| o.field == pk) {
            order.push(OrderBy::asc(pk));
        }
        if self.reversed {
            order = order.iter().map(OrderBy::reversed).collect();
        }
        order
    }

    /// Start at the row whose ordering values are `cursor` (inclusive).
    pub fn starting_at(mut self, cursor: &[SqlValue]) -> Self {
        let order = self.effective_order();
        let mut values = Vec::new();
        let sql = keyset_predicate(ROOT_ALIAS, &order, cursor, &mut values);
        self.where_clauses.push(sql);
        for value in values {
            self.compiler.push_value(value);
        }
        self
    }

    /// Set limit directly.
    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Set offset directly.
    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Project these columns as NULL.
    pub fn omit(mut self, columns: Vec<&'static str>) -> Self {
        self.omitted = columns;
        self
    }

    pub fn values(&self) -> &[SqlValue] {
        self.compiler.values()
    }

    fn where_sql(&self) -> String {
        if self.where_clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.where_clauses.join(" AND "))
        }
    }

    fn projection(&self) -> String {
        E::schema()
            .columns
            .iter()
            .map(|c| {
                if self.omitted.contains(&c.name) {
                    format!("NULL AS {}", c.name)
                } else {
                    format!("{}.{} AS {}", ROOT_ALIAS, c.name, c.name)
                }
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Build the SQL query string.
    pub fn build_sql(&self) -> String {
        let schema = E::schema();
        let mut sql = format!(
            "SELECT {} FROM {} {}{}",
            self.projection(),
            schema.table,
            ROOT_ALIAS,
            self.where_sql()
        );

        let order: Vec<String> = self
            .effective_order()
            .iter()
            .map(|o| order_term_sql(&format!("{}.{}", ROOT_ALIAS, o.field), o))
            .collect();
        sql.push_str(" ORDER BY ");
        sql.push_str(&order.join(", "));

        match (self.limit, self.offset) {
            (Some(limit), Some(offset)) if offset > 0 => {
                sql.push_str(&format!(" LIMIT {} OFFSET {}", limit, offset))
            }
            (Some(limit), _) => sql.push_str(&format!(" LIMIT {}", limit)),
            (None, Some(offset)) if offset > 0 => {
                sql.push_str(&format!(" LIMIT -1 OFFSET {}", offset))
            }
            _ => {}
        }

        sql
    }

    /// Build a COUNT query string.
    pub fn build_count_sql(&self) -> String {
        format!(
            "SELECT COUNT(*) FROM {} {}{}",
            E::schema().table,
            ROOT_ALIAS,
            self.where_sql()
        )
    }

    /// Subquery selecting the primary keys of matching rows, for bulk writes.
    pub fn build_key_subquery(&self) -> String {
        let schema = E::schema();
        format!(
            "SELECT {}.{} FROM {} {}{}",
            ROOT_ALIAS,
            schema.primary_key,
            schema.table,
            ROOT_ALIAS,
            self.where_sql()
        )
    }

    /// Execute the query and return all matching entities.
    pub async fn fetch_all(&self, conn: &mut SqliteConnection) -> Result<Vec<E>> {
        let sql = self.build_sql();
        tracing::debug!(sql = %sql, "Executing entity query");

        let rows = bind_all(sqlx::query(&sql), self.values())
            .fetch_all(&mut *conn)
            .await?;
        rows.iter()
            .map(|row| E::from_row(row).map_err(DbError::from))
            .collect()
    }

    /// Execute a COUNT query.
    pub async fn count(&self, conn: &mut SqliteConnection) -> Result<i64> {
        let sql = self.build_count_sql();
        tracing::debug!(sql = %sql, "Executing count query");

        let mut query = sqlx::query_scalar::<_, i64>(&sql);
        for value in self.values() {
            query = match value {
                SqlValue::String(s) => query.bind(s.as_str()),
                SqlValue::Int(i) => query.bind(*i),
                SqlValue::Float(f) => query.bind(*f),
                SqlValue::Bool(b) => query.bind(if *b { 1i32 } else { 0i32 }),
                SqlValue::Null => query.bind(None::<String>),
            };
        }

        Ok(query.fetch_one(&mut *conn).await?)
    }
}

impl<E: DatabaseEntity + FromSqlRow> Default for EntityQuery<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{Job, User};
    use crate::orm::filter::FieldFilter;
    use pretty_assertions::assert_eq;

    fn compile_user(filter: &Filter) -> Result<(String, Vec<SqlValue>)> {
        let mut compiler = FilterCompiler::new();
        let sql = compiler.compile(User::schema(), ROOT_ALIAS, filter)?;
        Ok((sql, compiler.into_values()))
    }

    #[test]
    fn test_null_equals_compiles_to_is_null() {
        let (sql, values) = compile_user(&Filter::is_null("password")).unwrap();
        assert_eq!(sql, "t0.password IS NULL");
        assert!(values.is_empty());
    }

    #[test]
    fn test_not_value_excludes_nulls() {
        let (sql, values) = compile_user(&Filter::ne("role", "ADMIN")).unwrap();
        assert_eq!(sql, "t0.role <> ?");
        assert_eq!(values, vec![SqlValue::from("ADMIN")]);
    }

    #[test]
    fn test_empty_in_matches_nothing() {
        let filter = Filter::field("email", FieldFilter::new().in_list(Vec::<String>::new()));
        assert_eq!(compile_user(&filter).unwrap().0, "1=0");

        let filter = Filter::field("email", FieldFilter::new().not_in(Vec::<String>::new()));
        assert_eq!(compile_user(&filter).unwrap().0, "1=1");
    }

    #[test]
    fn test_empty_combinators() {
        assert_eq!(compile_user(&Filter::and([])).unwrap().0, "1=1");
        assert_eq!(compile_user(&Filter::or([])).unwrap().0, "1=0");
    }

    #[test]
    fn test_insensitive_contains() {
        let filter = Filter::field("name", FieldFilter::new().contains("ann").insensitive());
        let (sql, values) = compile_user(&filter).unwrap();
        assert_eq!(sql, "instr(LOWER(t0.name), LOWER(?)) > 0");
        assert_eq!(values, vec![SqlValue::from("ann")]);
    }

    #[test]
    fn test_ends_with_binds_pattern_twice() {
        let filter = Filter::field("email", FieldFilter::new().ends_with("@x.com"));
        let (sql, values) = compile_user(&filter).unwrap();
        assert_eq!(sql, "substr(t0.email, length(t0.email) - length(?) + 1) = ?");
        assert_eq!(values.len(), 2);
    }

    #[test]
    fn test_validation_errors() {
        assert!(matches!(
            compile_user(&Filter::eq("nickname", "x")),
            Err(DbError::Validation(_))
        ));
        assert!(matches!(
            compile_user(&Filter::eq("is_verified", "yes")),
            Err(DbError::Validation(_))
        ));
        assert!(matches!(
            compile_user(&Filter::field("is_verified", FieldFilter::new().gt(true))),
            Err(DbError::Validation(_))
        ));
        assert!(matches!(
            compile_user(&Filter::field("email", FieldFilter::new().in_list([SqlValue::Null]))),
            Err(DbError::Validation(_))
        ));
        assert!(matches!(
            compile_user(&Filter::field("created_at", FieldFilter::new().lt(SqlValue::Null))),
            Err(DbError::Validation(_))
        ));
        // to-one relations take is/isNot, not some/every/none
        assert!(matches!(
            compile_user(&Filter::some("profile", Filter::all())),
            Err(DbError::Validation(_))
        ));
        assert!(matches!(
            compile_user(&Filter::is("skills", Filter::all())),
            Err(DbError::Validation(_))
        ));
    }

    #[test]
    fn test_nested_relation_filter_uses_fresh_aliases() {
        let filter = Filter::is("poster", Filter::some("skills", Filter::eq("name", "Rust")));
        let mut compiler = FilterCompiler::new();
        let sql = compiler.compile(Job::schema(), ROOT_ALIAS, &filter).unwrap();
        assert_eq!(
            sql,
            "EXISTS (SELECT 1 FROM users t1 WHERE t1.id = t0.posted_by AND \
             (EXISTS (SELECT 1 FROM skills t2 WHERE t2.user_id = t1.id AND (t2.name = ?))))"
        );
        assert_eq!(compiler.into_values(), vec![SqlValue::from("Rust")]);
    }

    #[test]
    fn test_absent_relation() {
        let (sql, _) = compile_user(&Filter::absent("profile")).unwrap();
        assert_eq!(
            sql,
            "NOT EXISTS (SELECT 1 FROM profiles t1 WHERE t1.user_id = t0.id)"
        );
    }

    #[test]
    fn test_keyset_single_key() {
        let mut values = Vec::new();
        let sql = keyset_predicate("t0", &[OrderBy::asc("id")], &[SqlValue::from("k")], &mut values);
        assert_eq!(sql, "((t0.id > ?) OR (t0.id = ?))");
        assert_eq!(values.len(), 2);
    }

    #[test]
    fn test_keyset_nullable_column_nulls_last() {
        let order = [OrderBy::desc("verify_code"), OrderBy::asc("id")];
        let cursor = [SqlValue::from("abc"), SqlValue::from("k")];
        let mut values = Vec::new();
        let sql = keyset_predicate("t0", &order, &cursor, &mut values);
        assert_eq!(
            sql,
            "(((t0.verify_code < ? OR t0.verify_code IS NULL)) OR \
             (t0.verify_code = ? AND t0.id > ?) OR \
             (t0.verify_code = ? AND t0.id = ?))"
        );
        assert_eq!(values.len(), 5);
    }

    #[test]
    fn test_keyset_null_cursor_value_nulls_last() {
        let order = [OrderBy::asc("verify_code").nulls_last(), OrderBy::asc("id")];
        let cursor = [SqlValue::Null, SqlValue::from("k")];
        let mut values = Vec::new();
        let sql = keyset_predicate("t0", &order, &cursor, &mut values);
        assert_eq!(
            sql,
            "((t0.verify_code IS NULL AND t0.id > ?) OR (t0.verify_code IS NULL AND t0.id = ?))"
        );
        assert_eq!(values, vec![SqlValue::from("k"), SqlValue::from("k")]);
    }

    #[test]
    fn test_select_sql_with_omit_and_tiebreak() {
        let query = EntityQuery::<User>::new()
            .filter(&Filter::eq("role", "ADMIN"))
            .unwrap()
            .order_by(&[OrderBy::desc("created_at")])
            .unwrap()
            .omit(vec!["password"])
            .limit(10)
            .offset(5);
        let sql = query.build_sql();
        assert!(sql.contains("NULL AS password"));
        assert!(sql.contains("t0.email AS email"));
        assert!(sql.ends_with(
            "FROM users t0 WHERE t0.role = ? ORDER BY t0.created_at DESC, t0.id ASC LIMIT 10 OFFSET 5"
        ));
    }

    #[test]
    fn test_reversed_order() {
        let query = EntityQuery::<User>::new()
            .order_by(&[OrderBy::asc("name")])
            .unwrap()
            .reverse();
        assert!(query
            .build_sql()
            .ends_with("ORDER BY t0.name DESC NULLS LAST, t0.id DESC NULLS LAST"));
    }

    #[test]
    fn test_extreme_skip_and_take_saturate() {
        assert_eq!(clamp_offset(u64::MAX), i64::MAX);
        assert_eq!(clamp_offset(7), 7);
        assert_eq!(clamp_limit(i64::MIN), i64::MAX);
        assert_eq!(clamp_limit(-3), 3);

        let sql = EntityQuery::<User>::new()
            .limit(clamp_limit(i64::MIN))
            .offset(clamp_offset(u64::MAX))
            .build_sql();
        assert!(sql.ends_with(&format!("LIMIT {} OFFSET {}", i64::MAX, i64::MAX)));
    }
}
