//! Grouping and aggregation
//!
//! `group_by` returns one [`GroupRow`] per distinct combination of the `by`
//! fields among rows matching the filter. `having` filters groups on grouped
//! values or aggregates. Requests are validated against the schema before
//! any SQL runs.

use std::collections::BTreeMap;

use serde::Serialize;
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use super::builder::{FilterCompiler, ROOT_ALIAS, clamp_offset};
use super::filter::{FieldFilter, Filter};
use super::repository::Repository;
use super::traits::{ColumnDef, Entity, EntitySchema, NullsOrder, OrderDirection};
use super::value::{ColumnKind, SqlValue, bind_all, decode_value};
use crate::error::{DbError, Result};

/// Aggregate function applied to a column.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AggregateFn {
    Count,
    Min,
    Max,
    Avg,
    Sum,
}

impl AggregateFn {
    fn sql(&self, expr: &str) -> String {
        match self {
            AggregateFn::Count => format!("COUNT({})", expr),
            AggregateFn::Min => format!("MIN({})", expr),
            AggregateFn::Max => format!("MAX({})", expr),
            AggregateFn::Avg => format!("CAST(AVG({}) AS REAL)", expr),
            AggregateFn::Sum => format!("CAST(SUM({}) AS REAL)", expr),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            AggregateFn::Count => "_count",
            AggregateFn::Min => "_min",
            AggregateFn::Max => "_max",
            AggregateFn::Avg => "_avg",
            AggregateFn::Sum => "_sum",
        }
    }

    /// Kind of the aggregate's result for a column of `kind`.
    fn result_kind(&self, kind: ColumnKind) -> ColumnKind {
        match self {
            AggregateFn::Count => ColumnKind::Integer,
            AggregateFn::Min | AggregateFn::Max => kind,
            AggregateFn::Avg | AggregateFn::Sum => ColumnKind::Float,
        }
    }

    fn check(&self, column: &ColumnDef) -> Result<()> {
        if matches!(self, AggregateFn::Avg | AggregateFn::Sum) && !column.kind.is_numeric() {
            return Err(DbError::validation(format!(
                "{} requires a numeric field, `{}` is {}",
                self.name(),
                column.name,
                column.kind.name()
            )));
        }
        Ok(())
    }
}

/// Post-aggregation filter on groups.
#[derive(Clone, Debug, PartialEq)]
pub enum Having {
    /// Condition on a grouped field, or on an aggregate of it
    Field {
        field: String,
        aggregate: Option<AggregateFn>,
        filter: FieldFilter,
    },
    And(Vec<Having>),
    Or(Vec<Having>),
    Not(Box<Having>),
}

impl Having {
    pub fn field(field: impl Into<String>, filter: FieldFilter) -> Self {
        Having::Field {
            field: field.into(),
            aggregate: None,
            filter,
        }
    }

    pub fn aggregate(field: impl Into<String>, aggregate: AggregateFn, filter: FieldFilter) -> Self {
        Having::Field {
            field: field.into(),
            aggregate: Some(aggregate),
            filter,
        }
    }
}

/// Aggregates to compute per group.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AggregateSelection {
    /// `COUNT(*)`
    pub count_all: bool,
    /// Non-null values per field
    pub count: Vec<String>,
    pub min: Vec<String>,
    pub max: Vec<String>,
    pub avg: Vec<String>,
    pub sum: Vec<String>,
}

impl AggregateSelection {
    fn requested(&self) -> impl Iterator<Item = (AggregateFn, &String)> {
        let lists = [
            (AggregateFn::Count, &self.count),
            (AggregateFn::Min, &self.min),
            (AggregateFn::Max, &self.max),
            (AggregateFn::Avg, &self.avg),
            (AggregateFn::Sum, &self.sum),
        ];
        lists
            .into_iter()
            .flat_map(|(f, fields)| fields.iter().map(move |field| (f, field)))
    }
}

/// Ordering of groups.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupOrderBy {
    pub field: String,
    pub aggregate: Option<AggregateFn>,
    pub direction: OrderDirection,
    pub nulls: Option<NullsOrder>,
}

impl GroupOrderBy {
    pub fn field(field: impl Into<String>, direction: OrderDirection) -> Self {
        Self {
            field: field.into(),
            aggregate: None,
            direction,
            nulls: None,
        }
    }

    pub fn aggregate(field: impl Into<String>, aggregate: AggregateFn, direction: OrderDirection) -> Self {
        Self {
            field: field.into(),
            aggregate: Some(aggregate),
            direction,
            nulls: None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct GroupByArgs {
    pub by: Vec<String>,
    pub filter: Option<Filter>,
    pub having: Option<Having>,
    pub aggregates: AggregateSelection,
    pub order_by: Vec<GroupOrderBy>,
    pub take: Option<i64>,
    pub skip: Option<u64>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AggregateArgs {
    pub filter: Option<Filter>,
    pub aggregates: AggregateSelection,
}

/// One group (or the single row of an `aggregate`).
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct GroupRow {
    /// Grouped field values; empty for `aggregate`
    pub key: BTreeMap<String, SqlValue>,
    #[serde(rename = "_count_all", skip_serializing_if = "Option::is_none")]
    pub count_all: Option<i64>,
    #[serde(rename = "_count", skip_serializing_if = "BTreeMap::is_empty")]
    pub count: BTreeMap<String, i64>,
    #[serde(rename = "_min", skip_serializing_if = "BTreeMap::is_empty")]
    pub min: BTreeMap<String, SqlValue>,
    #[serde(rename = "_max", skip_serializing_if = "BTreeMap::is_empty")]
    pub max: BTreeMap<String, SqlValue>,
    #[serde(rename = "_avg", skip_serializing_if = "BTreeMap::is_empty")]
    pub avg: BTreeMap<String, SqlValue>,
    #[serde(rename = "_sum", skip_serializing_if = "BTreeMap::is_empty")]
    pub sum: BTreeMap<String, SqlValue>,
}

/// A compiled aggregation statement and how to read its rows back.
#[derive(Debug)]
struct AggregatePlan {
    sql: String,
    values: Vec<SqlValue>,
    keys: Vec<&'static ColumnDef>,
    count_all: bool,
    aggregates: Vec<(AggregateFn, &'static ColumnDef)>,
}

impl AggregatePlan {
    fn decode(&self, row: &SqliteRow) -> Result<GroupRow> {
        let mut group = GroupRow::default();
        for (i, column) in self.keys.iter().enumerate() {
            let value = decode_value(row, &format!("g{}", i), column.kind)?;
            group.key.insert(column.name.to_string(), value);
        }
        if self.count_all {
            group.count_all = Some(row.try_get::<i64, _>("count_all")?);
        }
        for (i, (aggregate, column)) in self.aggregates.iter().enumerate() {
            let alias = format!("a{}", i);
            let name = column.name.to_string();
            match aggregate {
                AggregateFn::Count => {
                    group.count.insert(name, row.try_get::<i64, _>(alias.as_str())?);
                }
                other => {
                    let value = decode_value(row, &alias, other.result_kind(column.kind))?;
                    let target = match other {
                        AggregateFn::Min => &mut group.min,
                        AggregateFn::Max => &mut group.max,
                        AggregateFn::Avg => &mut group.avg,
                        _ => &mut group.sum,
                    };
                    target.insert(name, value);
                }
            }
        }
        Ok(group)
    }
}

fn aggregate_columns(
    schema: &EntitySchema,
    selection: &AggregateSelection,
) -> Result<Vec<(AggregateFn, &'static ColumnDef)>> {
    selection
        .requested()
        .map(|(aggregate, field)| {
            let column = schema.require_column(field)?;
            aggregate.check(column)?;
            Ok((aggregate, column))
        })
        .collect()
}

fn select_aggregates(
    count_all: bool,
    aggregates: &[(AggregateFn, &'static ColumnDef)],
    select: &mut Vec<String>,
) {
    if count_all {
        select.push("COUNT(*) AS count_all".to_string());
    }
    for (i, (aggregate, column)) in aggregates.iter().enumerate() {
        let expr = format!("{}.{}", ROOT_ALIAS, column.name);
        select.push(format!("{} AS a{}", aggregate.sql(&expr), i));
    }
}

/// Column for a field referenced by `having` or `order_by`.
///
/// Bare fields must be grouped; aggregated fields may be any column the
/// aggregate accepts.
fn referenced_column(
    schema: &EntitySchema,
    by: &[&'static ColumnDef],
    field: &str,
    aggregate: Option<AggregateFn>,
    context: &str,
) -> Result<&'static ColumnDef> {
    let column = schema.require_column(field)?;
    match aggregate {
        Some(aggregate) => aggregate.check(column)?,
        None if !by.iter().any(|c| c.name == column.name) => {
            return Err(DbError::validation(format!(
                "`{}` is used in {} but is not part of `by`",
                field, context
            )));
        }
        None => {}
    }
    Ok(column)
}

fn compile_having(
    compiler: &mut FilterCompiler,
    schema: &EntitySchema,
    by: &[&'static ColumnDef],
    having: &Having,
) -> Result<String> {
    match having {
        Having::Field {
            field,
            aggregate,
            filter,
        } => {
            let column = referenced_column(schema, by, field, *aggregate, "having")?;
            let expr = format!("{}.{}", ROOT_ALIAS, column.name);
            match aggregate {
                None => compiler.compile_condition(&expr, column, filter),
                Some(aggregate) => {
                    let typed = ColumnDef {
                        kind: aggregate.result_kind(column.kind),
                        nullable: true,
                        ..*column
                    };
                    compiler.compile_condition(&aggregate.sql(&expr), &typed, filter)
                }
            }
        }
        Having::And(items) if items.is_empty() => Ok("1=1".to_string()),
        Having::Or(items) if items.is_empty() => Ok("1=0".to_string()),
        Having::And(items) | Having::Or(items) => {
            let joiner = if matches!(having, Having::And(_)) { " AND " } else { " OR " };
            let parts = items
                .iter()
                .map(|h| compile_having(compiler, schema, by, h).map(|sql| format!("({})", sql)))
                .collect::<Result<Vec<_>>>()?;
            Ok(parts.join(joiner))
        }
        Having::Not(inner) => {
            let sql = compile_having(compiler, schema, by, inner)?;
            Ok(format!("NOT ({})", sql))
        }
    }
}

/// Validate a group-by request and compile it to SQL.
fn plan_group_by(schema: &'static EntitySchema, args: &GroupByArgs) -> Result<AggregatePlan> {
    if args.by.is_empty() {
        return Err(DbError::validation("groupBy requires at least one `by` field"));
    }
    let keys = args
        .by
        .iter()
        .map(|f| schema.require_column(f))
        .collect::<Result<Vec<_>>>()?;
    let aggregates = aggregate_columns(schema, &args.aggregates)?;
    if matches!(args.take, Some(t) if t < 0) {
        return Err(DbError::validation("groupBy `take` cannot be negative"));
    }

    let mut compiler = FilterCompiler::new();
    let where_sql = match &args.filter {
        Some(filter) => compiler.compile(schema, ROOT_ALIAS, filter)?,
        None => "1=1".to_string(),
    };
    let having_sql = args
        .having
        .as_ref()
        .map(|h| compile_having(&mut compiler, schema, &keys, h))
        .transpose()?;

    let mut order: Vec<String> = Vec::new();
    for term in &args.order_by {
        let column = referenced_column(schema, &keys, &term.field, term.aggregate, "orderBy")?;
        let expr = format!("{}.{}", ROOT_ALIAS, column.name);
        let expr = match term.aggregate {
            Some(aggregate) => aggregate.sql(&expr),
            None => expr,
        };
        order.push(match term.nulls {
            Some(nulls) => format!("{} {} {}", expr, term.direction.to_sql(), nulls.to_sql()),
            None => format!("{} {}", expr, term.direction.to_sql()),
        });
    }
    // Grouped fields make the group order total.
    for column in &keys {
        let expr = format!("{}.{}", ROOT_ALIAS, column.name);
        order.push(format!("{} ASC", expr));
    }

    let group_exprs: Vec<String> = keys
        .iter()
        .map(|c| format!("{}.{}", ROOT_ALIAS, c.name))
        .collect();
    let mut select: Vec<String> = group_exprs
        .iter()
        .enumerate()
        .map(|(i, expr)| format!("{} AS g{}", expr, i))
        .collect();
    select_aggregates(args.aggregates.count_all, &aggregates, &mut select);

    let mut sql = format!(
        "SELECT {} FROM {} {} WHERE {} GROUP BY {}",
        select.join(", "),
        schema.table,
        ROOT_ALIAS,
        where_sql,
        group_exprs.join(", ")
    );
    if let Some(having) = having_sql {
        sql.push_str(&format!(" HAVING {}", having));
    }
    sql.push_str(&format!(" ORDER BY {}", order.join(", ")));
    let skip = args.skip.map(clamp_offset);
    match (args.take, skip) {
        (Some(take), Some(skip)) => sql.push_str(&format!(" LIMIT {} OFFSET {}", take, skip)),
        (Some(take), None) => sql.push_str(&format!(" LIMIT {}", take)),
        (None, Some(skip)) => sql.push_str(&format!(" LIMIT -1 OFFSET {}", skip)),
        (None, None) => {}
    }

    Ok(AggregatePlan {
        sql,
        values: compiler.into_values(),
        keys,
        count_all: args.aggregates.count_all,
        aggregates,
    })
}

fn plan_aggregate(schema: &'static EntitySchema, args: &AggregateArgs) -> Result<AggregatePlan> {
    let aggregates = aggregate_columns(schema, &args.aggregates)?;
    let count_all = args.aggregates.count_all || aggregates.is_empty();

    let mut compiler = FilterCompiler::new();
    let where_sql = match &args.filter {
        Some(filter) => compiler.compile(schema, ROOT_ALIAS, filter)?,
        None => "1=1".to_string(),
    };

    let mut select = Vec::new();
    select_aggregates(count_all, &aggregates, &mut select);
    let sql = format!(
        "SELECT {} FROM {} {} WHERE {}",
        select.join(", "),
        schema.table,
        ROOT_ALIAS,
        where_sql
    );

    Ok(AggregatePlan {
        sql,
        values: compiler.into_values(),
        keys: Vec::new(),
        count_all,
        aggregates,
    })
}

impl<E: Entity> Repository<E> {
    /// Group matching rows and compute aggregates per group.
    pub async fn group_by(&self, args: GroupByArgs) -> Result<Vec<GroupRow>> {
        let plan = plan_group_by(E::schema(), &args)?;
        self.conn
            .run(async {
                let mut guard = self.conn.acquire().await?;
                tracing::debug!(sql = %plan.sql, "Grouping {}", E::ENTITY_NAME);
                let rows = bind_all(sqlx::query(&plan.sql), &plan.values)
                    .fetch_all(guard.connection()?)
                    .await?;
                rows.iter().map(|row| plan.decode(row)).collect()
            })
            .await
    }

    /// Aggregates over every matching row, without grouping.
    ///
    /// Counts all rows when no aggregate is selected.
    pub async fn aggregate(&self, args: AggregateArgs) -> Result<GroupRow> {
        let plan = plan_aggregate(E::schema(), &args)?;
        self.conn
            .run(async {
                let mut guard = self.conn.acquire().await?;
                tracing::debug!(sql = %plan.sql, "Aggregating {}", E::ENTITY_NAME);
                let row = bind_all(sqlx::query(&plan.sql), &plan.values)
                    .fetch_one(guard.connection()?)
                    .await?;
                plan.decode(&row)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{Certification, Employment};
    use crate::orm::DatabaseEntity;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_by_rejected() {
        let err = plan_group_by(Employment::schema(), &GroupByArgs::default()).unwrap_err();
        assert!(matches!(err, DbError::Validation(_)));
    }

    #[test]
    fn test_having_outside_by_rejected() {
        let args = GroupByArgs {
            by: vec!["company".into()],
            having: Some(Having::field("designation", FieldFilter::new().equals("Engineer"))),
            ..Default::default()
        };
        let err = plan_group_by(Employment::schema(), &args).unwrap_err();
        assert!(matches!(err, DbError::Validation(msg) if msg.contains("designation")));
    }

    #[test]
    fn test_aggregate_of_ungrouped_field_allowed() {
        let args = GroupByArgs {
            by: vec!["authority".into()],
            having: Some(Having::aggregate("year", AggregateFn::Max, FieldFilter::new().gt(2020))),
            order_by: vec![GroupOrderBy::aggregate("year", AggregateFn::Min, OrderDirection::Asc)],
            ..Default::default()
        };
        let plan = plan_group_by(Certification::schema(), &args).unwrap();
        assert_eq!(
            plan.sql,
            "SELECT t0.authority AS g0 FROM certifications t0 WHERE 1=1 GROUP BY t0.authority \
             HAVING MAX(t0.year) > ? ORDER BY MIN(t0.year) ASC, t0.authority ASC"
        );

        let not_numeric = GroupByArgs {
            by: vec!["authority".into()],
            having: Some(Having::aggregate("name", AggregateFn::Avg, FieldFilter::new().gt(1))),
            ..Default::default()
        };
        assert!(matches!(
            plan_group_by(Certification::schema(), &not_numeric),
            Err(DbError::Validation(_))
        ));
    }

    #[test]
    fn test_order_outside_by_rejected() {
        let args = GroupByArgs {
            by: vec!["company".into()],
            order_by: vec![GroupOrderBy::field("from_date", OrderDirection::Desc)],
            ..Default::default()
        };
        assert!(matches!(
            plan_group_by(Employment::schema(), &args),
            Err(DbError::Validation(_))
        ));
    }

    #[test]
    fn test_sum_requires_numeric_field() {
        let args = GroupByArgs {
            by: vec!["authority".into()],
            aggregates: AggregateSelection {
                sum: vec!["name".into()],
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(
            plan_group_by(Certification::schema(), &args),
            Err(DbError::Validation(_))
        ));
    }

    #[test]
    fn test_group_by_sql() {
        let args = GroupByArgs {
            by: vec!["authority".into()],
            filter: Some(Filter::field("year", FieldFilter::new().gte(2020))),
            having: Some(Having::aggregate(
                "authority",
                AggregateFn::Count,
                FieldFilter::new().gt(1),
            )),
            aggregates: AggregateSelection {
                count_all: true,
                max: vec!["year".into()],
                ..Default::default()
            },
            order_by: vec![GroupOrderBy::aggregate(
                "authority",
                AggregateFn::Count,
                OrderDirection::Desc,
            )],
            take: Some(5),
            ..Default::default()
        };
        let plan = plan_group_by(Certification::schema(), &args).unwrap();
        assert_eq!(
            plan.sql,
            "SELECT t0.authority AS g0, COUNT(*) AS count_all, MAX(t0.year) AS a0 \
             FROM certifications t0 WHERE t0.year >= ? GROUP BY t0.authority \
             HAVING COUNT(t0.authority) > ? \
             ORDER BY COUNT(t0.authority) DESC, t0.authority ASC LIMIT 5"
        );
        assert_eq!(plan.values, vec![SqlValue::Int(2020), SqlValue::Int(1)]);
    }

    #[test]
    fn test_aggregate_defaults_to_count() {
        let plan = plan_aggregate(Certification::schema(), &AggregateArgs::default()).unwrap();
        assert_eq!(
            plan.sql,
            "SELECT COUNT(*) AS count_all FROM certifications t0 WHERE 1=1"
        );
    }
}
