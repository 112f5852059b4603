//! Relation loading
//!
//! Requested relations are loaded in bulk for a whole result set: one query
//! per relation per chunk of parent keys, grouped by foreign key in memory.
//! Nested filters, ordering and pagination apply per parent. Nested includes
//! are loaded for all kept children at once.

use std::collections::{BTreeMap, HashMap, HashSet};

use sqlx::SqliteConnection;

use super::builder::{EntityQuery, FilterCompiler, ROOT_ALIAS};
use super::context::QueryContext;
use super::filter::Filter;
use super::traits::{Entity, EntitySchema, FieldAccess, OrderBy, RelationDef};
use super::value::SqlValue;
use crate::error::{DbError, Result};

/// Upper bound on keys bound into one `IN (...)` list.
pub const RELATION_CHUNK_SIZE: usize = 500;

/// Relations to load alongside a read, by relation name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Include {
    relations: BTreeMap<String, RelationArgs>,
}

impl Include {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `relation` with default arguments.
    pub fn with(self, relation: impl Into<String>) -> Self {
        self.relation(relation, RelationArgs::default())
    }

    pub fn relation(mut self, relation: impl Into<String>, args: RelationArgs) -> Self {
        self.relations.insert(relation.into(), args);
        self
    }

    pub fn get(&self, relation: &str) -> Option<&RelationArgs> {
        self.relations.get(relation)
    }

    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &RelationArgs)> {
        self.relations.iter()
    }

    /// Check relation names and nested arguments against `schema`, recursively.
    pub fn validate(&self, schema: &'static EntitySchema) -> Result<()> {
        for (name, args) in &self.relations {
            let relation = schema.require_relation(name)?;
            args.validate(relation)?;
        }
        Ok(())
    }
}

/// Arguments of one included relation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelationArgs {
    pub filter: Option<Filter>,
    pub order_by: Vec<OrderBy>,
    /// Per parent; negative takes from the end
    pub take: Option<i64>,
    pub skip: Option<u64>,
    pub distinct: Vec<String>,
    pub include: Include,
    /// Fail with NotFound when a to-one relation is absent. To-one includes
    /// take no filter, so this only fires for a missing row.
    pub required: bool,
}

impl RelationArgs {
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by.push(order);
        self
    }

    pub fn take(mut self, take: i64) -> Self {
        self.take = Some(take);
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn distinct(mut self, field: impl Into<String>) -> Self {
        self.distinct.push(field.into());
        self
    }

    pub fn include(mut self, include: Include) -> Self {
        self.include = include;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    fn validate(&self, relation: &'static RelationDef) -> Result<()> {
        let target = (relation.target)();
        let to_many = relation.kind.is_to_many();

        if !to_many
            && (self.filter.is_some()
                || self.take.is_some()
                || self.skip.is_some()
                || !self.distinct.is_empty())
        {
            return Err(DbError::validation(format!(
                "filter/take/skip/distinct are only valid on to-many relations, `{}` is to-one",
                relation.name
            )));
        }
        if to_many && self.required {
            return Err(DbError::validation(format!(
                "`required` is only valid on to-one relations, `{}` is to-many",
                relation.name
            )));
        }
        for term in &self.order_by {
            target.require_column(&term.field)?;
        }
        for field in &self.distinct {
            target.require_column(field)?;
        }
        if let Some(filter) = &self.filter {
            FilterCompiler::new().compile(target, ROOT_ALIAS, filter)?;
        }
        self.include.validate(target)
    }
}

/// Load relation rows for every parent, in parent order.
///
/// Each returned batch is filtered, ordered and paginated for its parent, and
/// carries its own nested includes.
pub async fn load_relation<P, C>(
    parents: &[P],
    relation: &'static RelationDef,
    args: &RelationArgs,
    conn: &mut SqliteConnection,
    ctx: &QueryContext,
) -> Result<Vec<Vec<C>>>
where
    P: FieldAccess,
    C: Entity,
{
    let parent_keys: Vec<Option<SqlValue>> = parents
        .iter()
        .map(|p| p.field_value(relation.local_column).filter(|v| !v.is_null()))
        .collect();

    let mut seen = HashSet::new();
    let keys: Vec<SqlValue> = parent_keys
        .iter()
        .flatten()
        .filter(|v| v.key().is_some_and(|k| seen.insert(k)))
        .cloned()
        .collect();

    let mut grouped: HashMap<String, Vec<C>> = HashMap::new();
    if !keys.is_empty() {
        let omitted = ctx.omit.columns_for(C::schema(), &[])?;
        for chunk in keys.chunks(RELATION_CHUNK_SIZE) {
            let mut query = EntityQuery::<C>::new().where_in(relation.foreign_column, chunk);
            if let Some(filter) = &args.filter {
                query = query.filter(filter)?;
            }
            let query = query.order_by(&args.order_by)?.omit(omitted.clone());

            for row in query.fetch_all(conn).await? {
                if let Some(key) = row.field_value(relation.foreign_column).and_then(|v| v.key()) {
                    grouped.entry(key).or_default().push(row);
                }
            }
        }
    }

    tracing::debug!(
        relation = relation.name,
        parents = parents.len(),
        keys = keys.len(),
        "Loaded relation"
    );

    let batches: Vec<Vec<C>> = parent_keys
        .iter()
        .map(|key| {
            let rows = key
                .as_ref()
                .and_then(|k| k.key())
                .and_then(|k| grouped.get(&k).cloned())
                .unwrap_or_default();
            paginate(distinct_by(rows, &args.distinct), args.skip, args.take)
        })
        .collect();

    if args.include.is_empty() {
        return Ok(batches);
    }

    let sizes: Vec<usize> = batches.iter().map(Vec::len).collect();
    let mut children: Vec<C> = batches.into_iter().flatten().collect();
    C::load_relations(&mut children, &args.include, conn, ctx).await?;

    let mut children = children.into_iter();
    Ok(sizes
        .into_iter()
        .map(|size| children.by_ref().take(size).collect())
        .collect())
}

/// Collapse a to-one batch to its row, enforcing `required`.
pub fn single<C: Entity>(rows: Vec<C>, args: &RelationArgs) -> Result<Option<Box<C>>> {
    match rows.into_iter().next() {
        Some(row) => Ok(Some(Box::new(row))),
        None if args.required => Err(DbError::NotFound {
            entity: C::ENTITY_NAME,
        }),
        None => Ok(None),
    }
}

/// Keep the first row of every distinct combination of `fields`.
pub fn distinct_by<T: FieldAccess>(rows: Vec<T>, fields: &[String]) -> Vec<T> {
    if fields.is_empty() {
        return rows;
    }
    let mut seen = HashSet::new();
    rows.into_iter()
        .filter(|row| {
            let key: Vec<Option<SqlValue>> = fields.iter().map(|f| row.field_value(f)).collect();
            seen.insert(format!("{:?}", key))
        })
        .collect()
}

/// Apply skip/take in memory. A negative `take` counts from the end.
pub fn paginate<T>(rows: Vec<T>, skip: Option<u64>, take: Option<i64>) -> Vec<T> {
    let skip = skip.map_or(0, |s| usize::try_from(s).unwrap_or(usize::MAX));
    let magnitude = |t: i64| usize::try_from(t.unsigned_abs()).unwrap_or(usize::MAX);
    match take {
        Some(take) if take < 0 => {
            let end = rows.len().saturating_sub(skip);
            let start = end.saturating_sub(magnitude(take));
            rows.into_iter().skip(start).take(end - start).collect()
        }
        Some(take) => rows.into_iter().skip(skip).take(magnitude(take)).collect(),
        None => rows.into_iter().skip(skip).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::User;
    use crate::orm::DatabaseEntity;

    #[test]
    fn test_paginate_forward_and_backward() {
        let rows: Vec<i32> = (1..=6).collect();
        assert_eq!(paginate(rows.clone(), Some(1), Some(2)), vec![2, 3]);
        assert_eq!(paginate(rows.clone(), None, Some(-2)), vec![5, 6]);
        assert_eq!(paginate(rows.clone(), Some(1), Some(-2)), vec![4, 5]);
        assert_eq!(paginate(rows.clone(), Some(10), Some(3)), Vec::<i32>::new());
        assert_eq!(paginate(rows.clone(), Some(u64::MAX), None), Vec::<i32>::new());
        assert_eq!(paginate(rows.clone(), None, Some(i64::MIN)).len(), 6);
        assert_eq!(paginate(rows, None, None).len(), 6);
    }

    #[test]
    fn test_include_validation() {
        let ok = Include::new()
            .with("profile")
            .relation("skills", RelationArgs::default().take(2).order_by(OrderBy::asc("name")));
        assert!(ok.validate(User::schema()).is_ok());

        let unknown = Include::new().with("friends");
        assert!(matches!(unknown.validate(User::schema()), Err(DbError::Validation(_))));

        let take_on_one = Include::new().relation("profile", RelationArgs::default().take(1));
        assert!(matches!(take_on_one.validate(User::schema()), Err(DbError::Validation(_))));

        let filter_on_one = Include::new().relation(
            "profile",
            RelationArgs::default()
                .filter(Filter::eq("location", "Berlin"))
                .required(),
        );
        assert!(matches!(filter_on_one.validate(User::schema()), Err(DbError::Validation(_))));

        let nested_bad = Include::new().relation(
            "jobs",
            RelationArgs::default().include(Include::new().with("skills")),
        );
        assert!(matches!(nested_bad.validate(User::schema()), Err(DbError::Validation(_))));
    }
}
