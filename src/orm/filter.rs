//! Filter tree for repository queries
//!
//! A [`Filter`] is a tagged tree of field conditions, boolean combinators and
//! relation conditions. It is compiled to a parameterized WHERE clause by
//! [`FilterCompiler`](super::builder::FilterCompiler); nothing here touches SQL.
//!
//! A field that does not appear in the tree is not constrained. A field filter
//! with `equals: Some(SqlValue::Null)` matches only rows where the column is NULL.

use super::value::SqlValue;

/// Comparison mode for text columns.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum QueryMode {
    #[default]
    Default,
    /// ASCII case folding on both sides of the comparison
    Insensitive,
}

/// Conditions on a single column. All set conditions must hold.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FieldFilter {
    /// Equals (`Null` matches NULL columns)
    pub equals: Option<SqlValue>,
    /// Not equals (`Null` matches non-NULL columns)
    pub not: Option<SqlValue>,
    /// In list
    pub in_list: Option<Vec<SqlValue>>,
    /// Not in list
    pub not_in: Option<Vec<SqlValue>>,
    pub lt: Option<SqlValue>,
    pub lte: Option<SqlValue>,
    pub gt: Option<SqlValue>,
    pub gte: Option<SqlValue>,
    /// Contains substring
    pub contains: Option<String>,
    pub starts_with: Option<String>,
    pub ends_with: Option<String>,
    pub mode: QueryMode,
}

impl FieldFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if filter has any conditions
    pub fn is_empty(&self) -> bool {
        self.equals.is_none()
            && self.not.is_none()
            && self.in_list.is_none()
            && self.not_in.is_none()
            && self.lt.is_none()
            && self.lte.is_none()
            && self.gt.is_none()
            && self.gte.is_none()
            && self.contains.is_none()
            && self.starts_with.is_none()
            && self.ends_with.is_none()
    }

    pub fn equals(mut self, value: impl Into<SqlValue>) -> Self {
        self.equals = Some(value.into());
        self
    }

    pub fn not(mut self, value: impl Into<SqlValue>) -> Self {
        self.not = Some(value.into());
        self
    }

    pub fn is_null(mut self) -> Self {
        self.equals = Some(SqlValue::Null);
        self
    }

    pub fn is_not_null(mut self) -> Self {
        self.not = Some(SqlValue::Null);
        self
    }

    pub fn in_list<V: Into<SqlValue>>(mut self, values: impl IntoIterator<Item = V>) -> Self {
        self.in_list = Some(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn not_in<V: Into<SqlValue>>(mut self, values: impl IntoIterator<Item = V>) -> Self {
        self.not_in = Some(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn lt(mut self, value: impl Into<SqlValue>) -> Self {
        self.lt = Some(value.into());
        self
    }

    pub fn lte(mut self, value: impl Into<SqlValue>) -> Self {
        self.lte = Some(value.into());
        self
    }

    pub fn gt(mut self, value: impl Into<SqlValue>) -> Self {
        self.gt = Some(value.into());
        self
    }

    pub fn gte(mut self, value: impl Into<SqlValue>) -> Self {
        self.gte = Some(value.into());
        self
    }

    pub fn contains(mut self, value: impl Into<String>) -> Self {
        self.contains = Some(value.into());
        self
    }

    pub fn starts_with(mut self, value: impl Into<String>) -> Self {
        self.starts_with = Some(value.into());
        self
    }

    pub fn ends_with(mut self, value: impl Into<String>) -> Self {
        self.ends_with = Some(value.into());
        self
    }

    pub fn insensitive(mut self) -> Self {
        self.mode = QueryMode::Insensitive;
        self
    }
}

/// Condition applied to the rows of a relation.
#[derive(Clone, Debug, PartialEq)]
pub enum RelationCondition {
    /// At least one related row matches (to-many)
    Some(Box<Filter>),
    /// Every related row matches; vacuously true without related rows (to-many)
    Every(Box<Filter>),
    /// No related row matches (to-many)
    None(Box<Filter>),
    /// The related row exists and matches; `None` means the relation is absent (to-one)
    Is(Option<Box<Filter>>),
    /// The related row is absent or does not match; `None` means it exists (to-one)
    IsNot(Option<Box<Filter>>),
}

impl RelationCondition {
    pub fn is_to_many(&self) -> bool {
        matches!(
            self,
            RelationCondition::Some(_) | RelationCondition::Every(_) | RelationCondition::None(_)
        )
    }
}

/// A filter tree over one entity.
#[derive(Clone, Debug, PartialEq)]
pub enum Filter {
    Field { field: String, filter: FieldFilter },
    /// All match; an empty list matches every row
    And(Vec<Filter>),
    /// Any matches; an empty list matches no row
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Relation {
        relation: String,
        condition: RelationCondition,
    },
}

impl Default for Filter {
    fn default() -> Self {
        Filter::all()
    }
}

impl Filter {
    /// Matches every row.
    pub fn all() -> Self {
        Filter::And(Vec::new())
    }

    pub fn field(field: impl Into<String>, filter: FieldFilter) -> Self {
        Filter::Field {
            field: field.into(),
            filter,
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Filter::field(field, FieldFilter::new().equals(value))
    }

    pub fn ne(field: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Filter::field(field, FieldFilter::new().not(value))
    }

    pub fn is_null(field: impl Into<String>) -> Self {
        Filter::field(field, FieldFilter::new().is_null())
    }

    pub fn is_not_null(field: impl Into<String>) -> Self {
        Filter::field(field, FieldFilter::new().is_not_null())
    }

    pub fn and(filters: impl IntoIterator<Item = Filter>) -> Self {
        Filter::And(filters.into_iter().collect())
    }

    pub fn or(filters: impl IntoIterator<Item = Filter>) -> Self {
        Filter::Or(filters.into_iter().collect())
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(filter: Filter) -> Self {
        Filter::Not(Box::new(filter))
    }

    pub fn some(relation: impl Into<String>, filter: Filter) -> Self {
        Filter::relation(relation, RelationCondition::Some(Box::new(filter)))
    }

    pub fn every(relation: impl Into<String>, filter: Filter) -> Self {
        Filter::relation(relation, RelationCondition::Every(Box::new(filter)))
    }

    pub fn none(relation: impl Into<String>, filter: Filter) -> Self {
        Filter::relation(relation, RelationCondition::None(Box::new(filter)))
    }

    pub fn is(relation: impl Into<String>, filter: Filter) -> Self {
        Filter::relation(relation, RelationCondition::Is(Some(Box::new(filter))))
    }

    pub fn is_not(relation: impl Into<String>, filter: Filter) -> Self {
        Filter::relation(relation, RelationCondition::IsNot(Some(Box::new(filter))))
    }

    /// The to-one relation is absent.
    pub fn absent(relation: impl Into<String>) -> Self {
        Filter::relation(relation, RelationCondition::Is(None))
    }

    /// The to-one relation is present.
    pub fn present(relation: impl Into<String>) -> Self {
        Filter::relation(relation, RelationCondition::IsNot(None))
    }

    fn relation(relation: impl Into<String>, condition: RelationCondition) -> Self {
        Filter::Relation {
            relation: relation.into(),
            condition,
        }
    }

    /// Combine with another filter under AND, flattening nested ANDs.
    pub fn and_also(self, other: Filter) -> Self {
        match (self, other) {
            (Filter::And(mut a), Filter::And(b)) => {
                a.extend(b);
                Filter::And(a)
            }
            (Filter::And(mut a), other) => {
                a.push(other);
                Filter::And(a)
            }
            (this, Filter::And(mut b)) => {
                b.insert(0, this);
                Filter::And(b)
            }
            (this, other) => Filter::And(vec![this, other]),
        }
    }
}
