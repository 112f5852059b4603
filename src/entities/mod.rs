//! Entity definitions
//!
//! One module per table. Each struct derives `Entity`, which generates the
//! schema metadata, row decoding, column access and relation loading. The
//! create and update inputs next to it are written by hand.

mod certification;
mod education;
mod employment;
mod job;
mod profile;
mod project;
mod skill;
mod user;

pub use certification::*;
pub use education::*;
pub use employment::*;
pub use job::*;
pub use profile::*;
pub use project::*;
pub use skill::*;
pub use user::*;

use crate::error::{DbError, Result};
use crate::orm::{ColumnValue, DatabaseEntity, EntitySchema, SqlValue};

/// Every entity schema, parents before children.
pub fn schemas() -> Vec<&'static EntitySchema> {
    vec![
        User::schema(),
        Profile::schema(),
        Skill::schema(),
        Employment::schema(),
        Education::schema(),
        Project::schema(),
        Certification::schema(),
        Job::schema(),
    ]
}

/// Column values of a create input.
#[derive(Default)]
pub(crate) struct Values(Vec<(&'static str, SqlValue)>);

impl Values {
    pub(crate) fn with<T: ColumnValue>(mut self, column: &'static str, value: &T) -> Self {
        self.0.push((column, value.to_value()));
        self
    }

    /// Add the column only when the caller supplied it.
    pub(crate) fn maybe<T: ColumnValue>(mut self, column: &'static str, value: &Option<T>) -> Self {
        if let Some(v) = value {
            self.0.push((column, v.to_value()));
        }
        self
    }

    pub(crate) fn finish(self) -> Vec<(&'static str, SqlValue)> {
        self.0
    }
}

/// Reject blank values of required text fields.
pub(crate) fn require_text(entity: &str, field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(DbError::validation(format!(
            "{}.{} is required",
            entity, field
        )));
    }
    Ok(())
}

/// Reject blank values of required text fields in an update.
pub(crate) fn require_text_if_set(entity: &str, field: &str, value: &Option<String>) -> Result<()> {
    match value {
        Some(v) => require_text(entity, field, v),
        None => Ok(()),
    }
}
