use careerdb_macros::Entity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{User, Values, require_text, require_text_if_set};
use crate::error::{DbError, Result};
use crate::orm::{ChangeSet, InsertValues, Repository, SqlValue};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Entity)]
#[entity(table = "educations", create = CreateEducation, update = UpdateEducation)]
#[serde(rename_all = "camelCase")]
pub struct Education {
    #[column(primary_key)]
    pub id: String,
    #[column(references = User)]
    pub user_id: String,
    pub degree: String,
    pub institute: String,
    /// Year of completion
    pub year: i32,
    #[column(created_at)]
    pub created_at: DateTime<Utc>,
    #[column(updated_at)]
    pub updated_at: DateTime<Utc>,

    #[relation(belongs_to, target = User, local_key = "user_id")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<Box<User>>,
}

#[derive(Debug, Clone, Default)]
pub struct CreateEducation {
    pub id: Option<String>,
    pub user_id: String,
    pub degree: String,
    pub institute: String,
    pub year: i32,
}

impl InsertValues for CreateEducation {
    fn insert_values(&self) -> Vec<(&'static str, SqlValue)> {
        Values::default()
            .maybe("id", &self.id)
            .with("user_id", &self.user_id)
            .with("degree", &self.degree)
            .with("institute", &self.institute)
            .with("year", &self.year)
            .finish()
    }

    fn validate(&self) -> Result<()> {
        require_text("Education", "user_id", &self.user_id)?;
        require_text("Education", "degree", &self.degree)?;
        require_text("Education", "institute", &self.institute)?;
        validate_year(self.year)
    }
}

#[derive(Debug, Clone, Default)]
pub struct UpdateEducation {
    pub degree: Option<String>,
    pub institute: Option<String>,
    pub year: Option<i32>,
}

impl ChangeSet for UpdateEducation {
    fn assignments(&self) -> Vec<(&'static str, SqlValue)> {
        Values::default()
            .maybe("degree", &self.degree)
            .maybe("institute", &self.institute)
            .maybe("year", &self.year)
            .finish()
    }

    fn validate(&self) -> Result<()> {
        require_text_if_set("Education", "degree", &self.degree)?;
        require_text_if_set("Education", "institute", &self.institute)?;
        self.year.map_or(Ok(()), validate_year)
    }
}

pub(crate) fn validate_year(year: i32) -> Result<()> {
    if !(1900..=2200).contains(&year) {
        return Err(DbError::validation(format!("year {} is out of range", year)));
    }
    Ok(())
}

pub type EducationRepository = Repository<Education>;
