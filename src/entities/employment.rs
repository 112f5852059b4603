use careerdb_macros::Entity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{User, Values, require_text, require_text_if_set};
use crate::error::Result;
use crate::orm::{ChangeSet, InsertValues, Repository, SqlValue};

/// A position held by a user.
///
/// `current` with a null `to_date` is the convention for an ongoing
/// position. Neither that pairing nor a single current position per user is
/// enforced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Entity)]
#[entity(table = "employments", create = CreateEmployment, update = UpdateEmployment)]
#[serde(rename_all = "camelCase")]
pub struct Employment {
    #[column(primary_key)]
    pub id: String,
    #[column(references = User)]
    pub user_id: String,
    pub company: String,
    pub designation: String,
    pub from_date: DateTime<Utc>,
    pub to_date: Option<DateTime<Utc>>,
    #[column(default = "0")]
    pub current: bool,
    pub description: Option<String>,
    #[column(created_at)]
    pub created_at: DateTime<Utc>,
    #[column(updated_at)]
    pub updated_at: DateTime<Utc>,

    #[relation(belongs_to, target = User, local_key = "user_id")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<Box<User>>,
}

#[derive(Debug, Clone)]
pub struct CreateEmployment {
    pub id: Option<String>,
    pub user_id: String,
    pub company: String,
    pub designation: String,
    pub from_date: DateTime<Utc>,
    pub to_date: Option<DateTime<Utc>>,
    pub current: bool,
    pub description: Option<String>,
}

impl CreateEmployment {
    pub fn new(
        user_id: impl Into<String>,
        company: impl Into<String>,
        designation: impl Into<String>,
        from_date: DateTime<Utc>,
    ) -> Self {
        Self {
            id: None,
            user_id: user_id.into(),
            company: company.into(),
            designation: designation.into(),
            from_date,
            to_date: None,
            current: false,
            description: None,
        }
    }
}

impl InsertValues for CreateEmployment {
    fn insert_values(&self) -> Vec<(&'static str, SqlValue)> {
        Values::default()
            .maybe("id", &self.id)
            .with("user_id", &self.user_id)
            .with("company", &self.company)
            .with("designation", &self.designation)
            .with("from_date", &self.from_date)
            .with("to_date", &self.to_date)
            .with("current", &self.current)
            .with("description", &self.description)
            .finish()
    }

    fn validate(&self) -> Result<()> {
        require_text("Employment", "user_id", &self.user_id)?;
        require_text("Employment", "company", &self.company)?;
        require_text("Employment", "designation", &self.designation)
    }
}

#[derive(Debug, Clone, Default)]
pub struct UpdateEmployment {
    pub company: Option<String>,
    pub designation: Option<String>,
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<Option<DateTime<Utc>>>,
    pub current: Option<bool>,
    pub description: Option<Option<String>>,
}

impl ChangeSet for UpdateEmployment {
    fn assignments(&self) -> Vec<(&'static str, SqlValue)> {
        Values::default()
            .maybe("company", &self.company)
            .maybe("designation", &self.designation)
            .maybe("from_date", &self.from_date)
            .maybe("to_date", &self.to_date)
            .maybe("current", &self.current)
            .maybe("description", &self.description)
            .finish()
    }

    fn validate(&self) -> Result<()> {
        require_text_if_set("Employment", "company", &self.company)?;
        require_text_if_set("Employment", "designation", &self.designation)
    }
}

pub type EmploymentRepository = Repository<Employment>;
