use careerdb_macros::Entity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{User, Values, require_text, require_text_if_set};
use crate::error::Result;
use crate::orm::{ChangeSet, InsertValues, Repository, SqlValue};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Entity)]
#[entity(table = "projects", create = CreateProject, update = UpdateProject)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    #[column(primary_key)]
    pub id: String,
    #[column(references = User)]
    pub user_id: String,
    pub name: String,
    /// The user's part in the project
    pub role: Option<String>,
    pub from_date: DateTime<Utc>,
    pub to_date: Option<DateTime<Utc>>,
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
pub struct CreateProject {
    pub id: Option<String>,
    pub user_id: String,
    pub name: String,
    pub role: Option<String>,
    pub from_date: DateTime<Utc>,
    pub to_date: Option<DateTime<Utc>>,
    pub description: Option<String>,
}

impl InsertValues for CreateProject {
    fn insert_values(&self) -> Vec<(&'static str, SqlValue)> {
        Values::default()
            .maybe("id", &self.id)
            .with("user_id", &self.user_id)
            .with("name", &self.name)
            .with("role", &self.role)
            .with("from_date", &self.from_date)
            .with("to_date", &self.to_date)
            .with("description", &self.description)
            .finish()
    }

    fn validate(&self) -> Result<()> {
        require_text("Project", "user_id", &self.user_id)?;
        require_text("Project", "name", &self.name)
    }
}

#[derive(Debug, Clone, Default)]
pub struct UpdateProject {
    pub name: Option<String>,
    pub role: Option<Option<String>>,
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<Option<DateTime<Utc>>>,
    pub description: Option<Option<String>>,
}

impl ChangeSet for UpdateProject {
    fn assignments(&self) -> Vec<(&'static str, SqlValue)> {
        Values::default()
            .maybe("name", &self.name)
            .maybe("role", &self.role)
            .maybe("from_date", &self.from_date)
            .maybe("to_date", &self.to_date)
            .maybe("description", &self.description)
            .finish()
    }

    fn validate(&self) -> Result<()> {
        require_text_if_set("Project", "name", &self.name)
    }
}

pub type ProjectRepository = Repository<Project>;
