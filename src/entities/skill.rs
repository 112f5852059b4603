use careerdb_macros::Entity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{User, Values, require_text, require_text_if_set};
use crate::error::Result;
use crate::orm::{ChangeSet, InsertValues, Repository, SqlValue};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Entity)]
#[entity(table = "skills", create = CreateSkill, update = UpdateSkill)]
#[serde(rename_all = "camelCase")]
pub struct Skill {
    #[column(primary_key)]
    pub id: String,
    #[column(references = User)]
    pub user_id: String,
    pub name: String,
    #[column(created_at)]
    pub created_at: DateTime<Utc>,

    #[relation(belongs_to, target = User, local_key = "user_id")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<Box<User>>,
}

#[derive(Debug, Clone, Default)]
pub struct CreateSkill {
    pub id: Option<String>,
    pub user_id: String,
    pub name: String,
}

impl CreateSkill {
    pub fn new(user_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: None,
            user_id: user_id.into(),
            name: name.into(),
        }
    }
}

impl InsertValues for CreateSkill {
    fn insert_values(&self) -> Vec<(&'static str, SqlValue)> {
        Values::default()
            .maybe("id", &self.id)
            .with("user_id", &self.user_id)
            .with("name", &self.name)
            .finish()
    }

    fn validate(&self) -> Result<()> {
        require_text("Skill", "user_id", &self.user_id)?;
        require_text("Skill", "name", &self.name)
    }
}

#[derive(Debug, Clone, Default)]
pub struct UpdateSkill {
    pub name: Option<String>,
}

impl ChangeSet for UpdateSkill {
    fn assignments(&self) -> Vec<(&'static str, SqlValue)> {
        Values::default().maybe("name", &self.name).finish()
    }

    fn validate(&self) -> Result<()> {
        require_text_if_set("Skill", "name", &self.name)
    }
}

pub type SkillRepository = Repository<Skill>;
