use careerdb_macros::Entity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::education::validate_year;
use super::{User, Values, require_text, require_text_if_set};
use crate::error::Result;
use crate::orm::{ChangeSet, InsertValues, Repository, SqlValue};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Entity)]
#[entity(table = "certifications", create = CreateCertification, update = UpdateCertification)]
#[serde(rename_all = "camelCase")]
pub struct Certification {
    #[column(primary_key)]
    pub id: String,
    #[column(references = User)]
    pub user_id: String,
    pub name: String,
    /// Issuing body
    pub authority: String,
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
pub struct CreateCertification {
    pub id: Option<String>,
    pub user_id: String,
    pub name: String,
    pub authority: String,
    pub year: i32,
}

impl InsertValues for CreateCertification {
    fn insert_values(&self) -> Vec<(&'static str, SqlValue)> {
        Values::default()
            .maybe("id", &self.id)
            .with("user_id", &self.user_id)
            .with("name", &self.name)
            .with("authority", &self.authority)
            .with("year", &self.year)
            .finish()
    }

    fn validate(&self) -> Result<()> {
        require_text("Certification", "user_id", &self.user_id)?;
        require_text("Certification", "name", &self.name)?;
        require_text("Certification", "authority", &self.authority)?;
        validate_year(self.year)
    }
}

#[derive(Debug, Clone, Default)]
pub struct UpdateCertification {
    pub name: Option<String>,
    pub authority: Option<String>,
    pub year: Option<i32>,
}

impl ChangeSet for UpdateCertification {
    fn assignments(&self) -> Vec<(&'static str, SqlValue)> {
        Values::default()
            .maybe("name", &self.name)
            .maybe("authority", &self.authority)
            .maybe("year", &self.year)
            .finish()
    }

    fn validate(&self) -> Result<()> {
        require_text_if_set("Certification", "name", &self.name)?;
        require_text_if_set("Certification", "authority", &self.authority)?;
        self.year.map_or(Ok(()), validate_year)
    }
}

pub type CertificationRepository = Repository<Certification>;
