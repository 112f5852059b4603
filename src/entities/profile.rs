use careerdb_macros::Entity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{User, Values, require_text};
use crate::error::Result;
use crate::orm::{ChangeSet, InsertValues, Repository, SqlValue, UniqueKey};

/// Public profile of a user; at most one per user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Entity)]
#[entity(table = "profiles", create = CreateProfile, update = UpdateProfile)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[column(primary_key)]
    pub id: String,
    #[column(unique, references = User)]
    pub user_id: String,
    pub summary: Option<String>,
    pub full_name: Option<String>,
    pub mobile: Option<String>,
    pub location: Option<String>,
    pub total_experience: Option<String>,
    pub notice_period: Option<String>,
    pub resume_url: Option<String>,
    #[column(created_at)]
    pub created_at: DateTime<Utc>,
    #[column(updated_at)]
    pub updated_at: DateTime<Utc>,

    #[relation(belongs_to, target = User, local_key = "user_id")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<Box<User>>,
}

impl Profile {
    /// Unique key for the profile of `user_id`.
    pub fn by_user(user_id: impl Into<String>) -> UniqueKey {
        UniqueKey::new("user_id", user_id.into())
    }
}

#[derive(Debug, Clone, Default)]
pub struct CreateProfile {
    pub id: Option<String>,
    pub user_id: String,
    pub summary: Option<String>,
    pub full_name: Option<String>,
    pub mobile: Option<String>,
    pub location: Option<String>,
    pub total_experience: Option<String>,
    pub notice_period: Option<String>,
    pub resume_url: Option<String>,
}

impl CreateProfile {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Default::default()
        }
    }
}

impl InsertValues for CreateProfile {
    fn insert_values(&self) -> Vec<(&'static str, SqlValue)> {
        Values::default()
            .maybe("id", &self.id)
            .with("user_id", &self.user_id)
            .with("summary", &self.summary)
            .with("full_name", &self.full_name)
            .with("mobile", &self.mobile)
            .with("location", &self.location)
            .with("total_experience", &self.total_experience)
            .with("notice_period", &self.notice_period)
            .with("resume_url", &self.resume_url)
            .finish()
    }

    fn validate(&self) -> Result<()> {
        require_text("Profile", "user_id", &self.user_id)
    }
}

#[derive(Debug, Clone, Default)]
pub struct UpdateProfile {
    pub summary: Option<Option<String>>,
    pub full_name: Option<Option<String>>,
    pub mobile: Option<Option<String>>,
    pub location: Option<Option<String>>,
    pub total_experience: Option<Option<String>>,
    pub notice_period: Option<Option<String>>,
    pub resume_url: Option<Option<String>>,
}

impl ChangeSet for UpdateProfile {
    fn assignments(&self) -> Vec<(&'static str, SqlValue)> {
        Values::default()
            .maybe("summary", &self.summary)
            .maybe("full_name", &self.full_name)
            .maybe("mobile", &self.mobile)
            .maybe("location", &self.location)
            .maybe("total_experience", &self.total_experience)
            .maybe("notice_period", &self.notice_period)
            .maybe("resume_url", &self.resume_url)
            .finish()
    }
}

pub type ProfileRepository = Repository<Profile>;

impl Repository<Profile> {
    pub async fn find_by_user_id(&self, user_id: &str) -> Result<Option<Profile>> {
        self.find_unique(Profile::by_user(user_id)).await
    }
}
