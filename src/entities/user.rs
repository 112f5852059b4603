//! Users and their role

use std::fmt;
use std::str::FromStr;

use careerdb_macros::Entity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    Certification, Education, Employment, Job, Profile, Project, Skill, Values, require_text,
    require_text_if_set,
};
use crate::error::{DbError, Result};
use crate::orm::{ChangeSet, ColumnKind, ColumnValue, InsertValues, Repository, SqlValue, UniqueKey};

/// Account role, stored as text
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    #[default]
    User,
    Recruiter,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Recruiter => "RECRUITER",
            Role::Admin => "ADMIN",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "USER" => Ok(Role::User),
            "RECRUITER" => Ok(Role::Recruiter),
            "ADMIN" => Ok(Role::Admin),
            other => Err(DbError::validation(format!("unknown role `{}`", other))),
        }
    }
}

impl From<Role> for SqlValue {
    fn from(role: Role) -> Self {
        SqlValue::String(role.as_str().to_string())
    }
}

impl ColumnValue for Role {
    const KIND: ColumnKind = ColumnKind::Text;

    fn to_value(&self) -> SqlValue {
        (*self).into()
    }

    fn from_value(value: SqlValue) -> anyhow::Result<Self> {
        match value {
            SqlValue::String(s) => Ok(s.parse()?),
            other => Err(anyhow::anyhow!("expected role text, got {:?}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Entity)]
#[entity(table = "users", create = CreateUser, update = UpdateUser)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[column(primary_key)]
    pub id: String,
    pub name: String,
    #[column(unique)]
    pub email: String,
    /// Password hash; absent for accounts without a local login
    pub password: Option<String>,
    #[column(default = "0")]
    pub is_verified: bool,
    pub verify_code: Option<String>,
    pub verify_code_expiry: Option<DateTime<Utc>>,
    #[column(default = "'USER'")]
    pub role: Role,
    #[column(created_at)]
    pub created_at: DateTime<Utc>,
    #[column(updated_at)]
    pub updated_at: DateTime<Utc>,

    #[relation(has_one, target = Profile, foreign_key = "user_id")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<Box<Profile>>,
    #[relation(has_many, target = Skill, foreign_key = "user_id")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skills: Option<Vec<Skill>>,
    #[relation(has_many, target = Employment, foreign_key = "user_id")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employments: Option<Vec<Employment>>,
    #[relation(has_many, target = Education, foreign_key = "user_id")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub educations: Option<Vec<Education>>,
    #[relation(has_many, target = Project, foreign_key = "user_id")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projects: Option<Vec<Project>>,
    #[relation(has_many, target = Certification, foreign_key = "user_id")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certifications: Option<Vec<Certification>>,
    #[relation(has_many, target = Job, foreign_key = "posted_by")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jobs: Option<Vec<Job>>,
}

impl User {
    /// Unique key for an email lookup.
    pub fn by_email(email: impl Into<String>) -> UniqueKey {
        UniqueKey::new("email", email.into())
    }
}

#[derive(Debug, Clone, Default)]
pub struct CreateUser {
    /// Chosen id; generated when absent
    pub id: Option<String>,
    pub name: String,
    pub email: String,
    pub password: Option<String>,
    pub is_verified: bool,
    pub verify_code: Option<String>,
    pub verify_code_expiry: Option<DateTime<Utc>>,
    pub role: Role,
}

impl CreateUser {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            ..Default::default()
        }
    }
}

impl InsertValues for CreateUser {
    fn insert_values(&self) -> Vec<(&'static str, SqlValue)> {
        Values::default()
            .maybe("id", &self.id)
            .with("name", &self.name)
            .with("email", &self.email)
            .with("password", &self.password)
            .with("is_verified", &self.is_verified)
            .with("verify_code", &self.verify_code)
            .with("verify_code_expiry", &self.verify_code_expiry)
            .with("role", &self.role)
            .finish()
    }

    fn validate(&self) -> Result<()> {
        require_text("User", "name", &self.name)?;
        validate_email(&self.email)
    }
}

#[derive(Debug, Clone, Default)]
pub struct UpdateUser {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<Option<String>>,
    pub is_verified: Option<bool>,
    pub verify_code: Option<Option<String>>,
    pub verify_code_expiry: Option<Option<DateTime<Utc>>>,
    pub role: Option<Role>,
}

impl ChangeSet for UpdateUser {
    fn assignments(&self) -> Vec<(&'static str, SqlValue)> {
        Values::default()
            .maybe("name", &self.name)
            .maybe("email", &self.email)
            .maybe("password", &self.password)
            .maybe("is_verified", &self.is_verified)
            .maybe("verify_code", &self.verify_code)
            .maybe("verify_code_expiry", &self.verify_code_expiry)
            .maybe("role", &self.role)
            .finish()
    }

    fn validate(&self) -> Result<()> {
        require_text_if_set("User", "name", &self.name)?;
        match &self.email {
            Some(email) => validate_email(email),
            None => Ok(()),
        }
    }
}

fn validate_email(email: &str) -> Result<()> {
    let trimmed = email.trim();
    match trimmed.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(()),
        _ => Err(DbError::validation(format!("invalid email `{}`", email))),
    }
}

pub type UserRepository = Repository<User>;

impl Repository<User> {
    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        self.find_unique(User::by_email(email)).await
    }
}
