use careerdb_macros::Entity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{User, Values, require_text, require_text_if_set};
use crate::error::Result;
use crate::orm::{ChangeSet, InsertValues, Repository, SqlValue};

/// A job posting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Entity)]
#[entity(table = "jobs", create = CreateJob, update = UpdateJob)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    #[column(primary_key)]
    pub id: String,
    pub title: String,
    pub description: String,
    pub company: String,
    pub location: String,
    pub salary: String,
    pub job_type: String,
    pub employment_type: String,
    pub work_mode: String,
    pub experience: String,
    /// Comma separated, denormalised
    pub skills: Option<String>,
    #[column(references = User)]
    pub posted_by: String,
    #[column(created_at)]
    pub created_at: DateTime<Utc>,
    #[column(updated_at)]
    pub updated_at: DateTime<Utc>,

    #[relation(belongs_to, target = User, local_key = "posted_by")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poster: Option<Box<User>>,
}

impl Job {
    /// Individual entries of the denormalised skills list.
    pub fn skill_list(&self) -> Vec<&str> {
        self.skills
            .as_deref()
            .map(|s| s.split(',').map(str::trim).filter(|s| !s.is_empty()).collect())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct CreateJob {
    pub id: Option<String>,
    pub title: String,
    pub description: String,
    pub company: String,
    pub location: String,
    pub salary: String,
    pub job_type: String,
    pub employment_type: String,
    pub work_mode: String,
    pub experience: String,
    pub skills: Option<String>,
    pub posted_by: String,
}

impl InsertValues for CreateJob {
    fn insert_values(&self) -> Vec<(&'static str, SqlValue)> {
        Values::default()
            .maybe("id", &self.id)
            .with("title", &self.title)
            .with("description", &self.description)
            .with("company", &self.company)
            .with("location", &self.location)
            .with("salary", &self.salary)
            .with("job_type", &self.job_type)
            .with("employment_type", &self.employment_type)
            .with("work_mode", &self.work_mode)
            .with("experience", &self.experience)
            .with("skills", &self.skills)
            .with("posted_by", &self.posted_by)
            .finish()
    }

    fn validate(&self) -> Result<()> {
        require_text("Job", "title", &self.title)?;
        require_text("Job", "company", &self.company)?;
        require_text("Job", "posted_by", &self.posted_by)
    }
}

#[derive(Debug, Clone, Default)]
pub struct UpdateJob {
    pub title: Option<String>,
    pub description: Option<String>,
    pub company: Option<String>,
    pub location: Option<String>,
    pub salary: Option<String>,
    pub job_type: Option<String>,
    pub employment_type: Option<String>,
    pub work_mode: Option<String>,
    pub experience: Option<String>,
    pub skills: Option<Option<String>>,
}

impl ChangeSet for UpdateJob {
    fn assignments(&self) -> Vec<(&'static str, SqlValue)> {
        Values::default()
            .maybe("title", &self.title)
            .maybe("description", &self.description)
            .maybe("company", &self.company)
            .maybe("location", &self.location)
            .maybe("salary", &self.salary)
            .maybe("job_type", &self.job_type)
            .maybe("employment_type", &self.employment_type)
            .maybe("work_mode", &self.work_mode)
            .maybe("experience", &self.experience)
            .maybe("skills", &self.skills)
            .finish()
    }

    fn validate(&self) -> Result<()> {
        require_text_if_set("Job", "title", &self.title)?;
        require_text_if_set("Job", "company", &self.company)
    }
}

pub type JobRepository = Repository<Job>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orm::{DatabaseEntity, RelationKind};

    #[test]
    fn test_poster_relation() {
        let relation = Job::schema().relation("poster").unwrap();
        assert_eq!(relation.kind, RelationKind::BelongsTo);
        assert_eq!(relation.local_column, "posted_by");
        assert_eq!(relation.foreign_column, "id");
        assert_eq!((relation.target)().table, "users");
    }

    #[test]
    fn test_schema_sql() {
        let schema = Job::schema();
        assert!(schema
            .create_table_sql()
            .contains("posted_by TEXT NOT NULL REFERENCES users(id)"));
        assert_eq!(
            schema.index_sql(),
            vec!["CREATE INDEX IF NOT EXISTS idx_jobs_posted_by ON jobs (posted_by)"]
        );
    }

    #[test]
    fn test_skill_list() {
        let now = chrono::Utc::now();
        let job = Job {
            id: "j1".into(),
            title: "Backend".into(),
            description: String::new(),
            company: "Acme".into(),
            location: "Remote".into(),
            salary: "100k".into(),
            job_type: "FULL_TIME".into(),
            employment_type: "PERMANENT".into(),
            work_mode: "REMOTE".into(),
            experience: "3+".into(),
            skills: Some("Rust, Go,,SQL ".into()),
            posted_by: "u1".into(),
            created_at: now,
            updated_at: now,
            poster: None,
        };
        assert_eq!(job.skill_list(), vec!["Rust", "Go", "SQL"]);
    }
}
