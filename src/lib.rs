//! careerdb - typed data access for the career portal schema
//!
//! Eight entities (users and their profile, skills, employments, educations,
//! projects, certifications and job postings) served by one generic
//! [`Repository`](orm::Repository) over SQLite.
//!
//! ```rust,ignore
//! let db = Database::connect("sqlite::memory:").await?;
//! db.sync_schema().await;
//!
//! let user = db.users().create(CreateUser::new("Ann", "a@x.com")).await?;
//! db.skills().create(CreateSkill::new(&user.id, "Go")).await?;
//!
//! let loaded = db
//!     .users()
//!     .find_unique_with(UniqueKey::id(&user.id), Include::new().with("skills"))
//!     .await?;
//! ```

pub mod config;
pub mod db;
pub mod entities;
pub mod error;
pub mod logging;
pub mod orm;

pub use config::Config;
pub use db::{Database, IsolationLevel, Transaction, TransactionOptions};
pub use error::{ConstraintKind, DbError, Result};
