//! Shared fixtures for integration tests

#![allow(dead_code)]

use careerdb::config::Config;
use careerdb::db::Database;
use careerdb::entities::{CreateProfile, CreateSkill, CreateUser, User};
use tempfile::TempDir;

/// A synced database in a throwaway directory. Keep the `TempDir` alive for
/// as long as the database is used.
pub async fn test_db() -> (TempDir, Database) {
    test_db_with(Config::default()).await
}

pub async fn test_db_with(config: Config) -> (TempDir, Database) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let config = Config {
        database_url: dir
            .path()
            .join("careerdb.db")
            .to_string_lossy()
            .into_owned(),
        ..config
    };
    let db = Database::connect_with_config(&config)
        .await
        .expect("connect to test database");
    let sync = db.sync_schema().await;
    assert!(sync.errors.is_empty(), "schema sync failed: {:?}", sync.errors);
    (dir, db)
}

pub async fn create_user(db: &Database, name: &str, email: &str) -> User {
    db.users()
        .create(CreateUser::new(name, email))
        .await
        .expect("create user")
}

/// User with a profile and the given skills.
pub async fn create_candidate(db: &Database, name: &str, email: &str, skills: &[&str]) -> User {
    let user = create_user(db, name, email).await;
    db.profiles()
        .create(CreateProfile {
            full_name: Some(name.to_string()),
            ..CreateProfile::new(&user.id)
        })
        .await
        .expect("create profile");
    for skill in skills {
        db.skills()
            .create(CreateSkill::new(&user.id, *skill))
            .await
            .expect("create skill");
    }
    user
}
