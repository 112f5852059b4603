//! Integration tests for transactions and cascading deletes

mod common;

use std::time::Duration;

use assert_matches::assert_matches;
use careerdb::config::Config;
use careerdb::db::{IsolationLevel, TransactionOptions};
use careerdb::entities::{CreateProfile, CreateSkill, CreateUser, User};
use careerdb::error::DbError;
use careerdb::orm::{Filter, Include, UniqueKey};
use pretty_assertions::assert_eq;

use common::{create_candidate, test_db, test_db_with};

#[tokio::test]
async fn test_transaction_commits_on_ok() {
    let (_dir, db) = test_db().await;

    let user = db
        .transaction(|tx| async move {
            let user = tx.users().create(CreateUser::new("Ann", "a@x.com")).await?;
            tx.profiles().create(CreateProfile::new(&user.id)).await?;
            tx.skills().create(CreateSkill::new(&user.id, "Go")).await?;

            // Reads inside the transaction see its own writes
            let seen = tx.skills().count(Filter::eq("user_id", user.id.as_str())).await?;
            assert_eq!(seen, 1);
            Ok::<_, DbError>(user)
        })
        .await
        .unwrap();

    let loaded = db
        .users()
        .find_unique_with(
            UniqueKey::id(&user.id),
            Include::new().with("profile").with("skills"),
        )
        .await
        .unwrap()
        .unwrap();
    assert!(loaded.profile.is_some());
    assert_eq!(loaded.skills.map(|s| s.len()), Some(1));
}

#[tokio::test]
async fn test_transaction_rolls_back_on_err() {
    let (_dir, db) = test_db().await;

    let err = db
        .transaction(|tx| async move {
            tx.users().create(CreateUser::new("Ann", "a@x.com")).await?;
            Err::<(), _>(DbError::validation("abandon"))
        })
        .await
        .unwrap_err();
    assert_matches!(err, DbError::Validation(msg) if msg == "abandon");
    assert_eq!(db.users().count(Filter::all()).await.unwrap(), 0);
}

#[tokio::test]
async fn test_failed_write_rolls_back_earlier_writes() {
    let (_dir, db) = test_db().await;

    let err = db
        .transaction(|tx| async move {
            tx.users().create(CreateUser::new("Ann", "a@x.com")).await?;
            tx.users().create(CreateUser::new("Ann", "a@x.com")).await?;
            Ok::<_, DbError>(())
        })
        .await
        .unwrap_err();
    assert!(err.is_unique_violation_on("email"));
    assert_eq!(db.users().count(Filter::all()).await.unwrap(), 0);
}

#[tokio::test]
async fn test_transaction_timeout_rolls_back() {
    let (_dir, db) = test_db().await;
    let options = TransactionOptions::default().with_timeout(Duration::from_millis(100));

    let err = db
        .transaction_with(options, |tx| async move {
            tx.users().create(CreateUser::new("Ann", "a@x.com")).await?;
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok::<_, DbError>(())
        })
        .await
        .unwrap_err();
    assert_matches!(err, DbError::Timeout(_));
    assert!(err.is_retryable());
    assert_eq!(db.users().count(Filter::all()).await.unwrap(), 0);
}

#[tokio::test]
async fn test_operations_after_deadline_time_out() {
    let (_dir, db) = test_db().await;
    let tx = db
        .begin_with(TransactionOptions::default().with_timeout(Duration::from_millis(50)))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let err = tx.users().count(Filter::all()).await.unwrap_err();
    assert_matches!(err, DbError::Timeout(_));

    let err = tx.commit().await.unwrap_err();
    assert_matches!(err, DbError::Timeout(_));
}

#[tokio::test]
async fn test_closed_transaction_rejects_operations() {
    let (_dir, db) = test_db().await;
    let tx = db.begin().await.unwrap();
    let users = tx.users();
    let handle = tx.clone();

    users.create(CreateUser::new("Ann", "a@x.com")).await.unwrap();
    tx.commit().await.unwrap();
    assert!(!handle.is_open().await);

    let err = users
        .create(CreateUser::new("Bob", "b@x.com"))
        .await
        .unwrap_err();
    assert_matches!(err, DbError::TransactionClosed);

    let err = handle.commit().await.unwrap_err();
    assert_matches!(err, DbError::TransactionClosed);

    assert_eq!(db.users().count(Filter::all()).await.unwrap(), 1);
}

#[tokio::test]
async fn test_explicit_rollback() {
    let (_dir, db) = test_db().await;
    let tx = db
        .begin_with(
            TransactionOptions::default().with_isolation_level(IsolationLevel::ReadCommitted),
        )
        .await
        .unwrap();

    tx.users().create(CreateUser::new("Ann", "a@x.com")).await.unwrap();
    assert!(tx.is_open().await);
    tx.rollback().await.unwrap();

    assert_eq!(db.users().count(Filter::all()).await.unwrap(), 0);
}

#[tokio::test]
async fn test_dropped_transaction_is_rolled_back() {
    let (_dir, db) = test_db().await;
    {
        let tx = db.begin().await.unwrap();
        tx.users().create(CreateUser::new("Ann", "a@x.com")).await.unwrap();
    }
    assert_eq!(db.users().count(Filter::all()).await.unwrap(), 0);
}

#[tokio::test]
async fn test_begin_waits_at_most_max_wait() {
    let config = Config {
        max_connections: 1,
        ..Config::default()
    };
    let (_dir, db) = test_db_with(config).await;

    let held = db.begin().await.unwrap();
    let err = db
        .begin_with(TransactionOptions::default().with_max_wait(Duration::from_millis(100)))
        .await
        .unwrap_err();
    assert_matches!(err, DbError::Timeout(_));

    held.rollback().await.unwrap();
    let next = db.begin().await.unwrap();
    next.commit().await.unwrap();
}

// ============================================================================
// Cascading deletes
// ============================================================================

#[tokio::test]
async fn test_deleting_user_removes_owned_rows() {
    let (_dir, db) = test_db().await;
    let ann = create_candidate(&db, "Ann", "ann@x.com", &["Go", "Rust"]).await;
    let bob = create_candidate(&db, "Bob", "bob@x.com", &["Go"]).await;

    let deleted = db.users().delete(User::by_email("ann@x.com")).await.unwrap();
    assert_eq!(deleted.id, ann.id);

    assert_eq!(db.profiles().find_by_user_id(&ann.id).await.unwrap(), None);
    assert_eq!(
        db.skills()
            .count(Filter::eq("user_id", ann.id.as_str()))
            .await
            .unwrap(),
        0
    );

    // Bob is untouched
    assert!(db.profiles().find_by_user_id(&bob.id).await.unwrap().is_some());
    assert_eq!(
        db.skills()
            .count(Filter::eq("user_id", bob.id.as_str()))
            .await
            .unwrap(),
        1
    );
}

#[tokio::test]
async fn test_delete_many_cascades_inside_transaction() {
    let (_dir, db) = test_db().await;
    create_candidate(&db, "Ann", "ann@corp.com", &["Go"]).await;
    create_candidate(&db, "Bob", "bob@corp.com", &["Rust"]).await;
    create_candidate(&db, "Cid", "cid@home.org", &["Zig"]).await;

    let removed = db
        .transaction(|tx| async move {
            let result = tx
                .users()
                .delete_many(Filter::field(
                    "email",
                    careerdb::orm::FieldFilter::new().ends_with("@corp.com"),
                ))
                .await?;
            Ok::<_, DbError>(result.count)
        })
        .await
        .unwrap();

    assert_eq!(removed, 2);
    assert_eq!(db.users().count(Filter::all()).await.unwrap(), 1);
    assert_eq!(db.profiles().count(Filter::all()).await.unwrap(), 1);
    assert_eq!(db.skills().count(Filter::all()).await.unwrap(), 1);
}
