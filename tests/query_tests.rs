//! Integration tests for reads: pagination, relation filters, includes and
//! aggregation

mod common;

use std::collections::HashSet;

use assert_matches::assert_matches;
use careerdb::db::Database;
use careerdb::entities::{CreateCertification, CreateJob, CreateSkill, CreateUser, Job, User};
use careerdb::error::DbError;
use careerdb::orm::{
    AggregateArgs, AggregateFn, AggregateSelection, FieldFilter, Filter, FindManyArgs,
    GroupByArgs, GroupOrderBy, Having, Include, OrderBy, OrderDirection, RelationArgs, SqlValue,
    UniqueKey,
};
use pretty_assertions::assert_eq;

use common::{create_candidate, create_user, test_db};

async fn create_numbered_users(db: &Database, numbers: impl IntoIterator<Item = u32>) {
    for n in numbers {
        db.users()
            .create(CreateUser {
                id: Some(format!("u{:02}", n)),
                ..CreateUser::new(format!("User {}", n), format!("user{}@x.com", n))
            })
            .await
            .unwrap();
    }
}

fn ids(users: &[User]) -> Vec<&str> {
    users.iter().map(|u| u.id.as_str()).collect()
}

fn names(users: &[User]) -> Vec<&str> {
    users.iter().map(|u| u.name.as_str()).collect()
}

async fn post_job(db: &Database, posted_by: &str, title: &str) -> Job {
    db.jobs()
        .create(CreateJob {
            title: title.to_string(),
            description: "Build things".to_string(),
            company: "Acme".to_string(),
            location: "Remote".to_string(),
            salary: "100k".to_string(),
            job_type: "Full-time".to_string(),
            employment_type: "Permanent".to_string(),
            work_mode: "Remote".to_string(),
            experience: "3+ years".to_string(),
            skills: Some("Rust, SQL".to_string()),
            posted_by: posted_by.to_string(),
            ..Default::default()
        })
        .await
        .unwrap()
}

/// Ann (Go, Rust), Bob (Go) and Cid, who has no profile and no skills.
async fn seed_candidates(db: &Database) {
    create_candidate(db, "Ann", "ann@x.com", &["Go", "Rust"]).await;
    create_candidate(db, "Bob", "bob@x.com", &["Go"]).await;
    create_user(db, "Cid", "cid@x.com").await;
}

async fn names_matching(db: &Database, filter: Filter) -> Vec<String> {
    db.users()
        .query()
        .filter(filter)
        .order_by(OrderBy::asc("name"))
        .fetch_all()
        .await
        .unwrap()
        .into_iter()
        .map(|u| u.name)
        .collect()
}

// ============================================================================
// Ordering and pagination
// ============================================================================

#[tokio::test]
async fn test_cursor_pages_are_stable_across_inserts() {
    let (_dir, db) = test_db().await;
    create_numbered_users(&db, 1..=10).await;

    let first = db
        .users()
        .query()
        .order_by(OrderBy::asc("id"))
        .take(3)
        .fetch_all()
        .await
        .unwrap();
    assert_eq!(ids(&first), vec!["u01", "u02", "u03"]);

    let second = db
        .users()
        .query()
        .order_by(OrderBy::asc("id"))
        .cursor(UniqueKey::id("u03"))
        .skip(1)
        .take(3)
        .fetch_all()
        .await
        .unwrap();
    assert_eq!(ids(&second), vec!["u04", "u05", "u06"]);

    // Rows inserted on either side do not shift the next page
    create_numbered_users(&db, [0, 99]).await;

    let third = db
        .users()
        .query()
        .order_by(OrderBy::asc("id"))
        .cursor(UniqueKey::id("u06"))
        .skip(1)
        .take(3)
        .fetch_all()
        .await
        .unwrap();
    assert_eq!(ids(&third), vec!["u07", "u08", "u09"]);
}

#[tokio::test]
async fn test_cursor_is_inclusive_and_missing_cursor_is_empty() {
    let (_dir, db) = test_db().await;
    create_numbered_users(&db, 1..=5).await;

    let page = db
        .users()
        .query()
        .order_by(OrderBy::asc("id"))
        .cursor(UniqueKey::id("u03"))
        .take(2)
        .fetch_all()
        .await
        .unwrap();
    assert_eq!(ids(&page), vec!["u03", "u04"]);

    let missing = db
        .users()
        .query()
        .cursor(UniqueKey::id("u42"))
        .take(2)
        .fetch_all()
        .await
        .unwrap();
    assert!(missing.is_empty());
}

#[tokio::test]
async fn test_negative_take_pages_backwards() {
    let (_dir, db) = test_db().await;
    create_numbered_users(&db, 1..=10).await;

    let last = db
        .users()
        .query()
        .order_by(OrderBy::asc("id"))
        .take(-2)
        .fetch_all()
        .await
        .unwrap();
    assert_eq!(ids(&last), vec!["u09", "u10"]);

    let before_cursor = db
        .users()
        .query()
        .order_by(OrderBy::asc("id"))
        .cursor(UniqueKey::id("u05"))
        .take(-3)
        .fetch_all()
        .await
        .unwrap();
    assert_eq!(ids(&before_cursor), vec!["u03", "u04", "u05"]);

    let skipping = db
        .users()
        .query()
        .order_by(OrderBy::asc("id"))
        .cursor(UniqueKey::id("u05"))
        .skip(1)
        .take(-2)
        .fetch_all()
        .await
        .unwrap();
    assert_eq!(ids(&skipping), vec!["u03", "u04"]);
}

#[tokio::test]
async fn test_ties_are_broken_by_primary_key() {
    let (_dir, db) = test_db().await;
    for id in ["c", "a", "b"] {
        db.users()
            .create(CreateUser {
                id: Some(id.to_string()),
                ..CreateUser::new("Same", format!("{}@x.com", id))
            })
            .await
            .unwrap();
    }

    let rows = db
        .users()
        .query()
        .order_by(OrderBy::asc("name"))
        .fetch_all()
        .await
        .unwrap();
    assert_eq!(ids(&rows), vec!["a", "b", "c"]);

    let page = db
        .users()
        .query()
        .order_by(OrderBy::asc("name"))
        .cursor(UniqueKey::id("b"))
        .fetch_all()
        .await
        .unwrap();
    assert_eq!(ids(&page), vec!["b", "c"]);
}

#[tokio::test]
async fn test_nulls_ordering() {
    let (_dir, db) = test_db().await;
    create_user(&db, "Ann", "ann@x.com").await;
    db.users()
        .create(CreateUser {
            verify_code: Some("1".to_string()),
            ..CreateUser::new("Bob", "bob@x.com")
        })
        .await
        .unwrap();

    let first = db
        .users()
        .query()
        .order_by(OrderBy::asc("verify_code").nulls_last())
        .fetch_all()
        .await
        .unwrap();
    assert_eq!(names(&first), vec!["Bob", "Ann"]);

    let last = db
        .users()
        .query()
        .order_by(OrderBy::asc("verify_code").nulls_first())
        .fetch_all()
        .await
        .unwrap();
    assert_eq!(names(&last), vec!["Ann", "Bob"]);
}

#[tokio::test]
async fn test_distinct_keeps_first_of_each_value() {
    let (_dir, db) = test_db().await;
    seed_candidates(&db).await;

    let skills = db
        .skills()
        .find_many(FindManyArgs {
            order_by: vec![OrderBy::asc("name")],
            distinct: vec!["name".to_string()],
            ..Default::default()
        })
        .await
        .unwrap();
    let names: Vec<&str> = skills.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["Go", "Rust"]);

    let one = db
        .skills()
        .find_many(FindManyArgs {
            order_by: vec![OrderBy::asc("name")],
            distinct: vec!["name".to_string()],
            skip: Some(1),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(one.len(), 1);
    assert_eq!(one[0].name, "Rust");
}

#[tokio::test]
async fn test_unknown_order_field_is_validation_error() {
    let (_dir, db) = test_db().await;
    let err = db
        .users()
        .query()
        .order_by(OrderBy::asc("nickname"))
        .fetch_all()
        .await
        .unwrap_err();
    assert_matches!(err, DbError::Validation(_));
}

const VERIFY_CODES: [Option<&str>; 8] = [
    None,
    Some("a"),
    Some("b"),
    None,
    Some("a"),
    Some("c"),
    None,
    Some("b"),
];

async fn create_user_with_code(db: &Database, id: &str, code: Option<&str>) {
    db.users()
        .create(CreateUser {
            id: Some(id.to_string()),
            verify_code: code.map(str::to_string),
            ..CreateUser::new(id, format!("{}@x.com", id))
        })
        .await
        .unwrap();
}

async fn ordered_ids(db: &Database, order: &OrderBy) -> Vec<String> {
    db.users()
        .query()
        .order_by(order.clone())
        .fetch_all()
        .await
        .unwrap()
        .into_iter()
        .map(|u| u.id)
        .collect()
}

async fn page_ids(db: &Database, order: &OrderBy, cursor: Option<&str>, take: i64) -> Vec<String> {
    let users = db.users();
    let mut query = users.query().order_by(order.clone()).take(take);
    if let Some(cursor) = cursor {
        query = query.cursor(UniqueKey::id(cursor)).skip(1);
    }
    query.fetch_all().await.unwrap().into_iter().map(|u| u.id).collect()
}

/// Page through all users three at a time. After the first page one row not
/// yet returned is deleted, and two rows are inserted after every page.
async fn page_with_churn(db: &Database, order: &OrderBy, backwards: bool) -> Vec<String> {
    let before = ordered_ids(db, order).await;
    let take = if backwards { -3 } else { 3 };
    let mut seen: Vec<String> = Vec::new();
    let mut cursor: Option<String> = None;

    for round in 0.. {
        let rows = page_ids(db, order, cursor.as_deref(), take).await;
        let done = rows.len() < 3;
        if backwards {
            cursor = rows.first().cloned();
            seen.splice(0..0, rows);
        } else {
            cursor = rows.last().cloned();
            seen.extend(rows);
        }
        if done {
            break;
        }

        if round == 0 {
            let unseen: Vec<&String> = before.iter().filter(|id| !seen.contains(id)).collect();
            let victim = if backwards { unseen.last() } else { unseen.first() };
            let victim = victim.expect("rows left to page");
            db.users().delete(UniqueKey::id(victim.as_str())).await.unwrap();
        }
        create_user_with_code(db, &format!("n{}a", round), None).await;
        create_user_with_code(db, &format!("n{}b", round), Some("b")).await;
    }
    seen
}

#[tokio::test]
async fn test_cursor_pages_over_nullable_column_survive_churn() {
    let orders = [
        OrderBy::asc("verify_code").nulls_first(),
        OrderBy::asc("verify_code").nulls_last(),
        OrderBy::desc("verify_code").nulls_first(),
        OrderBy::desc("verify_code").nulls_last(),
    ];

    for order in &orders {
        for backwards in [false, true] {
            let (_dir, db) = test_db().await;
            for (i, code) in VERIFY_CODES.iter().enumerate() {
                create_user_with_code(&db, &format!("u{:02}", i + 1), *code).await;
            }

            let seen = page_with_churn(&db, order, backwards).await;

            let unique: HashSet<&String> = seen.iter().collect();
            assert_eq!(unique.len(), seen.len(), "{:?} backwards={}", order, backwards);

            // Every original row still present is returned exactly once, in order
            let survivors: Vec<String> = ordered_ids(&db, order)
                .await
                .into_iter()
                .filter(|id| id.starts_with('u'))
                .collect();
            assert_eq!(survivors.len(), VERIFY_CODES.len() - 1);
            let returned: Vec<String> = seen.into_iter().filter(|id| id.starts_with('u')).collect();
            assert_eq!(returned, survivors, "{:?} backwards={}", order, backwards);
        }
    }
}

#[tokio::test]
async fn test_extreme_skip_and_take() {
    let (_dir, db) = test_db().await;
    create_numbered_users(&db, 1..=2).await;

    let skipped = db.users().query().skip(u64::MAX).fetch_all().await.unwrap();
    assert!(skipped.is_empty());

    let skipped_distinct = db
        .users()
        .query()
        .distinct("name")
        .skip(u64::MAX)
        .fetch_all()
        .await
        .unwrap();
    assert!(skipped_distinct.is_empty());

    let everything = db
        .users()
        .query()
        .order_by(OrderBy::asc("id"))
        .take(i64::MIN)
        .fetch_all()
        .await
        .unwrap();
    assert_eq!(ids(&everything), vec!["u01", "u02"]);

    let all_but_last = db
        .users()
        .query()
        .order_by(OrderBy::asc("id"))
        .take(i64::MIN)
        .skip(1)
        .fetch_all()
        .await
        .unwrap();
    assert_eq!(ids(&all_but_last), vec!["u01"]);
}

// ============================================================================
// Relation filters
// ============================================================================

#[tokio::test]
async fn test_to_many_relation_filters() {
    let (_dir, db) = test_db().await;
    seed_candidates(&db).await;

    let rust = names_matching(&db, Filter::some("skills", Filter::eq("name", "Rust"))).await;
    assert_eq!(rust, vec!["Ann"]);

    let go = names_matching(&db, Filter::some("skills", Filter::eq("name", "Go"))).await;
    assert_eq!(go, vec!["Ann", "Bob"]);

    // every holds vacuously for users with no skills
    let only_go = names_matching(&db, Filter::every("skills", Filter::eq("name", "Go"))).await;
    assert_eq!(only_go, vec!["Bob", "Cid"]);

    let no_go = names_matching(&db, Filter::none("skills", Filter::eq("name", "Go"))).await;
    assert_eq!(no_go, vec!["Cid"]);
}

#[tokio::test]
async fn test_to_one_relation_filters() {
    let (_dir, db) = test_db().await;
    seed_candidates(&db).await;

    let ann = names_matching(&db, Filter::is("profile", Filter::eq("full_name", "Ann"))).await;
    assert_eq!(ann, vec!["Ann"]);

    let not_ann =
        names_matching(&db, Filter::is_not("profile", Filter::eq("full_name", "Ann"))).await;
    // an absent profile does not match either
    assert_eq!(not_ann, vec!["Bob", "Cid"]);

    let without = names_matching(&db, Filter::absent("profile")).await;
    assert_eq!(without, vec!["Cid"]);

    let with = names_matching(&db, Filter::present("profile")).await;
    assert_eq!(with, vec!["Ann", "Bob"]);
}

#[tokio::test]
async fn test_relation_filter_from_child_side() {
    let (_dir, db) = test_db().await;
    let recruiter = create_user(&db, "Rita", "rita@x.com").await;
    let other = create_user(&db, "Otto", "otto@x.com").await;
    post_job(&db, &recruiter.id, "Rust Engineer").await;
    post_job(&db, &other.id, "Go Engineer").await;

    let jobs = db
        .jobs()
        .query()
        .filter(Filter::is("poster", Filter::eq("email", "rita@x.com")))
        .fetch_all()
        .await
        .unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].title, "Rust Engineer");

    let err = db
        .jobs()
        .query()
        .filter(Filter::some("poster", Filter::all()))
        .fetch_all()
        .await
        .unwrap_err();
    assert_matches!(err, DbError::Validation(_));
}

// ============================================================================
// Includes
// ============================================================================

#[tokio::test]
async fn test_include_loads_requested_relations_only() {
    let (_dir, db) = test_db().await;
    seed_candidates(&db).await;

    let users = db
        .users()
        .query()
        .order_by(OrderBy::asc("name"))
        .include(Include::new().with("profile").with("skills"))
        .fetch_all()
        .await
        .unwrap();
    assert_eq!(names(&users), vec!["Ann", "Bob", "Cid"]);

    let ann = &users[0];
    assert_eq!(
        ann.profile.as_ref().and_then(|p| p.full_name.as_deref()),
        Some("Ann")
    );
    assert_eq!(ann.skills.as_ref().map(Vec::len), Some(2));
    assert_eq!(ann.jobs, None);

    let cid = &users[2];
    assert_eq!(cid.profile, None);
    assert_eq!(cid.skills, Some(Vec::new()));
}

#[tokio::test]
async fn test_include_with_per_parent_arguments() {
    let (_dir, db) = test_db().await;
    let ann = create_candidate(&db, "Ann", "ann@x.com", &["Go", "Rust", "SQL"]).await;
    create_candidate(&db, "Bob", "bob@x.com", &["Go", "Zig"]).await;

    let users = db
        .users()
        .query()
        .order_by(OrderBy::asc("name"))
        .include(Include::new().relation(
            "skills",
            RelationArgs::default()
                .filter(Filter::ne("name", "Go"))
                .order_by(OrderBy::desc("name"))
                .take(1),
        ))
        .fetch_all()
        .await
        .unwrap();

    let top: Vec<Vec<String>> = users
        .iter()
        .map(|u| {
            u.skills
                .iter()
                .flatten()
                .map(|s| s.name.clone())
                .collect()
        })
        .collect();
    assert_eq!(top, vec![vec!["SQL".to_string()], vec!["Zig".to_string()]]);
    assert_eq!(users[0].id, ann.id);
}

#[tokio::test]
async fn test_nested_include() {
    let (_dir, db) = test_db().await;
    let recruiter = create_candidate(&db, "Rita", "rita@x.com", &["Hiring"]).await;
    post_job(&db, &recruiter.id, "Rust Engineer").await;

    let jobs = db
        .jobs()
        .query()
        .include(Include::new().relation(
            "poster",
            RelationArgs::default().include(Include::new().with("profile").with("skills")),
        ))
        .fetch_all()
        .await
        .unwrap();

    let poster = jobs[0].poster.as_deref().expect("poster loaded");
    assert_eq!(poster.id, recruiter.id);
    assert_eq!(poster.password, None);
    assert!(poster.profile.is_some());
    assert_eq!(poster.skills.as_ref().map(Vec::len), Some(1));
    assert_eq!(jobs[0].skill_list(), vec!["Rust", "SQL"]);
}

#[tokio::test]
async fn test_required_to_one_include() {
    let (_dir, db) = test_db().await;
    create_user(&db, "Cid", "cid@x.com").await;

    let optional = db
        .users()
        .find_unique_with(User::by_email("cid@x.com"), Include::new().with("profile"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(optional.profile, None);

    let err = db
        .users()
        .find_unique_with(
            User::by_email("cid@x.com"),
            Include::new().relation("profile", RelationArgs::default().required()),
        )
        .await
        .unwrap_err();
    assert_matches!(err, DbError::NotFound { entity: "Profile" });
}

#[tokio::test]
async fn test_to_one_include_rejects_filter() {
    let (_dir, db) = test_db().await;
    create_candidate(&db, "Ann", "ann@x.com", &[]).await;

    let err = db
        .users()
        .find_unique_with(
            User::by_email("ann@x.com"),
            Include::new().relation(
                "profile",
                RelationArgs::default()
                    .filter(Filter::eq("location", "Berlin"))
                    .required(),
            ),
        )
        .await
        .unwrap_err();
    assert_matches!(err, DbError::Validation(_));
}

#[tokio::test]
async fn test_unknown_include_is_validation_error() {
    let (_dir, db) = test_db().await;
    let err = db
        .users()
        .query()
        .include(Include::new().with("friends"))
        .fetch_all()
        .await
        .unwrap_err();
    assert_matches!(err, DbError::Validation(_));
}

// ============================================================================
// Grouping and aggregates
// ============================================================================

#[tokio::test]
async fn test_group_by_with_having_and_order() {
    let (_dir, db) = test_db().await;
    seed_candidates(&db).await;
    let dan = create_user(&db, "Dan", "dan@x.com").await;
    db.skills().create(CreateSkill::new(&dan.id, "Rust")).await.unwrap();
    db.skills().create(CreateSkill::new(&dan.id, "Go")).await.unwrap();

    let groups = db
        .skills()
        .group_by(GroupByArgs {
            by: vec!["name".to_string()],
            aggregates: AggregateSelection {
                count_all: true,
                ..Default::default()
            },
            order_by: vec![GroupOrderBy::aggregate(
                "name",
                AggregateFn::Count,
                OrderDirection::Desc,
            )],
            ..Default::default()
        })
        .await
        .unwrap();

    let summary: Vec<(SqlValue, Option<i64>)> = groups
        .iter()
        .map(|g| (g.key["name"].clone(), g.count_all))
        .collect();
    assert_eq!(
        summary,
        vec![
            (SqlValue::String("Go".into()), Some(3)),
            (SqlValue::String("Rust".into()), Some(2)),
        ]
    );

    let popular = db
        .skills()
        .group_by(GroupByArgs {
            by: vec!["name".to_string()],
            having: Some(Having::aggregate(
                "name",
                AggregateFn::Count,
                FieldFilter::new().gt(2),
            )),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(popular.len(), 1);
    assert_eq!(popular[0].key["name"], SqlValue::String("Go".into()));
}

#[tokio::test]
async fn test_group_by_rejects_having_outside_by() {
    let (_dir, db) = test_db().await;
    let err = db
        .skills()
        .group_by(GroupByArgs {
            by: vec!["name".to_string()],
            having: Some(Having::field(
                "user_id",
                FieldFilter::new().equals("someone"),
            )),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert_matches!(err, DbError::Validation(_));
}

#[tokio::test]
async fn test_aggregate_over_filtered_rows() {
    let (_dir, db) = test_db().await;
    let ann = create_user(&db, "Ann", "ann@x.com").await;
    for (name, year) in [("CKA", 2019), ("AWS SA", 2021), ("CKAD", 2023)] {
        db.certifications()
            .create(CreateCertification {
                user_id: ann.id.clone(),
                name: name.to_string(),
                authority: "CNCF".to_string(),
                year,
                ..Default::default()
            })
            .await
            .unwrap();
    }

    let stats = db
        .certifications()
        .aggregate(AggregateArgs {
            filter: Some(Filter::field("year", FieldFilter::new().gte(2020))),
            aggregates: AggregateSelection {
                count_all: true,
                min: vec!["year".to_string()],
                max: vec!["year".to_string()],
                avg: vec!["year".to_string()],
                ..Default::default()
            },
        })
        .await
        .unwrap();

    assert_eq!(stats.count_all, Some(2));
    assert_eq!(stats.min["year"], SqlValue::Int(2021));
    assert_eq!(stats.max["year"], SqlValue::Int(2023));
    assert_eq!(stats.avg["year"], SqlValue::Float(2022.0));

    let empty = db
        .certifications()
        .aggregate(AggregateArgs {
            filter: Some(Filter::eq("authority", "Nobody")),
            aggregates: AggregateSelection {
                count_all: true,
                max: vec!["year".to_string()],
                ..Default::default()
            },
        })
        .await
        .unwrap();
    assert_eq!(empty.count_all, Some(0));
    assert_eq!(empty.max["year"], SqlValue::Null);
}

#[tokio::test]
async fn test_having_on_aggregate_of_ungrouped_field() {
    let (_dir, db) = test_db().await;
    let ann = create_user(&db, "Ann", "ann@x.com").await;
    for (authority, year) in [("AWS", 2019), ("AWS", 2023), ("GCP", 2018)] {
        db.certifications()
            .create(CreateCertification {
                user_id: ann.id.clone(),
                name: format!("{} {}", authority, year),
                authority: authority.to_string(),
                year,
                ..Default::default()
            })
            .await
            .unwrap();
    }

    let recent = db
        .certifications()
        .group_by(GroupByArgs {
            by: vec!["authority".to_string()],
            having: Some(Having::aggregate(
                "year",
                AggregateFn::Max,
                FieldFilter::new().gt(2020),
            )),
            aggregates: AggregateSelection {
                max: vec!["year".to_string()],
                ..Default::default()
            },
            order_by: vec![GroupOrderBy::aggregate(
                "year",
                AggregateFn::Max,
                OrderDirection::Desc,
            )],
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].key["authority"], SqlValue::String("AWS".into()));
    assert_eq!(recent[0].max["year"], SqlValue::Int(2023));
}
