//! careerdb - schema sync and status tool
//!
//! Connects to the configured database, creates missing tables, columns and
//! indexes, then reports how many rows each table holds.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::Context;
use careerdb::config::Config;
use careerdb::db::Database;
use careerdb::entities::{
    Certification, Education, Employment, Job, Profile, Project, Skill, User,
};
use careerdb::logging::init_tracing;
use careerdb::orm::{DatabaseEntity, Entity, Filter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env().context("Failed to load configuration")?;
    init_tracing(&config).context("Failed to initialise tracing")?;

    tracing::info!("Starting careerdb");

    let db = Database::connect_with_retry(&config, Duration::from_secs(5))
        .await
        .context("Failed to connect to database")?;

    let sync = db.sync_schema().await;
    for error in &sync.errors {
        tracing::warn!(error = %error, "Schema sync error");
    }
    tracing::info!(
        tables_created = sync.tables_created.len(),
        columns_added = sync.columns_added.len(),
        indexes_created = sync.indexes_created.len(),
        "Schema synchronised"
    );

    let mut counts = BTreeMap::new();
    counts.insert(User::TABLE_NAME, count::<User>(&db).await?);
    counts.insert(Profile::TABLE_NAME, count::<Profile>(&db).await?);
    counts.insert(Skill::TABLE_NAME, count::<Skill>(&db).await?);
    counts.insert(Employment::TABLE_NAME, count::<Employment>(&db).await?);
    counts.insert(Education::TABLE_NAME, count::<Education>(&db).await?);
    counts.insert(Project::TABLE_NAME, count::<Project>(&db).await?);
    counts.insert(Certification::TABLE_NAME, count::<Certification>(&db).await?);
    counts.insert(Job::TABLE_NAME, count::<Job>(&db).await?);

    for (table, rows) in &counts {
        tracing::info!(table = %table, rows, "Table status");
    }

    let summary = serde_json::json!({
        "database": &config.database_url,
        "sync": &sync,
        "rows": counts,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);

    db.close().await;
    if !sync.is_clean() {
        anyhow::bail!("schema sync finished with {} error(s)", sync.errors.len());
    }
    Ok(())
}

async fn count<E: Entity>(db: &Database) -> anyhow::Result<i64> {
    db.repository::<E>()
        .count(Filter::all())
        .await
        .with_context(|| format!("Failed to count {}", E::TABLE_NAME))
}
