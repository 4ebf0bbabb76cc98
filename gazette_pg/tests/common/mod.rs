use gazette_pg::Migrator;
use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;

/// Connects to `DATABASE_URL`. Returns `None` when it isn't set so the suite can run without a
/// database.
pub async fn get_pg_pool() -> Option<PgPool> {
    let _ = env_logger::builder().is_test(true).try_init();
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        log::warn!("DATABASE_URL not set, skipping postgres test");
        return None;
    };
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&database_url)
        .await
        .expect("Failed to create Postgres pool");
    Some(pool)
}

/// Drops every gazette table, leaving an empty database.
pub async fn teardown(pool: &PgPool) {
    for table in ["snapshots", "events", "_gazette_migrations"] {
        sqlx::query(&format!("DROP TABLE IF EXISTS {table} CASCADE"))
            .execute(pool)
            .await
            .expect("Failed to drop table");
    }
}

/// A freshly migrated, empty schema.
pub async fn migrated_pool() -> Option<PgPool> {
    let pool = get_pg_pool().await?;
    teardown(&pool).await;
    Migrator::new(pool.clone())
        .run()
        .await
        .expect("Failed to run migrations");
    Some(pool)
}
