mod common;

use gazette_pg::migrations::Migrator;
use serial_test::serial;
use sqlx::PgPool;

async fn table_exists(pool: &PgPool, table: &str) -> bool {
    let (count,): (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*)
        FROM information_schema.tables
        WHERE table_name = $1
        "#,
    )
    .bind(table)
    .fetch_one(pool)
    .await
    .expect("Failed to query information_schema");
    count == 1
}

#[tokio::test]
#[serial]
async fn test_migrator_creates_tracking_table() {
    let Some(pool) = common::get_pg_pool().await else {
        return;
    };
    common::teardown(&pool).await;

    let version = Migrator::new(pool.clone())
        .current_version()
        .await
        .expect("Should get version");

    assert_eq!(version, 0, "Initial version should be 0");
    assert!(table_exists(&pool, "_gazette_migrations").await);

    common::teardown(&pool).await;
}

#[tokio::test]
#[serial]
async fn test_migrator_runs_all_migrations() {
    let Some(pool) = common::get_pg_pool().await else {
        return;
    };
    common::teardown(&pool).await;
    let migrator = Migrator::new(pool.clone());

    assert_eq!(migrator.pending().await.expect("Should list pending").len(), 2);

    let applied = migrator.run().await.expect("Should run migrations");

    assert_eq!(applied, 2);
    assert_eq!(migrator.current_version().await.unwrap(), 2);
    assert!(migrator.pending().await.unwrap().is_empty());
    assert!(table_exists(&pool, "events").await);
    assert!(table_exists(&pool, "snapshots").await);

    let names: Vec<String> = migrator
        .applied()
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.name)
        .collect();
    assert_eq!(names, vec!["create_events_table", "create_snapshots_table"]);

    common::teardown(&pool).await;
}

#[tokio::test]
#[serial]
async fn test_migrator_is_idempotent() {
    let Some(pool) = common::migrated_pool().await else {
        return;
    };

    let applied = Migrator::new(pool.clone())
        .run()
        .await
        .expect("Second run should succeed");

    assert_eq!(applied, 0, "No new migrations should be applied");
}

#[tokio::test]
#[serial]
async fn test_migrator_detects_checksum_mismatch() {
    let Some(pool) = common::migrated_pool().await else {
        return;
    };
    sqlx::query("UPDATE _gazette_migrations SET checksum = 'tampered' WHERE version = 1")
        .execute(&pool)
        .await
        .unwrap();

    let result = Migrator::new(pool.clone()).run().await;

    assert!(matches!(
        result,
        Err(gazette_pg::MigrationError::ChecksumMismatch { version: 1, .. })
    ));

    common::teardown(&pool).await;
}
