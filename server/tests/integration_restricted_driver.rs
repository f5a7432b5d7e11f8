#![cfg(feature = "integration-tests")]

mod common;

use common::test_db::TestDatabase;
use server::db::driver::Driver;
use server::db::restricted::RestrictedDriver;
use shared::AccessMode;
use std::time::Duration;

#[tokio::test]
async fn restricted_mode_rejects_writes_but_allows_reads() -> anyhow::Result<()> {
    let db = TestDatabase::new().await?;
    db.pool
        .get()
        .await?
        .batch_execute("CREATE TABLE t (id serial primary key, n int)")
        .await?;

    let driver = Driver::new(db.pool.clone(), Duration::from_secs(5));
    let restricted = RestrictedDriver::new(driver, AccessMode::Restricted);

    let rows = restricted.query("SELECT 1 AS one", &[]).await?;
    assert_eq!(rows[0].get("one").and_then(|v| v.as_i64()), Some(1));

    let err = restricted
        .query("INSERT INTO t (n) VALUES (1)", &[])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        server::error::DbaError::StatementNotAllowed { .. }
    ));

    Ok(())
}

#[tokio::test]
async fn unrestricted_mode_allows_writes() -> anyhow::Result<()> {
    let db = TestDatabase::new().await?;
    db.pool
        .get()
        .await?
        .batch_execute("CREATE TABLE t (id serial primary key, n int)")
        .await?;

    let driver = Driver::new(db.pool.clone(), Duration::from_secs(5));
    let unrestricted = RestrictedDriver::new(driver, AccessMode::Unrestricted);

    let rows = unrestricted
        .query("INSERT INTO t (n) VALUES (1) RETURNING id", &[])
        .await?;
    assert_eq!(rows.len(), 1);

    Ok(())
}
