#![cfg(feature = "integration-tests")]

mod common;

use common::test_db::TestDatabase;
use server::db::driver::Driver;
use server::workload::Collector;
use shared::TopQueryOrderBy;
use std::time::Duration;

#[tokio::test]
async fn top_queries_reflects_executed_statements() -> anyhow::Result<()> {
    let db = TestDatabase::new().await?;
    let client = db.pool.get().await?;
    client.query("SELECT 1, 2, 3", &[]).await?;
    client.query("SELECT 1, 2, 3", &[]).await?;

    let row = client.query_one("SHOW server_version_num", &[]).await?;
    let server_version_num: i32 = row.get::<_, String>(0).parse()?;

    let driver = Driver::new(db.pool.clone(), Duration::from_secs(5));
    let collector = Collector::new(driver, server_version_num);

    let rows = collector.top_queries(50, TopQueryOrderBy::Calls).await?;
    assert!(rows.iter().any(|r| r.query_text.contains("SELECT")));

    Ok(())
}
