#![cfg(feature = "integration-tests")]

mod common;

use common::test_db::TestDatabase;
use server::advisor::{Advisor, HypoHandle};
use server::db::driver::Driver;
use server::explain::ExplainEngine;
use shared::{AdvisorConstraints, ExplainOptions, IndexDefinition, QueryWorkloadItem, TableRef};
use std::time::Duration;

async fn setup_widgets(db: &TestDatabase) -> anyhow::Result<()> {
    db.pool
        .get()
        .await?
        .batch_execute(
            "CREATE TABLE widgets (id serial primary key, owner_id int, status text);
             INSERT INTO widgets (owner_id, status)
             SELECT g % 500, CASE WHEN g % 7 = 0 THEN 'archived' ELSE 'active' END
             FROM generate_series(1, 20000) AS g;
             ANALYZE widgets;",
        )
        .await?;
    Ok(())
}

#[tokio::test]
async fn explain_returns_a_plan_without_hypothetical_indexes() -> anyhow::Result<()> {
    let db = TestDatabase::new().await?;
    setup_widgets(&db).await?;

    let driver = Driver::new(db.pool.clone(), Duration::from_secs(5));
    let engine = ExplainEngine::new(driver, 170_000);

    let plan = engine
        .explain(
            "SELECT * FROM widgets WHERE owner_id = 1",
            &[],
            &ExplainOptions::default(),
        )
        .await?;
    assert!(plan.plan.is_array());
    assert!(plan.total_cost.is_some());

    Ok(())
}

#[tokio::test]
async fn hypopg_index_is_visible_to_explain_and_cleaned_up_on_drop() -> anyhow::Result<()> {
    let db = TestDatabase::new().await?;
    if !db.hypopg_available().await? {
        eprintln!("skipping: hypopg is not installed in this test image");
        return Ok(());
    }
    setup_widgets(&db).await?;

    let driver = Driver::new(db.pool.clone(), Duration::from_secs(5));
    let def = IndexDefinition {
        table: TableRef {
            schema: "public".to_string(),
            name: "widgets".to_string(),
        },
        columns: vec!["owner_id".to_string()],
        using: "btree".to_string(),
        unique: false,
        where_clause: None,
    };

    {
        let handle = HypoHandle::create(&driver, &def).await?;
        let size = handle.estimated_size_bytes().await?;
        assert!(size > 0);
    }

    // Handle dropped above spawns a best-effort cleanup task; give it a
    // moment to run before asserting the hypothetical index is gone.
    tokio::time::sleep(Duration::from_millis(200)).await;
    let client = db.pool.get().await?;
    let count: i64 = client
        .query_one("SELECT count(*) FROM hypopg_list_indexes()", &[])
        .await?
        .get(0);
    assert_eq!(count, 0);

    Ok(())
}

#[tokio::test]
async fn advisor_recommends_index_for_selective_predicate() -> anyhow::Result<()> {
    let db = TestDatabase::new().await?;
    if !db.hypopg_available().await? {
        eprintln!("skipping: hypopg is not installed in this test image");
        return Ok(());
    }
    setup_widgets(&db).await?;

    let client = db.pool.get().await?;
    let row = client.query_one("SHOW server_version_num", &[]).await?;
    let server_version_num: i32 = row.get::<_, String>(0).parse()?;
    drop(client);

    let driver = Driver::new(db.pool.clone(), Duration::from_secs(5));
    let advisor = Advisor::new(driver, server_version_num);

    let workload = vec![QueryWorkloadItem {
        query_text: "SELECT * FROM widgets WHERE owner_id = 17".to_string(),
        calls: 500,
        mean_exec_ms: 12.0,
        queryid: Some(1),
    }];

    let result = advisor
        .recommend(&workload, &AdvisorConstraints::with_defaults())
        .await?;

    assert!(result
        .recommendations
        .iter()
        .any(|r| r.definition.columns == vec!["owner_id".to_string()]));

    Ok(())
}
