#![cfg(feature = "integration-tests")]

mod common;

use common::test_db::TestDatabase;
use server::catalog::Catalog;
use server::db::driver::Driver;
use shared::{GetObjectDetailsRequest, ListObjectsRequest};
use std::time::Duration;

#[tokio::test]
async fn lists_schemas_and_objects() -> anyhow::Result<()> {
    let db = TestDatabase::new().await?;
    db.pool
        .get()
        .await?
        .batch_execute(
            "CREATE TABLE widgets (id serial primary key, name text not null, qty int);
             CREATE INDEX widgets_name_idx ON widgets (name);",
        )
        .await?;

    let driver = Driver::new(db.pool.clone(), Duration::from_secs(5));
    let catalog = Catalog::new(driver);

    let schemas = catalog.list_schemas().await?;
    assert!(schemas.schemas.iter().any(|s| s == "public"));

    let objects = catalog
        .list_objects(&ListObjectsRequest {
            schema: Some("public".to_string()),
            object_types: vec![],
            limit: None,
            offset: None,
        })
        .await?;
    assert!(objects.objects.iter().any(|o| o.name == "widgets"));

    let details = catalog
        .get_object_details(&GetObjectDetailsRequest {
            schema: "public".to_string(),
            name: "widgets".to_string(),
        })
        .await?;
    assert_eq!(details.columns.len(), 3);
    assert!(details.indexes.iter().any(|i| i.name == "widgets_name_idx"));
    assert!(details
        .constraints
        .iter()
        .any(|c| c.constraint_type == "primary_key"));

    Ok(())
}

#[tokio::test]
async fn get_object_details_rejects_unknown_table() -> anyhow::Result<()> {
    let db = TestDatabase::new().await?;
    let driver = Driver::new(db.pool.clone(), Duration::from_secs(5));
    let catalog = Catalog::new(driver);

    let err = catalog
        .get_object_details(&GetObjectDetailsRequest {
            schema: "public".to_string(),
            name: "does_not_exist".to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, server::error::DbaError::ObjectNotFound(_)));
    Ok(())
}
