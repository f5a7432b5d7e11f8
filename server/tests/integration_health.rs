#![cfg(feature = "integration-tests")]

mod common;

use common::test_db::TestDatabase;
use server::db::driver::Driver;
use server::health::Orchestrator;
use shared::Severity;
use std::time::Duration;

#[tokio::test]
async fn health_orchestrator_returns_ok_composite_on_fresh_database() -> anyhow::Result<()> {
    let db = TestDatabase::new().await?;
    let driver = Driver::new(db.pool.clone(), Duration::from_secs(5));
    let orchestrator = Orchestrator::new(driver);

    let report = orchestrator.run(&[]).await;
    assert_eq!(report.reports.len(), 7);
    assert!(report.severity == Severity::Ok || report.severity == Severity::Warning);

    Ok(())
}

#[tokio::test]
async fn health_orchestrator_filters_to_requested_checks() -> anyhow::Result<()> {
    let db = TestDatabase::new().await?;
    let driver = Driver::new(db.pool.clone(), Duration::from_secs(5));
    let orchestrator = Orchestrator::new(driver);

    let report = orchestrator.run(&[shared::HealthType::Connection]).await;
    assert_eq!(report.reports.len(), 1);
    assert_eq!(report.reports[0].health_type, shared::HealthType::Connection);

    Ok(())
}
