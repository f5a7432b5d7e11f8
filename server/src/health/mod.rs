use async_trait::async_trait;
use shared::{HealthCheckReport, HealthCompositeReport, HealthType};
use tracing::instrument;

use crate::db::driver::Driver;
use crate::error::Result;

pub mod buffer;
pub mod connections;
pub mod constraints;
pub mod index;
pub mod replication;
pub mod sequences;
pub mod vacuum;

/// Uniform interface every health dimension implements; the orchestrator
/// fans calculators out concurrently and folds their reports into one
/// composite severity.
#[async_trait]
pub trait Calculator: Send + Sync {
    fn health_type(&self) -> HealthType;
    async fn run(&self, driver: &Driver) -> Result<HealthCheckReport>;
}

pub struct Orchestrator {
    driver: Driver,
    calculators: Vec<Box<dyn Calculator>>,
}

impl Orchestrator {
    pub fn new(driver: Driver) -> Self {
        let calculators: Vec<Box<dyn Calculator>> = vec![
            Box::new(index::IndexBloatCalculator),
            Box::new(buffer::BufferCacheCalculator),
            Box::new(connections::ConnectionsCalculator),
            Box::new(replication::ReplicationCalculator),
            Box::new(sequences::SequencesCalculator),
            Box::new(constraints::ConstraintsCalculator),
            Box::new(vacuum::VacuumCalculator),
        ];
        Self { driver, calculators }
    }

    #[instrument(skip(self))]
    pub async fn run(&self, only: &[HealthType]) -> HealthCompositeReport {
        let selected: Vec<&Box<dyn Calculator>> = if only.is_empty() {
            self.calculators.iter().collect()
        } else {
            self.calculators
                .iter()
                .filter(|c| only.contains(&c.health_type()))
                .collect()
        };

        let futures = selected.into_iter().map(|calculator| async move {
            match calculator.run(&self.driver).await {
                Ok(report) => report,
                Err(e) => HealthCheckReport {
                    health_type: calculator.health_type(),
                    severity: shared::Severity::Warning,
                    findings: vec![shared::HealthFinding {
                        severity: shared::Severity::Warning,
                        message: format!("check failed: {e}"),
                        details: serde_json::Value::Null,
                    }],
                },
            }
        });

        let reports = futures::future::join_all(futures).await;
        HealthCompositeReport::from_reports(reports)
    }
}
