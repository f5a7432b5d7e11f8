use async_trait::async_trait;
use shared::{HealthCheckReport, HealthFinding, HealthType, Severity};

use crate::db::driver::Driver;
use crate::error::Result;

use super::Calculator;

/// `NOT VALID` constraints left unvalidated: they're silently not
/// enforced against existing rows until someone runs `VALIDATE
/// CONSTRAINT`, which is easy to forget after an online migration.
pub struct ConstraintsCalculator;

#[async_trait]
impl Calculator for ConstraintsCalculator {
    fn health_type(&self) -> HealthType {
        HealthType::Constraint
    }

    async fn run(&self, driver: &Driver) -> Result<HealthCheckReport> {
        let client = driver.pool().get().await?;
        let rows = client
            .query(
                "SELECT conrelid::regclass::text AS table_name, conname \
                 FROM pg_constraint \
                 WHERE NOT convalidated \
                 ORDER BY table_name, conname",
                &[],
            )
            .await?;

        let findings: Vec<HealthFinding> = rows
            .iter()
            .map(|row| {
                let table: String = row.get("table_name");
                let name: String = row.get("conname");
                HealthFinding {
                    severity: Severity::Warning,
                    message: format!("constraint {name} on {table} is NOT VALID"),
                    details: serde_json::json!({ "table": table, "constraint": name }),
                }
            })
            .collect();

        let severity = if findings.is_empty() { Severity::Ok } else { Severity::Warning };

        Ok(HealthCheckReport {
            health_type: HealthType::Constraint,
            severity,
            findings,
        })
    }
}
