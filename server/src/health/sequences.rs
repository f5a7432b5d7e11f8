use async_trait::async_trait;
use shared::{HealthCheckReport, HealthFinding, HealthType, Severity};

use crate::db::driver::Driver;
use crate::error::Result;

use super::Calculator;

/// Sequences approaching the upper bound of their backing integer type.
/// A sequence that wraps causes every insert depending on it to fail.
pub struct SequencesCalculator;

#[async_trait]
impl Calculator for SequencesCalculator {
    fn health_type(&self) -> HealthType {
        HealthType::Sequence
    }

    async fn run(&self, driver: &Driver) -> Result<HealthCheckReport> {
        let client = driver.pool().get().await?;
        let rows = client
            .query(
                "SELECT schemaname, sequencename, last_value, max_value \
                 FROM pg_sequences \
                 WHERE last_value IS NOT NULL",
                &[],
            )
            .await?;

        let mut findings = Vec::new();
        let mut severity = Severity::Ok;

        for row in &rows {
            let schema: String = row.get("schemaname");
            let name: String = row.get("sequencename");
            let last_value: i64 = row.get("last_value");
            let max_value: i64 = row.get("max_value");
            if max_value <= 0 {
                continue;
            }
            let ratio = last_value as f64 / max_value as f64;

            let finding_severity = if ratio >= 0.95 {
                Severity::Critical
            } else if ratio >= 0.80 {
                Severity::Warning
            } else {
                continue;
            };
            severity = severity.max(finding_severity);

            findings.push(HealthFinding {
                severity: finding_severity,
                message: format!("sequence {schema}.{name} is at {:.1}% of its range", ratio * 100.0),
                details: serde_json::json!({
                    "schema": schema, "sequence": name, "last_value": last_value, "max_value": max_value,
                }),
            });
        }

        Ok(HealthCheckReport {
            health_type: HealthType::Sequence,
            severity,
            findings,
        })
    }
}
