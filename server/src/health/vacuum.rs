use async_trait::async_trait;
use shared::{HealthCheckReport, HealthFinding, HealthType, Severity};

use crate::db::driver::Driver;
use crate::error::Result;

use super::Calculator;

/// Tables with a high dead-tuple ratio, a sign autovacuum isn't keeping
/// up (too-aggressive `autovacuum_vacuum_scale_factor`, long-running
/// transactions holding back the xmin horizon, etc).
pub struct VacuumCalculator;

#[async_trait]
impl Calculator for VacuumCalculator {
    fn health_type(&self) -> HealthType {
        HealthType::Vacuum
    }

    async fn run(&self, driver: &Driver) -> Result<HealthCheckReport> {
        let client = driver.pool().get().await?;
        let rows = client
            .query(
                "SELECT schemaname, relname, n_live_tup, n_dead_tup \
                 FROM pg_stat_user_tables \
                 WHERE n_live_tup > 0 \
                 ORDER BY n_dead_tup DESC \
                 LIMIT 50",
                &[],
            )
            .await?;

        let mut findings = Vec::new();
        let mut severity = Severity::Ok;

        for row in &rows {
            let schema: String = row.get("schemaname");
            let table: String = row.get("relname");
            let live: i64 = row.get("n_live_tup");
            let dead: i64 = row.get("n_dead_tup");
            let ratio = dead as f64 / (live + dead).max(1) as f64;

            let finding_severity = if ratio >= 0.40 {
                Severity::Critical
            } else if ratio >= 0.20 {
                Severity::Warning
            } else {
                continue;
            };
            severity = severity.max(finding_severity);

            findings.push(HealthFinding {
                severity: finding_severity,
                message: format!("{schema}.{table} is {:.1}% dead tuples", ratio * 100.0),
                details: serde_json::json!({
                    "schema": schema, "table": table, "live": live, "dead": dead,
                }),
            });
        }

        Ok(HealthCheckReport {
            health_type: HealthType::Vacuum,
            severity,
            findings,
        })
    }
}
