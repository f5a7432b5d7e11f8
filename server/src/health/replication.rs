use async_trait::async_trait;
use shared::{HealthCheckReport, HealthFinding, HealthType, Severity};

use crate::db::driver::Driver;
use crate::error::Result;

use super::Calculator;

/// Replica lag for every attached streaming replica, in bytes of WAL.
/// Reports `Ok` with no findings when this instance has no replicas
/// (e.g. a standalone primary or a standby itself).
pub struct ReplicationCalculator;

const LAG_WARNING_BYTES: i64 = 16 * 1024 * 1024;
const LAG_CRITICAL_BYTES: i64 = 256 * 1024 * 1024;

#[async_trait]
impl Calculator for ReplicationCalculator {
    fn health_type(&self) -> HealthType {
        HealthType::Replication
    }

    async fn run(&self, driver: &Driver) -> Result<HealthCheckReport> {
        let client = driver.pool().get().await?;
        let rows = client
            .query(
                "SELECT application_name, \
                        pg_wal_lsn_diff(pg_current_wal_lsn(), replay_lsn)::int8 AS lag_bytes \
                 FROM pg_stat_replication",
                &[],
            )
            .await?;

        let mut findings = Vec::new();
        let mut severity = Severity::Ok;

        for row in &rows {
            let name: String = row.get("application_name");
            let lag: Option<i64> = row.get("lag_bytes");
            let lag = lag.unwrap_or(0);

            let finding_severity = if lag >= LAG_CRITICAL_BYTES {
                Severity::Critical
            } else if lag >= LAG_WARNING_BYTES {
                Severity::Warning
            } else {
                Severity::Ok
            };
            severity = severity.max(finding_severity);

            findings.push(HealthFinding {
                severity: finding_severity,
                message: format!("replica {name} is {lag} bytes behind"),
                details: serde_json::json!({ "application_name": name, "lag_bytes": lag }),
            });
        }

        Ok(HealthCheckReport {
            health_type: HealthType::Replication,
            severity,
            findings,
        })
    }
}
