use async_trait::async_trait;
use shared::{HealthCheckReport, HealthFinding, HealthType, Severity};

use crate::db::driver::Driver;
use crate::error::Result;

use super::Calculator;

/// Flags indexes that have never been scanned and are larger than a
/// trivial size, the cheapest proxy for "this index is dead weight".
pub struct IndexBloatCalculator;

const UNUSED_INDEX_MIN_BYTES: i64 = 8 * 1024 * 1024;

#[async_trait]
impl Calculator for IndexBloatCalculator {
    fn health_type(&self) -> HealthType {
        HealthType::Index
    }

    async fn run(&self, driver: &Driver) -> Result<HealthCheckReport> {
        let client = driver.pool().get().await?;
        let rows = client
            .query(
                "SELECT schemaname, relname, indexrelname, pg_relation_size(indexrelid) AS size_bytes \
                 FROM pg_stat_user_indexes \
                 WHERE idx_scan = 0 AND pg_relation_size(indexrelid) > $1 \
                 ORDER BY size_bytes DESC \
                 LIMIT 20",
                &[&UNUSED_INDEX_MIN_BYTES],
            )
            .await?;

        let findings: Vec<HealthFinding> = rows
            .iter()
            .map(|row| {
                let schema: String = row.get("schemaname");
                let table: String = row.get("relname");
                let index: String = row.get("indexrelname");
                let size: i64 = row.get("size_bytes");
                HealthFinding {
                    severity: Severity::Warning,
                    message: format!("index {schema}.{index} on {table} has never been scanned"),
                    details: serde_json::json!({
                        "schema": schema, "table": table, "index": index, "size_bytes": size,
                    }),
                }
            })
            .collect();

        let severity = if findings.is_empty() {
            Severity::Ok
        } else {
            Severity::Warning
        };

        Ok(HealthCheckReport {
            health_type: HealthType::Index,
            severity,
            findings,
        })
    }
}
