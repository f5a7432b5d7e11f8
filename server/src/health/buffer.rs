use async_trait::async_trait;
use shared::{HealthCheckReport, HealthFinding, HealthType, Severity};

use crate::db::driver::Driver;
use crate::error::Result;

use super::Calculator;

/// Database-wide shared buffer cache hit ratio. Below 0.90 is worth a
/// warning, below 0.75 is critical (both thresholds are workload
/// dependent but serve as a reasonable default).
pub struct BufferCacheCalculator;

#[async_trait]
impl Calculator for BufferCacheCalculator {
    fn health_type(&self) -> HealthType {
        HealthType::Buffer
    }

    async fn run(&self, driver: &Driver) -> Result<HealthCheckReport> {
        let client = driver.pool().get().await?;
        let row = client
            .query_one(
                "SELECT sum(blks_hit)::float8 AS hit, sum(blks_read)::float8 AS read \
                 FROM pg_stat_database",
                &[],
            )
            .await?;
        let hit: Option<f64> = row.get("hit");
        let read: Option<f64> = row.get("read");
        let (hit, read) = (hit.unwrap_or(0.0), read.unwrap_or(0.0));
        let ratio = if hit + read > 0.0 { hit / (hit + read) } else { 1.0 };

        let (severity, message) = if ratio < 0.75 {
            (Severity::Critical, format!("buffer cache hit ratio is {ratio:.3}, well below target"))
        } else if ratio < 0.90 {
            (Severity::Warning, format!("buffer cache hit ratio is {ratio:.3}, below target"))
        } else {
            (Severity::Ok, format!("buffer cache hit ratio is {ratio:.3}"))
        };

        let findings = vec![HealthFinding {
            severity,
            message,
            details: serde_json::json!({ "hit_ratio": ratio }),
        }];

        Ok(HealthCheckReport {
            health_type: HealthType::Buffer,
            severity,
            findings,
        })
    }
}
