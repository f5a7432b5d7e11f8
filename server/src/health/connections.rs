use async_trait::async_trait;
use shared::{HealthCheckReport, HealthFinding, HealthType, Severity};

use crate::db::driver::Driver;
use crate::error::Result;

use super::Calculator;

/// Active connection count against `max_connections`. Saturation here
/// means new client connections start failing outright.
pub struct ConnectionsCalculator;

#[async_trait]
impl Calculator for ConnectionsCalculator {
    fn health_type(&self) -> HealthType {
        HealthType::Connection
    }

    async fn run(&self, driver: &Driver) -> Result<HealthCheckReport> {
        let client = driver.pool().get().await?;
        let max_connections: String = client
            .query_one("SHOW max_connections", &[])
            .await?
            .get(0);
        let max_connections: i64 = max_connections
            .parse()
            .unwrap_or(100);

        let current: i64 = client
            .query_one("SELECT count(*) FROM pg_stat_activity", &[])
            .await?
            .get(0);

        let ratio = current as f64 / max_connections.max(1) as f64;
        let (severity, message) = if ratio >= 0.95 {
            (Severity::Critical, format!("{current}/{max_connections} connections in use"))
        } else if ratio >= 0.80 {
            (Severity::Warning, format!("{current}/{max_connections} connections in use"))
        } else {
            (Severity::Ok, format!("{current}/{max_connections} connections in use"))
        };

        let findings = vec![HealthFinding {
            severity,
            message,
            details: serde_json::json!({ "current": current, "max_connections": max_connections }),
        }];

        Ok(HealthCheckReport {
            health_type: HealthType::Connection,
            severity,
            findings,
        })
    }
}
