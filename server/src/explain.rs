use serde_json::Value;
use shared::{ExplainOptions, ExplainPlan};
use tracing::instrument;

use crate::advisor::HypoHandle;
use crate::db::driver::Driver;
use crate::error::{DbaError, Result};

/// Builds and runs `EXPLAIN (FORMAT JSON, ...)` statements, optionally under
/// a set of hypothetical indexes injected via `hypopg`.
pub struct ExplainEngine {
    driver: Driver,
    server_version_num: i32,
}

impl ExplainEngine {
    pub fn new(driver: Driver, server_version_num: i32) -> Self {
        Self {
            driver,
            server_version_num,
        }
    }

    #[instrument(skip(self, params))]
    pub async fn explain(
        &self,
        sql: &str,
        params: &[Value],
        options: &ExplainOptions,
    ) -> Result<ExplainPlan> {
        let mut guards = Vec::with_capacity(options.hypothetical_indexes.len());
        if !options.hypothetical_indexes.is_empty() {
            self.ensure_hypopg().await?;
            for def in &options.hypothetical_indexes {
                guards.push(HypoHandle::create(&self.driver, def).await?);
            }
        }

        let generic_plan = options.generic_plan && self.server_version_num >= 160_000;
        if options.generic_plan && !generic_plan {
            return Err(DbaError::UnsupportedOption {
                option: "generic_plan requires PostgreSQL 16 or newer".to_string(),
            });
        }
        let memory = options.memory && self.server_version_num >= 170_000;
        if options.memory && !memory {
            return Err(DbaError::UnsupportedOption {
                option: "memory requires PostgreSQL 17 or newer".to_string(),
            });
        }
        let serialize = options.serialize && self.server_version_num >= 170_000;
        if options.serialize && !serialize {
            return Err(DbaError::UnsupportedOption {
                option: "serialize requires PostgreSQL 17 or newer".to_string(),
            });
        }

        let mut flags = vec!["FORMAT JSON".to_string()];
        if options.analyze {
            flags.push("ANALYZE".to_string());
        }
        if options.buffers {
            flags.push("BUFFERS".to_string());
        }
        if generic_plan {
            flags.push("GENERIC_PLAN".to_string());
        }
        if memory {
            flags.push("MEMORY".to_string());
        }
        if serialize {
            flags.push("SERIALIZE".to_string());
        }

        let explain_sql = format!("EXPLAIN ({}) {}", flags.join(", "), sql);
        let rows = self.driver.query(&explain_sql, params).await?;

        let plan = rows
            .first()
            .and_then(|row| row.get("QUERY PLAN").cloned())
            .ok_or_else(|| DbaError::internal("EXPLAIN returned no plan row"))?;

        let (total_cost, actual_total_time_ms) = extract_top_level_costs(&plan);

        Ok(ExplainPlan {
            server_version_num: self.server_version_num,
            options_used: options.clone(),
            hypothetical_indexes: options.hypothetical_indexes.clone(),
            plan,
            total_cost,
            actual_total_time_ms,
            best_effort: options.generic_plan && !generic_plan,
        })
    }

    async fn ensure_hypopg(&self) -> Result<()> {
        let client = self.driver.pool().get().await?;
        let exists: bool = client
            .query_one(
                "SELECT EXISTS (SELECT 1 FROM pg_extension WHERE extname = 'hypopg')",
                &[],
            )
            .await?
            .get(0);
        if !exists {
            return Err(DbaError::ExtensionUnavailable {
                extension: "hypopg".to_string(),
                reason: "CREATE EXTENSION hypopg has not been run on this database".to_string(),
            });
        }
        Ok(())
    }
}

/// Pulls `Total Cost` and `Actual Total Time` off the root plan node, if
/// present, without requiring the full recursive plan schema.
fn extract_top_level_costs(plan: &Value) -> (Option<f64>, Option<f64>) {
    let root = plan
        .as_array()
        .and_then(|arr| arr.first())
        .and_then(|entry| entry.get("Plan"));
    let total_cost = root
        .and_then(|p| p.get("Total Cost"))
        .and_then(Value::as_f64);
    let actual_time = root
        .and_then(|p| p.get("Actual Total Time"))
        .and_then(Value::as_f64);
    (total_cost, actual_time)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_costs_from_plan_array() {
        let plan = json!([{
            "Plan": {
                "Node Type": "Seq Scan",
                "Total Cost": 123.45,
                "Actual Total Time": 6.7
            }
        }]);
        let (cost, time) = extract_top_level_costs(&plan);
        assert_eq!(cost, Some(123.45));
        assert_eq!(time, Some(6.7));
    }

    #[test]
    fn missing_costs_are_none() {
        let plan = json!([{"Plan": {"Node Type": "Seq Scan"}}]);
        let (cost, time) = extract_top_level_costs(&plan);
        assert_eq!(cost, None);
        assert_eq!(time, None);
    }
}
