use std::collections::HashSet;
use std::time::{Duration, Instant};

use shared::{
    AdvisorConstraints, AdvisorResult, ExplainOptions, IndexDefinition, IndexRecommendation,
    QueryWorkloadItem, TableRef,
};
use sqlparser::ast::{Expr, SetExpr, Statement, TableFactor};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use tracing::{debug, instrument, warn};

use crate::db::driver::Driver;
use crate::db::PgPool;
use crate::error::{DbaError, Result};
use crate::explain::ExplainEngine;

pub mod llm;

/// Holds a `hypopg`-created hypothetical index alive for the lifetime of
/// this value. Cleanup on drop is best-effort and fire-and-forget since
/// `Drop` cannot be async: if the process is killed before the spawned
/// cleanup task runs, `hypopg_reset()` at the next session start clears
/// the leftover OID.
pub struct HypoHandle {
    pool: PgPool,
    indexrelid: i64,
    pub definition: IndexDefinition,
}

impl HypoHandle {
    pub async fn create(driver: &Driver, definition: &IndexDefinition) -> Result<Self> {
        let ddl = definition.to_ddl("hypo_idx");
        let client = driver.pool().get().await?;
        let row = client
            .query_one("SELECT indexrelid FROM hypopg_create_index($1)", &[&ddl])
            .await?;
        let indexrelid: i64 = row.get(0);
        Ok(Self {
            pool: driver.pool().clone(),
            indexrelid,
            definition: definition.clone(),
        })
    }

    pub async fn estimated_size_bytes(&self) -> Result<i64> {
        let client = self.pool.get().await?;
        let row = client
            .query_one("SELECT hypopg_relation_size($1)", &[&self.indexrelid])
            .await?;
        Ok(row.get(0))
    }
}

impl Drop for HypoHandle {
    fn drop(&mut self) {
        let pool = self.pool.clone();
        let indexrelid = self.indexrelid;
        tokio::spawn(async move {
            match pool.get().await {
                Ok(client) => {
                    if let Err(e) = client
                        .execute("SELECT hypopg_drop_index($1)", &[&indexrelid])
                        .await
                    {
                        warn!(error = %e, indexrelid, "failed to drop hypothetical index");
                    }
                }
                Err(e) => warn!(error = %e, indexrelid, "could not reach pool to drop hypothetical index"),
            }
        });
    }
}

/// Anytime, bounded-search index advisor: generates candidate indexes from
/// a workload, costs each one under `hypopg`, and returns the best
/// non-overlapping set found within the wall-clock budget.
pub struct Advisor {
    driver: Driver,
    explain: ExplainEngine,
}

impl Advisor {
    pub fn new(driver: Driver, server_version_num: i32) -> Self {
        let explain = ExplainEngine::new(driver.clone(), server_version_num);
        Self { driver, explain }
    }

    #[instrument(skip(self, workload, constraints))]
    pub async fn recommend(
        &self,
        workload: &[QueryWorkloadItem],
        constraints: &AdvisorConstraints,
    ) -> Result<AdvisorResult> {
        self.ensure_hypopg().await?;

        let deadline = Instant::now() + Duration::from_secs(constraints.wall_clock_budget_secs);
        let candidates = generate_candidates(workload, constraints.max_columns_per_index);
        debug!(candidate_count = candidates.len(), "generated index candidates");

        let mut baseline_costs = Vec::with_capacity(workload.len());
        for item in workload {
            let cost = self.plan_cost(&item.query_text).await.unwrap_or(None);
            baseline_costs.push(cost);
        }
        let baseline_total: f64 = baseline_costs.iter().filter_map(|c| *c).sum();

        let mut accepted: Vec<IndexRecommendation> = Vec::new();
        let mut accepted_keys: HashSet<String> = HashSet::new();
        let mut total_size: i64 = 0;
        let mut partial = false;

        for candidate in candidates {
            if Instant::now() >= deadline {
                partial = true;
                break;
            }
            if accepted.len() >= constraints.max_indexes {
                break;
            }
            if accepted_keys.contains(&candidate.dedup_key()) {
                continue;
            }

            let handle = match HypoHandle::create(&self.driver, &candidate).await {
                Ok(h) => h,
                Err(e) => {
                    debug!(error = %e, "skipping candidate that hypopg rejected");
                    continue;
                }
            };

            let size = handle.estimated_size_bytes().await.unwrap_or(0);
            if total_size + size > constraints.max_total_size_bytes {
                continue;
            }

            let mut proposed_total = 0.0;
            let mut affected_queries = Vec::new();
            for (item, baseline) in workload.iter().zip(baseline_costs.iter()) {
                let Some(baseline_cost) = baseline else { continue };
                match self.plan_cost(&item.query_text).await {
                    Ok(Some(cost)) => {
                        proposed_total += cost;
                        if cost < *baseline_cost {
                            if let Some(id) = item.queryid {
                                affected_queries.push(id);
                            }
                        }
                    }
                    _ => proposed_total += *baseline_cost,
                }
            }

            let recommendation = IndexRecommendation {
                definition: candidate.clone(),
                estimated_size_bytes: size,
                baseline_cost: baseline_total,
                proposed_cost: proposed_total,
                affected_queries,
            };

            if recommendation.is_marginal(constraints.min_cost_improvement) {
                continue;
            }

            accepted_keys.insert(candidate.dedup_key());
            total_size += size;
            accepted.push(recommendation);
        }

        accepted.sort_by(|a, b| a.cost_ratio().partial_cmp(&b.cost_ratio()).unwrap());

        Ok(AdvisorResult {
            recommendations: accepted,
            partial,
        })
    }

    /// Costs `sql` via the shared EXPLAIN engine under `GENERIC_PLAN`, so
    /// `$1`-style placeholders straight out of `pg_stat_statements` (which
    /// carry no bound values) don't need real parameters.
    async fn plan_cost(&self, sql: &str) -> Result<Option<f64>> {
        let options = ExplainOptions {
            generic_plan: true,
            ..Default::default()
        };
        let plan = self.explain.explain(sql, &[], &options).await?;
        Ok(plan.total_cost)
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

/// Extracts column references from equality/range predicates in each
/// query's `WHERE` clause, then builds single-column and, up to
/// `max_columns`, composite candidates per referenced table.
fn generate_candidates(workload: &[QueryWorkloadItem], max_columns: usize) -> Vec<IndexDefinition> {
    let dialect = PostgreSqlDialect {};
    let mut seen: HashSet<String> = HashSet::new();
    let mut candidates = Vec::new();

    for item in workload {
        let Ok(statements) = Parser::parse_sql(&dialect, &item.query_text) else {
            continue;
        };
        for statement in &statements {
            let Statement::Query(query) = statement else {
                continue;
            };
            let SetExpr::Select(select) = query.body.as_ref() else {
                continue;
            };

            let table = select.from.first().and_then(table_ref_from_factor);
            let Some(table) = table else { continue };

            let mut columns = Vec::new();
            if let Some(selection) = &select.selection {
                collect_columns(selection, &mut columns);
            }
            columns.dedup();
            if columns.is_empty() {
                continue;
            }
            columns.truncate(max_columns.max(1));

            for take in 1..=columns.len() {
                let def = IndexDefinition {
                    table: table.clone(),
                    columns: columns[..take].to_vec(),
                    using: "btree".to_string(),
                    unique: false,
                    where_clause: None,
                };
                let key = def.dedup_key();
                if seen.insert(key) {
                    candidates.push(def);
                }
            }
        }
    }
    candidates
}

fn table_ref_from_factor(table_with_joins: &sqlparser::ast::TableWithJoins) -> Option<TableRef> {
    match &table_with_joins.relation {
        TableFactor::Table { name, .. } => {
            let parts: Vec<String> = name.0.iter().map(|ident| ident.value.clone()).collect();
            match parts.len() {
                1 => Some(TableRef {
                    schema: "public".to_string(),
                    name: parts[0].clone(),
                }),
                2 => Some(TableRef {
                    schema: parts[0].clone(),
                    name: parts[1].clone(),
                }),
                _ => None,
            }
        }
        _ => None,
    }
}

fn collect_columns(expr: &Expr, out: &mut Vec<String>) {
    match expr {
        Expr::BinaryOp { left, op, right } => {
            use sqlparser::ast::BinaryOperator::*;
            if matches!(op, And | Or) {
                collect_columns(left, out);
                collect_columns(right, out);
                return;
            }
            if let Expr::Identifier(ident) = left.as_ref() {
                out.push(ident.value.clone());
            } else if let Expr::CompoundIdentifier(parts) = left.as_ref() {
                if let Some(last) = parts.last() {
                    out.push(last.value.clone());
                }
            }
        }
        Expr::IsNull(inner) | Expr::IsNotNull(inner) => collect_columns(inner, out),
        Expr::InList { expr, .. } => collect_columns(expr, out),
        Expr::Between { expr, .. } => collect_columns(expr, out),
        Expr::Nested(inner) => collect_columns(inner, out),
        _ => {}
    }
}
