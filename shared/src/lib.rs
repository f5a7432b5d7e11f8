//! Wire-level data transfer objects shared between the tool surface and the
//! engine crate. Mirrors the data model in the specification: every request
//! or response that crosses the MCP tool boundary, or that is serialized
//! into a JSON envelope, has its shape defined here.

use std::collections::HashMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

// ── Access mode ──────────────────────────────────────────────────────────

/// Chosen at startup; never mutated for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, EnumString, Display, Serialize, Deserialize)]
#[strum(ascii_case_insensitive, serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AccessMode {
    #[default]
    Unrestricted,
    Restricted,
}

// ── Server info ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ServerInfo {
    pub major: i32,
    pub server_version_num: i32,
}

// ── Table reference ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct TableRef {
    #[serde(default = "default_schema")]
    pub schema: String,
    pub name: String,
}

fn default_schema() -> String {
    "public".to_string()
}

impl std::fmt::Display for TableRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

// ── Index definition ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct IndexDefinition {
    pub table: TableRef,
    pub columns: Vec<String>,
    #[serde(default = "default_using")]
    pub using: String,
    #[serde(default)]
    pub unique: bool,
    #[serde(default, rename = "where")]
    pub where_clause: Option<String>,
}

fn default_using() -> String {
    "btree".to_string()
}

impl IndexDefinition {
    /// Maximum number of columns a PostgreSQL index may cover.
    pub const MAX_COLUMNS: usize = 32;

    pub fn validate(&self) -> Result<(), String> {
        if self.columns.is_empty() {
            return Err("index definition must name at least one column".to_string());
        }
        if self.columns.len() > Self::MAX_COLUMNS {
            return Err(format!(
                "index definition names {} columns, limit is {}",
                self.columns.len(),
                Self::MAX_COLUMNS
            ));
        }
        Ok(())
    }

    /// A stable key for deduplication / interaction-graph lookups.
    pub fn dedup_key(&self) -> String {
        format!(
            "{}({}){}{}",
            self.table,
            self.columns.join(","),
            self.using,
            self.where_clause.as_deref().unwrap_or("")
        )
    }

    /// Reconstruct the `CREATE INDEX` DDL for this definition.
    pub fn to_ddl(&self, index_name: &str) -> String {
        let unique = if self.unique { "UNIQUE " } else { "" };
        let cols = self.columns.join(", ");
        let mut sql = format!(
            "CREATE {unique}INDEX {index_name} ON {table} USING {using} ({cols})",
            table = self.table,
            using = self.using,
        );
        if let Some(w) = &self.where_clause {
            sql.push_str(" WHERE ");
            sql.push_str(w);
        }
        sql
    }
}

// ── Query workload item ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct QueryWorkloadItem {
    pub query_text: String,
    #[serde(default = "default_calls")]
    pub calls: i64,
    #[serde(default)]
    pub mean_exec_ms: f64,
    #[serde(default)]
    pub queryid: Option<i64>,
}

fn default_calls() -> i64 {
    1
}

// ── Explain ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ExplainOptions {
    #[serde(default)]
    pub analyze: bool,
    #[serde(default)]
    pub buffers: bool,
    #[serde(default)]
    pub generic_plan: bool,
    #[serde(default)]
    pub memory: bool,
    #[serde(default)]
    pub serialize: bool,
    #[serde(default)]
    pub hypothetical_indexes: Vec<IndexDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplainPlan {
    pub server_version_num: i32,
    pub options_used: ExplainOptions,
    pub hypothetical_indexes: Vec<IndexDefinition>,
    /// Verbatim `EXPLAIN (FORMAT JSON, ...)` output — preserved key-for-key
    /// so unrecognised keys from newer PostgreSQL majors survive.
    pub plan: serde_json::Value,
    pub total_cost: Option<f64>,
    pub actual_total_time_ms: Option<f64>,
    /// Set when a pre-PG16 server required a best-effort literal
    /// substitution instead of a true generic plan.
    pub best_effort: bool,
}

// ── Index recommendation ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexRecommendation {
    pub definition: IndexDefinition,
    pub estimated_size_bytes: i64,
    pub baseline_cost: f64,
    pub proposed_cost: f64,
    pub affected_queries: Vec<i64>,
}

impl IndexRecommendation {
    /// `proposed_cost / baseline_cost`; recommendations at or above the
    /// configured `min_cost_improvement` ratio are discarded as marginal.
    pub fn cost_ratio(&self) -> f64 {
        if self.baseline_cost <= 0.0 {
            1.0
        } else {
            self.proposed_cost / self.baseline_cost
        }
    }

    pub fn is_marginal(&self, min_cost_improvement: f64) -> bool {
        self.cost_ratio() >= min_cost_improvement
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct AdvisorConstraints {
    #[serde(default = "default_max_indexes")]
    pub max_indexes: usize,
    #[serde(default = "default_max_total_size_bytes")]
    pub max_total_size_bytes: i64,
    #[serde(default = "default_max_columns_per_index")]
    pub max_columns_per_index: usize,
    #[serde(default = "default_min_cost_improvement")]
    pub min_cost_improvement: f64,
    #[serde(default = "default_budget_secs")]
    pub wall_clock_budget_secs: u64,
}

fn default_max_indexes() -> usize {
    5
}
fn default_max_total_size_bytes() -> i64 {
    10 * 1024 * 1024 * 1024
}
fn default_max_columns_per_index() -> usize {
    3
}
fn default_min_cost_improvement() -> f64 {
    0.95
}
fn default_budget_secs() -> u64 {
    60
}

impl AdvisorConstraints {
    pub fn with_defaults() -> Self {
        Self {
            max_indexes: default_max_indexes(),
            max_total_size_bytes: default_max_total_size_bytes(),
            max_columns_per_index: default_max_columns_per_index(),
            min_cost_improvement: default_min_cost_improvement(),
            wall_clock_budget_secs: default_budget_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvisorResult {
    pub recommendations: Vec<IndexRecommendation>,
    pub partial: bool,
}

// ── Health ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, EnumString, Display, Serialize, Deserialize, JsonSchema)]
#[strum(ascii_case_insensitive, serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Ok,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display, Serialize, Deserialize, JsonSchema)]
#[strum(ascii_case_insensitive, serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum HealthType {
    Index,
    Buffer,
    Connection,
    Replication,
    Sequence,
    Constraint,
    Vacuum,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthFinding {
    pub severity: Severity,
    pub message: String,
    pub details: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckReport {
    pub health_type: HealthType,
    pub severity: Severity,
    pub findings: Vec<HealthFinding>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCompositeReport {
    pub severity: Severity,
    pub reports: Vec<HealthCheckReport>,
}

impl HealthCompositeReport {
    pub fn from_reports(reports: Vec<HealthCheckReport>) -> Self {
        let severity = reports
            .iter()
            .map(|r| r.severity)
            .max()
            .unwrap_or(Severity::Ok);
        Self { severity, reports }
    }
}

// ── Top queries ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, EnumString, Display, Serialize, Deserialize, JsonSchema)]
#[strum(ascii_case_insensitive, serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TopQueryOrderBy {
    #[default]
    TotalTime,
    MeanTime,
    IoTime,
    Calls,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopQueryRow {
    pub queryid: Option<i64>,
    pub query_text: String,
    pub calls: i64,
    pub total_time_ms: Option<f64>,
    pub mean_time_ms: Option<f64>,
    pub io_time_ms: Option<f64>,
    pub stats_since: Option<chrono::DateTime<chrono::Utc>>,
    pub parallel_workers_launched: Option<i64>,
}

// ── Tool request / response DTOs ─────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ListObjectsRequest {
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub object_types: Vec<String>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectSummary {
    pub schema: String,
    pub name: String,
    pub object_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListObjectsResponse {
    pub objects: Vec<ObjectSummary>,
    pub total: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GetObjectDetailsRequest {
    #[serde(default = "default_schema")]
    pub schema: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnDetail {
    pub name: String,
    pub data_type: String,
    pub is_nullable: bool,
    pub default: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstraintDetail {
    pub name: String,
    pub constraint_type: String,
    pub definition: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexDetail {
    pub name: String,
    pub definition: String,
    pub is_unique: bool,
    pub is_valid: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectDetails {
    pub table: TableRef,
    pub columns: Vec<ColumnDetail>,
    pub constraints: Vec<ConstraintDetail>,
    pub indexes: Vec<IndexDetail>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ExecuteSqlRequest {
    pub sql: String,
    #[serde(default)]
    pub params: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteSqlResponse {
    pub rows: Vec<HashMap<String, serde_json::Value>>,
    pub row_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ExplainQueryRequest {
    pub sql: String,
    #[serde(default)]
    pub params: Vec<serde_json::Value>,
    #[serde(default)]
    pub options: ExplainOptions,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AnalyzeWorkloadIndexesRequest {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub constraints: AdvisorConstraints,
}

fn default_top_k() -> usize {
    20
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AnalyzeQueryIndexesRequest {
    pub queries: Vec<QueryWorkloadItem>,
    #[serde(default)]
    pub constraints: AdvisorConstraints,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct AnalyzeDbHealthRequest {
    #[serde(default)]
    pub checks: Vec<HealthType>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GetTopQueriesRequest {
    #[serde(default = "default_top_query_limit")]
    pub limit: i64,
    #[serde(default)]
    pub order_by: TopQueryOrderBy,
}

fn default_top_query_limit() -> i64 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetTopQueriesResponse {
    pub rows: Vec<TopQueryRow>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ListSchemasRequest {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListSchemasResponse {
    pub schemas: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_ref_defaults_to_public_schema() {
        let parsed: TableRef = serde_json::from_str(r#"{"name":"orders"}"#).unwrap();
        assert_eq!(parsed.schema, "public");
        assert_eq!(parsed.name, "orders");
    }

    #[test]
    fn index_definition_validates_column_count() {
        let def = IndexDefinition {
            table: TableRef {
                schema: "public".into(),
                name: "t".into(),
            },
            columns: (0..40).map(|i| format!("c{i}")).collect(),
            using: "btree".into(),
            unique: false,
            where_clause: None,
        };
        assert!(def.validate().is_err());
    }

    #[test]
    fn index_definition_rejects_empty_columns() {
        let def = IndexDefinition {
            table: TableRef {
                schema: "public".into(),
                name: "t".into(),
            },
            columns: vec![],
            using: "btree".into(),
            unique: false,
            where_clause: None,
        };
        assert!(def.validate().is_err());
    }

    #[test]
    fn index_definition_to_ddl_roundtrip_shape() {
        let def = IndexDefinition {
            table: TableRef {
                schema: "public".into(),
                name: "orders".into(),
            },
            columns: vec!["customer_id".into()],
            using: "btree".into(),
            unique: false,
            where_clause: None,
        };
        let ddl = def.to_ddl("idx_orders_customer_id");
        assert_eq!(
            ddl,
            "CREATE INDEX idx_orders_customer_id ON public.orders USING btree (customer_id)"
        );
    }

    #[test]
    fn recommendation_marginal_discard() {
        let rec = IndexRecommendation {
            definition: IndexDefinition {
                table: TableRef {
                    schema: "public".into(),
                    name: "t".into(),
                },
                columns: vec!["a".into()],
                using: "btree".into(),
                unique: false,
                where_clause: None,
            },
            estimated_size_bytes: 1024,
            baseline_cost: 100.0,
            proposed_cost: 99.0,
            affected_queries: vec![],
        };
        assert!(rec.is_marginal(0.95));

        let rec2 = IndexRecommendation {
            proposed_cost: 10.0,
            ..rec
        };
        assert!(!rec2.is_marginal(0.95));
    }

    #[test]
    fn composite_report_takes_worst_severity() {
        let reports = vec![
            HealthCheckReport {
                health_type: HealthType::Buffer,
                severity: Severity::Ok,
                findings: vec![],
            },
            HealthCheckReport {
                health_type: HealthType::Sequence,
                severity: Severity::Critical,
                findings: vec![],
            },
        ];
        let composite = HealthCompositeReport::from_reports(reports);
        assert_eq!(composite.severity, Severity::Critical);
    }
}
