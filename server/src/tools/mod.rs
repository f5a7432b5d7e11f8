use std::sync::Arc;

use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{CallToolResult, ErrorData, Implementation, ProtocolVersion, ServerCapabilities, ServerInfo};
use rmcp::{tool, tool_handler, tool_router, ServerHandler};

use shared::{
    AccessMode, AnalyzeDbHealthRequest, AnalyzeQueryIndexesRequest, AnalyzeWorkloadIndexesRequest,
    ExecuteSqlRequest, ExecuteSqlResponse, ExplainQueryRequest, GetObjectDetailsRequest,
    GetTopQueriesRequest, GetTopQueriesResponse, ListObjectsRequest, ListSchemasRequest,
};

use crate::advisor::Advisor;
use crate::catalog::Catalog;
use crate::db::restricted::{check_read_only, RestrictedDriver};
use crate::explain::ExplainEngine;
use crate::health::Orchestrator;
use crate::workload::{self, Collector};

pub mod envelope;

struct Inner {
    catalog: Catalog,
    restricted: RestrictedDriver,
    explain: ExplainEngine,
    advisor: Advisor,
    workload: Collector,
    health: Orchestrator,
    access_mode: AccessMode,
}

/// The MCP tool surface: the nine `postgres_*` tools a client can call.
/// Every field is a cheap clone of a shared connection pool, so cloning
/// `DbaServer` itself (required by the `rmcp` server loop, which hands a
/// fresh handle to each connection) is inexpensive.
#[derive(Clone)]
pub struct DbaServer {
    inner: Arc<Inner>,
    tool_router: ToolRouter<Self>,
}

impl DbaServer {
    pub fn new(
        catalog: Catalog,
        restricted: RestrictedDriver,
        explain: ExplainEngine,
        advisor: Advisor,
        workload: Collector,
        health: Orchestrator,
        access_mode: AccessMode,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                catalog,
                restricted,
                explain,
                advisor,
                workload,
                health,
                access_mode,
            }),
            tool_router: Self::tool_router(),
        }
    }
}

#[tool_router]
impl DbaServer {
    #[tool(
        name = "postgres_list_schemas",
        description = "List non-system schemas in the connected database"
    )]
    async fn postgres_list_schemas(
        &self,
        Parameters(_request): Parameters<ListSchemasRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        let response = self
            .inner
            .catalog
            .list_schemas()
            .await
            .map_err(envelope::to_mcp_error)?;
        envelope::ok(&response)
    }

    #[tool(
        name = "postgres_list_objects",
        description = "List tables, views, materialized views, or other objects in a schema"
    )]
    async fn postgres_list_objects(
        &self,
        Parameters(request): Parameters<ListObjectsRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        let response = self
            .inner
            .catalog
            .list_objects(&request)
            .await
            .map_err(envelope::to_mcp_error)?;
        envelope::ok(&response)
    }

    #[tool(
        name = "postgres_get_object_details",
        description = "Describe a table's columns, constraints, and indexes"
    )]
    async fn postgres_get_object_details(
        &self,
        Parameters(request): Parameters<GetObjectDetailsRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        let response = self
            .inner
            .catalog
            .get_object_details(&request)
            .await
            .map_err(envelope::to_mcp_error)?;
        envelope::ok(&response)
    }

    #[tool(
        name = "postgres_execute_sql",
        description = "Run a SQL statement and return its result rows. In restricted access \
                        mode only read-only SELECT/WITH statements are allowed"
    )]
    async fn postgres_execute_sql(
        &self,
        Parameters(request): Parameters<ExecuteSqlRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        let rows = self
            .inner
            .restricted
            .query(&request.sql, &request.params)
            .await
            .map_err(envelope::to_mcp_error)?;
        let response = ExecuteSqlResponse {
            row_count: rows.len(),
            rows,
        };
        envelope::ok(&response)
    }

    #[tool(
        name = "postgres_explain_query",
        description = "Return the EXPLAIN (FORMAT JSON) plan for a query, optionally under a \
                        set of hypothetical indexes"
    )]
    async fn postgres_explain_query(
        &self,
        Parameters(request): Parameters<ExplainQueryRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        if self.inner.access_mode == AccessMode::Restricted {
            check_read_only(&request.sql).map_err(envelope::to_mcp_error)?;
        }
        let plan = self
            .inner
            .explain
            .explain(&request.sql, &request.params, &request.options)
            .await
            .map_err(envelope::to_mcp_error)?;
        envelope::ok(&plan)
    }

    #[tool(
        name = "postgres_analyze_workload_indexes",
        description = "Recommend indexes for the current top queries recorded by \
                        pg_stat_statements"
    )]
    async fn postgres_analyze_workload_indexes(
        &self,
        Parameters(request): Parameters<AnalyzeWorkloadIndexesRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        let top = self
            .inner
            .workload
            .top_queries(request.top_k as i64, Default::default())
            .await
            .map_err(envelope::to_mcp_error)?;
        let items: Vec<_> = top.iter().map(workload::to_workload_item).collect();
        let result = self
            .inner
            .advisor
            .recommend(&items, &request.constraints)
            .await
            .map_err(envelope::to_mcp_error)?;
        envelope::ok(&result)
    }

    #[tool(
        name = "postgres_analyze_query_indexes",
        description = "Recommend indexes for an explicit list of queries"
    )]
    async fn postgres_analyze_query_indexes(
        &self,
        Parameters(request): Parameters<AnalyzeQueryIndexesRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        let result = self
            .inner
            .advisor
            .recommend(&request.queries, &request.constraints)
            .await
            .map_err(envelope::to_mcp_error)?;
        envelope::ok(&result)
    }

    #[tool(
        name = "postgres_analyze_db_health",
        description = "Run health calculators (index bloat, buffer cache, connections, \
                        replication, sequences, constraints, vacuum) and return a composite report"
    )]
    async fn postgres_analyze_db_health(
        &self,
        Parameters(request): Parameters<AnalyzeDbHealthRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        let report = self.inner.health.run(&request.checks).await;
        envelope::ok(&report)
    }

    #[tool(
        name = "postgres_get_top_queries",
        description = "Return the top queries recorded by pg_stat_statements, ordered by total \
                        time, mean time, I/O time, or call count"
    )]
    async fn postgres_get_top_queries(
        &self,
        Parameters(request): Parameters<GetTopQueriesRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        let rows = self
            .inner
            .workload
            .top_queries(request.limit, request.order_by)
            .await
            .map_err(envelope::to_mcp_error)?;
        envelope::ok(&GetTopQueriesResponse { rows })
    }
}

#[tool_handler]
impl ServerHandler for DbaServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "postgres-dba-mcp".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            },
            instructions: Some(
                "PostgreSQL DBA tool server. Use postgres_list_schemas and \
                 postgres_list_objects to explore the catalog, postgres_get_object_details for \
                 table structure, postgres_execute_sql for ad-hoc queries, \
                 postgres_explain_query for plan inspection, postgres_analyze_workload_indexes \
                 and postgres_analyze_query_indexes for index recommendations, \
                 postgres_analyze_db_health for diagnostics, and postgres_get_top_queries for \
                 the current query workload."
                    .to_string(),
            ),
        }
    }
}
