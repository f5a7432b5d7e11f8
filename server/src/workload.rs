use shared::{QueryWorkloadItem, TopQueryOrderBy, TopQueryRow};
use tracing::instrument;

use crate::db::driver::Driver;
use crate::error::{DbaError, Result};

/// Reads `pg_stat_statements`. Column names moved twice across supported
/// versions: `total_time`/`mean_time` (<=12) became `total_exec_time`/
/// `mean_exec_time` (13-16); 17 renamed `blk_read_time`/`blk_write_time` to
/// `shared_blk_read_time`/`shared_blk_write_time` and added `stats_since`/
/// `parallel_workers_launched`, which don't exist before 17. We pick the
/// column set once per collector instance based on the probed server
/// version.
pub struct Collector {
    driver: Driver,
    server_version_num: i32,
}

impl Collector {
    pub fn new(driver: Driver, server_version_num: i32) -> Self {
        Self {
            driver,
            server_version_num,
        }
    }

    #[instrument(skip(self))]
    pub async fn ensure_available(&self) -> Result<()> {
        let client = self.driver.pool().get().await?;
        let exists: bool = client
            .query_one(
                "SELECT EXISTS (SELECT 1 FROM pg_extension WHERE extname = 'pg_stat_statements')",
                &[],
            )
            .await?
            .get(0);
        if !exists {
            return Err(DbaError::ExtensionUnavailable {
                extension: "pg_stat_statements".to_string(),
                reason: "CREATE EXTENSION pg_stat_statements has not been run, or the library \
                         is missing from shared_preload_libraries"
                    .to_string(),
            });
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn top_queries(&self, limit: i64, order_by: TopQueryOrderBy) -> Result<Vec<TopQueryRow>> {
        self.ensure_available().await?;

        let columns = self.column_set();
        let order_expr = match order_by {
            TopQueryOrderBy::TotalTime => columns.total_time,
            TopQueryOrderBy::MeanTime => columns.mean_time,
            TopQueryOrderBy::IoTime => columns.io_time,
            TopQueryOrderBy::Calls => "calls",
        };

        let sql = format!(
            "SELECT queryid, query, calls, {total_time} AS total_time_ms, \
             {mean_time} AS mean_time_ms, {io_time} AS io_time_ms, {extra_select} \
             FROM pg_stat_statements \
             ORDER BY {order_expr} DESC NULLS LAST \
             LIMIT $1",
            total_time = columns.total_time,
            mean_time = columns.mean_time,
            io_time = columns.io_time,
            extra_select = columns.extra_select,
        );

        let client = self.driver.pool().get().await?;
        let rows = client.query(&sql, &[&limit]).await?;

        Ok(rows
            .iter()
            .map(|row| TopQueryRow {
                queryid: row.try_get("queryid").ok(),
                query_text: row.try_get("query").unwrap_or_default(),
                calls: row.try_get("calls").unwrap_or_default(),
                total_time_ms: row.try_get("total_time_ms").ok(),
                mean_time_ms: row.try_get("mean_time_ms").ok(),
                io_time_ms: row.try_get("io_time_ms").ok(),
                stats_since: row.try_get("stats_since").ok(),
                parallel_workers_launched: row.try_get("parallel_workers_launched").ok(),
            })
            .collect())
    }

    fn column_set(&self) -> ColumnSet {
        column_set_for_version(self.server_version_num)
    }
}

fn column_set_for_version(server_version_num: i32) -> ColumnSet {
    let (total_time, mean_time) = if server_version_num >= 130_000 {
        ("total_exec_time", "mean_exec_time")
    } else {
        ("total_time", "mean_time")
    };

    // PG17 renamed the shared-buffer io timing columns and added per-query
    // stats reset/parallelism tracking; both are unavailable below 17.
    let (io_time, extra_select) = if server_version_num >= 170_000 {
        (
            "(shared_blk_read_time + shared_blk_write_time)",
            "stats_since, parallel_workers_launched",
        )
    } else {
        (
            "(blk_read_time + blk_write_time)",
            "NULL AS stats_since, NULL AS parallel_workers_launched",
        )
    };

    ColumnSet {
        total_time,
        mean_time,
        io_time,
        extra_select,
    }
}

struct ColumnSet {
    total_time: &'static str,
    mean_time: &'static str,
    io_time: &'static str,
    extra_select: &'static str,
}

/// Converts a raw top-query row into the generic workload item shape the
/// advisor consumes, so `get_top_queries` output can be fed directly into
/// `analyze_workload_indexes`.
pub fn to_workload_item(row: &TopQueryRow) -> QueryWorkloadItem {
    QueryWorkloadItem {
        query_text: row.query_text.clone(),
        calls: row.calls,
        mean_exec_ms: row.mean_time_ms.unwrap_or(0.0),
        queryid: row.queryid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pre_13_uses_legacy_column_names() {
        let cols = column_set_for_version(120_005);
        assert_eq!(cols.total_time, "total_time");
        assert_eq!(cols.mean_time, "mean_time");
    }

    #[test]
    fn modern_versions_use_exec_time_columns() {
        let cols = column_set_for_version(160_003);
        assert_eq!(cols.total_time, "total_exec_time");
        assert_eq!(cols.mean_time, "mean_exec_time");
        assert_eq!(cols.io_time, "(blk_read_time + blk_write_time)");
        assert_eq!(
            cols.extra_select,
            "NULL AS stats_since, NULL AS parallel_workers_launched"
        );
    }

    #[test]
    fn pg17_uses_renamed_io_columns_and_exposes_stats_since() {
        let cols = column_set_for_version(170_000);
        assert_eq!(cols.total_time, "total_exec_time");
        assert_eq!(
            cols.io_time,
            "(shared_blk_read_time + shared_blk_write_time)"
        );
        assert_eq!(cols.extra_select, "stats_since, parallel_workers_launched");
    }
}
