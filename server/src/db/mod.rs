use std::str::FromStr;

use deadpool_postgres::{ManagerConfig, RecyclingMethod, Runtime};
use shared::ServerInfo;
use tokio_postgres::Config as PgConfig;
use tracing::{debug, info};

use crate::error::{DbaError, Result};
use crate::PgPoolParams;

pub mod driver;
pub mod restricted;

pub type PgPool = deadpool_postgres::Pool;
pub type PgConnection = deadpool_postgres::Object;

/// Builds the pool from a libpq-style connection string, the same shape
/// accepted by `psql` and by `tokio_postgres::Config::from_str`.
pub async fn get_pool(connection_string: &str, params: &PgPoolParams) -> Result<PgPool> {
    info!("creating postgres pool");
    let pg_config = PgConfig::from_str(connection_string)
        .map_err(|e| DbaError::Configuration(format!("invalid connection string: {e}")))?;

    let manager_config = ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    };
    let manager =
        deadpool_postgres::Manager::from_config(pg_config, tokio_postgres::NoTls, manager_config);
    let pool = deadpool_postgres::Pool::builder(manager)
        .max_size(params.pg_max_connections as usize)
        .runtime(Runtime::Tokio1)
        .build()
        .map_err(|e| DbaError::Configuration(format!("failed to build pool: {e}")))?;

    debug!("postgres pool created");
    Ok(pool)
}

/// Probes `server_version_num` and caches it; every component that needs to
/// gate behaviour on PostgreSQL major version reads this once at startup.
pub async fn probe_server_info(pool: &PgPool) -> Result<ServerInfo> {
    let client = pool.get().await?;
    let row = client
        .query_one("SHOW server_version_num", &[])
        .await?;
    let raw: String = row.get(0);
    let server_version_num: i32 = raw
        .parse()
        .map_err(|_| DbaError::internal("server_version_num was not an integer"))?;
    let major = server_version_num / 10_000;
    Ok(ServerInfo {
        major,
        server_version_num,
    })
}

/// Confirms an extension is installed in the current database; used by
/// components that depend on `hypopg` or `pg_stat_statements`.
pub async fn extension_installed(pool: &PgPool, name: &str) -> Result<bool> {
    let client = pool.get().await?;
    let row = client
        .query_one(
            "SELECT EXISTS (SELECT 1 FROM pg_extension WHERE extname = $1)",
            &[&name],
        )
        .await?;
    Ok(row.get(0))
}

pub async fn run_health_check(pool: &PgPool) -> Result<()> {
    let client = pool.get().await?;
    client.query_one("SELECT 1", &[]).await?;
    Ok(())
}
