use clap::{Parser, ValueEnum};
use std::time::Duration;
use strum_macros::{Display, EnumString};

pub use shared::AccessMode;

pub mod advisor;
pub mod catalog;
pub mod db;
pub mod error;
pub mod explain;
pub mod health;
pub mod tools;
pub mod workload;

/// MCP transport the server listens on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, EnumString, Display)]
#[strum(ascii_case_insensitive, serialize_all = "kebab-case")]
pub enum Transport {
    Stdio,
    Sse,
    StreamableHttp,
}

#[derive(Parser, Clone, Debug)]
#[command(version, about = "PostgreSQL DBA tool server speaking MCP")]
pub struct Config {
    /// Connection string, positional form.
    pub database_url: Option<String>,

    #[arg(long, env = "DATABASE_URI")]
    pub database_uri: Option<String>,

    #[arg(long, env = "ACCESS_MODE", default_value = "unrestricted")]
    pub access_mode: AccessMode,

    #[arg(long, env = "MCP_TRANSPORT", default_value = "stdio")]
    pub transport: Transport,

    #[arg(long, env = "SSE_HOST")]
    pub sse_host: Option<String>,

    #[arg(long, env = "STREAMABLE_HTTP_HOST")]
    pub streamable_http_host: Option<String>,

    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    #[clap(flatten)]
    pub pg: PgPoolParams,
}

#[derive(Debug, Clone, clap::Args)]
pub struct PgPoolParams {
    #[clap(long, env = "PG_MAX_CONNECTIONS", default_value_t = 10)]
    pub pg_max_connections: u8,

    #[clap(long, env = "PG_CONNECT_TIMEOUT_SECS", default_value_t = 10)]
    pub pg_connect_timeout_secs: u64,

    #[clap(long, env = "QUERY_TIMEOUT_SECS", default_value_t = 30)]
    pub query_timeout_secs: u64,
}

impl PgPoolParams {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }
}

impl Config {
    /// Resolves the effective connection string: positional argument wins
    /// over `--database-uri`/`DATABASE_URI`.
    pub fn connection_string(&self) -> error::Result<String> {
        self.database_url
            .clone()
            .or_else(|| self.database_uri.clone())
            .ok_or_else(|| {
                error::DbaError::Configuration(
                    "no database connection string given: pass it positionally or via --database-uri/DATABASE_URI"
                        .to_string(),
                )
            })
    }
}
