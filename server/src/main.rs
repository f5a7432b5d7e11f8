use std::io;

use clap::Parser;
use rmcp::transport::stdio;
use rmcp::ServiceExt;
use server::advisor::Advisor;
use server::catalog::Catalog;
use server::db::driver::Driver;
use server::db::restricted::RestrictedDriver;
use server::error::DbaError;
use server::explain::ExplainEngine;
use server::health::Orchestrator;
use server::tools::DbaServer;
use server::workload::Collector;
use server::{db, Config, Transport};
use tokio::signal::unix::SignalKind;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    let config = Config::parse();
    init_tracing();

    match run(config).await {
        Ok(()) => {}
        Err(error) => {
            tracing::error!(?error, "server error");
            let code = match &error {
                DbaError::Configuration(_) => 2,
                _ => 1,
            };
            std::process::exit(code);
        }
    }
}

/// Logging must never write to stdout: the `stdio` transport uses stdout
/// as its JSON-RPC framing channel, and any stray log line there would
/// corrupt the protocol stream from the client's point of view.
fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();
}

async fn run(config: Config) -> server::error::Result<()> {
    let connection_string = config.connection_string()?;
    let pool = db::get_pool(&connection_string, &config.pg).await?;
    db::run_health_check(&pool).await?;

    let server_info = db::probe_server_info(&pool).await?;
    tracing::info!(
        server_version_num = server_info.server_version_num,
        access_mode = %config.access_mode,
        "connected to postgres"
    );

    let driver = Driver::new(pool.clone(), config.pg.query_timeout());
    let restricted = RestrictedDriver::new(driver.clone(), config.access_mode);
    let catalog = Catalog::new(driver.clone());
    let explain = ExplainEngine::new(driver.clone(), server_info.server_version_num);
    let advisor = Advisor::new(driver.clone(), server_info.server_version_num);
    let workload = Collector::new(driver.clone(), server_info.server_version_num);
    let health = Orchestrator::new(driver);

    let server = DbaServer::new(
        catalog,
        restricted,
        explain,
        advisor,
        workload,
        health,
        config.access_mode,
    );

    match config.transport {
        Transport::Stdio => serve_stdio(server).await,
        Transport::Sse => serve_sse(server, &config).await,
        Transport::StreamableHttp => serve_streamable_http(server, &config).await,
    }
}

async fn serve_stdio(server: DbaServer) -> server::error::Result<()> {
    let service = server
        .serve(stdio())
        .await
        .map_err(|e| DbaError::internal(format!("failed to start stdio transport: {e}")))?;
    tokio::select! {
        result = service.waiting() => {
            result.map_err(|e| DbaError::internal(format!("stdio transport error: {e}")))?;
        }
        _ = shutdown_signal() => {}
    }
    Ok(())
}

async fn serve_sse(server: DbaServer, config: &Config) -> server::error::Result<()> {
    use rmcp::transport::sse_server::SseServer;

    let host = config.sse_host.clone().unwrap_or_else(|| "127.0.0.1".to_string());
    let bind_addr = format!("{host}:{}", config.port)
        .parse()
        .map_err(|e| DbaError::Configuration(format!("invalid sse bind address: {e}")))?;

    let ct = SseServer::serve(bind_addr)
        .await
        .map_err(|e| DbaError::internal(format!("failed to start sse transport: {e}")))?
        .with_service(move || server.clone());

    shutdown_signal().await;
    ct.cancel();
    Ok(())
}

async fn serve_streamable_http(server: DbaServer, config: &Config) -> server::error::Result<()> {
    use rmcp::transport::streamable_http_server::{
        session::local::LocalSessionManager, StreamableHttpService,
    };

    let host = config
        .streamable_http_host
        .clone()
        .unwrap_or_else(|| "127.0.0.1".to_string());
    let bind_addr = format!("{host}:{}", config.port);

    let service = StreamableHttpService::new(
        move || Ok(server.clone()),
        LocalSessionManager::default().into(),
        Default::default(),
    );
    let router = axum::Router::new().nest_service("/mcp", service);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| DbaError::internal(format!("failed to bind {bind_addr}: {e}")))?;

    tracing::info!(%bind_addr, "listening for streamable-http MCP clients");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| DbaError::internal(format!("streamable-http transport error: {e}")))?;
    Ok(())
}

async fn shutdown_signal() {
    async fn terminate() -> io::Result<()> {
        tokio::signal::unix::signal(SignalKind::terminate())?
            .recv()
            .await;
        Ok(())
    }
    tokio::select! {
        _ = terminate() => {},
        _ = tokio::signal::ctrl_c() => {},
    }
    tracing::debug!("signal received, starting graceful shutdown");
}
