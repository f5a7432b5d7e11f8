#![allow(dead_code)]

use anyhow::Context;
use testcontainers::{ContainerAsync, GenericImage};
use uuid::Uuid;

use super::{create_postgres_container, create_postgres_pool, generate_test_db_name, PgPool};

/// The Docker image to use for the PostgreSQL container.
/// Can be overridden by the `TEST_DB_CONTAINER_IMAGE` environment variable.
const CONTAINER_IMAGE: &str = match option_env!("TEST_DB_CONTAINER_IMAGE") {
    Some(image) => image,
    None => "postgres:17-alpine",
};

/// An isolated database instance for a single test.
pub struct TestDatabase {
    pub pool: PgPool,
    pub db_name: String,

    _container: ContainerAsync<GenericImage>,

    pub host: String,
    pub port: u16,
}

impl Drop for TestDatabase {
    fn drop(&mut self) {
        self.pool.close();
    }
}

impl TestDatabase {
    /// Creates a new, randomly named test database with `pg_stat_statements`
    /// enabled. `hypopg` is enabled too if the image has it installed.
    pub async fn new() -> anyhow::Result<Self> {
        let test_id = Uuid::new_v4().simple().to_string();
        let container_name = format!("test_db_{test_id}");

        println!("Starting PostgreSQL test container with ID: {test_id}");

        let container = start_postgres_container(&container_name).await;
        let host = container
            .get_host()
            .await
            .context("Container should have accessible host address")?
            .to_string();
        let port = container
            .get_host_port_ipv4(5432)
            .await
            .context("Container should expose PostgreSQL port 5432")?;

        let db_name = generate_test_db_name("test");

        let admin_pool = create_postgres_pool(&host, port, "postgres", "postgres", None).await?;
        let client = admin_pool.get().await?;
        client
            .execute(
                &format!("CREATE DATABASE \"{db_name}\" WITH ENCODING 'UTF8'"),
                &[],
            )
            .await?;

        let pool = create_postgres_pool(&host, port, &db_name, "postgres", None).await?;
        let client = pool.get().await?;
        client
            .execute("CREATE EXTENSION IF NOT EXISTS pg_stat_statements", &[])
            .await
            .context("pg_stat_statements should be available in the test image")?;
        let _ = client.execute("CREATE EXTENSION IF NOT EXISTS hypopg", &[]).await;

        Ok(Self {
            pool,
            db_name,
            _container: container,
            host,
            port,
        })
    }

    /// True when `hypopg` could be installed on this instance; tests that
    /// depend on hypothetical indexes should skip (not fail) otherwise.
    pub async fn hypopg_available(&self) -> anyhow::Result<bool> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                "SELECT EXISTS (SELECT 1 FROM pg_extension WHERE extname = 'hypopg')",
                &[],
            )
            .await?;
        Ok(row.get(0))
    }
}

async fn start_postgres_container(container_name: &str) -> ContainerAsync<GenericImage> {
    create_postgres_container(
        CONTAINER_IMAGE,
        container_name,
        "postgres",
        None,
        "postgres",
    )
    .await
    .expect("PostgreSQL container should start successfully")
}
