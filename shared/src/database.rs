//! PostgreSQL connection handling

use crate::{config::DatabaseConfig, error::AppError, Result};
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use tracing::{debug, info};

/// Owns the connection pool both services run on.
#[derive(Debug, Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Open the pool and fail fast on an unreachable server.
    ///
    /// sqlx pools connect lazily, which would defer a bad DSN to the first
    /// request; probing the server version here surfaces it at boot and
    /// leaves a useful line in the log.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .min_connections(config.min_connections)
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_seconds))
            .idle_timeout(Some(Duration::from_secs(config.idle_timeout_seconds)))
            .max_lifetime(Some(Duration::from_secs(config.max_lifetime_seconds)))
            .connect(&config.url)
            .await
            .map_err(|e| AppError::configuration(format!("cannot open database pool: {}", e)))?;

        let version: String = sqlx::query_scalar("SHOW server_version")
            .fetch_one(&pool)
            .await
            .map_err(|e| AppError::configuration(format!("database probe failed: {}", e)))?;

        debug!(%version, "postgres reachable");
        info!(
            min = config.min_connections,
            max = config.max_connections,
            "database pool ready"
        );

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
