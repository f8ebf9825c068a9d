//! PostgreSQL adapter for the dependency probe.
//!
//! Backed by a `deadpool-postgres` pool: each check borrows a connection, and
//! connections the server dropped are replaced on the next borrow, so a
//! database restart only fails the checks made while it is down.

use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use std::sync::Arc;
use std::time::Duration;
use tokio_postgres::NoTls;

use crate::health::probe::{DependencyConnectError, DependencyConnector, DependencyProbe, ProbeError};

/// Upper bound on pooled connections; readiness checks are the only users.
pub const POOL_SIZE: usize = 4;

const ROUND_TRIP: &str = "SELECT 1";

/// Builds a connection pool for the configured URL and verifies one session.
#[derive(Debug, Default, Clone, Copy)]
pub struct PostgresConnector;

#[async_trait]
impl DependencyConnector for PostgresConnector {
    async fn connect(&self, url: &str) -> Result<Arc<dyn DependencyProbe>, DependencyConnectError> {
        let pg_config: tokio_postgres::Config = url.parse().map_err(connect_error)?;
        let manager = Manager::from_config(
            pg_config,
            NoTls,
            ManagerConfig {
                recycling_method: RecyclingMethod::Fast,
            },
        );
        let pool = Pool::builder(manager)
            .max_size(POOL_SIZE)
            .build()
            .map_err(connect_error)?;

        // Fail fast at boot: an unreachable database never reaches SERVING.
        let client = pool.get().await.map_err(connect_error)?;
        client.simple_query(ROUND_TRIP).await.map_err(connect_error)?;
        drop(client);

        let probe: Arc<dyn DependencyProbe> = Arc::new(PostgresProbe { pool });
        Ok(probe)
    }
}

fn connect_error(e: impl std::fmt::Display) -> DependencyConnectError {
    DependencyConnectError {
        dependency: "database",
        message: e.to_string(),
    }
}

/// Reachability check backed by a connection pool.
pub struct PostgresProbe {
    pool: Pool,
}

impl PostgresProbe {
    async fn round_trip(&self) -> Result<(), ProbeError> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| ProbeError::Unreachable(e.to_string()))?;
        client
            .simple_query(ROUND_TRIP)
            .await
            .map(|_| ())
            .map_err(|e| ProbeError::Unreachable(e.to_string()))
    }
}

#[async_trait]
impl DependencyProbe for PostgresProbe {
    fn name(&self) -> &'static str {
        "database"
    }

    async fn check_reachable(&self, timeout: Duration) -> Result<(), ProbeError> {
        match tokio::time::timeout(timeout, self.round_trip()).await {
            Ok(result) => result,
            Err(_) => Err(ProbeError::Timeout(timeout)),
        }
    }

    async fn close(&self) {
        if !self.pool.is_closed() {
            self.pool.close();
            tracing::debug!("Database pool closed");
        }
    }
}
