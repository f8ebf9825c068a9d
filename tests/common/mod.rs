//! Shared utilities for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{routing::get, Router};
use rest_api_server::config::ServiceConfig;
use rest_api_server::health::{
    DependencyConnectError, DependencyConnector, DependencyProbe, ProbeError,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// In-memory dependency whose reachability the test controls.
#[derive(Default)]
pub struct MockDatabase {
    pub reachable: AtomicBool,
    pub checks: AtomicUsize,
    pub closes: AtomicUsize,
}

impl MockDatabase {
    pub fn up() -> Arc<Self> {
        let db = Arc::new(Self::default());
        db.reachable.store(true, Ordering::SeqCst);
        db
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DependencyProbe for MockDatabase {
    fn name(&self) -> &'static str {
        "database"
    }

    async fn check_reachable(&self, _timeout: Duration) -> Result<(), ProbeError> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ProbeError::Unreachable("connection closed".into()))
        }
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Connector handing out a shared `MockDatabase`, or refusing to connect.
pub struct MockConnector {
    pub db: Arc<MockDatabase>,
    pub refuse: bool,
    pub attempts: AtomicUsize,
}

impl MockConnector {
    pub fn new(db: Arc<MockDatabase>) -> Self {
        Self {
            db,
            refuse: false,
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn refusing() -> Self {
        Self {
            db: MockDatabase::up(),
            refuse: true,
            attempts: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl DependencyConnector for MockConnector {
    async fn connect(&self, url: &str) -> Result<Arc<dyn DependencyProbe>, DependencyConnectError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.refuse {
            return Err(DependencyConnectError {
                dependency: "database",
                message: format!("connection refused ({url})"),
            });
        }
        let probe: Arc<dyn DependencyProbe> = self.db.clone();
        Ok(probe)
    }
}

/// Config bound to an ephemeral loopback port.
pub fn test_config(drain: Duration) -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.bind_host = "127.0.0.1".into();
    config.port = 0;
    config.database_url = "postgres://test/db".into();
    config.timeouts.readiness_probe_ms = 500;
    config.timeouts.drain_ms = drain.as_millis() as u64;
    config
}

/// Collaborator routes used to exercise the pipeline end to end.
pub fn test_routes() -> Router {
    Router::new()
        .route("/slow/{millis}", get(slow))
        .route("/panic", get(panicking))
}

async fn slow(axum::extract::Path(millis): axum::extract::Path<u64>) -> &'static str {
    tokio::time::sleep(Duration::from_millis(millis)).await;
    "done"
}

async fn panicking() -> &'static str {
    panic!("handler defect")
}

/// Client that never reuses pooled connections between tests.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
