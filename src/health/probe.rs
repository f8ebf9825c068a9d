//! Dependency reachability probing.
//!
//! # Responsibilities
//! - Define the capability the core needs from a dependency client
//! - Bound every check by a caller-supplied timeout
//! - Turn the outcome into a report for the readiness endpoint
//!
//! # Design Decisions
//! - One round-trip per check, never retried
//! - A check never mutates dependency state
//! - Timeouts are enforced here too, not only by the adapter

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time;

/// Failure of a single reachability check.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Unreachable(String),
}

/// Failure to establish the dependency connection at boot.
#[derive(Debug, Error)]
#[error("failed to connect to {dependency}: {message}")]
pub struct DependencyConnectError {
    pub dependency: &'static str,
    pub message: String,
}

/// Bounded-time reachability check against an external service.
///
/// Implementations must be safe for concurrent use; the handle is shared by
/// every in-flight readiness request.
#[async_trait]
pub trait DependencyProbe: Send + Sync {
    /// Name used as the key in readiness check results.
    fn name(&self) -> &'static str;

    /// Perform one trivial round-trip within `timeout`.
    async fn check_reachable(&self, timeout: Duration) -> Result<(), ProbeError>;

    /// Release the underlying connection. Called once, by the orchestrator.
    async fn close(&self);
}

/// Builds a probe from the configured connection URL during startup.
#[async_trait]
pub trait DependencyConnector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Arc<dyn DependencyProbe>, DependencyConnectError>;
}

/// Outcome of one readiness check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    pub healthy: bool,
    pub detail: String,
}

/// Run exactly one check against `probe`, bounded by `timeout`.
pub async fn check_ready(probe: &dyn DependencyProbe, timeout: Duration) -> ProbeReport {
    let result = match time::timeout(timeout, probe.check_reachable(timeout)).await {
        Ok(result) => result,
        Err(_) => Err(ProbeError::Timeout(timeout)),
    };

    match result {
        Ok(()) => ProbeReport {
            healthy: true,
            detail: "healthy".to_string(),
        },
        Err(e) => {
            tracing::warn!(dependency = probe.name(), error = %e, "Readiness check failed");
            ProbeReport {
                healthy: false,
                detail: e.to_string(),
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// In-memory probe whose reachability is switched by the test.
    #[derive(Default)]
    pub struct FakeProbe {
        pub down: AtomicBool,
        pub delay: Option<Duration>,
        pub checks: AtomicUsize,
        pub closed: AtomicBool,
    }

    #[async_trait]
    impl DependencyProbe for FakeProbe {
        fn name(&self) -> &'static str {
            "database"
        }

        async fn check_reachable(&self, _timeout: Duration) -> Result<(), ProbeError> {
            self.checks.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.down.load(Ordering::SeqCst) {
                return Err(ProbeError::Unreachable("connection refused".into()));
            }
            Ok(())
        }

        async fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    /// Connector that always hands out the same fake probe.
    pub struct FakeConnector(pub Arc<FakeProbe>);

    #[async_trait]
    impl DependencyConnector for FakeConnector {
        async fn connect(&self, _url: &str) -> Result<Arc<dyn DependencyProbe>, DependencyConnectError> {
            let probe: Arc<dyn DependencyProbe> = self.0.clone();
            Ok(probe)
        }
    }
}
