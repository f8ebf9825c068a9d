//! Startup orchestration and bounded shutdown.
//!
//! # Responsibilities
//! - Connect the dependency, bind the listener, spawn the server task
//! - Subscribe to termination signals once serving
//! - Drain on the first shutdown request, bounded by the drain timeout
//! - Release the dependency exactly once, in every stop path
//!
//! # Design Decisions
//! - Fail fast: any boot error is fatal, there is no degraded start
//! - Listener starts last (traffic only when the dependency is connected)
//! - A repeated shutdown request while draining forces an immediate stop

use axum::Router;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, watch};
use tokio::task::{JoinError, JoinHandle};

use crate::config::{ConfigError, ServiceConfig};
use crate::health::handlers::HealthState;
use crate::health::probe::{DependencyConnectError, DependencyConnector, DependencyProbe};
use crate::http::HttpServer;
use crate::lifecycle::phase::{LifecyclePhase, PhaseCell, PhaseReader};
use crate::lifecycle::shutdown::{requested, Shutdown};
use crate::lifecycle::signals;

/// Drain could not complete cleanly.
#[derive(Debug, Error)]
pub enum ShutdownError {
    #[error("drain did not finish within {0:?}")]
    DrainTimeout(Duration),

    #[error("stop forced by repeated shutdown request")]
    Forced,

    #[error("server error while draining: {0}")]
    Drain(#[source] io::Error),

    #[error("server task failed: {0}")]
    Task(#[source] JoinError),
}

/// The listener task ended while the service was SERVING.
#[derive(Debug, Error)]
pub enum ServeError {
    #[error("listener stopped unexpectedly")]
    Stopped,

    #[error("listener failed: {0}")]
    Listener(#[source] io::Error),

    #[error("server task failed: {0}")]
    Task(#[source] JoinError),
}

/// Errors that end the process with a non-zero exit code.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("failed to load config: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    DependencyConnect(#[from] DependencyConnectError),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to install signal handlers: {0}")]
    Signals(#[source] io::Error),

    #[error("server error: {0}")]
    Serve(#[from] ServeError),

    #[error("server forced to shutdown: {0}")]
    Shutdown(#[from] ShutdownError),
}

/// Owns the process lifecycle from boot to exit.
pub struct Orchestrator {
    config: ServiceConfig,
    routes: Router,
    phase: PhaseCell,
    shutdown: Shutdown,
    requests: broadcast::Receiver<()>,
}

impl Orchestrator {
    pub fn new(config: ServiceConfig) -> Self {
        let shutdown = Shutdown::new();
        let requests = shutdown.subscribe();
        Self {
            config,
            routes: Router::new(),
            phase: PhaseCell::new(),
            shutdown,
            requests,
        }
    }

    /// Serve `routes` next to the health endpoints.
    pub fn with_routes(mut self, routes: Router) -> Self {
        self.routes = routes;
        self
    }

    /// Handle that requests shutdown, same effect as a termination signal.
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    pub fn phase(&self) -> PhaseReader {
        self.phase.reader()
    }

    /// STARTING: connect the dependency, bind, and start serving.
    pub async fn start(self, connector: &dyn DependencyConnector) -> Result<Running, LifecycleError> {
        let Orchestrator {
            config,
            routes,
            phase,
            shutdown,
            requests,
        } = self;

        tracing::info!(port = config.port, debug = config.debug, "starting server");

        let probe = match connector.connect(&config.database_url).await {
            Ok(probe) => probe,
            Err(e) => {
                phase.stop();
                return Err(e.into());
            }
        };
        tracing::info!("connected to database");

        let address = config.listen_address();
        let listener = match TcpListener::bind(&address).await {
            Ok(listener) => listener,
            Err(source) => {
                probe.close().await;
                phase.stop();
                return Err(LifecycleError::Bind { address, source });
            }
        };
        let local_addr = match listener.local_addr() {
            Ok(addr) => addr,
            Err(source) => {
                probe.close().await;
                phase.stop();
                return Err(LifecycleError::Bind { address, source });
            }
        };

        let health = HealthState {
            probe: Arc::clone(&probe),
            readiness_timeout: config.timeouts.readiness_probe(),
        };
        let server = HttpServer::new(health, routes, &config.timeouts);
        let (stop, stop_rx) = watch::channel(false);
        let server_task = tokio::spawn(server.run(listener, stop_rx));

        if let Err(e) = phase.transition(LifecyclePhase::Starting, LifecyclePhase::Serving) {
            tracing::error!(error = %e, "Unexpected lifecycle state at startup");
        }
        tracing::info!(addr = %local_addr, "server listening");

        Ok(Running {
            local_addr,
            drain_timeout: config.timeouts.drain(),
            probe,
            phase,
            shutdown,
            requests,
            stop,
            server_task,
        })
    }

    /// Full lifecycle: start, subscribe to OS signals, wait, drain, stop.
    pub async fn run(self, connector: &dyn DependencyConnector) -> Result<(), LifecycleError> {
        let running = self.start(connector).await?;

        let signal_task = match signals::forward_signals(running.shutdown_handle()) {
            Ok(task) => task,
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handlers, stopping");
                running.stop_now().await;
                return Err(LifecycleError::Signals(e));
            }
        };

        let result = running.wait().await;
        signal_task.abort();
        result
    }
}

/// A service in the SERVING phase.
pub struct Running {
    local_addr: SocketAddr,
    drain_timeout: Duration,
    probe: Arc<dyn DependencyProbe>,
    phase: PhaseCell,
    shutdown: Shutdown,
    requests: broadcast::Receiver<()>,
    stop: watch::Sender<bool>,
    server_task: JoinHandle<io::Result<()>>,
}

enum DrainEnd {
    Finished(Result<io::Result<()>, JoinError>),
    TimedOut,
    Forced,
}

impl Running {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn phase(&self) -> PhaseReader {
        self.phase.reader()
    }

    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Request shutdown and drain. The outcome is logged, not returned, for
    /// callers that already have an error to report.
    pub(crate) async fn stop_now(self) {
        self.shutdown.trigger();
        if let Err(e) = self.wait().await {
            tracing::error!(error = %e, "Shutdown did not complete cleanly");
        }
    }

    /// Serve until shutdown is requested, then drain and stop.
    pub async fn wait(self) -> Result<(), LifecycleError> {
        let Running {
            drain_timeout,
            probe,
            phase,
            mut requests,
            stop,
            mut server_task,
            ..
        } = self;

        // SERVING
        let served = tokio::select! {
            _ = requested(&mut requests) => None,
            result = &mut server_task => Some(result),
        };
        if let Some(result) = served {
            let error = match result {
                Ok(Ok(())) => ServeError::Stopped,
                Ok(Err(e)) => ServeError::Listener(e),
                Err(e) => ServeError::Task(e),
            };
            tracing::error!(error = %error, "server error");
            phase.stop();
            probe.close().await;
            return Err(error.into());
        }

        // DRAINING
        if let Err(e) = phase.transition(LifecyclePhase::Serving, LifecyclePhase::Draining) {
            tracing::warn!(error = %e, "Unexpected lifecycle state at shutdown");
        }
        tracing::info!("shutting down server...");
        let _ = stop.send(true);

        let end = tokio::select! {
            result = tokio::time::timeout(drain_timeout, &mut server_task) => match result {
                Ok(finished) => DrainEnd::Finished(finished),
                Err(_) => DrainEnd::TimedOut,
            },
            _ = requested(&mut requests) => DrainEnd::Forced,
        };

        let outcome = match end {
            DrainEnd::Finished(Ok(Ok(()))) => Ok(()),
            DrainEnd::Finished(Ok(Err(e))) => Err(ShutdownError::Drain(e)),
            DrainEnd::Finished(Err(e)) => Err(ShutdownError::Task(e)),
            DrainEnd::TimedOut => {
                tracing::warn!(timeout = ?drain_timeout, "Drain timeout elapsed, cancelling in-flight requests");
                Err(ShutdownError::DrainTimeout(drain_timeout))
            }
            DrainEnd::Forced => {
                tracing::warn!("Repeated shutdown request, cancelling in-flight requests");
                Err(ShutdownError::Forced)
            }
        };
        if outcome.is_err() && !server_task.is_finished() {
            server_task.abort();
            let _ = server_task.await;
        }

        // STOPPED
        if let Err(e) = phase.transition(LifecyclePhase::Draining, LifecyclePhase::Stopped) {
            tracing::warn!(error = %e, "Unexpected lifecycle state at stop");
            phase.stop();
        }
        probe.close().await;

        match outcome {
            Ok(()) => {
                tracing::info!("server stopped");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "server forced to shutdown");
                Err(e.into())
            }
        }
    }
}
