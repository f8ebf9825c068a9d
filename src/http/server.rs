//! HTTP server setup.
//!
//! # Responsibilities
//! - Assemble the router: health endpoints, collaborator routes, fallback
//! - Wrap every route in the instrumentation pipeline
//! - Accept connections and serve HTTP/1.1 and HTTP/2 via hyper-util
//! - Bound slow request heads and close idle keep-alive connections
//! - Stop accepting on request and let open connections finish
//!
//! Connection tasks live in a `JoinSet` owned by `run`, so dropping the
//! `run` future (e.g. aborting its task) cancels every in-flight request.

use axum::{
    extract::ConnectInfo,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use hyper::body::Incoming;
use hyper_util::{
    rt::{TokioExecutor, TokioIo, TokioTimer},
    server::conn::auto::Builder,
};
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tower::ServiceExt;

use crate::config::TimeoutConfig;
use crate::health::handlers::{liveness, readiness, HealthState};
use crate::http::middleware::instrument;

/// First pause after a resource-exhaustion accept error.
const ACCEPT_BACKOFF_MIN: Duration = Duration::from_millis(5);
/// Longest pause between accept retries.
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// HTTP server for the service.
pub struct HttpServer {
    router: Router,
    limits: ConnectionLimits,
}

/// Per-connection deadlines enforced by the accept loop.
#[derive(Debug, Clone, Copy)]
struct ConnectionLimits {
    header_read: Duration,
    idle: Duration,
}

impl HttpServer {
    /// Create a server exposing the health endpoints plus `routes`.
    pub fn new(health: HealthState, routes: Router, timeouts: &TimeoutConfig) -> Self {
        let health_routes = Router::new()
            .route("/health", get(liveness))
            .route("/ready", get(readiness))
            .with_state(health);

        Self {
            router: instrument(
                health_routes.merge(routes).fallback(not_found),
                timeouts.request(),
            ),
            limits: ConnectionLimits {
                header_read: timeouts.header_read(),
                idle: timeouts.idle(),
            },
        }
    }

    /// The fully instrumented router.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Accept connections on `listener` until `stop` flips to `true` (or its
    /// sender is dropped), then close the listener and wait for open
    /// connections to finish their in-flight requests.
    ///
    /// Running out of descriptors or buffers pauses accepting with a capped
    /// backoff; only an error that leaves the listener unusable is returned.
    pub async fn run(self, listener: TcpListener, mut stop: watch::Receiver<bool>) -> io::Result<()> {
        let addr = listener.local_addr()?;
        tracing::debug!(address = %addr, "HTTP server accepting");

        let mut connections = JoinSet::new();
        let mut backoff: Option<Duration> = None;

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            backoff = None;
                            let router = self.router.clone();
                            let stop = stop.clone();
                            connections.spawn(serve_connection(router, stream, peer, stop, self.limits));
                        }
                        Err(e) => match classify_accept_error(&e) {
                            AcceptError::Connection => {
                                tracing::debug!(error = %e, "Accept error on single connection");
                            }
                            AcceptError::Exhausted => {
                                let delay = next_backoff(backoff);
                                backoff = Some(delay);
                                tracing::warn!(
                                    error = %e,
                                    retry_in_ms = delay.as_millis() as u64,
                                    "Accept failed, backing off"
                                );
                                tokio::select! {
                                    _ = tokio::time::sleep(delay) => {}
                                    _ = stop.changed() => break,
                                }
                            }
                            AcceptError::Fatal => {
                                tracing::error!(error = %e, "Listener failed");
                                return Err(e);
                            }
                        },
                    }
                }
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
                _ = stop.changed() => break,
            }
        }

        drop(listener);
        tracing::debug!(open_connections = connections.len(), "Listener closed, draining connections");

        while connections.join_next().await.is_some() {}

        tracing::debug!("HTTP server drained");
        Ok(())
    }
}

/// Request activity on one connection, used to detect idleness.
struct ConnectionActivity {
    opened: Instant,
    in_flight: AtomicUsize,
    last_active_ms: AtomicU64,
}

impl ConnectionActivity {
    fn new() -> Self {
        Self {
            opened: Instant::now(),
            in_flight: AtomicUsize::new(0),
            last_active_ms: AtomicU64::new(0),
        }
    }

    fn touch(&self) {
        self.last_active_ms
            .store(self.opened.elapsed().as_millis() as u64, Ordering::Relaxed);
    }

    fn begin(self: &Arc<Self>) -> InFlight {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        self.touch();
        InFlight(Arc::clone(self))
    }

    /// How long the connection has had no request in flight.
    fn idle_for(&self) -> Duration {
        if self.in_flight.load(Ordering::SeqCst) > 0 {
            return Duration::ZERO;
        }
        let last = Duration::from_millis(self.last_active_ms.load(Ordering::Relaxed));
        self.opened.elapsed().saturating_sub(last)
    }
}

struct InFlight(Arc<ConnectionActivity>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.touch();
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn serve_connection(
    router: Router,
    stream: TcpStream,
    peer: SocketAddr,
    mut stop: watch::Receiver<bool>,
    limits: ConnectionLimits,
) {
    let activity = Arc::new(ConnectionActivity::new());
    let service_activity = Arc::clone(&activity);
    let service = hyper::service::service_fn(move |mut request: hyper::Request<Incoming>| {
        request.extensions_mut().insert(ConnectInfo(peer));
        let in_flight = service_activity.begin();
        let router = router.clone();
        async move {
            let _in_flight = in_flight;
            router.oneshot(request).await
        }
    });

    let mut builder = Builder::new(TokioExecutor::new());
    builder
        .http1()
        .timer(TokioTimer::new())
        .header_read_timeout(limits.header_read);
    builder.http2().timer(TokioTimer::new());

    let conn = builder.serve_connection(TokioIo::new(stream), service);
    tokio::pin!(conn);

    let mut closing = *stop.borrow();
    if closing {
        conn.as_mut().graceful_shutdown();
    }

    let result = loop {
        let idle_left = limits.idle.saturating_sub(activity.idle_for());
        tokio::select! {
            result = conn.as_mut() => break result,
            _ = stop.changed(), if !closing => {
                // Finish the in-flight request, refuse further ones on this connection.
                closing = true;
                conn.as_mut().graceful_shutdown();
            }
            _ = tokio::time::sleep(idle_left), if !closing => {
                if activity.idle_for() >= limits.idle {
                    tracing::debug!(peer = %peer, "Closing idle connection");
                    closing = true;
                    conn.as_mut().graceful_shutdown();
                }
            }
        }
    };

    if let Err(e) = result {
        tracing::debug!(peer = %peer, error = %e, "Connection closed with error");
    }
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "error": "not found" })),
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AcceptError {
    /// The peer went away before the connection was accepted.
    Connection,
    /// Out of descriptors or buffers; retry after a pause.
    Exhausted,
    /// The listener itself is unusable.
    Fatal,
}

fn classify_accept_error(e: &io::Error) -> AcceptError {
    if matches!(
        e.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
    ) {
        AcceptError::Connection
    } else if is_resource_exhaustion(e) {
        AcceptError::Exhausted
    } else {
        AcceptError::Fatal
    }
}

#[cfg(unix)]
fn is_resource_exhaustion(e: &io::Error) -> bool {
    match e.raw_os_error() {
        Some(code) => matches!(code, libc::EMFILE | libc::ENFILE | libc::ENOBUFS | libc::ENOMEM),
        None => e.kind() == io::ErrorKind::OutOfMemory,
    }
}

#[cfg(not(unix))]
fn is_resource_exhaustion(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::OutOfMemory
}

fn next_backoff(previous: Option<Duration>) -> Duration {
    match previous {
        None => ACCEPT_BACKOFF_MIN,
        Some(delay) => (delay * 2).min(ACCEPT_BACKOFF_MAX),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::probe::testing::FakeProbe;
    use axum::{body::Body, http::Request};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn health() -> HealthState {
        HealthState {
            probe: Arc::new(FakeProbe::default()),
            readiness_timeout: Duration::from_millis(100),
        }
    }

    fn server(routes: Router) -> HttpServer {
        HttpServer::new(health(), routes, &TimeoutConfig::default())
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let router = server(Router::new()).router();
        let response = router
            .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn collaborator_routes_are_merged() {
        let routes = Router::new().route("/items", get(|| async { "[]" }));
        let router = server(routes).router();
        let response = router
            .oneshot(Request::builder().uri("/items").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn stop_closes_listener_and_returns() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop_tx, stop_rx) = watch::channel(false);

        let task = tokio::spawn(server(Router::new()).run(listener, stop_rx));
        tokio::time::sleep(Duration::from_millis(50)).await;

        stop_tx.send(true).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn idle_keep_alive_connection_is_closed() {
        let timeouts = TimeoutConfig {
            idle_ms: 100,
            ..TimeoutConfig::default()
        };
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (_stop_tx, stop_rx) = watch::channel(false);
        let app = HttpServer::new(health(), Router::new(), &timeouts);
        tokio::spawn(app.run(listener, stop_rx));

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /health HTTP/1.1\r\nhost: test\r\n\r\n")
            .await
            .unwrap();

        // Read until the server closes the socket; a keep-alive connection
        // only ends here because it sat idle.
        let mut received = Vec::new();
        let closed = tokio::time::timeout(Duration::from_secs(2), stream.read_to_end(&mut received))
            .await
            .expect("idle connection should be closed by the server");
        assert!(closed.is_ok());
        assert!(String::from_utf8_lossy(&received).starts_with("HTTP/1.1 200"));
    }

    #[test]
    fn classifies_per_connection_errors() {
        for kind in [io::ErrorKind::ConnectionReset, io::ErrorKind::ConnectionAborted] {
            assert_eq!(classify_accept_error(&io::Error::from(kind)), AcceptError::Connection);
        }
        assert_eq!(
            classify_accept_error(&io::Error::from(io::ErrorKind::PermissionDenied)),
            AcceptError::Fatal
        );
    }

    #[cfg(unix)]
    #[test]
    fn descriptor_exhaustion_is_retried() {
        for code in [libc::EMFILE, libc::ENFILE, libc::ENOBUFS, libc::ENOMEM] {
            assert_eq!(
                classify_accept_error(&io::Error::from_raw_os_error(code)),
                AcceptError::Exhausted
            );
        }
        assert_eq!(
            classify_accept_error(&io::Error::from_raw_os_error(libc::EBADF)),
            AcceptError::Fatal
        );
    }

    #[test]
    fn backoff_doubles_up_to_one_second() {
        let mut delay = next_backoff(None);
        assert_eq!(delay, Duration::from_millis(5));
        delay = next_backoff(Some(delay));
        assert_eq!(delay, Duration::from_millis(10));
        for _ in 0..20 {
            delay = next_backoff(Some(delay));
        }
        assert_eq!(delay, Duration::from_secs(1));
    }
}
