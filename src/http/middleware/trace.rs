//! Per-request timing and metadata capture.
//!
//! A `RequestTrace` is opened when the request enters and emitted exactly
//! once as a structured `request` record. If the handler panics, the trace
//! is emitted while the panic unwinds through this stage, before the
//! containment layer above turns it into a 500.

use axum::{
    extract::{ConnectInfo, Request},
    http::{Method, StatusCode},
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use crate::http::request::RequestIdExt;
use crate::observability::metrics;

/// Status recorded for a request whose handler panicked.
const FAULT_STATUS: u16 = 500;
/// Status recorded for a request dropped before completion (client gone or
/// drain deadline reached).
const CANCELLED_STATUS: u16 = 499;

/// Ephemeral record of one request.
#[derive(Debug)]
pub struct RequestTrace {
    method: Method,
    path: String,
    query: String,
    client_ip: String,
    request_id: String,
    started: Instant,
    emitted: bool,
}

impl RequestTrace {
    pub fn begin<B>(request: &Request<B>) -> Self {
        Self {
            method: request.method().clone(),
            path: request.uri().path().to_string(),
            query: request.uri().query().unwrap_or_default().to_string(),
            client_ip: client_ip(request),
            request_id: request.request_id().unwrap_or("unknown").to_string(),
            started: Instant::now(),
            emitted: false,
        }
    }

    pub fn finish(mut self, status: StatusCode) {
        self.emit(status.as_u16(), None);
    }

    fn emit(&mut self, status: u16, fault: Option<&'static str>) {
        if self.emitted {
            return;
        }
        self.emitted = true;

        let latency = self.started.elapsed();
        tracing::info!(
            method = %self.method,
            path = %self.path,
            query = %self.query,
            status,
            latency_ms = latency_ms(latency),
            client_ip = %self.client_ip,
            request_id = %self.request_id,
            fault,
            "request"
        );
        metrics::record_request(self.method.as_str(), status, latency);
    }
}

impl Drop for RequestTrace {
    fn drop(&mut self) {
        if self.emitted {
            return;
        }
        if std::thread::panicking() {
            self.emit(FAULT_STATUS, Some("panic"));
        } else {
            self.emit(CANCELLED_STATUS, Some("cancelled"));
        }
    }
}

/// Middleware entry point.
pub async fn record_request(request: Request, next: Next) -> Response {
    let trace = RequestTrace::begin(&request);
    let response = next.run(request).await;
    trace.finish(response.status());
    response
}

fn latency_ms(latency: Duration) -> f64 {
    latency.as_secs_f64() * 1000.0
}

/// Caller address: first `X-Forwarded-For` hop, then `X-Real-IP`, then the
/// peer address of the connection.
fn client_ip<B>(request: &Request<B>) -> String {
    let headers = request.headers();
    if let Some(forwarded) = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return forwarded.to_string();
    }
    if let Some(real_ip) = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return real_ip.to_string();
    }
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
