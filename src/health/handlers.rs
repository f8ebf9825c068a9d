//! Liveness and readiness endpoints.
//!
//! `/health` answers whenever the process can run a handler at all and never
//! touches the dependency. `/ready` performs one fresh dependency check per
//! request. The two are kept on separate code paths.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::health::probe::{check_ready, DependencyProbe};

/// State shared by the health handlers.
#[derive(Clone)]
pub struct HealthState {
    pub probe: Arc<dyn DependencyProbe>,
    pub readiness_timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Unhealthy,
}

#[derive(Debug, Serialize)]
pub struct LivenessResponse {
    pub status: HealthStatus,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub status: HealthStatus,
    pub timestamp: String,
    pub checks: BTreeMap<String, String>,
}

/// GET /health
pub async fn liveness() -> Json<LivenessResponse> {
    Json(LivenessResponse {
        status: HealthStatus::Ok,
        timestamp: now_rfc3339(),
    })
}

/// GET /ready
pub async fn readiness(State(state): State<HealthState>) -> impl IntoResponse {
    let report = check_ready(state.probe.as_ref(), state.readiness_timeout).await;

    let mut checks = BTreeMap::new();
    let (code, status) = if report.healthy {
        checks.insert(state.probe.name().to_string(), report.detail);
        (StatusCode::OK, HealthStatus::Ok)
    } else {
        checks.insert(
            state.probe.name().to_string(),
            format!("unhealthy: {}", report.detail),
        );
        (StatusCode::SERVICE_UNAVAILABLE, HealthStatus::Unhealthy)
    };

    (
        code,
        Json(ReadinessResponse {
            status,
            timestamp: now_rfc3339(),
            checks,
        }),
    )
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}
