//! Request instrumentation pipeline.
//!
//! # Layer order (outermost first)
//! ```text
//! set x-request-id
//!     → propagate x-request-id to response
//!     → panic.rs  (fault containment → generic 500)
//!     → trace.rs  (timing + one `request` record)
//!     → handler deadline (408 when exceeded)
//!     → routes
//! ```
//!
//! Containment wraps timing, so a panicking handler is still timed and
//! logged on its way out. The deadline sits inside timing, so a request cut
//! off by it is logged with its 408.

pub mod panic;
pub mod trace;

use axum::{middleware, Router};
use std::time::Duration;
use tower_http::timeout::TimeoutLayer;

use crate::http::request::{propagate_request_id_layer, set_request_id_layer};

/// Apply the full pipeline to every route and the fallback of `router`.
pub fn instrument(router: Router, request_timeout: Duration) -> Router {
    // Router::layer: the last layer added is the outermost.
    router
        .layer(TimeoutLayer::new(request_timeout))
        .layer(middleware::from_fn(trace::record_request))
        .layer(panic::panic_containment_layer())
        .layer(propagate_request_id_layer())
        .layer(set_request_id_layer())
}
