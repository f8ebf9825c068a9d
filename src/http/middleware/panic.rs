//! Panic containment.
//!
//! The only fault boundary in the service: a panic raised while producing a
//! response becomes a generic 500 for that request alone. The connection task
//! and sibling requests keep running.

use axum::{
    body::Body,
    http::{header, Response, StatusCode},
};
use std::any::Any;
use tower_http::catch_panic::CatchPanicLayer;

/// Body sent for every contained fault. Carries no internal detail.
pub const FAULT_BODY: &str = r#"{"error":"internal server error"}"#;

pub type FaultHandler = fn(Box<dyn Any + Send + 'static>) -> Response<Body>;

pub fn panic_containment_layer() -> CatchPanicLayer<FaultHandler> {
    CatchPanicLayer::custom(fault_response as FaultHandler)
}

fn fault_response(payload: Box<dyn Any + Send + 'static>) -> Response<Body> {
    tracing::error!(panic = %panic_message(payload.as_ref()), "Handler fault contained");

    let mut response = Response::new(Body::from(FAULT_BODY));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/json"),
    );
    response
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic payload"
    }
}
