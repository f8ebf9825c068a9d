//! REST API service bootstrap.
//!
//! Startup ordering, liveness/readiness endpoints, the per-request
//! instrumentation pipeline and bounded graceful shutdown.

pub mod config;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod observability;

pub use config::schema::ServiceConfig;
pub use http::HttpServer;
pub use lifecycle::{Orchestrator, Shutdown};
