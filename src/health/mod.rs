//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! GET /health (handlers.rs):
//!     → 200 {status, timestamp}            no dependency I/O
//!
//! GET /ready (handlers.rs):
//!     → probe.rs check_ready(timeout)
//!     → DependencyProbe adapter (postgres.rs)
//!     → 200 ok / 503 unhealthy + detail
//! ```
//!
//! # Design Decisions
//! - Liveness and readiness never share a code path
//! - Readiness is recomputed on every request, never cached
//! - Readiness failures degrade the response only; they are never fatal

pub mod handlers;
pub mod postgres;
pub mod probe;

pub use handlers::{HealthState, HealthStatus};
pub use postgres::PostgresConnector;
pub use probe::{
    check_ready, DependencyConnectError, DependencyConnector, DependencyProbe, ProbeError,
    ProbeReport,
};
