//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Request pipeline and lifecycle produce:
//!     → logging.rs (JSON events on stdout)
//!     → metrics.rs (counters, histograms, phase gauge)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Request ID flows into every request record
//! - Metrics exporter is optional and never blocks startup

pub mod logging;
pub mod metrics;
