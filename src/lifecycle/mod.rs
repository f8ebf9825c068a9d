//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Config (already loaded) → Connect dependency → Bind listener
//!     → Spawn server task → Subscribe to signals        [Starting → Serving]
//!
//! Shutdown (startup.rs + shutdown.rs):
//!     Request received → Stop accepting → Drain (bounded) [Serving → Draining]
//!     → Release dependency → Exit                         [Draining → Stopped]
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!     Second SIGTERM/SIGINT while draining → forced stop
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then dependency, then listener
//! - Ordered shutdown: stop accept, drain, release
//! - Shutdown has a timeout: in-flight work is cancelled after the deadline

pub mod phase;
pub mod shutdown;
pub mod signals;
pub mod startup;

pub use phase::{LifecyclePhase, PhaseReader};
pub use shutdown::Shutdown;
pub use startup::{LifecycleError, Orchestrator, Running, ServeError, ShutdownError};
