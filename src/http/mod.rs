//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (accept loop, hyper-util HTTP/1.1 + HTTP/2)
//!     → request.rs (assign x-request-id)
//!     → middleware/ (panic containment, timing record)
//!     → health endpoints or collaborator routes
//! ```

pub mod middleware;
pub mod request;
pub mod server;

pub use request::{RequestIdExt, X_REQUEST_ID};
pub use server::HttpServer;
