//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! CLI flags (cli.rs)          highest priority
//!     → APP_* environment     middle
//!     → built-in defaults     lowest
//!     → loader.rs (merge & require database_url)
//!     → ServiceConfig (immutable, owned by the orchestrator)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - database_url is the single mandatory field; nothing else is validated
//! - Loading reads configuration sources only, never the network

pub mod cli;
pub mod loader;
pub mod schema;

pub use cli::{Cli, Commands, ServeArgs};
pub use loader::{load_config, load_config_with, ConfigError};
pub use schema::{ServiceConfig, TimeoutConfig};
