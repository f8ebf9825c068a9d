//! Configuration schema definitions.
//!
//! `ServiceConfig` is built once at startup by the loader and never mutated
//! afterwards.

use std::time::Duration;

/// Listen port used when neither a flag nor the environment sets one.
pub const DEFAULT_PORT: u16 = 8080;

/// Root configuration for the service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Host part of the listen address.
    pub bind_host: String,

    /// TCP port to accept HTTP connections on.
    pub port: u16,

    /// Connection URL of the downstream database. Required.
    pub database_url: String,

    /// Enable debug-level logging.
    pub debug: bool,

    /// Optional Prometheus scrape address (e.g. "0.0.0.0:9090").
    pub metrics_address: Option<String>,

    /// Probe, connection and drain deadlines.
    pub timeouts: TimeoutConfig,
}

impl ServiceConfig {
    /// Address the HTTP listener binds to.
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.bind_host, self.port)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            database_url: String::new(),
            debug: false,
            metrics_address: None,
            timeouts: TimeoutConfig::default(),
        }
    }
}

/// Deadlines for the readiness probe, client connections and the shutdown drain.
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    /// Upper bound on a single readiness round-trip, in milliseconds.
    pub readiness_probe_ms: u64,

    /// Upper bound on draining in-flight requests at shutdown, in milliseconds.
    pub drain_ms: u64,

    /// Time a client has to send a complete request head, in milliseconds.
    pub header_read_ms: u64,

    /// Time a handler has to produce its response, in milliseconds.
    pub request_ms: u64,

    /// Keep-alive connections with no request in flight are closed after this
    /// many milliseconds.
    pub idle_ms: u64,
}

impl TimeoutConfig {
    pub fn readiness_probe(&self) -> Duration {
        Duration::from_millis(self.readiness_probe_ms)
    }

    pub fn drain(&self) -> Duration {
        Duration::from_millis(self.drain_ms)
    }

    pub fn header_read(&self) -> Duration {
        Duration::from_millis(self.header_read_ms)
    }

    pub fn request(&self) -> Duration {
        Duration::from_millis(self.request_ms)
    }

    pub fn idle(&self) -> Duration {
        Duration::from_millis(self.idle_ms)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            readiness_probe_ms: 5_000,
            drain_ms: 30_000,
            header_read_ms: 15_000,
            request_ms: 15_000,
            idle_ms: 60_000,
        }
    }
}
