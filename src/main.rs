//! REST API server.
//!
//! ```text
//! server serve [--port <int>] [--debug[=<bool>]] [--db <url>] [--metrics-addr <addr>]
//! ```
//!
//! Exit codes: 0 on clean shutdown or `--help`, 1 on any boot, serve or
//! shutdown failure.

use clap::Parser;
use std::process::ExitCode;

use rest_api_server::config::{load_config, Cli, Commands};
use rest_api_server::health::PostgresConnector;
use rest_api_server::lifecycle::{LifecycleError, Orchestrator};
use rest_api_server::observability::{logging, metrics};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    match cli.command {
        Commands::Serve(args) => {
            let config = match load_config(&args) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("Error: {}", LifecycleError::from(e));
                    return ExitCode::FAILURE;
                }
            };

            if let Err(e) = logging::init_logging(config.debug) {
                eprintln!("Error: failed to initialize logging: {e}");
                return ExitCode::FAILURE;
            }

            if let Some(address) = &config.metrics_address {
                match address.parse() {
                    Ok(addr) => metrics::init_metrics(addr),
                    Err(_) => tracing::error!(
                        metrics_address = %address,
                        "Failed to parse metrics address"
                    ),
                }
            }

            match Orchestrator::new(config).run(&PostgresConnector).await {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    tracing::error!(error = %e, "server exited with error");
                    ExitCode::FAILURE
                }
            }
        }
    }
}
