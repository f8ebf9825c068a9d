//! Command-line surface.
//!
//! Every `serve` flag is optional so the loader can tell "not given" apart
//! from "given with the default value" when layering over the environment.

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "server")]
#[command(version, about = "REST API server", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Start the HTTP server
    Serve(ServeArgs),
}

/// Flags of the `serve` command. Flags override `APP_*` environment variables.
#[derive(Debug, Clone, Default, Args)]
pub struct ServeArgs {
    /// Server port
    #[arg(long)]
    pub port: Option<u16>,

    /// Enable debug mode
    #[arg(long, num_args = 0..=1, default_missing_value = "true", value_parser = parse_flag_bool)]
    pub debug: Option<bool>,

    /// Database connection URL
    #[arg(long = "db", value_name = "URL")]
    pub database_url: Option<String>,

    /// Prometheus scrape address (disabled when unset)
    #[arg(long = "metrics-addr", value_name = "ADDR")]
    pub metrics_address: Option<String>,
}

fn parse_flag_bool(raw: &str) -> Result<bool, String> {
    super::loader::parse_bool(raw).ok_or_else(|| format!("invalid boolean value '{raw}'"))
}
