//! OS signal handling.
//!
//! # Responsibilities
//! - Register SIGINT and SIGTERM handlers
//! - Forward every delivery into the `Shutdown` coordinator
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - The first signal starts the drain, a repeated one forces the stop
//! - No other signals are handled

use std::io;

use tokio::task::JoinHandle;

use crate::lifecycle::shutdown::Shutdown;

/// Install handlers and spawn the forwarding task.
///
/// Registration happens before this returns, so a signal delivered right
/// after cannot be missed.
pub fn forward_signals(shutdown: Shutdown) -> io::Result<JoinHandle<()>> {
    #[cfg(unix)]
    let mut terminate =
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    #[cfg(unix)]
    let mut interrupt =
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())?;

    let handle = tokio::spawn(async move {
        loop {
            #[cfg(unix)]
            let name = tokio::select! {
                _ = interrupt.recv() => "SIGINT",
                _ = terminate.recv() => "SIGTERM",
            };

            #[cfg(not(unix))]
            let name = match tokio::signal::ctrl_c().await {
                Ok(()) => "ctrl-c",
                Err(e) => {
                    tracing::error!(error = %e, "Failed to listen for ctrl-c");
                    return;
                }
            };

            let count = shutdown.trigger();
            if count == 1 {
                tracing::info!(signal = name, "Shutdown signal received");
            } else {
                tracing::warn!(signal = name, count, "Repeated shutdown signal, forcing stop");
            }
        }
    });

    Ok(handle)
}
