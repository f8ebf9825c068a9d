//! Process lifecycle phase.
//!
//! # States
//! ```text
//! Starting → Serving → Draining → Stopped
//! Starting → Stopped              (boot failure)
//! Serving  → Stopped              (listener failure)
//! ```
//!
//! A single `PhaseCell` is owned by the orchestrator; every other component
//! gets a `PhaseReader` and can only observe.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use crate::observability::metrics;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
    Starting = 0,
    Serving = 1,
    Draining = 2,
    Stopped = 3,
}

impl LifecyclePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecyclePhase::Starting => "starting",
            LifecyclePhase::Serving => "serving",
            LifecyclePhase::Draining => "draining",
            LifecyclePhase::Stopped => "stopped",
        }
    }

    fn can_transition_to(self, next: LifecyclePhase) -> bool {
        use LifecyclePhase::*;
        matches!(
            (self, next),
            (Starting, Serving)
                | (Starting, Stopped)
                | (Serving, Draining)
                | (Serving, Stopped)
                | (Draining, Stopped)
        )
    }
}

impl From<u8> for LifecyclePhase {
    fn from(val: u8) -> Self {
        match val {
            0 => LifecyclePhase::Starting,
            1 => LifecyclePhase::Serving,
            2 => LifecyclePhase::Draining,
            _ => LifecyclePhase::Stopped,
        }
    }
}

impl std::fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected phase change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal lifecycle transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: LifecyclePhase,
    pub to: LifecyclePhase,
}

/// Mutable owner of the process phase.
///
/// Deliberately not `Clone`: only the orchestrator holds one.
#[derive(Debug)]
pub struct PhaseCell {
    state: Arc<AtomicU8>,
}

impl PhaseCell {
    pub fn new() -> Self {
        metrics::record_phase(LifecyclePhase::Starting);
        Self {
            state: Arc::new(AtomicU8::new(LifecyclePhase::Starting as u8)),
        }
    }

    pub fn get(&self) -> LifecyclePhase {
        LifecyclePhase::from(self.state.load(Ordering::Acquire))
    }

    /// Move from `from` to `to` atomically.
    ///
    /// Fails if the current phase is not `from` or the edge is not part of the
    /// state machine.
    pub fn transition(
        &self,
        from: LifecyclePhase,
        to: LifecyclePhase,
    ) -> Result<(), InvalidTransition> {
        if !from.can_transition_to(to) {
            return Err(InvalidTransition { from, to });
        }
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|actual| InvalidTransition {
                from: LifecyclePhase::from(actual),
                to,
            })?;

        tracing::debug!(from = %from, to = %to, "Lifecycle transition");
        metrics::record_phase(to);
        Ok(())
    }

    /// Move to `Stopped` from whatever non-terminal phase is current.
    pub fn stop(&self) -> LifecyclePhase {
        let previous = LifecyclePhase::from(
            self.state
                .swap(LifecyclePhase::Stopped as u8, Ordering::AcqRel),
        );
        if previous != LifecyclePhase::Stopped {
            tracing::debug!(from = %previous, to = %LifecyclePhase::Stopped, "Lifecycle transition");
            metrics::record_phase(LifecyclePhase::Stopped);
        }
        previous
    }

    pub fn reader(&self) -> PhaseReader {
        PhaseReader {
            state: Arc::clone(&self.state),
        }
    }
}

impl Default for PhaseCell {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only view of the lifecycle phase.
#[derive(Debug, Clone)]
pub struct PhaseReader {
    state: Arc<AtomicU8>,
}

impl PhaseReader {
    pub fn get(&self) -> LifecyclePhase {
        LifecyclePhase::from(self.state.load(Ordering::Acquire))
    }
}
