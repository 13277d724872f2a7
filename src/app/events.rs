//! Outbound supervisor events.
//!
//! The [`SupervisorLoop`](super::supervisor::SupervisorLoop) emits these
//! through the [`EventSink`](super::ports::EventSink) port.  The default
//! adapter renders them as tagged log lines.

use crate::app::ports::MemoryInfo;
use crate::app::supervisor::LoopState;
use crate::error::Error;
use crate::power::PowerMode;

/// Structured events emitted by the supervisor.
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// The loop is about to run its first cycle.
    Started { device_id: String, endpoints: usize },

    /// The loop moved between states.
    StateChanged { from: LoopState, to: LoopState },

    /// A new broker session was seen, opened by the loop or re-established
    /// by the client itself; subscriptions were registered again.
    BrokerConnected { resubscribed: usize },

    /// The registry was populated in this cycle.
    RegistryReady { endpoints: usize },

    /// One full cycle completed.
    Cycle(CycleReport),

    /// The health record could not be published; the cycle continues.
    HealthSkipped(Error),

    /// Entering the configured power mode.
    PowerTransition(PowerMode),

    /// A fault aborted the cycle.
    Fault { error: Error, memory: MemoryInfo },

    /// The loop is exiting on request.
    Exiting,
}

/// Per-cycle broker traffic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub cycle: u64,
    pub published: usize,
    pub received: usize,
}
