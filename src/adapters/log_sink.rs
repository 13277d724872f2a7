//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing one tagged line per supervisor
//! event to the logger (UART / USB-CDC on the device).

use log::{error, info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`] to the console.
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Started { device_id, endpoints } => {
                info!("START | id={} | endpoints={}", device_id, endpoints);
            }
            AppEvent::StateChanged { from, to } => {
                info!("STATE | {:?} -> {:?}", from, to);
            }
            AppEvent::BrokerConnected { resubscribed } => {
                info!("BROKER | connected | resubscribed={}", resubscribed);
            }
            AppEvent::RegistryReady { endpoints } => {
                info!("REGISTRY | ready | endpoints={}", endpoints);
            }
            AppEvent::Cycle(r) => {
                info!(
                    "CYCLE | #{} | published={} received={}",
                    r.cycle, r.published, r.received
                );
            }
            AppEvent::HealthSkipped(e) => {
                warn!("HEALTH | skipped: {}", e);
            }
            AppEvent::PowerTransition(mode) => {
                info!("POWER | {:?}", mode);
            }
            AppEvent::Fault { error: e, memory } => {
                error!(
                    "FAULT | {} | mem_free={} mem_alloc={}",
                    e, memory.free, memory.allocated
                );
            }
            AppEvent::Exiting => {
                info!("EXIT | leaving supervisor loop");
            }
        }
    }
}
