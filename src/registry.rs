//! The set of live endpoints, in configuration order.
//!
//! Population is create-once and all-or-nothing: every endpoint is built,
//! subscribed, run (one-shot) or armed (timers) before the registry is
//! committed.  A failure anywhere leaves the registry empty so the next
//! supervisor cycle starts over.

use std::sync::Arc;

use embedded_hal::delay::DelayNs;
use log::info;

use crate::app::ports::{BoardPort, BrokerSession, TimerPort};
use crate::bridge;
use crate::config::DeviceConfig;
use crate::endpoint::capability::CapabilityTable;
use crate::endpoint::{Endpoint, Trigger};
use crate::error::Result;

/// Collaborators needed while populating the registry.
pub struct InitContext<'a, B, T, D> {
    pub broker: &'a mut B,
    pub timers: &'a mut T,
    pub delay: &'a mut D,
}

pub struct DeviceRegistry<H: BoardPort> {
    table: CapabilityTable,
    endpoints: Vec<Arc<Endpoint<H>>>,
    initialized: bool,
    constructed: u64,
}

impl<H: BoardPort> DeviceRegistry<H> {
    pub fn new(table: CapabilityTable) -> Self {
        Self {
            table,
            endpoints: Vec::new(),
            initialized: false,
            constructed: 0,
        }
    }

    /// `true` once a population attempt has committed, even with no endpoints.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Re-register every subscription (after a fresh broker connection).
    pub fn resubscribe(&self, broker: &mut impl BrokerSession) -> Result<usize> {
        let mut n = 0;
        for sub in self.endpoints.iter().filter_map(|e| e.subscribe()) {
            broker.subscribe(&sub.topic)?;
            n += 1;
        }
        Ok(n)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Endpoint<H>>> {
        self.endpoints.iter().find(|e| e.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Endpoint<H>>> {
        self.endpoints.iter()
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Input pins armed for edge-triggered reads, in configuration order.
    pub fn edge_pins(&self) -> Vec<u8> {
        self.endpoints
            .iter()
            .filter(|e| !e.is_oneshot())
            .filter_map(|e| match e.trigger() {
                Trigger::Edge { pin } => Some(pin),
                _ => None,
            })
            .collect()
    }

    /// Total endpoint constructions attempted over the registry's lifetime.
    pub fn constructions(&self) -> u64 {
        self.constructed
    }
}

impl<H: BoardPort + 'static> DeviceRegistry<H> {
    /// Populate from `config` unless already populated.
    ///
    /// Returns `true` if endpoints were created by this call.
    pub fn ensure_initialized<B, T, D>(
        &mut self,
        config: &DeviceConfig,
        board: &Arc<H>,
        ctx: &mut InitContext<'_, B, T, D>,
    ) -> Result<bool>
    where
        B: BrokerSession,
        T: TimerPort,
        D: DelayNs,
    {
        if self.initialized {
            return Ok(false);
        }

        let defaults = config.endpoint_defaults();
        let mut built = Vec::with_capacity(config.devices.len());
        for spec in &config.devices {
            info!("Initializing endpoint '{}'", spec.name);
            self.constructed += 1;
            built.push(Arc::new(Endpoint::new(
                spec,
                &self.table,
                Arc::clone(board),
                &defaults,
            )?));
        }

        if let Err(e) = Self::activate(&built, ctx) {
            ctx.timers.cancel_all();
            return Err(e);
        }

        info!("Registry ready: {} endpoint(s)", built.len());
        self.endpoints = built;
        self.initialized = true;
        Ok(true)
    }

    fn activate<B, T, D>(built: &[Arc<Endpoint<H>>], ctx: &mut InitContext<'_, B, T, D>) -> Result<()>
    where
        B: BrokerSession,
        T: TimerPort,
        D: DelayNs,
    {
        for endpoint in built {
            if let Some(sub) = endpoint.subscribe() {
                ctx.broker.subscribe(&sub.topic)?;
                info!("'{}': subscribed to {}", endpoint.name(), sub.topic);
            }
        }
        for endpoint in built {
            if endpoint.is_oneshot() {
                bridge::run_oneshot(endpoint, &mut *ctx.broker, &mut *ctx.delay)?;
            } else {
                arm(endpoint, &mut *ctx.timers)?;
            }
        }
        Ok(())
    }
}

/// Register the read trigger and the publish/subscribe due-flag timers.
fn arm<H: BoardPort + 'static>(endpoint: &Arc<Endpoint<H>>, timers: &mut impl TimerPort) -> Result<()> {
    match endpoint.trigger() {
        Trigger::Edge { pin } => {
            let e = Arc::clone(endpoint);
            timers.on_falling_edge(pin, Box::new(move || e.on_event()))?;
        }
        Trigger::Every { period_ms } => {
            let e = Arc::clone(endpoint);
            timers.every(period_ms, Box::new(move || e.on_event()))?;
        }
        Trigger::Manual => {}
    }
    if let Some(publish) = endpoint.publish() {
        let e = Arc::clone(endpoint);
        timers.every(publish.interval_ms, Box::new(move || e.mark_publish_due()))?;
    }
    if let Some(subscribe) = endpoint.subscribe() {
        let e = Arc::clone(endpoint);
        timers.every(subscribe.interval_ms, Box::new(move || e.mark_subscribe_due()))?;
    }
    Ok(())
}
