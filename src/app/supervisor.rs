//! Supervisor loop: the firmware's single main loop.
//!
//! ```text
//!   ┌──────────────┐    ┌──────────────┐    ┌──────────┐    ┌─────────────────┐
//!   │ConnectBroker │──▶│ InitRegistry │──▶│ RunCycle │──▶│ PowerTransition │──┐
//!   └──────────────┘    └──────────────┘    └──────────┘    └─────────────────┘  │
//!          ▲                     any state ──▶ HandleFault ──▶ (wait/reset/exit) │
//!          └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Faults of every kind are handled the same way, governed by the
//! `exception_*` switches of [`DeviceConfig`].

use std::sync::Arc;

use embedded_hal::delay::DelayNs;
use log::{error, info, warn};

use crate::app::events::{AppEvent, CycleReport};
use crate::app::ports::{BoardPort, BrokerSession, EventSink, SystemPort, TimerPort};
use crate::bridge::{self, HealthRecord};
use crate::config::DeviceConfig;
use crate::endpoint::capability::CapabilityTable;
use crate::error::{Error, Result};
use crate::power::PowerScheduler;
use crate::registry::{DeviceRegistry, InitContext};
use crate::retry::{ATTEMPTS, RETRY_DELAY_MS, with_retry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    ConnectBroker,
    InitRegistry,
    RunCycle,
    PowerTransition,
    HandleFault,
}

/// What the caller of [`SupervisorLoop::run_cycle`] should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// Owns the registry and every adapter the main loop drives.
pub struct SupervisorLoop<H, B, T, S, D, E>
where
    H: BoardPort + 'static,
    B: BrokerSession,
    T: TimerPort,
    S: SystemPort,
    D: DelayNs,
    E: EventSink,
{
    config: DeviceConfig,
    board: Arc<H>,
    broker: B,
    timers: T,
    system: S,
    delay: D,
    sink: E,
    registry: DeviceRegistry<H>,
    power: PowerScheduler,
    state: LoopState,
    session: u32,
    cycles: u64,
    faults: u64,
}

impl<H, B, T, S, D, E> SupervisorLoop<H, B, T, S, D, E>
where
    H: BoardPort + 'static,
    B: BrokerSession,
    T: TimerPort,
    S: SystemPort,
    D: DelayNs,
    E: EventSink,
{
    pub fn new(
        config: DeviceConfig,
        board: Arc<H>,
        broker: B,
        timers: T,
        system: S,
        delay: D,
        sink: E,
    ) -> Self {
        Self::with_capabilities(
            config,
            CapabilityTable::standard(),
            board,
            broker,
            timers,
            system,
            delay,
            sink,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn with_capabilities(
        config: DeviceConfig,
        table: CapabilityTable,
        board: Arc<H>,
        broker: B,
        timers: T,
        system: S,
        delay: D,
        sink: E,
    ) -> Self {
        let power = PowerScheduler::from_config(&config);
        Self {
            config,
            board,
            broker,
            timers,
            system,
            delay,
            sink,
            registry: DeviceRegistry::new(table),
            power,
            state: LoopState::ConnectBroker,
            session: 0,
            cycles: 0,
            faults: 0,
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Run until `exception_exit` ends the loop or `exception_raise`
    /// surfaces a fault to the caller.
    pub fn run(&mut self) -> Result<()> {
        self.sink.emit(&AppEvent::Started {
            device_id: self.config.device_id.clone(),
            endpoints: self.config.devices.len(),
        });
        loop {
            if self.run_cycle()? == Flow::Exit {
                self.sink.emit(&AppEvent::Exiting);
                return Ok(());
            }
        }
    }

    /// One pass through the state machine, including fault handling.
    pub fn run_cycle(&mut self) -> Result<Flow> {
        match self.cycle() {
            Ok(()) => Ok(Flow::Continue),
            Err(e) => self.handle_fault(e),
        }
    }

    fn cycle(&mut self) -> Result<()> {
        self.enter(LoopState::ConnectBroker);
        self.connect_broker()?;
        let session = self.broker.session();
        if session != self.session {
            let resubscribed = self.registry.resubscribe(&mut self.broker)?;
            self.session = session;
            self.sink.emit(&AppEvent::BrokerConnected { resubscribed });
        }

        self.enter(LoopState::InitRegistry);
        let created = {
            let mut ctx = InitContext {
                broker: &mut self.broker,
                timers: &mut self.timers,
                delay: &mut self.delay,
            };
            self.registry
                .ensure_initialized(&self.config, &self.board, &mut ctx)?
        };
        if created {
            self.power.set_wake_pins(self.registry.edge_pins());
            self.sink.emit(&AppEvent::RegistryReady {
                endpoints: self.registry.len(),
            });
        }

        self.enter(LoopState::RunCycle);
        let stats = bridge::run_due(&self.registry, &mut self.broker)?;
        if self.config.publish_health {
            self.publish_health();
        }
        self.cycles += 1;
        self.sink.emit(&AppEvent::Cycle(CycleReport {
            cycle: self.cycles,
            published: stats.published,
            received: stats.received,
        }));

        self.enter(LoopState::PowerTransition);
        self.sink.emit(&AppEvent::PowerTransition(self.power.mode()));
        self.power
            .enter(&mut self.broker, &mut self.system, &mut self.delay);
        Ok(())
    }

    /// Open the broker session if needed.
    fn connect_broker(&mut self) -> Result<()> {
        if self.broker.is_connected() {
            return Ok(());
        }
        let clean = self.config.publish.clean_session;
        let broker = &mut self.broker;
        with_retry(ATTEMPTS, RETRY_DELAY_MS, &mut self.delay, "broker connect", || {
            broker.connect(clean).map_err(Error::from)
        })?;
        info!(
            "Connected to broker {}:{}",
            self.config.publish.server, self.config.publish.port
        );
        Ok(())
    }

    fn publish_health(&mut self) {
        let memory = self.system.memory();
        let record = HealthRecord {
            name: self.config.friendly_name.clone(),
            id: self.config.device_id.clone(),
            uptime_ms: self.system.uptime_ms(),
            mem_free: memory.free,
            mem_alloc: memory.allocated,
        };
        let topic = self.config.health_topic();
        if let Err(e) = bridge::publish_health(&mut self.broker, &record, &topic) {
            warn!("Health publish failed: {e}");
            self.sink.emit(&AppEvent::HealthSkipped(e));
        }
    }

    fn handle_fault(&mut self, e: Error) -> Result<Flow> {
        self.enter(LoopState::HandleFault);
        self.faults += 1;
        if self.config.exception_raise {
            error!("Fault (raising): {e}");
            return Err(e);
        }

        let memory = self.system.memory();
        error!("Fault: {e}");
        self.sink.emit(&AppEvent::Fault { error: e, memory });

        self.delay
            .delay_ms(self.config.exception_wait.saturating_mul(1000));
        if self.config.exception_reset {
            warn!("Restarting after fault");
            self.system.restart();
        }
        if self.config.exception_exit {
            return Ok(Flow::Exit);
        }
        Ok(Flow::Continue)
    }

    fn enter(&mut self, to: LoopState) {
        if self.state != to {
            let from = self.state;
            self.state = to;
            self.sink.emit(&AppEvent::StateChanged { from, to });
        }
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn faults(&self) -> u64 {
        self.faults
    }

    pub fn registry(&self) -> &DeviceRegistry<H> {
        &self.registry
    }

    pub fn broker(&self) -> &B {
        &self.broker
    }

    pub fn broker_mut(&mut self) -> &mut B {
        &mut self.broker
    }

    pub fn timers_mut(&mut self) -> &mut T {
        &mut self.timers
    }

    pub fn system(&self) -> &S {
        &self.system
    }

    pub fn sink(&self) -> &E {
        &self.sink
    }

    pub fn delay(&self) -> &D {
        &self.delay
    }
}
