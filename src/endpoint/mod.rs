//! Endpoints: one configured pin, PWM channel or sensor.
//!
//! An [`Endpoint`] binds up to three capabilities (read, write, sample),
//! owns an [`EventAggregator`], and carries its derived publish/subscribe
//! bindings.  It is shared between the main loop and the timer/IRQ
//! callbacks that drive it, so every method takes `&self`.
//!
//! ```text
//!   IRQ / timer ──▶ on_event() ──▶ EventAggregator ──▶ harvest() ──▶ Bridge
//!   Bridge ──▶ write(payload) ──▶ board
//! ```

pub mod capability;
pub mod reading;

use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{info, warn};

use crate::aggregator::{EventAggregator, EventOutcome};
use crate::app::ports::{BoardPort, DhtModel, PinMode};
use crate::config::{EndpointDefaults, EndpointSpec};
use crate::error::{ConfigError, Error, Result};

use self::capability::{Capability, CapabilityTable, PinRequirement, Role};
use self::reading::{PwmUpdate, Reading, parse_level};

// ───────────────────────────────────────────────────────────────
// Bindings
// ───────────────────────────────────────────────────────────────

/// What drives [`Endpoint::on_event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Falling edge on the endpoint pin.
    Edge { pin: u8 },
    /// Periodic timer.
    Every { period_ms: u32 },
    /// Nothing: the endpoint only reacts to control messages or one-shot passes.
    Manual,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishBinding {
    pub topic: String,
    pub interval_ms: u32,
    pub retain: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeBinding {
    pub topic: String,
    pub interval_ms: u32,
    pub echo: bool,
}

/// Result of draining an endpoint's aggregation window.
#[derive(Debug, Clone, PartialEq)]
pub struct Harvest {
    pub events: u32,
    pub readings: Vec<Reading>,
}

impl Harvest {
    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }
}

// ───────────────────────────────────────────────────────────────
// Endpoint
// ───────────────────────────────────────────────────────────────

pub struct Endpoint<H: BoardPort> {
    name: String,
    pin: Option<u8>,
    pwm: Option<u8>,
    read: Option<Capability>,
    write: Option<Capability>,
    sample: Option<Capability>,
    trigger: Trigger,
    publish: Option<PublishBinding>,
    subscribe: Option<SubscribeBinding>,
    oneshot: bool,
    aggregator: EventAggregator,
    publish_due: AtomicBool,
    subscribe_due: AtomicBool,
    board: Arc<H>,
}

impl<H: BoardPort> Endpoint<H> {
    /// Resolve capabilities, configure hardware and derive topics.
    pub fn new(
        spec: &EndpointSpec,
        table: &CapabilityTable,
        board: Arc<H>,
        defaults: &EndpointDefaults,
    ) -> Result<Self> {
        let name = spec.name.as_str();

        let sample = match spec.function_sample.as_deref() {
            Some(id) => Some(table.resolve(name, id, Role::Sample)?),
            None => table
                .lookup(&format!("sample_{name}"))
                .filter(|c| c.serves(Role::Sample)),
        };

        let read = match &spec.read {
            None => None,
            Some(r) => match r.function.as_deref() {
                Some(id) => Some(table.resolve(name, id, Role::Read)?),
                None => {
                    let id = format!("read_{name}");
                    match table.resolve(name, &id, Role::Read) {
                        Ok(cap) => Some(cap),
                        // Count-only: the sample function consumes the event counter.
                        Err(_) if sample.is_some() => None,
                        Err(e) => return Err(e.into()),
                    }
                }
            },
        };

        let write = match &spec.subscribe {
            None => None,
            Some(s) => {
                let id = s
                    .function
                    .clone()
                    .unwrap_or_else(|| format!("write_{name}"));
                Some(table.resolve(name, &id, Role::Write)?)
            }
        };

        let irq = spec.read.as_ref().is_some_and(|r| r.irq);
        configure_hardware(spec, &*board, [read, write, sample], irq)?;

        let trigger = match &spec.read {
            None => Trigger::Manual,
            Some(r) if r.irq => Trigger::Edge {
                pin: require(spec.pin, name, "interrupt")?,
            },
            Some(_) if spec.oneshot => Trigger::Manual,
            Some(r) => match r.interval {
                Some(secs) => Trigger::Every {
                    period_ms: secs.saturating_mul(1000),
                },
                None => return Err(ConfigError::Missing("read.interval").into()),
            },
        };

        let publish = spec.publish.as_ref().map(|p| {
            let base = defaults.topic_base(
                p.topic_base.as_deref(),
                defaults.publish_topic_base.as_deref(),
            );
            PublishBinding {
                topic: p.topic.clone().unwrap_or_else(|| format!("{base}/{name}")),
                interval_ms: p.interval.unwrap_or(defaults.publish_interval).saturating_mul(1000),
                retain: p.retain.unwrap_or(defaults.retain),
            }
        });

        let subscribe = spec.subscribe.as_ref().map(|s| {
            let base = defaults.topic_base(
                s.topic_base.as_deref(),
                defaults.subscribe_topic_base.as_deref(),
            );
            SubscribeBinding {
                topic: s
                    .topic
                    .clone()
                    .unwrap_or_else(|| format!("{base}/{name}/control")),
                interval_ms: s
                    .interval
                    .unwrap_or(defaults.subscribe_interval)
                    .saturating_mul(1000),
                echo: s.echo,
            }
        });

        info!(
            "Endpoint '{}': read={:?} write={:?} sample={:?} trigger={:?}",
            name,
            read.map(Capability::id),
            write.map(Capability::id),
            sample.map(Capability::id),
            trigger
        );

        let now = board.now_ms();
        Ok(Self {
            name: spec.name.clone(),
            pin: spec.pin,
            pwm: spec.pwm,
            read,
            write,
            sample,
            trigger,
            publish,
            subscribe,
            oneshot: spec.oneshot,
            aggregator: EventAggregator::new(now),
            publish_due: AtomicBool::new(false),
            subscribe_due: AtomicBool::new(false),
            board,
        })
    }

    // ── Accessors ─────────────────────────────────────────────

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pin(&self) -> Option<u8> {
        self.pin
    }

    pub fn trigger(&self) -> Trigger {
        self.trigger
    }

    pub fn publish(&self) -> Option<&PublishBinding> {
        self.publish.as_ref()
    }

    pub fn subscribe(&self) -> Option<&SubscribeBinding> {
        self.subscribe.as_ref()
    }

    pub fn is_oneshot(&self) -> bool {
        self.oneshot
    }

    pub fn read_capability(&self) -> Option<Capability> {
        self.read
    }

    pub fn write_capability(&self) -> Option<Capability> {
        self.write
    }

    pub fn sample_capability(&self) -> Option<Capability> {
        self.sample
    }

    // ── Callback context ──────────────────────────────────────

    /// Count one event and buffer its reading.  Safe from IRQ/timer context.
    pub fn on_event(&self) {
        let outcome = match self.read {
            None => EventOutcome::Empty,
            Some(cap) => match self.invoke(cap) {
                Ok(Some(r)) => EventOutcome::Reading(r),
                Ok(None) => EventOutcome::Empty,
                // Reported from the main loop at the next harvest.
                Err(_) => EventOutcome::Fault,
            },
        };
        self.aggregator.record(outcome);
    }

    pub fn mark_publish_due(&self) {
        self.publish_due.store(true, Ordering::Release);
    }

    pub fn mark_subscribe_due(&self) {
        self.subscribe_due.store(true, Ordering::Release);
    }

    /// Clear and return the publish-due flag.
    pub fn take_publish_due(&self) -> bool {
        self.publish_due.swap(false, Ordering::AcqRel)
    }

    pub fn take_subscribe_due(&self) -> bool {
        self.subscribe_due.swap(false, Ordering::AcqRel)
    }

    // ── Main loop ─────────────────────────────────────────────

    /// Drain the aggregation window.
    ///
    /// With a sample binding the buffered readings are replaced by one
    /// rate record computed from the event count and window length.
    pub fn harvest(&self) -> Harvest {
        let now = self.board.now_ms();
        let snap = self.aggregator.harvest(now);
        if snap.faults > 0 {
            warn!("'{}': {} read(s) failed since last harvest", self.name, snap.faults);
        }
        if snap.dropped > 0 {
            warn!("'{}': {} reading(s) dropped (buffer full)", self.name, snap.dropped);
        }

        let readings = match self.sample {
            Some(Capability::SampleRate) => {
                let elapsed = now.saturating_sub(snap.window_start_ms);
                if elapsed == 0 {
                    warn!("'{}': zero-length sample window", self.name);
                }
                vec![rate_sample(snap.events, elapsed)]
            }
            _ => snap.readings,
        };

        Harvest {
            events: snap.events,
            readings,
        }
    }

    /// Invoke the read binding directly, propagating failures, and feed
    /// the result into the aggregator as one event.
    pub fn read_now(&self) -> Result<Option<Reading>> {
        let Some(cap) = self.read else {
            return Ok(None);
        };
        let reading = self.invoke(cap)?;
        let outcome = match &reading {
            Some(r) => EventOutcome::Reading(r.clone()),
            None => EventOutcome::Empty,
        };
        self.aggregator.record(outcome);
        Ok(reading)
    }

    /// Append a record produced outside the read binding (write echo).
    pub fn record(&self, reading: Reading) {
        self.aggregator.record(EventOutcome::Reading(reading));
    }

    /// Apply a control payload through the write binding.
    ///
    /// `Ok(None)` for an unparseable payload; nothing is changed then.
    pub fn write(&self, payload: &[u8]) -> Result<Option<Reading>> {
        match self.write {
            Some(Capability::WriteStatus) => {
                let Some((high, value)) = parse_level(payload) else {
                    warn!("'{}': ignoring control payload {:?}", self.name, lossy(payload));
                    return Ok(None);
                };
                self.board.set_level(self.gpio()?, high)?;
                Ok(Some(Reading::Status { value }))
            }
            Some(Capability::WritePwm) => {
                let Some(update) = PwmUpdate::parse(payload) else {
                    warn!("'{}': ignoring control payload {:?}", self.name, lossy(payload));
                    return Ok(None);
                };
                let pwm = self.pwm_pin()?;
                if let Some(freq) = update.freq {
                    self.board.set_freq(pwm, freq)?;
                }
                if let Some(duty) = update.duty {
                    self.board.set_duty(pwm, duty)?;
                }
                Ok(Some(self.read_pwm(pwm)?))
            }
            Some(Capability::ToggleStatus) => self.toggle().map(Some),
            _ => Ok(None),
        }
    }

    /// Drive the output to the complement of its current level.
    pub fn toggle(&self) -> Result<Reading> {
        let pin = self.gpio()?;
        let level = self.board.level(pin)?;
        self.board.set_level(pin, !level)?;
        Ok(Reading::status(self.board.level(pin)?))
    }

    fn invoke(&self, cap: Capability) -> Result<Option<Reading>> {
        match cap {
            Capability::ReadStatus => Ok(Some(Reading::status(self.board.level(self.gpio()?)?))),
            Capability::ReadDht11 => self.read_dht(DhtModel::Dht11).map(Some),
            Capability::ReadDht22 => self.read_dht(DhtModel::Dht22).map(Some),
            Capability::ReadOnewireTemperature => {
                let probes = self.board.measure_onewire(self.gpio()?)?;
                Ok((!probes.0.is_empty()).then_some(Reading::Probes(probes)))
            }
            Capability::ReadPwm => self.read_pwm(self.pwm_pin()?).map(Some),
            Capability::ToggleStatus => self.toggle().map(Some),
            Capability::WriteStatus | Capability::WritePwm | Capability::SampleRate => Ok(None),
        }
    }

    fn read_dht(&self, model: DhtModel) -> Result<Reading> {
        let s = self.board.measure_dht(self.gpio()?, model)?;
        Ok(Reading::Climate {
            temperature: s.temperature_c,
            humidity: s.humidity_pct,
        })
    }

    fn read_pwm(&self, pwm: u8) -> Result<Reading> {
        Ok(Reading::Pwm {
            freq: self.board.freq(pwm)?,
            duty: self.board.duty(pwm)?,
        })
    }

    fn gpio(&self) -> Result<u8> {
        require(self.pin, &self.name, "GPIO")
    }

    fn pwm_pin(&self) -> Result<u8> {
        require(self.pwm, &self.name, "PWM")
    }
}

// ───────────────────────────────────────────────────────────────
// Helpers
// ───────────────────────────────────────────────────────────────

/// Rate record for `events` counted over `elapsed_ms`.
pub fn rate_sample(events: u32, elapsed_ms: u64) -> Reading {
    let sample = elapsed_ms as f32 / 1000.0;
    let (rps, rpm) = if sample > 0.0 {
        let rps = events as f32 / sample;
        (rps, rps * 60.0)
    } else {
        (0.0, 0.0)
    };
    Reading::Rate {
        rounds: events,
        sample,
        rps,
        rpm,
    }
}

fn require(pin: Option<u8>, endpoint: &str, role: &'static str) -> Result<u8> {
    pin.ok_or_else(|| {
        Error::Config(ConfigError::PinRequired {
            endpoint: endpoint.into(),
            role,
        })
    })
}

fn lossy(payload: &[u8]) -> String {
    String::from_utf8_lossy(payload).into_owned()
}

/// Check pin presence for every bound capability and configure the board.
fn configure_hardware<H: BoardPort + ?Sized>(
    spec: &EndpointSpec,
    board: &H,
    bound: [Option<Capability>; 3],
    irq: bool,
) -> Result<()> {
    let name = spec.name.as_str();
    let mut gpio_mode: Option<PinMode> = irq.then_some(PinMode::Input);
    let mut needs_pwm = false;

    for cap in bound.into_iter().flatten() {
        match cap.requirement() {
            PinRequirement::Gpio(mode) => {
                gpio_mode = Some(match (gpio_mode, mode) {
                    (Some(PinMode::InputOutput), _) | (_, PinMode::InputOutput) => PinMode::InputOutput,
                    (Some(PinMode::SensorBus), _) | (_, PinMode::SensorBus) => PinMode::SensorBus,
                    _ => PinMode::Input,
                });
            }
            PinRequirement::Pwm => needs_pwm = true,
            PinRequirement::Nothing => {}
        }
    }

    if let Some(mode) = gpio_mode {
        let pin = require(spec.pin, name, "GPIO")?;
        board.configure(pin, mode).map_err(|e| {
            warn!("'{name}': GPIO{pin} rejected: {e}");
            ConfigError::PinRejected {
                endpoint: name.into(),
                pin,
            }
        })?;
    } else if let Some(pin) = spec.pin {
        // Declared but unused by any binding: still claim it as an input.
        board.configure(pin, PinMode::Input).map_err(|_| ConfigError::PinRejected {
            endpoint: name.into(),
            pin,
        })?;
    }

    if needs_pwm || spec.pwm.is_some() {
        let pwm = require(spec.pwm, name, "PWM")?;
        board
            .configure_pwm(pwm, spec.freq, spec.duty)
            .map_err(|_| ConfigError::PinRejected {
                endpoint: name.into(),
                pin: pwm,
            })?;
    }
    Ok(())
}
