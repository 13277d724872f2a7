//! Port traits: the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ Endpoint / Bridge / SupervisorLoop
//! ```
//!
//! Driven adapters (board, broker, timers, system power, config storage,
//! event sinks) implement these traits.  The domain consumes them via
//! generics, so nothing outside `adapters` and `drivers` touches hardware.
//!
//! ## Context rules
//!
//! - [`BoardPort`] methods take `&self` and may be called from interrupt
//!   or timer-callback context (endpoint reads run there).
//! - [`BrokerSession`], [`SystemPort`] and [`ConfigSource`] are main-loop
//!   only.  Every call may block; none may be issued from a callback.

use crate::endpoint::reading::ProbeTemperatures;
use crate::error::{BrokerFault, ConfigError, HardwareFault};

// ───────────────────────────────────────────────────────────────
// Board ports (driven adapter: domain ↔ pins, PWM, sensors, clock)
// ───────────────────────────────────────────────────────────────

/// Direction a pin is configured for at endpoint construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinMode {
    /// Input only (status reads, edge interrupts).
    Input,
    /// Input/output: the level can be driven and read back.
    InputOutput,
    /// Handed to a sensor driver (DHT single-wire, one-wire bus).
    SensorBus,
}

/// Digital pin access.
pub trait GpioPort: Send + Sync {
    /// Validate and configure a pin for `mode`.
    fn configure(&self, pin: u8, mode: PinMode) -> Result<(), HardwareFault>;

    /// Current logic level (`true` = high).
    fn level(&self, pin: u8) -> Result<bool, HardwareFault>;

    /// Drive the pin to `high`.
    fn set_level(&self, pin: u8, high: bool) -> Result<(), HardwareFault>;
}

/// PWM channel access, addressed by output pin.
pub trait PwmPort: Send + Sync {
    /// Claim a PWM channel for `pin` with the initial frequency and duty.
    fn configure_pwm(&self, pin: u8, freq_hz: u32, duty: u32) -> Result<(), HardwareFault>;

    fn freq(&self, pin: u8) -> Result<u32, HardwareFault>;

    fn set_freq(&self, pin: u8, freq_hz: u32) -> Result<(), HardwareFault>;

    /// Duty on the 10-bit scale (0–1023).
    fn duty(&self, pin: u8) -> Result<u32, HardwareFault>;

    fn set_duty(&self, pin: u8, duty: u32) -> Result<(), HardwareFault>;
}

/// DHT sensor family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DhtModel {
    Dht11,
    Dht22,
}

/// Decoded climate measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClimateSample {
    pub temperature_c: f32,
    pub humidity_pct: f32,
}

/// Sensor drivers.  Both calls block for the duration of the bus
/// transaction and fail with a [`HardwareFault`] on timeout or checksum.
pub trait SensorDriverPort: Send + Sync {
    fn measure_dht(&self, pin: u8, model: DhtModel) -> Result<ClimateSample, HardwareFault>;

    /// Scan the one-wire bus on `pin`, convert, and return every probe's
    /// temperature in scan order.
    fn measure_onewire(&self, pin: u8) -> Result<ProbeTemperatures, HardwareFault>;
}

/// Monotonic millisecond clock.
pub trait ClockPort: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// Everything an [`Endpoint`](crate::endpoint::Endpoint) needs from the board.
pub trait BoardPort: GpioPort + PwmPort + SensorDriverPort + ClockPort {}

impl<T: GpioPort + PwmPort + SensorDriverPort + ClockPort> BoardPort for T {}

// ───────────────────────────────────────────────────────────────
// Timer port (driven adapter: domain → hardware timers / IRQs)
// ───────────────────────────────────────────────────────────────

/// Callback invoked from timer or interrupt context.
pub type Callback = Box<dyn Fn() + Send + Sync + 'static>;

/// Periodic timers and edge interrupts.  Callbacks must stay short and
/// never touch the broker session.
pub trait TimerPort {
    /// Invoke `callback` every `period_ms` milliseconds until reset.
    fn every(&mut self, period_ms: u32, callback: Callback) -> Result<(), HardwareFault>;

    /// Invoke `callback` on each falling edge of `pin`.
    fn on_falling_edge(&mut self, pin: u8, callback: Callback) -> Result<(), HardwareFault>;

    /// Stop every timer and detach every interrupt registered so far.
    fn cancel_all(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Broker session (driven adapter: domain ↔ message broker)
// ───────────────────────────────────────────────────────────────

/// An incoming or outgoing broker message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub topic: String,
    pub payload: Vec<u8>,
    pub retain: bool,
}

/// Pub/sub session.  Implementations never retry internally: every
/// failure is reported and the caller decides.
pub trait BrokerSession {
    fn connect(&mut self, clean_session: bool) -> Result<(), BrokerFault>;

    fn is_connected(&self) -> bool;

    /// Sessions established so far, counting ones the client re-established
    /// on its own after a drop.  A change means broker-side subscriptions
    /// may be gone.
    fn session(&self) -> u32;

    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<(), BrokerFault>;

    /// Register interest in `topic`.
    fn subscribe(&mut self, topic: &str) -> Result<(), BrokerFault>;

    /// Non-blocking: return one pending message on `topic`, if any.
    fn poll(&mut self, topic: &str) -> Result<Option<Message>, BrokerFault>;

    fn disconnect(&mut self) -> Result<(), BrokerFault>;
}

// ───────────────────────────────────────────────────────────────
// System port (driven adapter: domain → power / reset / memory)
// ───────────────────────────────────────────────────────────────

/// Heap figures for health telemetry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryInfo {
    pub free: u32,
    pub allocated: u32,
}

/// Chip-level power and lifecycle primitives.
pub trait SystemPort {
    /// Milliseconds since boot.
    fn uptime_ms(&self) -> u64;

    fn memory(&self) -> MemoryInfo;

    /// Halt the CPU until the next interrupt.
    fn idle(&mut self);

    /// Light sleep for up to `duration_ms`; peripherals suspended, RAM
    /// kept.  A low level on any of `wake_pins` ends the sleep early.
    fn light_sleep(&mut self, duration_ms: u32, wake_pins: &[u8]);

    /// Arm the wake timer (if `wake_after_ms` is `Some`) and power down.
    /// On hardware this never returns: the chip restarts on wake.
    fn deep_sleep(&mut self, wake_after_ms: Option<u32>);

    /// Full hardware reset.  Never returns on hardware.
    fn restart(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Configuration source (driven adapter: domain ← persistent config)
// ───────────────────────────────────────────────────────────────

/// Reads raw configuration documents by name (e.g. `a4cf12b3c4d5.json`).
pub trait ConfigSource {
    fn read(&self, name: &str) -> Result<String, ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging)
// ───────────────────────────────────────────────────────────────

/// The supervisor emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}
