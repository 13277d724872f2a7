//! Unified error types for the PinBridge firmware.
//!
//! A single `Error` enum that every subsystem converts into, keeping the
//! supervisor's fault handling uniform.  The supervisor deliberately does
//! not branch on the kind: every variant is logged and handled by the
//! `exception_*` configuration switches.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible operation in the firmware funnels into this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Configuration is malformed, missing a field, or inconsistent.
    Config(ConfigError),
    /// An endpoint references a function id outside the dispatch table.
    Capability(CapabilityError),
    /// A pin, PWM channel or sensor could not be accessed.
    Hardware(HardwareFault),
    /// The broker session failed.
    Broker(BrokerFault),
    /// Anything else.
    Unclassified(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Capability(e) => write!(f, "capability: {e}"),
            Self::Hardware(e) => write!(f, "hardware: {e}"),
            Self::Broker(e) => write!(f, "broker: {e}"),
            Self::Unclassified(msg) => write!(f, "unclassified: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The configuration document could not be read from its source.
    NotFound(String),
    /// The document is not valid JSON or does not match the schema.
    Parse(String),
    /// A required field is absent.
    Missing(&'static str),
    /// A field is present but its value is unusable.
    Invalid(&'static str),
    /// An endpoint needs a pin (or PWM pin) for its role but has none.
    PinRequired { endpoint: String, role: &'static str },
    /// The board rejected the pin for the requested role.
    PinRejected { endpoint: String, pin: u8 },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(src) => write!(f, "config source '{src}' not found"),
            Self::Parse(msg) => write!(f, "parse error: {msg}"),
            Self::Missing(field) => write!(f, "missing field '{field}'"),
            Self::Invalid(msg) => write!(f, "invalid value: {msg}"),
            Self::PinRequired { endpoint, role } => {
                write!(f, "endpoint '{endpoint}' needs a {role} pin")
            }
            Self::PinRejected { endpoint, pin } => {
                write!(f, "endpoint '{endpoint}': pin {pin} not usable")
            }
        }
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Capability errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapabilityError {
    /// The function id does not name any entry of the dispatch table.
    Unknown { endpoint: String, function: String },
    /// The function exists but cannot serve the role it was bound to
    /// (e.g. a write function configured as the read function).
    WrongRole {
        endpoint: String,
        function: String,
        role: &'static str,
    },
}

impl fmt::Display for CapabilityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown { endpoint, function } => {
                write!(f, "endpoint '{endpoint}': unknown function '{function}'")
            }
            Self::WrongRole {
                endpoint,
                function,
                role,
            } => write!(
                f,
                "endpoint '{endpoint}': function '{function}' cannot be used as {role}"
            ),
        }
    }
}

impl From<CapabilityError> for Error {
    fn from(e: CapabilityError) -> Self {
        Self::Capability(e)
    }
}

// ---------------------------------------------------------------------------
// Hardware faults
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardwareFault {
    /// Pin number is out of range or reserved on this board.
    InvalidPin(u8),
    /// GPIO level read failed.
    GpioReadFailed(u8),
    /// GPIO level write failed.
    GpioWriteFailed(u8),
    /// No free PWM channel or timer for the pin.
    PwmUnavailable(u8),
    /// PWM frequency/duty update was rejected.
    PwmWriteFailed(u8),
    /// Sensor did not answer within its protocol timeout.
    SensorTimeout(u8),
    /// Sensor answered but the frame failed its checksum.
    SensorChecksum(u8),
    /// No sensor driver is available for this measurement.
    SensorUnsupported,
    /// Timer or interrupt registration failed.
    TimerSetupFailed,
}

impl fmt::Display for HardwareFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidPin(p) => write!(f, "invalid pin {p}"),
            Self::GpioReadFailed(p) => write!(f, "GPIO{p} read failed"),
            Self::GpioWriteFailed(p) => write!(f, "GPIO{p} write failed"),
            Self::PwmUnavailable(p) => write!(f, "no PWM channel for GPIO{p}"),
            Self::PwmWriteFailed(p) => write!(f, "PWM update on GPIO{p} failed"),
            Self::SensorTimeout(p) => write!(f, "sensor on GPIO{p} timed out"),
            Self::SensorChecksum(p) => write!(f, "sensor on GPIO{p} checksum mismatch"),
            Self::SensorUnsupported => write!(f, "no sensor driver available"),
            Self::TimerSetupFailed => write!(f, "timer/IRQ setup failed"),
        }
    }
}

impl From<HardwareFault> for Error {
    fn from(e: HardwareFault) -> Self {
        Self::Hardware(e)
    }
}

// ---------------------------------------------------------------------------
// Broker faults
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerFault {
    ConnectFailed,
    NotConnected,
    PublishFailed,
    SubscribeFailed,
    PollFailed,
    DisconnectFailed,
}

impl fmt::Display for BrokerFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectFailed => write!(f, "connect failed"),
            Self::NotConnected => write!(f, "session not connected"),
            Self::PublishFailed => write!(f, "publish failed"),
            Self::SubscribeFailed => write!(f, "subscribe failed"),
            Self::PollFailed => write!(f, "poll failed"),
            Self::DisconnectFailed => write!(f, "disconnect failed"),
        }
    }
}

impl From<BrokerFault> for Error {
    fn from(e: BrokerFault) -> Self {
        Self::Broker(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
