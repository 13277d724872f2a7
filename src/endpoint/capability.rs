//! Fixed capability set and the dispatch table endpoints resolve against.
//!
//! Configuration names functions by id (`read_status`, `write_pwm`, …).
//! Every id is resolved to a [`Capability`] once, when the endpoint is
//! built; an id that is not in the table fails construction instead of
//! failing on first use.

use crate::app::ports::PinMode;
use crate::error::CapabilityError;

/// Every function an endpoint can bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    ReadStatus,
    ReadDht11,
    ReadDht22,
    ReadOnewireTemperature,
    ReadPwm,
    WriteStatus,
    WritePwm,
    ToggleStatus,
    SampleRate,
}

/// The slot a capability is bound into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Read,
    Write,
    Sample,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read function",
            Self::Write => "write function",
            Self::Sample => "sample function",
        }
    }
}

/// Hardware a capability needs on its endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinRequirement {
    Gpio(PinMode),
    Pwm,
    Nothing,
}

impl Capability {
    pub const ALL: [Self; 9] = [
        Self::ReadStatus,
        Self::ReadDht11,
        Self::ReadDht22,
        Self::ReadOnewireTemperature,
        Self::ReadPwm,
        Self::WriteStatus,
        Self::WritePwm,
        Self::ToggleStatus,
        Self::SampleRate,
    ];

    /// Canonical configuration id.
    pub fn id(self) -> &'static str {
        match self {
            Self::ReadStatus => "read_status",
            Self::ReadDht11 => "read_dht11",
            Self::ReadDht22 => "read_dht22",
            Self::ReadOnewireTemperature => "read_ds18x20",
            Self::ReadPwm => "read_pwm",
            Self::WriteStatus => "write_status",
            Self::WritePwm => "write_pwm",
            Self::ToggleStatus => "toggle_status",
            Self::SampleRate => "sample_rpm",
        }
    }

    /// Resolve a configuration id, including accepted aliases.
    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            "read_onewire" => Some(Self::ReadOnewireTemperature),
            "sample_rate" => Some(Self::SampleRate),
            _ => Self::ALL.into_iter().find(|c| c.id() == id),
        }
    }

    /// Whether this capability may be bound into `role`.
    ///
    /// Toggling is an actuator action that also yields a status record,
    /// so it serves both as a periodic read and as a write handler.
    pub fn serves(self, role: Role) -> bool {
        match self {
            Self::ReadStatus
            | Self::ReadDht11
            | Self::ReadDht22
            | Self::ReadOnewireTemperature
            | Self::ReadPwm => role == Role::Read,
            Self::WriteStatus | Self::WritePwm => role == Role::Write,
            Self::ToggleStatus => matches!(role, Role::Read | Role::Write),
            Self::SampleRate => role == Role::Sample,
        }
    }

    pub fn requirement(self) -> PinRequirement {
        match self {
            Self::ReadStatus => PinRequirement::Gpio(PinMode::Input),
            Self::ReadDht11 | Self::ReadDht22 | Self::ReadOnewireTemperature => {
                PinRequirement::Gpio(PinMode::SensorBus)
            }
            Self::WriteStatus | Self::ToggleStatus => PinRequirement::Gpio(PinMode::InputOutput),
            Self::ReadPwm | Self::WritePwm => PinRequirement::Pwm,
            Self::SampleRate => PinRequirement::Nothing,
        }
    }
}

/// The set of capabilities available to endpoints on this build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityTable {
    entries: heapless::Vec<Capability, 9>,
}

impl Default for CapabilityTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl CapabilityTable {
    /// Every capability.
    pub fn standard() -> Self {
        Self::only(&Capability::ALL)
    }

    /// A restricted table (boards without sensor support, tests).
    pub fn only(capabilities: &[Capability]) -> Self {
        let mut entries = heapless::Vec::new();
        for c in capabilities {
            if !entries.contains(c) {
                let _ = entries.push(*c);
            }
        }
        Self { entries }
    }

    /// Look up an id without any role check.
    pub fn lookup(&self, id: &str) -> Option<Capability> {
        Capability::from_id(id).filter(|c| self.entries.contains(c))
    }

    /// Resolve `function` for `endpoint` into `role`, failing closed.
    pub fn resolve(
        &self,
        endpoint: &str,
        function: &str,
        role: Role,
    ) -> Result<Capability, CapabilityError> {
        let cap = self.lookup(function).ok_or_else(|| CapabilityError::Unknown {
            endpoint: endpoint.into(),
            function: function.into(),
        })?;
        if cap.serves(role) {
            Ok(cap)
        } else {
            Err(CapabilityError::WrongRole {
                endpoint: endpoint.into(),
                function: function.into(),
                role: role.as_str(),
            })
        }
    }

    pub fn contains(&self, cap: Capability) -> bool {
        self.entries.contains(&cap)
    }
}
