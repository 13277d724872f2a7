//! Reading records and control-payload parsing.
//!
//! Every reading serialises to one flat JSON object; the shape depends on
//! the capability that produced it.

use serde::Deserialize;
use serde::Serialize;
use serde::ser::SerializeMap;
use serde_json::Value;

use crate::error::{Error, Result};

/// Maximum number of one-wire probes reported per reading.
pub const MAX_PROBES: usize = 8;

/// One record produced by a read, write, toggle or sample function.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Reading {
    /// DHT11 / DHT22 climate sensor.
    Climate { temperature: f32, humidity: f32 },
    /// Digital pin level.  Echoed writes keep the value exactly as the
    /// control payload carried it (e.g. `"1"`).
    Status { value: Value },
    /// PWM readback.
    Pwm { freq: u32, duty: u32 },
    /// Rate sample computed from the event counter.
    Rate {
        rounds: u32,
        sample: f32,
        rps: f32,
        rpm: f32,
    },
    /// One-wire temperature probes, keyed `temperature0`, `temperature1`, …
    Probes(ProbeTemperatures),
}

impl Reading {
    /// Digital status reading from a pin level.
    pub fn status(high: bool) -> Self {
        Self::Status {
            value: Value::from(u8::from(high)),
        }
    }

    /// Serialise to the wire payload.
    pub fn to_payload(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|_| Error::Unclassified("reading serialisation failed"))
    }
}

/// Fixed-capacity set of probe temperatures in bus scan order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProbeTemperatures(pub heapless::Vec<f32, MAX_PROBES>);

impl Serialize for ProbeTemperatures {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (i, t) in self.0.iter().enumerate() {
            map.serialize_entry(&format!("temperature{i}"), t)?;
        }
        map.end()
    }
}

// ── Control payloads ──────────────────────────────────────────

/// Parse a digital-output control payload.
///
/// Accepts `{"value": v}` or a bare scalar `v`, where `v` is a boolean,
/// an integer, or a string holding an integer.  Returns the requested
/// level and the value as received (for the echo record).
pub fn parse_level(payload: &[u8]) -> Option<(bool, Value)> {
    let doc: Value = serde_json::from_slice(payload).ok()?;
    let value = match doc {
        Value::Object(mut obj) => obj.remove("value")?,
        scalar => scalar,
    };
    let high = match &value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_i64()? != 0,
        Value::String(s) => s.trim().parse::<i64>().ok()? != 0,
        _ => return None,
    };
    Some((high, value))
}

/// Partial PWM update: absent fields are left untouched.  A zero
/// frequency is ignored; a zero duty switches the output off.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct PwmUpdate {
    #[serde(default)]
    pub freq: Option<u32>,
    #[serde(default)]
    pub duty: Option<u32>,
}

impl PwmUpdate {
    /// Parse a `{freq, duty}` payload.  `None` if the payload is not an
    /// object or carries neither field.
    pub fn parse(payload: &[u8]) -> Option<Self> {
        let update: Self = serde_json::from_slice(payload).ok()?;
        let update = Self {
            freq: update.freq.filter(|f| *f > 0),
            duty: update.duty,
        };
        (update.freq.is_some() || update.duty.is_some()).then_some(update)
    }
}
