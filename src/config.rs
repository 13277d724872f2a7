//! Layered device configuration.
//!
//! The compiled-in [`DEFAULT_CONFIG`] document is deep-merged with the
//! per-device override `<device-id>.json`, then validated into a
//! [`DeviceConfig`].  Endpoint specs keep the order they appear in under
//! `device`; that order is the registry and service order.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::app::ports::ConfigSource;
use crate::error::{ConfigError, Result};

/// Built-in defaults every device override is merged onto.
pub const DEFAULT_CONFIG: &str = r#"{
    "sleep_type": "wait",
    "sleep_time": 60000,
    "exception_wait": 10,
    "exception_raise": false,
    "exception_reset": true,
    "exception_exit": false,
    "publish_health": true,
    "publish": {
        "port": 1883,
        "interval": 30,
        "keepalive": 0,
        "clean_session": true,
        "retain": false
    },
    "subscribe": {
        "interval": 10
    },
    "device": {}
}"#;

/// Default PWM frequency (Hz) for endpoints that declare a PWM pin.
pub const DEFAULT_PWM_FREQ: u32 = 1000;
/// Default PWM duty (10-bit scale; clamped by the board).
pub const DEFAULT_PWM_DUTY: u32 = 1024;

// ── Merge ─────────────────────────────────────────────────────

/// Deep-merge `overlay` into `base`.
///
/// Mappings are merged key by key, recursively.  Equal leaves are left
/// alone, differing leaves take the overlay value, overlay-only keys are
/// appended.  Merging the same overlay twice changes nothing.
pub fn merge(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, overlay) => {
            if base != overlay {
                *base = overlay.clone();
            }
        }
    }
}

// ── Schema ────────────────────────────────────────────────────

/// What the supervisor does between cycles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SleepType {
    #[default]
    Wait,
    Idle,
    Sleep,
    #[serde(rename = "deepsleep")]
    DeepSleep,
}

/// Global broker / publish settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PublishConfig {
    #[serde(default)]
    pub server: String,
    pub port: u16,
    #[serde(default)]
    pub topic_base: Option<String>,
    /// Seconds between publish cycles.
    pub interval: u32,
    /// Broker keepalive in seconds (0 disables).
    pub keepalive: u16,
    pub clean_session: bool,
    pub retain: bool,
}

/// Global subscribe settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SubscribeConfig {
    #[serde(default)]
    pub topic_base: Option<String>,
    /// Seconds between subscribe polls.
    pub interval: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ReadSpec {
    #[serde(default)]
    pub function: Option<String>,
    /// Trigger on the falling edge of the endpoint pin instead of a timer.
    #[serde(default)]
    pub irq: bool,
    /// Seconds between reads when not IRQ-driven.
    #[serde(default)]
    pub interval: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct EndpointPublishSpec {
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub topic_base: Option<String>,
    #[serde(default)]
    pub interval: Option<u32>,
    #[serde(default)]
    pub retain: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EndpointSubscribeSpec {
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub topic_base: Option<String>,
    #[serde(default)]
    pub interval: Option<u32>,
    #[serde(default)]
    pub function: Option<String>,
    /// Publish the record produced by a write back on the data topic.
    #[serde(default = "default_true")]
    pub echo: bool,
}

impl Default for EndpointSubscribeSpec {
    fn default() -> Self {
        Self {
            topic: None,
            topic_base: None,
            interval: None,
            function: None,
            echo: true,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_freq() -> u32 {
    DEFAULT_PWM_FREQ
}

fn default_duty() -> u32 {
    DEFAULT_PWM_DUTY
}

/// Body of one `device.<name>` entry.
#[derive(Debug, Clone, Deserialize)]
struct EndpointBody {
    #[serde(default)]
    pin: Option<u8>,
    #[serde(default)]
    pwm: Option<u8>,
    #[serde(default = "default_freq")]
    freq: u32,
    #[serde(default = "default_duty")]
    duty: u32,
    #[serde(default)]
    read: Option<ReadSpec>,
    #[serde(default)]
    publish: Option<EndpointPublishSpec>,
    #[serde(default)]
    subscribe: Option<EndpointSubscribeSpec>,
    #[serde(default)]
    function_sample: Option<String>,
    #[serde(default)]
    oneshot: bool,
}

/// One configured endpoint, in configuration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointSpec {
    pub name: String,
    pub pin: Option<u8>,
    pub pwm: Option<u8>,
    pub freq: u32,
    pub duty: u32,
    pub read: Option<ReadSpec>,
    pub publish: Option<EndpointPublishSpec>,
    pub subscribe: Option<EndpointSubscribeSpec>,
    pub function_sample: Option<String>,
    pub oneshot: bool,
}

impl EndpointSpec {
    /// Minimal spec with only a name; used by tests and programmatic setups.
    pub fn named(name: &str) -> Self {
        Self {
            name: name.into(),
            pin: None,
            pwm: None,
            freq: DEFAULT_PWM_FREQ,
            duty: DEFAULT_PWM_DUTY,
            read: None,
            publish: None,
            subscribe: None,
            function_sample: None,
            oneshot: false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    sleep_type: SleepType,
    sleep_time: u32,
    exception_wait: u32,
    exception_raise: bool,
    exception_reset: bool,
    exception_exit: bool,
    publish_health: bool,
    #[serde(default)]
    friendly_name: Option<String>,
    publish: PublishConfig,
    subscribe: SubscribeConfig,
    device: Map<String, Value>,
}

/// Validated device configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    pub device_id: String,
    pub sleep_type: SleepType,
    /// Milliseconds spent in the power transition.
    pub sleep_time: u32,
    /// Seconds to wait after a handled fault.
    pub exception_wait: u32,
    pub exception_raise: bool,
    pub exception_reset: bool,
    pub exception_exit: bool,
    pub publish_health: bool,
    pub friendly_name: String,
    pub publish: PublishConfig,
    pub subscribe: SubscribeConfig,
    pub devices: Vec<EndpointSpec>,
}

/// Values an endpoint falls back to when its own spec is silent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointDefaults {
    pub device_id: String,
    pub publish_topic_base: Option<String>,
    pub subscribe_topic_base: Option<String>,
    /// Seconds.
    pub publish_interval: u32,
    pub retain: bool,
    /// Seconds.
    pub subscribe_interval: u32,
}

impl EndpointDefaults {
    /// Defaults for a device with no global overrides.
    pub fn for_device(device_id: &str) -> Self {
        Self {
            device_id: device_id.into(),
            publish_topic_base: None,
            subscribe_topic_base: None,
            publish_interval: 30,
            retain: false,
            subscribe_interval: 10,
        }
    }

    /// Resolve a topic base: the endpoint's own, else `global`, else
    /// `esp/<device-id>`.  `{0}` is replaced by the device id.
    pub fn topic_base(&self, own: Option<&str>, global: Option<&str>) -> String {
        let base = own
            .or(global)
            .map(str::to_owned)
            .unwrap_or_else(|| format!("esp/{}", self.device_id));
        base.replace("{0}", &self.device_id)
    }
}

impl DeviceConfig {
    pub fn endpoint_defaults(&self) -> EndpointDefaults {
        EndpointDefaults {
            device_id: self.device_id.clone(),
            publish_topic_base: self.publish.topic_base.clone(),
            subscribe_topic_base: self.subscribe.topic_base.clone(),
            publish_interval: self.publish.interval,
            retain: self.publish.retain,
            subscribe_interval: self.subscribe.interval,
        }
    }

    /// `<publish topic base>/health`.
    pub fn health_topic(&self) -> String {
        let base = self
            .endpoint_defaults()
            .topic_base(None, self.publish.topic_base.as_deref());
        format!("{base}/health")
    }

    /// Parse and validate a fully merged document.
    pub fn from_value(device_id: &str, doc: Value) -> Result<Self> {
        let raw: RawConfig =
            serde_json::from_value(doc).map_err(|e| ConfigError::Parse(e.to_string()))?;

        if raw.publish.server.trim().is_empty() {
            return Err(ConfigError::Missing("publish.server").into());
        }
        if raw.publish.interval == 0 {
            return Err(ConfigError::Invalid("publish.interval must be > 0").into());
        }
        if raw.subscribe.interval == 0 {
            return Err(ConfigError::Invalid("subscribe.interval must be > 0").into());
        }

        let force_oneshot = raw.sleep_type == SleepType::DeepSleep;
        let mut devices = Vec::with_capacity(raw.device.len());
        for (name, body) in raw.device {
            devices.push(endpoint_spec(name, body, force_oneshot)?);
        }

        Ok(Self {
            device_id: device_id.into(),
            sleep_type: raw.sleep_type,
            sleep_time: raw.sleep_time,
            exception_wait: raw.exception_wait,
            exception_raise: raw.exception_raise,
            exception_reset: raw.exception_reset,
            exception_exit: raw.exception_exit,
            publish_health: raw.publish_health,
            friendly_name: raw.friendly_name.unwrap_or_else(|| device_id.into()),
            publish: raw.publish,
            subscribe: raw.subscribe,
            devices,
        })
    }
}

fn endpoint_spec(name: String, body: Value, force_oneshot: bool) -> Result<EndpointSpec> {
    if name.trim().is_empty() {
        return Err(ConfigError::Invalid("endpoint name must not be empty").into());
    }
    if !body.is_object() {
        return Err(ConfigError::Parse(format!("endpoint '{name}' must be a mapping")).into());
    }
    let body: EndpointBody = serde_json::from_value(body)
        .map_err(|e| ConfigError::Parse(format!("endpoint '{name}': {e}")))?;

    let intervals = [
        body.read.as_ref().and_then(|r| r.interval),
        body.publish.as_ref().and_then(|p| p.interval),
        body.subscribe.as_ref().and_then(|s| s.interval),
    ];
    if intervals.contains(&Some(0)) {
        return Err(ConfigError::Invalid("endpoint intervals must be > 0").into());
    }

    Ok(EndpointSpec {
        name,
        pin: body.pin,
        pwm: body.pwm,
        freq: body.freq,
        duty: body.duty,
        read: body.read,
        publish: body.publish,
        subscribe: body.subscribe,
        function_sample: body.function_sample,
        oneshot: body.oneshot || force_oneshot,
    })
}

// ── Store ─────────────────────────────────────────────────────

/// Loads the device configuration from a [`ConfigSource`].
#[derive(Debug, Clone)]
pub struct ConfigStore {
    device_id: String,
}

impl ConfigStore {
    pub fn new(device_id: &str) -> Self {
        Self {
            device_id: device_id.into(),
        }
    }

    /// Name of the per-device override document.
    pub fn document_name(&self) -> String {
        format!("{}.json", self.device_id)
    }

    /// Read `<device-id>.json`, merge it over the defaults and validate.
    pub fn load(&self, source: &impl ConfigSource) -> Result<DeviceConfig> {
        let text = source.read(&self.document_name())?;
        self.load_str(&text)
    }

    pub fn load_str(&self, overlay: &str) -> Result<DeviceConfig> {
        let overlay: Value =
            serde_json::from_str(overlay).map_err(|e| ConfigError::Parse(e.to_string()))?;
        if !overlay.is_object() {
            return Err(ConfigError::Parse("top level must be a mapping".into()).into());
        }
        let mut doc: Value = serde_json::from_str(DEFAULT_CONFIG)
            .map_err(|e| ConfigError::Parse(e.to_string()))?;
        merge(&mut doc, &overlay);
        log::debug!("Merged configuration for {}", self.device_id);
        DeviceConfig::from_value(&self.device_id, doc)
    }
}
