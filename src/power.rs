//! Power transition between supervisor cycles.

use embedded_hal::delay::DelayNs;
use log::{debug, info, warn};

use crate::app::ports::{BrokerSession, SystemPort};
use crate::config::{DeviceConfig, SleepType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerMode {
    /// Busy-wait on the delay provider.
    Wait,
    /// Halt until the next interrupt.
    Idle,
    /// Light sleep; RAM and peripheral state kept.
    LightSleep,
    /// Power down; the next cycle is a fresh boot.
    DeepSleep,
}

impl From<SleepType> for PowerMode {
    fn from(t: SleepType) -> Self {
        match t {
            SleepType::Wait => Self::Wait,
            SleepType::Idle => Self::Idle,
            SleepType::Sleep => Self::LightSleep,
            SleepType::DeepSleep => Self::DeepSleep,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PowerScheduler {
    mode: PowerMode,
    sleep_time_ms: u32,
    /// Edge-triggered inputs that may end a light sleep.
    wake_pins: Vec<u8>,
}

impl PowerScheduler {
    pub fn new(mode: PowerMode, sleep_time_ms: u32) -> Self {
        Self {
            mode,
            sleep_time_ms,
            wake_pins: Vec::new(),
        }
    }

    pub fn from_config(config: &DeviceConfig) -> Self {
        Self::new(config.sleep_type.into(), config.sleep_time)
    }

    pub fn mode(&self) -> PowerMode {
        self.mode
    }

    pub fn set_wake_pins(&mut self, pins: Vec<u8>) {
        self.wake_pins = pins;
    }

    pub fn wake_pins(&self) -> &[u8] {
        &self.wake_pins
    }

    /// Enter the configured mode.
    ///
    /// Deep sleep closes an open broker session before powering down; a
    /// failing disconnect is logged and the transition continues.
    pub fn enter(
        &self,
        broker: &mut impl BrokerSession,
        system: &mut impl SystemPort,
        delay: &mut impl DelayNs,
    ) {
        match self.mode {
            PowerMode::Wait => {
                debug!("Waiting {} ms", self.sleep_time_ms);
                delay.delay_ms(self.sleep_time_ms);
            }
            PowerMode::Idle => system.idle(),
            PowerMode::LightSleep => {
                debug!("Light sleep {} ms, wake pins {:?}", self.sleep_time_ms, self.wake_pins);
                system.light_sleep(self.sleep_time_ms, &self.wake_pins);
            }
            PowerMode::DeepSleep => {
                if broker.is_connected() {
                    if let Err(e) = broker.disconnect() {
                        warn!("Broker disconnect before deep sleep failed: {e}");
                    }
                }
                let wake = (self.sleep_time_ms > 0).then_some(self.sleep_time_ms);
                info!("Deep sleep (wake after {wake:?} ms)");
                system.deep_sleep(wake);
            }
        }
    }
}
