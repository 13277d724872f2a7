//! Board adapter: pins, PWM, sensors and clock behind [`BoardPort`].
//!
//! The only module outside `drivers` that touches peripherals.  On
//! non-espidf targets it keeps pin and PWM state in memory so the whole
//! stack can run on the host.
//!
//! Sensor decoding is delegated to a [`SensorDriverPort`] supplied at
//! construction; [`NoSensorDriver`] reports every measurement as
//! unsupported.

use core::cell::RefCell;
#[cfg(not(target_os = "espidf"))]
use std::sync::Mutex;

use critical_section::Mutex as CsMutex;

use crate::adapters::time::TimeAdapter;
use crate::app::ports::{
    ClimateSample, ClockPort, DhtModel, GpioPort, PinMode, PwmPort, SensorDriverPort,
};
use crate::endpoint::reading::ProbeTemperatures;
use crate::error::HardwareFault;

#[cfg(target_os = "espidf")]
use crate::drivers::{gpio, ledc};

/// Full-scale PWM duty.
pub const DUTY_MAX: u32 = 1023;

// ───────────────────────────────────────────────────────────────
// Sensors
// ───────────────────────────────────────────────────────────────

/// Sensor driver for boards without DHT / one-wire support.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSensorDriver;

impl SensorDriverPort for NoSensorDriver {
    fn measure_dht(&self, _pin: u8, _model: DhtModel) -> Result<ClimateSample, HardwareFault> {
        Err(HardwareFault::SensorUnsupported)
    }

    fn measure_onewire(&self, _pin: u8) -> Result<ProbeTemperatures, HardwareFault> {
        Err(HardwareFault::SensorUnsupported)
    }
}

// ───────────────────────────────────────────────────────────────
// Board adapter
// ───────────────────────────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
#[derive(Default)]
struct SimPins {
    levels: std::collections::HashMap<u8, bool>,
    modes: std::collections::HashMap<u8, PinMode>,
    pwm: std::collections::HashMap<u8, (u32, u32)>,
}

/// Highest GPIO number accepted by the simulation (ESP32-S3 has 0–48).
#[cfg(not(target_os = "espidf"))]
const SIM_MAX_GPIO: u8 = 48;

pub struct BoardAdapter<S: SensorDriverPort = NoSensorDriver> {
    clock: TimeAdapter,
    sensors: S,
    /// LEDC slot index → PWM pin.  Read from interrupt context by
    /// `read_pwm` endpoints, so guarded by a critical section.
    pwm_slots: CsMutex<RefCell<heapless::Vec<u8, 4>>>,
    #[cfg(not(target_os = "espidf"))]
    sim: Mutex<SimPins>,
}

impl BoardAdapter<NoSensorDriver> {
    pub fn new() -> Self {
        Self::with_sensors(NoSensorDriver)
    }
}

impl Default for BoardAdapter<NoSensorDriver> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: SensorDriverPort> BoardAdapter<S> {
    pub fn with_sensors(sensors: S) -> Self {
        Self {
            clock: TimeAdapter::new(),
            sensors,
            pwm_slots: CsMutex::new(RefCell::new(heapless::Vec::new())),
            #[cfg(not(target_os = "espidf"))]
            sim: Mutex::new(SimPins::default()),
        }
    }

    fn slot(&self, pin: u8) -> Result<u8, HardwareFault> {
        critical_section::with(|cs| {
            self.pwm_slots
                .borrow_ref(cs)
                .iter()
                .position(|p| *p == pin)
                .map(|i| i as u8)
                .ok_or(HardwareFault::PwmUnavailable(pin))
        })
    }

    fn claim_slot(&self, pin: u8) -> Result<u8, HardwareFault> {
        critical_section::with(|cs| {
            let mut slots = self.pwm_slots.borrow_ref_mut(cs);
            if let Some(i) = slots.iter().position(|p| *p == pin) {
                return Ok(i as u8);
            }
            slots.push(pin).map_err(|_| HardwareFault::PwmUnavailable(pin))?;
            Ok((slots.len() - 1) as u8)
        })
    }

    /// Simulation: drive an input pin from outside (button, sensor line).
    #[cfg(not(target_os = "espidf"))]
    pub fn sim_set_level(&self, pin: u8, high: bool) {
        if let Ok(mut sim) = self.sim.lock() {
            sim.levels.insert(pin, high);
        }
    }

    /// Simulation: the mode a pin was configured for.
    #[cfg(not(target_os = "espidf"))]
    pub fn sim_mode(&self, pin: u8) -> Option<PinMode> {
        self.sim.lock().ok()?.modes.get(&pin).copied()
    }
}

// ── GpioPort ──────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
impl<S: SensorDriverPort> GpioPort for BoardAdapter<S> {
    fn configure(&self, pin: u8, mode: PinMode) -> Result<(), HardwareFault> {
        gpio::configure(pin, mode)
    }

    fn level(&self, pin: u8) -> Result<bool, HardwareFault> {
        gpio::check_pin(pin)?;
        Ok(gpio::level(pin))
    }

    fn set_level(&self, pin: u8, high: bool) -> Result<(), HardwareFault> {
        gpio::set_level(pin, high)
    }
}

#[cfg(not(target_os = "espidf"))]
impl<S: SensorDriverPort> GpioPort for BoardAdapter<S> {
    fn configure(&self, pin: u8, mode: PinMode) -> Result<(), HardwareFault> {
        if pin > SIM_MAX_GPIO {
            return Err(HardwareFault::InvalidPin(pin));
        }
        let mut sim = self.sim.lock().map_err(|_| HardwareFault::InvalidPin(pin))?;
        sim.modes.insert(pin, mode);
        sim.levels.entry(pin).or_insert(false);
        Ok(())
    }

    fn level(&self, pin: u8) -> Result<bool, HardwareFault> {
        let sim = self.sim.lock().map_err(|_| HardwareFault::GpioReadFailed(pin))?;
        sim.levels
            .get(&pin)
            .copied()
            .ok_or(HardwareFault::GpioReadFailed(pin))
    }

    fn set_level(&self, pin: u8, high: bool) -> Result<(), HardwareFault> {
        let mut sim = self.sim.lock().map_err(|_| HardwareFault::GpioWriteFailed(pin))?;
        match sim.modes.get(&pin) {
            Some(PinMode::InputOutput | PinMode::SensorBus) => {
                sim.levels.insert(pin, high);
                Ok(())
            }
            _ => Err(HardwareFault::GpioWriteFailed(pin)),
        }
    }
}

// ── PwmPort ───────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
impl<S: SensorDriverPort> PwmPort for BoardAdapter<S> {
    fn configure_pwm(&self, pin: u8, freq_hz: u32, duty: u32) -> Result<(), HardwareFault> {
        gpio::check_pin(pin)?;
        let slot = self.claim_slot(pin)?;
        ledc::attach(slot, pin, freq_hz, duty.min(DUTY_MAX))
    }

    fn freq(&self, pin: u8) -> Result<u32, HardwareFault> {
        Ok(ledc::freq(self.slot(pin)?))
    }

    fn set_freq(&self, pin: u8, freq_hz: u32) -> Result<(), HardwareFault> {
        ledc::set_freq(self.slot(pin)?, pin, freq_hz)
    }

    fn duty(&self, pin: u8) -> Result<u32, HardwareFault> {
        Ok(ledc::duty(self.slot(pin)?))
    }

    fn set_duty(&self, pin: u8, duty: u32) -> Result<(), HardwareFault> {
        ledc::set_duty(self.slot(pin)?, pin, duty.min(DUTY_MAX))
    }
}

#[cfg(not(target_os = "espidf"))]
impl<S: SensorDriverPort> PwmPort for BoardAdapter<S> {
    fn configure_pwm(&self, pin: u8, freq_hz: u32, duty: u32) -> Result<(), HardwareFault> {
        if pin > SIM_MAX_GPIO {
            return Err(HardwareFault::InvalidPin(pin));
        }
        self.claim_slot(pin)?;
        let mut sim = self.sim.lock().map_err(|_| HardwareFault::PwmUnavailable(pin))?;
        sim.pwm.insert(pin, (freq_hz, duty.min(DUTY_MAX)));
        Ok(())
    }

    fn freq(&self, pin: u8) -> Result<u32, HardwareFault> {
        self.sim_pwm(pin).map(|(f, _)| f)
    }

    fn set_freq(&self, pin: u8, freq_hz: u32) -> Result<(), HardwareFault> {
        self.sim_pwm_update(pin, |state| state.0 = freq_hz)
    }

    fn duty(&self, pin: u8) -> Result<u32, HardwareFault> {
        self.sim_pwm(pin).map(|(_, d)| d)
    }

    fn set_duty(&self, pin: u8, duty: u32) -> Result<(), HardwareFault> {
        self.sim_pwm_update(pin, |state| state.1 = duty.min(DUTY_MAX))
    }
}

#[cfg(not(target_os = "espidf"))]
impl<S: SensorDriverPort> BoardAdapter<S> {
    fn sim_pwm(&self, pin: u8) -> Result<(u32, u32), HardwareFault> {
        let sim = self.sim.lock().map_err(|_| HardwareFault::PwmUnavailable(pin))?;
        sim.pwm.get(&pin).copied().ok_or(HardwareFault::PwmUnavailable(pin))
    }

    fn sim_pwm_update(
        &self,
        pin: u8,
        f: impl FnOnce(&mut (u32, u32)),
    ) -> Result<(), HardwareFault> {
        let mut sim = self.sim.lock().map_err(|_| HardwareFault::PwmWriteFailed(pin))?;
        let state = sim.pwm.get_mut(&pin).ok_or(HardwareFault::PwmUnavailable(pin))?;
        f(state);
        Ok(())
    }
}

// ── Sensors / clock ───────────────────────────────────────────

impl<S: SensorDriverPort> SensorDriverPort for BoardAdapter<S> {
    fn measure_dht(&self, pin: u8, model: DhtModel) -> Result<ClimateSample, HardwareFault> {
        self.sensors.measure_dht(pin, model)
    }

    fn measure_onewire(&self, pin: u8) -> Result<ProbeTemperatures, HardwareFault> {
        self.sensors.measure_onewire(pin)
    }
}

impl<S: SensorDriverPort> ClockPort for BoardAdapter<S> {
    fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }
}
