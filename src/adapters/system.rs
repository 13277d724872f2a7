//! Chip power, reset and heap figures behind [`SystemPort`].
//!
//! - **`target_os = "espidf"`**: `esp_sleep_*`, `esp_restart`, heap caps.
//! - **other targets**: records every request so host runs can inspect
//!   what the supervisor asked for.

use log::info;

use crate::adapters::time::TimeAdapter;
use crate::app::ports::{MemoryInfo, SystemPort};

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

#[cfg(target_os = "espidf")]
use crate::drivers::gpio;

/// Why the chip started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeCause {
    /// Woken by the deep-sleep timer.
    DeepSleepTimer,
    /// Cold boot, reset button or any other source.
    PowerOn,
}

pub struct SystemAdapter {
    clock: TimeAdapter,
    #[cfg(not(target_os = "espidf"))]
    log: SimRecord,
}

/// Requests seen by the simulated system.
#[cfg(not(target_os = "espidf"))]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimRecord {
    pub idles: u32,
    pub light_sleeps: Vec<(u32, Vec<u8>)>,
    pub deep_sleeps: Vec<Option<u32>>,
    pub restarts: u32,
}

impl Default for SystemAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemAdapter {
    pub fn new() -> Self {
        Self {
            clock: TimeAdapter::new(),
            #[cfg(not(target_os = "espidf"))]
            log: SimRecord::default(),
        }
    }

    #[cfg(target_os = "espidf")]
    pub fn wake_cause(&self) -> WakeCause {
        // SAFETY: read-only query of the RTC wake source.
        let cause = unsafe { esp_sleep_get_wakeup_cause() };
        if cause == esp_sleep_source_t_ESP_SLEEP_WAKEUP_TIMER {
            WakeCause::DeepSleepTimer
        } else {
            WakeCause::PowerOn
        }
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn wake_cause(&self) -> WakeCause {
        WakeCause::PowerOn
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn record(&self) -> &SimRecord {
        &self.log
    }
}

#[cfg(target_os = "espidf")]
impl SystemPort for SystemAdapter {
    fn uptime_ms(&self) -> u64 {
        self.clock.uptime_ms()
    }

    fn memory(&self) -> MemoryInfo {
        // SAFETY: heap statistics queries have no preconditions.
        let (free, total) = unsafe {
            (
                esp_get_free_heap_size(),
                heap_caps_get_total_size(MALLOC_CAP_DEFAULT) as u32,
            )
        };
        MemoryInfo {
            free,
            allocated: total.saturating_sub(free),
        }
    }

    fn idle(&mut self) {
        // One tick lets the idle task run WFI until the next interrupt.
        // SAFETY: plain FreeRTOS delay from task context.
        unsafe { vTaskDelay(1) };
    }

    fn light_sleep(&mut self, duration_ms: u32, wake_pins: &[u8]) {
        gpio::arm_wakeup(wake_pins);
        // SAFETY: wake sources armed before sleeping; returns on wake.
        unsafe {
            esp_sleep_enable_timer_wakeup(u64::from(duration_ms) * 1_000);
            if !wake_pins.is_empty() {
                esp_sleep_enable_gpio_wakeup();
            }
            esp_light_sleep_start();
        }
        gpio::restore_edge_irq(wake_pins);
    }

    fn deep_sleep(&mut self, wake_after_ms: Option<u32>) {
        // SAFETY: does not return; RTC timer wakes the chip into a fresh boot.
        unsafe {
            if let Some(ms) = wake_after_ms {
                esp_sleep_enable_timer_wakeup(u64::from(ms) * 1_000);
            }
            esp_deep_sleep_start();
        }
    }

    fn restart(&mut self) {
        info!("system: restarting");
        // SAFETY: does not return.
        unsafe { esp_restart() };
    }
}

#[cfg(not(target_os = "espidf"))]
impl SystemPort for SystemAdapter {
    fn uptime_ms(&self) -> u64 {
        self.clock.uptime_ms()
    }

    fn memory(&self) -> MemoryInfo {
        MemoryInfo {
            free: 180_000,
            allocated: 40_000,
        }
    }

    fn idle(&mut self) {
        self.log.idles += 1;
    }

    fn light_sleep(&mut self, duration_ms: u32, wake_pins: &[u8]) {
        self.log.light_sleeps.push((duration_ms, wake_pins.to_vec()));
    }

    fn deep_sleep(&mut self, wake_after_ms: Option<u32>) {
        info!("system(sim): deep sleep, wake after {:?} ms", wake_after_ms);
        self.log.deep_sleeps.push(wake_after_ms);
    }

    fn restart(&mut self) {
        info!("system(sim): restart requested");
        self.log.restarts += 1;
    }
}
