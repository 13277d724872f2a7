//! Periodic timers and edge interrupts behind [`TimerPort`].
//!
//! On ESP-IDF, periodic callbacks run on the `esp_timer` task and edge
//! callbacks run in GPIO ISR context.  Each registered [`Callback`] is
//! boxed and its address handed to the C side as the callback argument;
//! the box stays owned here until [`TimerPort::cancel_all`] or drop.
//!
//! On host targets, [`HwTimers`] is a manual clock: tests call
//! [`HwTimers::advance`] and [`HwTimers::trigger_edge`] to fire callbacks.

use crate::app::ports::{Callback, TimerPort};
use crate::error::HardwareFault;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

#[cfg(target_os = "espidf")]
use crate::drivers::gpio;

// ───────────────────────────────────────────────────────────────
// ESP-IDF
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
unsafe extern "C" fn dispatch(arg: *mut core::ffi::c_void) {
    // SAFETY: `arg` points at a `Callback` boxed in `HwTimers::keep`,
    // which outlives the timer/ISR registration.
    let cb = unsafe { &*(arg as *const Callback) };
    cb();
}

#[cfg(target_os = "espidf")]
pub struct HwTimers {
    timers: Vec<esp_timer_handle_t>,
    edges: Vec<u8>,
    keep: Vec<Box<Callback>>,
}

#[cfg(target_os = "espidf")]
impl HwTimers {
    pub fn new() -> Result<Self, HardwareFault> {
        gpio::install_isr_service()?;
        Ok(Self {
            timers: Vec::new(),
            edges: Vec::new(),
            keep: Vec::new(),
        })
    }

    fn retain(&mut self, callback: Callback) -> *mut core::ffi::c_void {
        let boxed = Box::new(callback);
        let arg = (&*boxed as *const Callback).cast_mut().cast();
        self.keep.push(boxed);
        arg
    }
}

#[cfg(target_os = "espidf")]
impl TimerPort for HwTimers {
    fn every(&mut self, period_ms: u32, callback: Callback) -> Result<(), HardwareFault> {
        let arg = self.retain(callback);
        let args = esp_timer_create_args_t {
            callback: Some(dispatch),
            arg,
            dispatch_method: esp_timer_dispatch_t_ESP_TIMER_TASK,
            name: c"endpoint".as_ptr(),
            skip_unhandled_events: true,
        };
        let mut handle: esp_timer_handle_t = core::ptr::null_mut();
        // SAFETY: `arg` is kept alive in `self.keep`; handle written by the call.
        unsafe {
            let ret = esp_timer_create(&args, &mut handle);
            if ret != ESP_OK as i32 {
                log::error!("hw_timer: create failed (rc={})", ret);
                return Err(HardwareFault::TimerSetupFailed);
            }
            let ret = esp_timer_start_periodic(handle, u64::from(period_ms) * 1_000);
            if ret != ESP_OK as i32 {
                log::error!("hw_timer: start failed (rc={})", ret);
                esp_timer_delete(handle);
                return Err(HardwareFault::TimerSetupFailed);
            }
        }
        self.timers.push(handle);
        log::debug!("hw_timer: periodic {} ms", period_ms);
        Ok(())
    }

    fn on_falling_edge(&mut self, pin: u8, callback: Callback) -> Result<(), HardwareFault> {
        let arg = self.retain(callback);
        // SAFETY: `arg` is kept alive in `self.keep` until detach.
        unsafe { gpio::attach_falling_edge(pin, dispatch, arg)? };
        self.edges.push(pin);
        Ok(())
    }

    fn cancel_all(&mut self) {
        for handle in self.timers.drain(..) {
            // SAFETY: handles were created by esp_timer_create and not yet deleted.
            unsafe {
                esp_timer_stop(handle);
                esp_timer_delete(handle);
            }
        }
        for pin in self.edges.drain(..) {
            gpio::detach_edge(pin);
        }
        self.keep.clear();
    }
}

#[cfg(target_os = "espidf")]
impl Drop for HwTimers {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

// ───────────────────────────────────────────────────────────────
// Simulation
// ───────────────────────────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
struct Periodic {
    period_ms: u32,
    next_due_ms: u64,
    callback: Callback,
}

#[cfg(not(target_os = "espidf"))]
pub struct HwTimers {
    now_ms: u64,
    periodic: Vec<Periodic>,
    edges: Vec<(u8, Callback)>,
}

#[cfg(not(target_os = "espidf"))]
impl HwTimers {
    pub fn new() -> Result<Self, HardwareFault> {
        Ok(Self {
            now_ms: 0,
            periodic: Vec::new(),
            edges: Vec::new(),
        })
    }

    /// Move the simulated clock forward, firing every periodic callback
    /// that comes due (possibly several times).
    pub fn advance(&mut self, ms: u64) {
        self.now_ms += ms;
        for t in &mut self.periodic {
            while t.next_due_ms <= self.now_ms {
                (t.callback)();
                t.next_due_ms += u64::from(t.period_ms.max(1));
            }
        }
    }

    /// Fire every callback attached to `pin`.
    pub fn trigger_edge(&mut self, pin: u8) {
        for (p, cb) in &self.edges {
            if *p == pin {
                cb();
            }
        }
    }

    pub fn periodic_count(&self) -> usize {
        self.periodic.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }
}

#[cfg(not(target_os = "espidf"))]
impl TimerPort for HwTimers {
    fn every(&mut self, period_ms: u32, callback: Callback) -> Result<(), HardwareFault> {
        if period_ms == 0 {
            return Err(HardwareFault::TimerSetupFailed);
        }
        self.periodic.push(Periodic {
            period_ms,
            next_due_ms: self.now_ms + u64::from(period_ms),
            callback,
        });
        Ok(())
    }

    fn on_falling_edge(&mut self, pin: u8, callback: Callback) -> Result<(), HardwareFault> {
        self.edges.push((pin, callback));
        Ok(())
    }

    fn cancel_all(&mut self) {
        self.periodic.clear();
        self.edges.clear();
    }
}
