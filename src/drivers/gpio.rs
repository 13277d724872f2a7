//! Raw ESP-IDF GPIO access: pin configuration, levels, edge interrupts.
//!
//! Thin `unsafe` wrappers used by the board adapter and the timer
//! driver.  Everything here maps an `esp_err_t` onto a [`HardwareFault`].

use core::ffi::c_void;

use esp_idf_svc::sys::*;
use log::info;

use crate::app::ports::PinMode;
use crate::error::HardwareFault;

/// Reject pins outside the chip's GPIO matrix.
pub fn check_pin(pin: u8) -> Result<(), HardwareFault> {
    if i32::from(pin) >= gpio_num_t_GPIO_NUM_MAX {
        return Err(HardwareFault::InvalidPin(pin));
    }
    Ok(())
}

/// Configure `pin` for `mode`.  Sensor buses get an open-drain
/// input/output with the internal pull-up enabled.
pub fn configure(pin: u8, mode: PinMode) -> Result<(), HardwareFault> {
    check_pin(pin)?;
    let (gpio_mode, pull_up) = match mode {
        PinMode::Input => (gpio_mode_t_GPIO_MODE_INPUT, gpio_pullup_t_GPIO_PULLUP_ENABLE),
        PinMode::InputOutput => (
            gpio_mode_t_GPIO_MODE_INPUT_OUTPUT,
            gpio_pullup_t_GPIO_PULLUP_DISABLE,
        ),
        PinMode::SensorBus => (
            gpio_mode_t_GPIO_MODE_INPUT_OUTPUT_OD,
            gpio_pullup_t_GPIO_PULLUP_ENABLE,
        ),
    };
    let cfg = gpio_config_t {
        pin_bit_mask: 1u64 << pin,
        mode: gpio_mode,
        pull_up_en: pull_up,
        pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_DISABLE,
        intr_type: gpio_int_type_t_GPIO_INTR_DISABLE,
    };
    // SAFETY: cfg is a fully initialised config for a range-checked pin.
    let ret = unsafe { gpio_config(&cfg) };
    if ret != ESP_OK as i32 {
        return Err(HardwareFault::InvalidPin(pin));
    }
    Ok(())
}

pub fn level(pin: u8) -> bool {
    // SAFETY: register read on a configured pin; valid in ISR context.
    (unsafe { gpio_get_level(i32::from(pin)) }) != 0
}

pub fn set_level(pin: u8, high: bool) -> Result<(), HardwareFault> {
    // SAFETY: register write on a configured output pin.
    let ret = unsafe { gpio_set_level(i32::from(pin), u32::from(high)) };
    if ret != ESP_OK as i32 {
        return Err(HardwareFault::GpioWriteFailed(pin));
    }
    Ok(())
}

/// Install the per-pin ISR dispatch service.  Idempotent.
pub fn install_isr_service() -> Result<(), HardwareFault> {
    // SAFETY: ESP_ERR_INVALID_STATE means the service is already installed.
    let ret = unsafe { gpio_install_isr_service(0) };
    if ret != ESP_OK as i32 && ret != ESP_ERR_INVALID_STATE as i32 {
        log::error!("gpio: ISR service install failed (rc={})", ret);
        return Err(HardwareFault::TimerSetupFailed);
    }
    Ok(())
}

/// Attach `handler(arg)` to the falling edge of `pin`.
///
/// # Safety
/// `arg` must stay valid until [`detach_edge`] is called for `pin`.
pub unsafe fn attach_falling_edge(
    pin: u8,
    handler: unsafe extern "C" fn(*mut c_void),
    arg: *mut c_void,
) -> Result<(), HardwareFault> {
    check_pin(pin)?;
    let gpio = i32::from(pin);
    // SAFETY: caller guarantees `arg` outlives the registration.
    unsafe {
        if gpio_set_intr_type(gpio, gpio_int_type_t_GPIO_INTR_NEGEDGE) != ESP_OK as i32
            || gpio_isr_handler_add(gpio, Some(handler), arg) != ESP_OK as i32
            || gpio_intr_enable(gpio) != ESP_OK as i32
        {
            return Err(HardwareFault::TimerSetupFailed);
        }
    }
    info!("gpio: falling-edge IRQ on GPIO{}", pin);
    Ok(())
}

pub fn detach_edge(pin: u8) {
    let gpio = i32::from(pin);
    // SAFETY: removing a handler that may or may not be registered is harmless.
    unsafe {
        gpio_intr_disable(gpio);
        gpio_isr_handler_remove(gpio);
    }
}

/// Let a low level on each of `pins` wake the chip from light sleep.
///
/// Light-sleep GPIO wakeup is level-triggered, so the pin's edge IRQ is
/// masked until [`restore_edge_irq`] puts it back.
pub fn arm_wakeup(pins: &[u8]) {
    for &pin in pins {
        let gpio = i32::from(pin);
        // SAFETY: pins were range-checked when their edge IRQ was attached.
        unsafe {
            gpio_intr_disable(gpio);
            if gpio_wakeup_enable(gpio, gpio_int_type_t_GPIO_INTR_LOW_LEVEL) != ESP_OK as i32 {
                log::warn!("gpio: GPIO{} cannot wake from light sleep", pin);
            }
        }
    }
}

/// Undo [`arm_wakeup`]: back to a falling-edge IRQ.  The edge that ended
/// the sleep is not counted.
pub fn restore_edge_irq(pins: &[u8]) {
    for &pin in pins {
        let gpio = i32::from(pin);
        // SAFETY: same pins as armed before sleeping.
        unsafe {
            gpio_wakeup_disable(gpio);
            gpio_set_intr_type(gpio, gpio_int_type_t_GPIO_INTR_NEGEDGE);
            gpio_intr_enable(gpio);
        }
    }
}
