//! LEDC PWM channels at 10-bit duty resolution.
//!
//! Each slot pairs LEDC channel N with LEDC timer N, so every PWM pin can
//! run its own frequency.  The low-speed group has four timers, which
//! caps the board at four PWM endpoints.  Callers pass duty already
//! clamped to the 10-bit range.

use esp_idf_svc::sys::*;
use log::info;

use crate::error::HardwareFault;

const MODE: ledc_mode_t = ledc_mode_t_LEDC_LOW_SPEED_MODE;

/// Number of independent PWM slots.
pub const SLOTS: usize = 4;

pub fn attach(slot: u8, pin: u8, freq_hz: u32, duty: u32) -> Result<(), HardwareFault> {
    if usize::from(slot) >= SLOTS {
        return Err(HardwareFault::PwmUnavailable(pin));
    }
    let timer = ledc_timer_config_t {
        speed_mode: MODE,
        timer_num: u32::from(slot),
        duty_resolution: ledc_timer_bit_t_LEDC_TIMER_10_BIT,
        freq_hz,
        clk_cfg: soc_periph_ledc_clk_src_legacy_t_LEDC_AUTO_CLK,
        ..Default::default()
    };
    // SAFETY: plain config structs; slot range-checked above.
    unsafe {
        if ledc_timer_config(&timer) != ESP_OK as i32 {
            return Err(HardwareFault::PwmUnavailable(pin));
        }
        let channel = ledc_channel_config_t {
            speed_mode: MODE,
            channel: u32::from(slot),
            timer_sel: u32::from(slot),
            gpio_num: i32::from(pin),
            duty,
            hpoint: 0,
            ..Default::default()
        };
        if ledc_channel_config(&channel) != ESP_OK as i32 {
            return Err(HardwareFault::PwmUnavailable(pin));
        }
    }
    info!("ledc: GPIO{} on slot {} ({} Hz, duty {})", pin, slot, freq_hz, duty);
    Ok(())
}

pub fn freq(slot: u8) -> u32 {
    // SAFETY: read of a configured timer.
    unsafe { ledc_get_freq(MODE, u32::from(slot)) }
}

pub fn set_freq(slot: u8, pin: u8, freq_hz: u32) -> Result<(), HardwareFault> {
    // SAFETY: slot was attached; LEDC rejects unreachable frequencies with an error code.
    if unsafe { ledc_set_freq(MODE, u32::from(slot), freq_hz) } != ESP_OK as i32 {
        return Err(HardwareFault::PwmWriteFailed(pin));
    }
    Ok(())
}

pub fn duty(slot: u8) -> u32 {
    // SAFETY: read of a configured channel.
    unsafe { ledc_get_duty(MODE, u32::from(slot)) }
}

pub fn set_duty(slot: u8, pin: u8, duty: u32) -> Result<(), HardwareFault> {
    // SAFETY: slot was attached; LEDC rejects out-of-range duty with an error code.
    unsafe {
        if ledc_set_duty(MODE, u32::from(slot), duty) != ESP_OK as i32
            || ledc_update_duty(MODE, u32::from(slot)) != ESP_OK as i32
        {
            return Err(HardwareFault::PwmWriteFailed(pin));
        }
    }
    Ok(())
}
