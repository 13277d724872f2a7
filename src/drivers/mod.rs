//! Low-level peripheral drivers.
//!
//! `gpio` and `ledc` wrap raw ESP-IDF calls and only exist on the device
//! target; `hw_timer` carries a host simulation as well.

#[cfg(target_os = "espidf")]
pub mod gpio;
pub mod hw_timer;
#[cfg(target_os = "espidf")]
pub mod ledc;
