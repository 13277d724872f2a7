//! Device identity derived from the factory MAC address.
//!
//! The id is the full 6-byte MAC in lowercase hex (`a4cf12b3c4d5`).  It
//! names the per-device configuration file, serves as the broker client
//! id, and fills the default topic base and friendly name.

/// Twelve hex digits.
pub type DeviceIdString = heapless::String<12>;

pub type MacAddress = [u8; 6];

/// Read the factory MAC address from eFuse.
#[cfg(target_os = "espidf")]
pub fn read_mac() -> MacAddress {
    let mut mac: MacAddress = [0u8; 6];
    unsafe {
        esp_idf_svc::sys::esp_efuse_mac_get_default(mac.as_mut_ptr());
    }
    mac
}

/// Simulation: a fixed fake MAC.
#[cfg(not(target_os = "espidf"))]
pub fn read_mac() -> MacAddress {
    [0xDE, 0xAD, 0xBE, 0xEF, 0xCA, 0xFE]
}

pub fn device_id(mac: &MacAddress) -> DeviceIdString {
    use core::fmt::Write;
    let mut id = DeviceIdString::new();
    for b in mac {
        let _ = write!(id, "{b:02x}");
    }
    id
}
