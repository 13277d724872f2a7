//! Configuration document sources behind [`ConfigSource`].
//!
//! [`FileConfigSource`] reads from a directory through `std::fs`; on the
//! device that directory is the SPIFFS partition mounted by
//! [`mount_spiffs`].  [`MemoryConfigSource`] serves documents from a map.

use std::collections::HashMap;
use std::path::PathBuf;

use log::debug;

use crate::app::ports::ConfigSource;
use crate::error::ConfigError;

/// Mount point of the configuration partition on the device.
pub const SPIFFS_BASE: &str = "/spiffs";

/// Register the SPIFFS partition under [`SPIFFS_BASE`].
#[cfg(target_os = "espidf")]
pub fn mount_spiffs() -> Result<(), ConfigError> {
    use esp_idf_svc::sys::*;

    let conf = esp_vfs_spiffs_conf_t {
        base_path: c"/spiffs".as_ptr(),
        partition_label: core::ptr::null(),
        max_files: 4,
        format_if_mount_failed: false,
    };
    // SAFETY: conf points at a static path; ESP-IDF copies what it keeps.
    let ret = unsafe { esp_vfs_spiffs_register(&conf) };
    if ret != ESP_OK as i32 {
        return Err(ConfigError::NotFound(format!("spiffs (rc={ret})")));
    }
    log::info!("config: SPIFFS mounted at {}", SPIFFS_BASE);
    Ok(())
}

pub struct FileConfigSource {
    root: PathBuf,
}

impl FileConfigSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ConfigSource for FileConfigSource {
    fn read(&self, name: &str) -> Result<String, ConfigError> {
        let path = self.root.join(name);
        debug!("config: reading {}", path.display());
        std::fs::read_to_string(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ConfigError::NotFound(path.display().to_string()),
            _ => ConfigError::Parse(format!("{}: {e}", path.display())),
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryConfigSource {
    docs: HashMap<String, String>,
}

impl MemoryConfigSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, text: &str) -> Self {
        self.docs.insert(name.into(), text.into());
        self
    }
}

impl ConfigSource for MemoryConfigSource {
    fn read(&self, name: &str) -> Result<String, ConfigError> {
        self.docs
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::NotFound(name.into()))
    }
}
