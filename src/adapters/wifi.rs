//! Wi-Fi station bootstrap.
//!
//! Credentials come from a two-line file on the config filesystem: SSID
//! on the first line, password on the second (empty for open networks).
//! The station is joined once at boot, before the supervisor starts.
//!
//! - **`target_os = "espidf"`**: `esp_idf_svc::wifi::BlockingWifi` over `EspWifi`.
//! - **other targets**: records the join so host runs can proceed.

use core::fmt;

use log::info;
#[cfg(target_os = "espidf")]
use log::warn;

#[cfg(target_os = "espidf")]
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::modem::Modem,
    nvs::EspDefaultNvsPartition,
    wifi::{AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi},
};

/// Credentials file name on the config filesystem.
pub const CREDENTIALS_FILE: &str = ".wireless";

#[cfg(target_os = "espidf")]
const CONNECT_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectivityError {
    NoCredentials,
    InvalidSsid,
    InvalidPassword,
    ConnectionFailed,
}

impl fmt::Display for ConnectivityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCredentials => write!(f, "no WiFi credentials configured"),
            Self::InvalidSsid => write!(f, "SSID invalid (must be 1-32 printable ASCII bytes)"),
            Self::InvalidPassword => {
                write!(f, "password invalid (must be 8-64 bytes for WPA2, or empty for open)")
            }
            Self::ConnectionFailed => write!(f, "WiFi connection failed"),
        }
    }
}

impl std::error::Error for ConnectivityError {}

// ───────────────────────────────────────────────────────────────
// Credentials
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub ssid: heapless::String<32>,
    pub password: heapless::String<64>,
}

impl Credentials {
    pub fn new(ssid: &str, password: &str) -> Result<Self, ConnectivityError> {
        validate_ssid(ssid)?;
        validate_password(password)?;
        let mut c = Self {
            ssid: heapless::String::new(),
            password: heapless::String::new(),
        };
        c.ssid.push_str(ssid).map_err(|_| ConnectivityError::InvalidSsid)?;
        c.password
            .push_str(password)
            .map_err(|_| ConnectivityError::InvalidPassword)?;
        Ok(c)
    }

    pub fn is_open(&self) -> bool {
        self.password.is_empty()
    }
}

/// Parse the credentials file.  Trailing whitespace and `\r` are ignored.
pub fn parse_credentials(text: &str) -> Result<Credentials, ConnectivityError> {
    let mut lines = text.lines().map(str::trim_end);
    let ssid = lines.next().unwrap_or("");
    if ssid.is_empty() {
        return Err(ConnectivityError::NoCredentials);
    }
    Credentials::new(ssid, lines.next().unwrap_or(""))
}

fn is_printable_ascii(s: &str) -> bool {
    s.bytes().all(|b| (0x20..=0x7E).contains(&b))
}

fn validate_ssid(ssid: &str) -> Result<(), ConnectivityError> {
    if ssid.is_empty() || ssid.len() > 32 || !is_printable_ascii(ssid) {
        return Err(ConnectivityError::InvalidSsid);
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), ConnectivityError> {
    if password.is_empty() {
        return Ok(());
    }
    if password.len() < 8 || password.len() > 64 {
        return Err(ConnectivityError::InvalidPassword);
    }
    Ok(())
}

// ───────────────────────────────────────────────────────────────
// Station
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub struct WifiAdapter {
    wifi: BlockingWifi<EspWifi<'static>>,
}

#[cfg(target_os = "espidf")]
impl WifiAdapter {
    /// Bring up the station and block until it has an IP address.
    pub fn connect(
        modem: Modem,
        sysloop: EspSystemEventLoop,
        nvs: EspDefaultNvsPartition,
        creds: &Credentials,
    ) -> Result<Self, ConnectivityError> {
        let fail = |what: &str, e: esp_idf_svc::sys::EspError| {
            warn!("WiFi: {what} failed: {e}");
            ConnectivityError::ConnectionFailed
        };

        let esp_wifi =
            EspWifi::new(modem, sysloop.clone(), Some(nvs)).map_err(|e| fail("driver init", e))?;
        let mut wifi = BlockingWifi::wrap(esp_wifi, sysloop).map_err(|e| fail("wrap", e))?;

        let auth_method = if creds.is_open() {
            AuthMethod::None
        } else {
            AuthMethod::WPAWPA2Personal
        };
        wifi.set_configuration(&Configuration::Client(ClientConfiguration {
            ssid: creds
                .ssid
                .as_str()
                .try_into()
                .map_err(|_| ConnectivityError::InvalidSsid)?,
            password: creds
                .password
                .as_str()
                .try_into()
                .map_err(|_| ConnectivityError::InvalidPassword)?,
            auth_method,
            ..Default::default()
        }))
        .map_err(|e| fail("configure", e))?;

        wifi.start().map_err(|e| fail("start", e))?;
        info!("WiFi: started, joining '{}'", creds.ssid);

        let mut attempt = 1;
        loop {
            match wifi.connect() {
                Ok(()) => break,
                Err(e) if attempt < CONNECT_ATTEMPTS => {
                    warn!("WiFi: connect attempt {attempt}/{CONNECT_ATTEMPTS} failed: {e}");
                    attempt += 1;
                }
                Err(e) => return Err(fail("connect", e)),
            }
        }
        wifi.wait_netif_up().map_err(|e| fail("netif up", e))?;

        if let Ok(ip) = wifi.wifi().sta_netif().get_ip_info() {
            info!("WiFi: connected, ip {}", ip.ip);
        }
        Ok(Self { wifi })
    }

    pub fn is_connected(&self) -> bool {
        self.wifi.is_connected().unwrap_or(false)
    }
}

#[cfg(not(target_os = "espidf"))]
pub struct WifiAdapter {
    ssid: heapless::String<32>,
}

#[cfg(not(target_os = "espidf"))]
impl WifiAdapter {
    pub fn connect(creds: &Credentials) -> Result<Self, ConnectivityError> {
        info!("WiFi(sim): joined '{}'", creds.ssid);
        Ok(Self {
            ssid: creds.ssid.clone(),
        })
    }

    pub fn is_connected(&self) -> bool {
        !self.ssid.is_empty()
    }

    pub fn ssid(&self) -> &str {
        &self.ssid
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
