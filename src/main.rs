//! PinBridge firmware entry point.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  BoardAdapter     MqttAdapter     HwTimers      SystemAdapter  │
//! │  (Gpio+Pwm+Sensor)(BrokerSession) (TimerPort)   (SystemPort)   │
//! │  FileConfigSource LogEventSink    WifiAdapter                  │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │     SupervisorLoop → DeviceRegistry → Endpoint         │    │
//! │  │     bridge (publish / subscribe) · PowerScheduler      │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use std::sync::Arc;

use anyhow::{Context, Result};
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::delay::FreeRtos;
use esp_idf_svc::hal::peripherals::Peripherals;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use log::info;

use pinbridge::adapters::config_source::{FileConfigSource, SPIFFS_BASE, mount_spiffs};
use pinbridge::adapters::device_id;
use pinbridge::adapters::hardware::BoardAdapter;
use pinbridge::adapters::log_sink::LogEventSink;
use pinbridge::adapters::mqtt::MqttAdapter;
use pinbridge::adapters::system::{SystemAdapter, WakeCause};
use pinbridge::adapters::wifi::{self, WifiAdapter};
use pinbridge::app::ports::ConfigSource;
use pinbridge::app::supervisor::SupervisorLoop;
use pinbridge::config::ConfigStore;
use pinbridge::drivers::hw_timer::HwTimers;

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  PinBridge v{}                       ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    let system = SystemAdapter::new();
    match system.wake_cause() {
        WakeCause::DeepSleepTimer => info!("Boot: deep-sleep timer wake"),
        WakeCause::PowerOn => info!("Boot: power-on"),
    }

    // ── 2. Identity + config filesystem ───────────────────────
    let id = device_id::device_id(&device_id::read_mac());
    info!("Device id: {}", id);
    mount_spiffs().map_err(pinbridge::error::Error::from)?;
    let files = FileConfigSource::new(SPIFFS_BASE);

    // ── 3. Network ────────────────────────────────────────────
    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take()?;

    let creds_text = files
        .read(wifi::CREDENTIALS_FILE)
        .map_err(pinbridge::error::Error::from)
        .context("reading WiFi credentials")?;
    let creds = wifi::parse_credentials(&creds_text)?;
    let _wifi = WifiAdapter::connect(peripherals.modem, sysloop, nvs, &creds)?;

    // ── 4. Device configuration ───────────────────────────────
    let config = ConfigStore::new(&id)
        .load(&files)
        .with_context(|| format!("loading {}.json", id))?;
    info!(
        "Config: {} endpoint(s), broker {}:{}, sleep {:?}",
        config.devices.len(),
        config.publish.server,
        config.publish.port,
        config.sleep_type
    );

    // ── 5. Adapters + supervisor ──────────────────────────────
    let board = Arc::new(BoardAdapter::new());
    let broker = MqttAdapter::new(&config.publish, &id);
    let timers = HwTimers::new().map_err(pinbridge::error::Error::from)?;

    let mut supervisor = SupervisorLoop::new(
        config,
        board,
        broker,
        timers,
        system,
        FreeRtos,
        LogEventSink::new(),
    );
    supervisor.run()?;

    info!("Supervisor exited");
    Ok(())
}
