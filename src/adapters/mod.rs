//! Adapters: concrete implementations of the port traits.
//!
//! | Adapter         | Implements                 | Connects to              |
//! |-----------------|----------------------------|--------------------------|
//! | `config_source` | ConfigSource               | SPIFFS / in-memory files |
//! | `device_id`     |                            | Factory MAC (eFuse)      |
//! | `hardware`      | GpioPort, PwmPort          | ESP32 GPIO, LEDC         |
//! |                 | SensorDriverPort, ClockPort| Sensor driver, timer     |
//! | `log_sink`      | EventSink                  | Serial log output        |
//! | `mqtt`          | BrokerSession              | ESP-IDF MQTT client      |
//! | `system`        | SystemPort                 | Sleep, restart, heap     |
//! | `time`          | ClockPort                  | ESP32 system timer       |
//! | `wifi`          |                            | ESP-IDF WiFi STA         |

pub mod config_source;
pub mod device_id;
pub mod hardware;
pub mod log_sink;
pub mod mqtt;
pub mod system;
pub mod time;
pub mod wifi;
