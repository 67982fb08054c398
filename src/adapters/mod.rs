//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter     | Implements          | Connects to                   |
//! |-------------|---------------------|-------------------------------|
//! | `ble`       | ScanPort (beacons)  | Bluedroid GAP passive scan    |
//! | `board`     | all device ports    | forwards to the adapters below|
//! | `flash_fs`  | (none)              | SPIFFS partition at `/data`   |
//! | `http`      | HttpPort            | EspHttpConnection             |
//! | `log_sink`  | EventSink           | Serial log output             |
//! | `nvs`       | ConfigPort          | NVS / in-memory store         |
//! |             | StoragePort         |                               |
//! | `power`     | (none)              | Deep sleep + RTC timer wakeup |
//! | `rtc`       | RetentionPort       | `.rtc.data` slow memory       |
//! | `sensors`   | SensorPort          | ADC1, die temperature         |
//! | `time`      | TimePort            | System clock + SNTP           |
//! | `wifi`      | ScanPort (WiFi)     | ESP-IDF WiFi STA              |
//! |             | LinkPort            |                               |

pub mod ble;
pub mod board;
pub mod flash_fs;
pub mod http;
pub mod log_sink;
pub mod nvs;
pub mod power;
pub mod rtc;
pub mod sensors;
pub mod time;
pub mod wifi;
