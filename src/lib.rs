//! 设备配网门户
//!
//! 通过 SoftAP 上的网页配置 WiFi 以及可选的 MQTT 服务器、发布/订阅别名。

pub mod captive_portal;
pub mod config;

pub use config::{AccessPointConfig, PortalConfig};
