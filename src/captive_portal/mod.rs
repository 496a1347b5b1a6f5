//! SoftAP + Web 配网模块
//!
//! 路由、表单校验和别名表管理在本模块内完成；无线驱动、HTTP 监听和
//! MQTT 客户端通过 trait 接入。

mod aliases;
mod broker;
mod error;
mod handlers;
mod html;
mod request;
mod routes;
mod scan;

#[cfg(not(target_os = "espidf"))]
pub mod host;
#[cfg(target_os = "espidf")]
mod server;

pub use aliases::{AliasEntry, AliasError, AliasKind, AliasList, AliasRegistry};
pub use broker::{parse_port, BrokerConfigSink, BrokerCredential, BrokerStatus};
pub use error::PortalError;
pub use handlers::{Exchange, Handler, NetworkCredential, PortalController};
pub use request::{RequestContext, Response};
pub use routes::{RouteError, RouteTable};
pub use scan::{ConnectivityProbe, EncryptionKind, ScanEntry, ScanSnapshot, ScanStatus};
#[cfg(target_os = "espidf")]
pub use server::{CaptivePortal, EspProbe, PortalEvent};
