//! 门户启动配置

use std::net::Ipv4Addr;

use serde::Deserialize;

use crate::captive_portal::AliasEntry;

/// SoftAP 网络参数
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AccessPointConfig {
    /// 为空时使用 `server_name`
    pub ssid: String,
    /// 为空时为开放热点
    pub password: String,
    pub local_ip: Ipv4Addr,
    pub gateway: Ipv4Addr,
    /// 子网掩码前缀长度
    pub netmask: u8,
    pub channel: u8,
    pub max_connections: u16,
}

impl Default for AccessPointConfig {
    fn default() -> Self {
        Self {
            ssid: String::new(),
            password: String::new(),
            local_ip: Ipv4Addr::new(192, 168, 4, 1),
            gateway: Ipv4Addr::new(192, 168, 4, 1),
            netmask: 24,
            channel: 1,
            max_connections: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    /// mDNS 主机名，同时是默认热点名
    pub server_name: String,
    /// 是否启用 MQTT 相关页面
    pub broker_support: bool,
    /// 发布别名槽位，长度即容量
    pub publications: Vec<AliasEntry>,
    /// 订阅别名槽位，长度即容量
    pub subscriptions: Vec<AliasEntry>,
    /// 扫描页自动刷新间隔（秒）
    pub scan_refresh_secs: u32,
    pub default_broker_port: u16,
    /// 收到新的 WiFi 配置后是否直接让驱动连接
    pub join_on_network_change: bool,
    pub http_port: u16,
    pub access_point: AccessPointConfig,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            server_name: "NetworkHelper".to_string(),
            broker_support: false,
            publications: Vec::new(),
            subscriptions: Vec::new(),
            scan_refresh_secs: 15,
            default_broker_port: 1883,
            join_on_network_change: false,
            http_port: 80,
            access_point: AccessPointConfig::default(),
        }
    }
}

impl PortalConfig {
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let config: PortalConfig = serde_json::from_str(json)?;
        if config.server_name.is_empty() {
            anyhow::bail!("server_name must not be empty");
        }
        Ok(config)
    }

    pub fn ap_ssid(&self) -> &str {
        if self.access_point.ssid.is_empty() {
            &self.server_name
        } else {
            &self.access_point.ssid
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PortalConfig::from_json("{}").unwrap();
        assert_eq!(config, PortalConfig::default());
        assert_eq!(config.server_name, "NetworkHelper");
        assert_eq!(config.ap_ssid(), "NetworkHelper");
        assert_eq!(config.default_broker_port, 1883);
        assert_eq!(config.access_point.local_ip, Ipv4Addr::new(192, 168, 4, 1));
        assert!(!config.broker_support);
    }

    #[test]
    fn test_from_json() {
        let config = PortalConfig::from_json(
            r#"{
                "server_name": "greenhouse",
                "broker_support": true,
                "publications": [
                    {"alias": "temperature"},
                    {"alias": "humidity", "bound_name": "gh/humidity"}
                ],
                "subscriptions": [{"alias": "vent"}],
                "access_point": {"ssid": "Greenhouse-Setup", "local_ip": "10.0.0.1", "gateway": "10.0.0.1"}
            }"#,
        )
        .unwrap();
        assert_eq!(config.server_name, "greenhouse");
        assert!(config.broker_support);
        assert_eq!(config.publications.len(), 2);
        assert_eq!(config.publications[1].bound_name(), "gh/humidity");
        assert_eq!(config.subscriptions[0].alias(), "vent");
        assert_eq!(config.ap_ssid(), "Greenhouse-Setup");
        assert_eq!(config.access_point.local_ip, Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(config.access_point.netmask, 24);
        assert_eq!(config.scan_refresh_secs, 15);
    }

    #[test]
    fn test_invalid_config() {
        assert!(PortalConfig::from_json(r#"{"server_name": ""}"#).is_err());
        assert!(PortalConfig::from_json(r#"{"http_port": "eighty"}"#).is_err());
    }
}
