//! MQTT 服务器配置协作接口

/// 一次 /serverchange 提交的内容，只在调用期间存在
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerCredential {
    pub address: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

/// 负责实际的 MQTT 连接
pub trait BrokerConfigSink {
    fn configure(&mut self, credential: &BrokerCredential) -> anyhow::Result<()>;

    /// 当前连接状态，不支持时返回 None
    fn status(&self) -> Option<BrokerStatus> {
        None
    }
}

/// MQTT 客户端的连接状态码（-4..=5）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrokerStatus(pub i8);

const STATUS_OFFSET: i8 = -4;

const STATUS_NAMES: [&str; 10] = [
    "CONNECTION TIMEOUT", // -4
    "CONNECTION LOST",    // -3
    "CONNECT FAILED",     // -2
    "DISCONNECTED",       // -1
    "CONNECTED",          // 0
    "BAD PROTOCOL",       // 1
    "BAD CLIENT ID",      // 2
    "UNAVAILABLE",        // 3
    "BAD CREDENTIALS",    // 4
    "UNAUTHORIZED",       // 5
];

impl BrokerStatus {
    pub const CONNECTED: Self = Self(0);
    pub const DISCONNECTED: Self = Self(-1);

    pub fn name(self) -> &'static str {
        let index = i16::from(self.0) - i16::from(STATUS_OFFSET);
        usize::try_from(index)
            .ok()
            .and_then(|i| STATUS_NAMES.get(i))
            .copied()
            .unwrap_or("UNKNOWN")
    }
}

/// 按 C `atoi` 的方式解析端口：取前导数字，无法解析时为 0。
/// 超出 u16 范围同样视为 0。
pub fn parse_port(raw: &str) -> u16 {
    let trimmed = raw.trim_start();
    let digits = trimmed
        .strip_prefix('+')
        .unwrap_or(trimmed)
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect::<String>();

    match digits.parse::<u16>() {
        Ok(port) => port,
        Err(_) => {
            log::warn!("Invalid broker port {:?}, using 0", raw);
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_names() {
        assert_eq!(BrokerStatus(-4).name(), "CONNECTION TIMEOUT");
        assert_eq!(BrokerStatus::DISCONNECTED.name(), "DISCONNECTED");
        assert_eq!(BrokerStatus::CONNECTED.name(), "CONNECTED");
        assert_eq!(BrokerStatus(5).name(), "UNAUTHORIZED");
        assert_eq!(BrokerStatus(6).name(), "UNKNOWN");
        assert_eq!(BrokerStatus(-5).name(), "UNKNOWN");
        assert_eq!(BrokerStatus(i8::MIN).name(), "UNKNOWN");
    }

    #[test]
    fn test_parse_port() {
        assert_eq!(parse_port("1883"), 1883);
        assert_eq!(parse_port("  8883"), 8883);
        assert_eq!(parse_port("+1883"), 1883);
        assert_eq!(parse_port("1883abc"), 1883);
        assert_eq!(parse_port("abc"), 0);
        assert_eq!(parse_port("-1"), 0);
        assert_eq!(parse_port("70000"), 0);
        assert_eq!(parse_port(""), 0);
    }
}
