//! WiFi 扫描协作接口与扫描快照

/// 加密类型名称表，按驱动上报的原始编码索引
const ENCRYPTION_NAMES: [&str; 9] = [
    "UNKNOWN",      // 0
    "UNKNOWN",      // 1
    "WPA/PSK",      // 2
    "UNKNOWN",      // 3
    "WPA2/PSK",     // 4
    "WEP",          // 5
    "UNKNOWN",      // 6
    "NONE",         // 7
    "WPA/WPA2/PSK", // 8
];

/// 驱动上报的原始加密类型编码
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncryptionKind(pub u8);

impl EncryptionKind {
    pub const WPA_PSK: Self = Self(2);
    pub const WPA2_PSK: Self = Self(4);
    pub const WEP: Self = Self(5);
    pub const OPEN: Self = Self(7);
    pub const WPA_WPA2_PSK: Self = Self(8);
    pub const UNKNOWN: Self = Self(0);

    pub fn name(self) -> &'static str {
        ENCRYPTION_NAMES
            .get(self.0 as usize)
            .copied()
            .unwrap_or("UNKNOWN")
    }

    pub fn is_open(self) -> bool {
        self == Self::OPEN
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanEntry {
    pub ssid: String,
    pub encryption: EncryptionKind,
    /// dBm
    pub rssi: i32,
}

/// 扫描状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStatus {
    /// 从未启动或上次扫描失败
    Idle,
    /// 扫描进行中
    Running,
    /// 扫描完成，结果条数
    Complete(usize),
}

impl ScanStatus {
    /// 原始计数：-1 进行中，-2 未启动，非负为结果条数
    pub fn from_raw(count: i32) -> Self {
        match count {
            -1 => ScanStatus::Running,
            n if n < 0 => ScanStatus::Idle,
            n => ScanStatus::Complete(n as usize),
        }
    }
}

/// 无线驱动需要提供的能力。扫描是非阻塞的，状态靠轮询获得。
pub trait ConnectivityProbe {
    fn begin_scan(&mut self) -> anyhow::Result<()>;

    fn scan_status(&mut self) -> ScanStatus;

    fn result_at(&self, index: usize) -> Option<ScanEntry>;

    /// 释放上一次扫描结果
    fn clear_results(&mut self);

    fn join(&mut self, ssid: &str, password: &str) -> anyhow::Result<()>;
}

/// 一次渲染用的扫描结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSnapshot {
    pub entries: Vec<ScanEntry>,
}

impl ScanSnapshot {
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    /// 按驱动返回的顺序收集结果，不排序
    pub fn collect(probe: &dyn ConnectivityProbe, count: usize) -> Self {
        let entries = (0..count).filter_map(|i| probe.result_at(i)).collect();
        Self { entries }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encryption_names() {
        assert_eq!(EncryptionKind(4).name(), "WPA2/PSK");
        assert_eq!(EncryptionKind(7).name(), "NONE");
        assert_eq!(EncryptionKind(2).name(), "WPA/PSK");
        assert_eq!(EncryptionKind(5).name(), "WEP");
        assert_eq!(EncryptionKind(8).name(), "WPA/WPA2/PSK");
        assert_eq!(EncryptionKind(3).name(), "UNKNOWN");
        assert_eq!(EncryptionKind(9).name(), "UNKNOWN");
        assert_eq!(EncryptionKind(255).name(), "UNKNOWN");
        assert!(EncryptionKind::OPEN.is_open());
        assert!(!EncryptionKind::WEP.is_open());
    }

    #[test]
    fn test_scan_status_from_raw() {
        assert_eq!(ScanStatus::from_raw(-1), ScanStatus::Running);
        assert_eq!(ScanStatus::from_raw(-2), ScanStatus::Idle);
        assert_eq!(ScanStatus::from_raw(0), ScanStatus::Complete(0));
        assert_eq!(ScanStatus::from_raw(12), ScanStatus::Complete(12));
    }
}
