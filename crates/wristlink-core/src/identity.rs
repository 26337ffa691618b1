//! 设备标识
//!
//! 两种形式，且只能匹配其一：
//! - 硬件地址: `8-4-4-4-12` 连字符十六进制（平台分配的外设标识符）
//! - 设备 ID: 6-8 位十六进制（印在设备背面，也出现在广播名称末尾）

use crate::error::{Error, Result};
use regex::Regex;
use std::sync::LazyLock;

static ADDRESS_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9A-Fa-f]{8}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{12}$")
        .unwrap()
});

static DEVICE_ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9A-Fa-f]{6,8}$").unwrap());

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DeviceIdentity {
    Address(String),
    DeviceId(String),
}

impl DeviceIdentity {
    /// 解析标识字符串，两种形式都不匹配时返回 `InvalidArgument`（带前后空白也算不匹配）
    pub fn parse(text: &str) -> Result<Self> {
        if ADDRESS_PATTERN.is_match(text) {
            Ok(DeviceIdentity::Address(text.to_uppercase()))
        } else if DEVICE_ID_PATTERN.is_match(text) {
            Ok(DeviceIdentity::DeviceId(text.to_uppercase()))
        } else {
            Err(Error::InvalidArgument(format!(
                "'{}' is neither a device address nor a device id",
                text
            )))
        }
    }

    /// 规范化后的字符串（大写）
    pub fn as_str(&self) -> &str {
        match self {
            DeviceIdentity::Address(s) | DeviceIdentity::DeviceId(s) => s,
        }
    }

    /// 判断广播名称 / 外设标识是否属于该设备
    ///
    /// 设备 ID 与广播名称的最后一个单词比较，例如 `Polar H10 1A2B3C4D`。
    pub fn matches(&self, peripheral_id: &str, local_name: Option<&str>) -> bool {
        match self {
            DeviceIdentity::Address(addr) => peripheral_id.to_uppercase().contains(addr.as_str()),
            DeviceIdentity::DeviceId(id) => local_name
                .and_then(|name| name.split_whitespace().last())
                .is_some_and(|suffix| suffix.eq_ignore_ascii_case(id)),
        }
    }
}

impl std::str::FromStr for DeviceIdentity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl std::fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_address() {
        let id = DeviceIdentity::parse("0a1b2c3d-4e5f-6a7b-8c9d-0e1f2a3b4c5d").unwrap();
        assert_eq!(
            id,
            DeviceIdentity::Address("0A1B2C3D-4E5F-6A7B-8C9D-0E1F2A3B4C5D".to_string())
        );
    }

    #[test]
    fn test_parse_device_id() {
        for text in ["A1B2C3", "a1b2c3d", "1A2B3C4D"] {
            assert!(
                matches!(DeviceIdentity::parse(text), Ok(DeviceIdentity::DeviceId(_))),
                "{}",
                text
            );
        }
    }

    #[test]
    fn test_parse_invalid() {
        for text in [
            "",
            "A1B2C",
            "1A2B3C4D5",
            "G1B2C3",
            "AA:BB:CC:DD:EE:FF",
            "0a1b2c3d-4e5f-6a7b-8c9d-0e1f2a3b4c5",
            "0a1b2c3d4e5f6a7b8c9d0e1f2a3b4c5d",
            " A1B2C3 ",
            "A1B2C3\n",
            "\t0a1b2c3d-4e5f-6a7b-8c9d-0e1f2a3b4c5d",
        ] {
            assert!(
                matches!(DeviceIdentity::parse(text), Err(Error::InvalidArgument(_))),
                "{:?} should be rejected",
                text
            );
        }
    }

    #[test]
    fn test_matches_name_suffix() {
        let id = DeviceIdentity::parse("1a2b3c4d").unwrap();
        assert!(id.matches("hci0/dev_00", Some("Polar Vantage V2 1A2B3C4D")));
        assert!(!id.matches("hci0/dev_00", Some("Polar Vantage V2 1A2B3C4E")));
        assert!(!id.matches("hci0/dev_00", None));
    }
}
