//! 客户端配置和持久化
//!
//! 提供就绪超时、轮询间隔、请求超时等设置的存储和读取。

use crate::pftp::ReadinessGate;
use crate::pftp::walker::DEFAULT_MAX_DEPTH;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// 客户端设置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// 等待控制通道就绪的最长时间（毫秒）
    pub ready_timeout_ms: u64,
    /// 就绪轮询间隔（毫秒）
    pub ready_poll_interval_ms: u64,
    /// 单个请求等待响应的最长时间（秒）
    pub request_timeout_secs: u64,
    /// 扫描时长（秒）
    pub scan_timeout_secs: u64,
    /// 每帧字节数（含 1 字节帧头），受 ATT MTU 限制
    pub frame_size: usize,
    /// 目录递归的最大深度，超过即报错
    pub max_walk_depth: usize,
    /// 详细日志模式
    pub verbose: bool,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            ready_timeout_ms: 5000,
            ready_poll_interval_ms: 100,
            request_timeout_secs: 30,
            scan_timeout_secs: 5,
            frame_size: 20,
            max_walk_depth: DEFAULT_MAX_DEPTH,
            verbose: false,
        }
    }
}

impl ClientSettings {
    /// 获取配置文件路径
    pub fn config_path() -> PathBuf {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("wristlink");
        config_dir.join("settings.toml")
    }

    /// 加载设置（如果文件不存在则使用默认值）
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &std::path::Path) -> Self {
        if path.exists() {
            match fs::read_to_string(path) {
                Ok(content) => match toml::from_str(&content) {
                    Ok(settings) => {
                        debug!("Loaded settings from {:?}", path);
                        return settings;
                    }
                    Err(e) => {
                        log::warn!("Failed to parse settings: {}, using defaults", e);
                    }
                },
                Err(e) => {
                    log::warn!("Failed to read settings file: {}, using defaults", e);
                }
            }
        }
        Self::default()
    }

    /// 保存设置
    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &std::path::Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        debug!("Saved settings to {:?}", path);
        Ok(())
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }

    pub fn ready_poll_interval(&self) -> Duration {
        Duration::from_millis(self.ready_poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_secs)
    }

    pub fn readiness_gate(&self) -> ReadinessGate {
        ReadinessGate::new(self.ready_poll_interval(), self.ready_timeout())
    }
}
