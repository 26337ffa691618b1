//! 错误类型
//!
//! 所有对外操作返回 [`Result<T>`]。
//!
//! | 类别 | 变体 |
//! |------|------|
//! | 会话 | [`Error::DeviceNotFound`], [`Error::DeviceNotConnected`], [`Error::ServiceNotFound`] |
//! | 就绪 | [`Error::NotificationNotEnabled`] |
//! | 参数 | [`Error::InvalidArgument`] |
//! | 协议 | [`Error::Protocol`] |
//! | 链路 | [`Error::Transport`], [`Error::Remote`] |
//! | 取消 | [`Error::Cancelled`] |

use std::time::Duration;

/// 库内统一的 Result 别名
pub type Result<T> = std::result::Result<T, Error>;

/// 链路层错误，原样透传给调用方
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("Link failure: {0}")]
    Link(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Session closed")]
    Closed,

    /// 设备返回的数字错误码（尚未翻译）
    #[error("Device reported error code {0}")]
    DeviceCode(u16),
}

impl From<btleplug::Error> for TransportError {
    fn from(e: btleplug::Error) -> Self {
        TransportError::Link(e.to_string())
    }
}

/// 设备上报的错误，已翻译为可读形式
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteError {
    pub domain: &'static str,
    pub code: u16,
    pub message: &'static str,
}

impl std::fmt::Display for RemoteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} error {}: {}", self.domain, self.code, self.message)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Device not connected")]
    DeviceNotConnected,

    #[error("Service not found: {0}")]
    ServiceNotFound(String),

    #[error("Notifications not enabled after {waited:?}")]
    NotificationNotEnabled { waited: Duration },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Remote error: {0}")]
    Remote(RemoteError),

    #[error("Operation cancelled")]
    Cancelled,
}

impl From<btleplug::Error> for Error {
    fn from(e: btleplug::Error) -> Self {
        Error::Transport(e.into())
    }
}
