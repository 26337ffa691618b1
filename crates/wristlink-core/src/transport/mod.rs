//! 传输层接口
//!
//! 核心逻辑只依赖这里的两个 trait：
//! - [`TransportSession`]: 一个已连接设备的请求/响应通道和推送事件源
//! - [`SessionResolver`]: 根据 [`DeviceIdentity`] 找到会话
//!
//! BLE 实现见 [`crate::ble`]，内存实现见 [`memory`]。

pub mod memory;

use crate::error::{Result, TransportError};
use crate::identity::DeviceIdentity;
use futures_util::stream::BoxStream;
use std::sync::Arc;

/// 会话连接状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NotFound,
    NotConnected,
    Open,
}

/// 两个控制通道，发送命令前都必须开启通知
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// 命令请求/响应
    Mtu,
    /// 设备到主机的推送事件
    DeviceToHost,
}

impl Channel {
    pub const ALL: [Channel; 2] = [Channel::Mtu, Channel::DeviceToHost];
}

/// 推送事件流: `(tag, payload)`
pub type EventStream = BoxStream<'static, (i32, Vec<u8>)>;

/// PUT 请求体
pub type BodyStream = BoxStream<'static, std::io::Result<Vec<u8>>>;

/// 会话级请求锁，同一时间只允许一个在途请求
pub type RequestSlot = Arc<tokio::sync::Mutex<()>>;

pub fn new_request_slot() -> RequestSlot {
    Arc::new(tokio::sync::Mutex::new(()))
}

/// 一个已连接设备的会话
///
/// 传输层本身不保证单请求约束，由 [`crate::pftp::CommandClient`] 通过
/// [`TransportSession::request_slot`] 串行化。
#[async_trait::async_trait]
pub trait TransportSession: Send + Sync {
    /// 会话标识（用于按会话加锁和日志）
    fn id(&self) -> &str;

    async fn state(&self) -> SessionState;

    /// 控制通道对应的特征是否已发现
    fn has_channel(&self, channel: Channel) -> bool;

    fn is_notification_enabled(&self, channel: Channel) -> bool;

    fn rssi(&self) -> Option<i16> {
        None
    }

    /// 会话自带的请求锁，每次调用必须返回同一把
    fn request_slot(&self) -> RequestSlot;

    async fn request(&self, header: Vec<u8>) -> std::result::Result<Vec<u8>, TransportError>;

    async fn write_stream(
        &self,
        header: Vec<u8>,
        body: BodyStream,
    ) -> std::result::Result<(), TransportError>;

    /// 订阅推送事件，只包含订阅之后的事件
    async fn events(&self) -> std::result::Result<EventStream, TransportError>;
}

#[async_trait::async_trait]
pub trait SessionResolver: Send + Sync {
    async fn resolve(&self, identity: &DeviceIdentity) -> Result<Arc<dyn TransportSession>>;
}
