//! Wristlink Core Library
//!
//! 通过 BLE 控制通道访问运动手表文件系统（PFTP）的核心实现库
//!
//! # 模块
//!
//! - **transport**: 会话抽象与内存设备
//! - **ble**: btleplug 扫描、连接和分帧
//! - **pftp**: 操作编解码、就绪门、命令客户端、目录遍历
//! - **notify**: 设备推送通知的分类与解码
//! - **workflow**: 面向应用的高层 API
//!
//! # 使用示例
//!
//! ## 读取文件
//!
//! ```ignore
//! use wristlink_core::{BleResolver, ClientSettings, DeviceClient};
//!
//! let settings = ClientSettings::load();
//! let resolver = BleResolver::new(settings.clone()).await?;
//! let client = DeviceClient::new(Arc::new(resolver), &settings);
//!
//! let bytes = client.read_file("1A2B3C4D", "/U/0/USERID.BPB").await?;
//! ```
//!
//! ## 列出训练记录
//!
//! ```ignore
//! let paths = client.list("1A2B3C4D", "/U/0/", true).await?;
//! for path in paths {
//!     println!("{}", path);
//! }
//! ```
//!
//! ## 订阅通知
//!
//! ```ignore
//! let mut events = client.notifications("1A2B3C4D").await?;
//! while let Some(event) = events.next().await {
//!     println!("{}: {:?}", event.kind, event.parsed);
//! }
//! ```

pub mod ble;
pub mod config;
pub mod error;
pub mod identity;
pub mod logging;
pub mod notify;
pub mod pftp;
pub mod transport;
pub mod workflow;

pub use error::{Error, RemoteError, Result, TransportError};
pub use identity::DeviceIdentity;

// Config re-exports
pub use config::ClientSettings;
pub use logging::LogLevel;

// BLE re-exports
pub use ble::{BleResolver, BleSession, DiscoveredDevice};

// Transport re-exports
pub use transport::memory::{MemoryDevice, MemoryResolver};
pub use transport::{BodyStream, Channel, SessionResolver, SessionState, TransportSession};

// PFTP re-exports
pub use pftp::{
    BincodeCodec, Command, CommandClient, Directory, DirectoryEntry, Operation, OperationCodec,
    ReadinessGate, TreeWalker, WalkEntry,
};

// Notification re-exports
pub use notify::{
    DecoderRegistry, Demultiplexer, EventKind, NotificationEvent, NotificationStream, TypedValue,
};

// Workflow re-exports
pub use workflow::{DeviceClient, Fetched};
