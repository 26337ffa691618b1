//! PFTP 文件传输协议
//!
//! - **codec**: 操作和目录列表的线格式
//! - **ready**: 控制通道就绪门
//! - **client**: GET / PUT / REMOVE 命令客户端
//! - **walker**: 基于 GET 的目录树遍历
//! - **errors**: 设备错误码翻译

pub mod client;
pub mod codec;
pub mod errors;
pub mod ready;
pub mod walker;

pub use client::CommandClient;
pub use codec::{BincodeCodec, Command, Directory, DirectoryEntry, Operation, OperationCodec};
pub use ready::{Ready, ReadinessGate};
pub use walker::{TreeWalker, WalkEntry};

/// 目录路径规范化：以 `/` 开头并以 `/` 结尾
pub fn normalize_dir(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{}/", trimmed)
    }
}

/// 文件路径规范化：以 `/` 开头
pub fn normalize_file(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}
