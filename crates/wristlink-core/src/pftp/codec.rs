//! PFTP 操作编解码
//!
//! 线格式与命令逻辑之间唯一的接缝。默认实现 [`BincodeCodec`] 使用 bincode
//! varint 编码，限制单条消息大小并拒绝多余的尾部字节。

use crate::error::{Error, Result};
use bincode::Options;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

/// 单条消息上限，防止不可信数据触发超大分配
pub const MAX_MESSAGE_LEN: u64 = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    Get,
    Put,
    Remove,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub command: Command,
    pub path: String,
}

impl Operation {
    pub fn new(command: Command, path: &str) -> Self {
        Self {
            command,
            path: path.to_string(),
        }
    }
}

/// 目录项，名称以 `/` 结尾表示子目录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub name: String,
    pub size: u64,
}

impl DirectoryEntry {
    pub fn new(name: &str, size: u64) -> Self {
        Self {
            name: name.to_string(),
            size,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.name.ends_with('/')
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directory {
    pub entries: Vec<DirectoryEntry>,
}

impl Directory {
    pub fn new(entries: Vec<DirectoryEntry>) -> Self {
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// 可替换的线格式
pub trait OperationCodec: Send + Sync {
    fn encode(&self, operation: &Operation) -> Result<Vec<u8>>;

    fn decode_operation(&self, bytes: &[u8]) -> Result<Operation>;

    fn encode_directory(&self, directory: &Directory) -> Result<Vec<u8>>;

    fn decode_directory(&self, bytes: &[u8]) -> Result<Directory>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec;

impl OperationCodec for BincodeCodec {
    fn encode(&self, operation: &Operation) -> Result<Vec<u8>> {
        to_wire(operation)
    }

    fn decode_operation(&self, bytes: &[u8]) -> Result<Operation> {
        from_wire(bytes)
    }

    fn encode_directory(&self, directory: &Directory) -> Result<Vec<u8>> {
        to_wire(directory)
    }

    fn decode_directory(&self, bytes: &[u8]) -> Result<Directory> {
        from_wire(bytes)
    }
}

fn wire_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_varint_encoding()
        .with_limit(MAX_MESSAGE_LEN)
        .reject_trailing_bytes()
}

/// 使用默认线格式序列化任意消息（通知载荷也走这里）
pub fn to_wire<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    wire_options()
        .serialize(value)
        .map_err(|e| Error::Protocol(format!("encode failed: {}", e)))
}

pub fn from_wire<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    wire_options()
        .deserialize(bytes)
        .map_err(|e| Error::Protocol(format!("decode failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_fixture() {
        // 1 项: name="A/" (len 2), size=0
        let bytes = [0x01, 0x02, b'A', b'/', 0x00];
        let dir = BincodeCodec.decode_directory(&bytes).unwrap();
        assert_eq!(dir, Directory::new(vec![DirectoryEntry::new("A/", 0)]));
        assert!(dir.entries[0].is_dir());
    }

    #[test]
    fn test_decode_large_size_fixture() {
        // size=300 -> varint 0xFB + u16 LE
        let bytes = [0x01, 0x01, b'f', 0xFB, 0x2C, 0x01];
        let dir = BincodeCodec.decode_directory(&bytes).unwrap();
        assert_eq!(dir.entries, vec![DirectoryEntry::new("f", 300)]);
    }

    #[test]
    fn test_directory_roundtrip() {
        let dir = Directory::new(vec![
            DirectoryEntry::new("U/", 0),
            DirectoryEntry::new("DEVICE.BPB", 412),
            DirectoryEntry::new("SYNCINFO.BPB", 70_000),
        ]);
        let bytes = BincodeCodec.encode_directory(&dir).unwrap();
        assert_eq!(BincodeCodec.decode_directory(&bytes).unwrap(), dir);
    }

    #[test]
    fn test_malformed_directory() {
        // 声明 1 项但数据被截断
        let err = BincodeCodec.decode_directory(&[0x01, 0x05, b'a']).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));

        // 尾部多余字节
        let err = BincodeCodec
            .decode_directory(&[0x00, 0xAA])
            .unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn test_oversized_length_rejected() {
        // 声明一个远超上限的字符串长度
        let bytes = [0x01, 0xFD, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x00, 0x00];
        assert!(BincodeCodec.decode_directory(&bytes).is_err());
    }

    #[test]
    fn test_operation_roundtrip() {
        let op = Operation::new(Command::Remove, "/U/0/20240101/");
        let bytes = BincodeCodec.encode(&op).unwrap();
        assert_eq!(BincodeCodec.decode_operation(&bytes).unwrap(), op);
    }
}
