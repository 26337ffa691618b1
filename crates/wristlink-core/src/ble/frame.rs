//! MTU 分帧
//!
//! 帧头 1 字节:
//! - bit0: 后续还有帧
//! - bit1-2: 状态，1 表示错误帧（载荷为 u16 LE 设备错误码）
//! - bit4-7: 序号，模 16 递增
//!
//! 请求的载荷为 `u16 LE 操作头长度 + 操作头 + 请求体`，跨帧连续切分。

use crate::error::TransportError;

const MORE: u8 = 0x01;
const STATUS_MASK: u8 = 0x06;
const STATUS_ERROR: u8 = 0x02;
const MIN_FRAME_SIZE: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("empty frame")]
    Empty,

    #[error("frame out of sequence: expected {expected}, got {got}")]
    OutOfSequence { expected: u8, got: u8 },

    #[error("truncated error frame")]
    TruncatedError,

    #[error("operation header too large ({0} bytes)")]
    HeaderTooLarge(usize),

    #[error("device error {0}")]
    Device(u16),
}

impl From<FrameError> for TransportError {
    fn from(e: FrameError) -> Self {
        match e {
            FrameError::Device(code) => TransportError::DeviceCode(code),
            other => TransportError::Link(other.to_string()),
        }
    }
}

/// 请求载荷前缀：操作头长度 + 操作头
pub fn request_prefix(header: &[u8]) -> Result<Vec<u8>, FrameError> {
    let len = u16::try_from(header.len()).map_err(|_| FrameError::HeaderTooLarge(header.len()))?;
    let mut out = Vec::with_capacity(2 + header.len());
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(header);
    Ok(out)
}

/// 增量分帧：最后一帧留到 [`FrameWriter::finish`] 才发出，以便标记 `more`
pub struct FrameWriter {
    chunk: usize,
    seq: u8,
    pending: Vec<u8>,
}

impl FrameWriter {
    pub fn new(frame_size: usize) -> Self {
        Self {
            chunk: frame_size.max(MIN_FRAME_SIZE) - 1,
            seq: 0,
            pending: Vec::new(),
        }
    }

    /// 追加数据，返回已确定不是最后一帧的完整帧
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Vec<u8>> {
        self.pending.extend_from_slice(bytes);
        let mut frames = Vec::new();
        while self.pending.len() > self.chunk {
            let rest = self.pending.split_off(self.chunk);
            let data = std::mem::replace(&mut self.pending, rest);
            frames.push(self.frame(&data, true));
        }
        frames
    }

    /// 发出最后一帧（数据为空时也会发出一个空帧）
    pub fn finish(mut self) -> Vec<u8> {
        let data = std::mem::take(&mut self.pending);
        self.frame(&data, false)
    }

    fn frame(&mut self, data: &[u8], more: bool) -> Vec<u8> {
        let mut header = (self.seq & 0x0F) << 4;
        if more {
            header |= MORE;
        }
        self.seq = self.seq.wrapping_add(1) & 0x0F;
        let mut frame = Vec::with_capacity(1 + data.len());
        frame.push(header);
        frame.extend_from_slice(data);
        frame
    }
}

/// 一次性切分完整消息
pub fn split(payload: &[u8], frame_size: usize) -> Vec<Vec<u8>> {
    let mut writer = FrameWriter::new(frame_size);
    let mut frames = writer.push(payload);
    frames.push(writer.finish());
    frames
}

#[derive(Debug, PartialEq, Eq)]
pub enum Progress {
    More,
    Complete(Vec<u8>),
}

/// 响应重组
#[derive(Default)]
pub struct FrameReader {
    expected: u8,
    data: Vec<u8>,
}

impl FrameReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, frame: &[u8]) -> Result<Progress, FrameError> {
        let (&header, body) = frame.split_first().ok_or(FrameError::Empty)?;
        let seq = header >> 4;
        if seq != self.expected {
            return Err(FrameError::OutOfSequence {
                expected: self.expected,
                got: seq,
            });
        }
        self.expected = (self.expected + 1) & 0x0F;

        if header & STATUS_MASK == STATUS_ERROR {
            let code = body
                .get(..2)
                .map(|b| u16::from_le_bytes([b[0], b[1]]))
                .ok_or(FrameError::TruncatedError)?;
            return Err(FrameError::Device(code));
        }

        self.data.extend_from_slice(body);
        if header & MORE == 0 {
            Ok(Progress::Complete(std::mem::take(&mut self.data)))
        } else {
            Ok(Progress::More)
        }
    }
}
