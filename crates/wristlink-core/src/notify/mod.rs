//! 设备推送通知
//!
//! 设备通过 D2H 特征推送 `(tag, payload)`。tag 映射到封闭的 [`EventKind`]，
//! 载荷交给按类型注册的解码器。未知 tag 直接丢弃，解码失败只记录日志，
//! 事件仍然送达（`parsed = None`）。

pub mod decoders;
pub mod demux;

pub use decoders::{DecodeError, Decoder, DecoderRegistry, TypedValue};
pub use demux::{Demultiplexer, NotificationStream, SubscriptionState};

/// 设备到主机的事件类型（tag 6 保留未用）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    FilesystemModified = 0,
    InternalTestEvent = 1,
    Idling = 2,
    BatteryStatus = 3,
    InactivityAlert = 4,
    TrainingSessionStatus = 5,
    SyncRequired = 7,
    AutosyncStatus = 8,
    PnsNotificationResponse = 9,
    PnsSettings = 10,
    StartGpsMeasurement = 11,
    StopGpsMeasurement = 12,
    KeepBackupAlive = 13,
    ShellData = 14,
    MediaControlRequest = 15,
    MediaControlCommand = 16,
    MediaControlEnabled = 17,
    RestApiEvent = 18,
    ExerciseStatus = 19,
}

impl EventKind {
    /// 未知 tag 返回 `None`，不会 panic
    pub fn from_tag(tag: i32) -> Option<Self> {
        let kind = match tag {
            0 => EventKind::FilesystemModified,
            1 => EventKind::InternalTestEvent,
            2 => EventKind::Idling,
            3 => EventKind::BatteryStatus,
            4 => EventKind::InactivityAlert,
            5 => EventKind::TrainingSessionStatus,
            7 => EventKind::SyncRequired,
            8 => EventKind::AutosyncStatus,
            9 => EventKind::PnsNotificationResponse,
            10 => EventKind::PnsSettings,
            11 => EventKind::StartGpsMeasurement,
            12 => EventKind::StopGpsMeasurement,
            13 => EventKind::KeepBackupAlive,
            14 => EventKind::ShellData,
            15 => EventKind::MediaControlRequest,
            16 => EventKind::MediaControlCommand,
            17 => EventKind::MediaControlEnabled,
            18 => EventKind::RestApiEvent,
            19 => EventKind::ExerciseStatus,
            _ => return None,
        };
        Some(kind)
    }

    pub fn tag(self) -> i32 {
        self as i32
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}({})", self, self.tag())
    }
}

/// 一条已分类的推送事件，原始载荷总是保留
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationEvent {
    pub kind: EventKind,
    pub raw: Vec<u8>,
    pub parsed: Option<TypedValue>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_roundtrip() {
        for tag in (0..=5).chain(7..=19) {
            let kind = EventKind::from_tag(tag).unwrap();
            assert_eq!(kind.tag(), tag);
        }
    }

    #[test]
    fn test_unknown_tags() {
        for tag in [-1, 6, 20, 255, i32::MAX] {
            assert_eq!(EventKind::from_tag(tag), None);
        }
    }
}
