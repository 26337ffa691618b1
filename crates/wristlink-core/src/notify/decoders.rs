//! 通知载荷解码器
//!
//! [`DecoderRegistry`] 把 [`EventKind`] 映射到解码函数，启动时填充，
//! 共享后只读。载荷使用与 PFTP 操作相同的线格式。

use crate::notify::EventKind;
use crate::pftp::codec::from_wire;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("invalid value: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileAction {
    Created,
    Updated,
    Removed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilesystemModified {
    pub action: FileAction,
    pub path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatteryStatus {
    /// 0-100
    pub level: u8,
    pub charging: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InactivityAlert {
    pub countdown_secs: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingSessionStatus {
    pub in_progress: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRequired {
    pub full_sync: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutosyncStatus {
    pub succeeded: bool,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StartGpsMeasurement {
    pub min_interval_ms: u32,
    pub accuracy_m: u32,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExerciseState {
    Idle,
    Running,
    Paused,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExerciseStatus {
    pub state: ExerciseState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaControlEnabled {
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestApiEvent {
    pub uri: String,
    pub body: Vec<u8>,
}

/// 已解码的载荷，每种可解码的事件一个变体
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TypedValue {
    FilesystemModified(FilesystemModified),
    BatteryStatus(BatteryStatus),
    InactivityAlert(InactivityAlert),
    TrainingSessionStatus(TrainingSessionStatus),
    SyncRequired(SyncRequired),
    AutosyncStatus(AutosyncStatus),
    StartGpsMeasurement(StartGpsMeasurement),
    ExerciseStatus(ExerciseStatus),
    MediaControlEnabled(MediaControlEnabled),
    RestApiEvent(RestApiEvent),
}

pub type Decoder = Box<dyn Fn(&[u8]) -> Result<TypedValue, DecodeError> + Send + Sync>;

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, DecodeError> {
    from_wire(bytes).map_err(|e| DecodeError::Malformed(e.to_string()))
}

fn battery(bytes: &[u8]) -> Result<TypedValue, DecodeError> {
    let status: BatteryStatus = decode(bytes)?;
    if status.level > 100 {
        return Err(DecodeError::Invalid(format!(
            "battery level {}%",
            status.level
        )));
    }
    Ok(TypedValue::BatteryStatus(status))
}

#[derive(Default)]
pub struct DecoderRegistry {
    decoders: HashMap<EventKind, Decoder>,
}

impl DecoderRegistry {
    /// 空注册表：所有事件都不带解析结果
    pub fn new() -> Self {
        Self::default()
    }

    /// 内置解码器
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(EventKind::FilesystemModified, |b| {
            decode(b).map(TypedValue::FilesystemModified)
        });
        registry.register(EventKind::BatteryStatus, battery);
        registry.register(EventKind::InactivityAlert, |b| {
            decode(b).map(TypedValue::InactivityAlert)
        });
        registry.register(EventKind::TrainingSessionStatus, |b| {
            decode(b).map(TypedValue::TrainingSessionStatus)
        });
        registry.register(EventKind::SyncRequired, |b| {
            decode(b).map(TypedValue::SyncRequired)
        });
        registry.register(EventKind::AutosyncStatus, |b| {
            decode(b).map(TypedValue::AutosyncStatus)
        });
        registry.register(EventKind::StartGpsMeasurement, |b| {
            decode(b).map(TypedValue::StartGpsMeasurement)
        });
        registry.register(EventKind::ExerciseStatus, |b| {
            decode(b).map(TypedValue::ExerciseStatus)
        });
        registry.register(EventKind::MediaControlEnabled, |b| {
            decode(b).map(TypedValue::MediaControlEnabled)
        });
        registry.register(EventKind::RestApiEvent, |b| {
            decode(b).map(TypedValue::RestApiEvent)
        });
        registry
    }

    /// 注册（或替换）某类事件的解码器
    pub fn register<F>(&mut self, kind: EventKind, decoder: F)
    where
        F: Fn(&[u8]) -> Result<TypedValue, DecodeError> + Send + Sync + 'static,
    {
        self.decoders.insert(kind, Box::new(decoder));
    }

    pub fn get(&self, kind: EventKind) -> Option<&Decoder> {
        self.decoders.get(&kind)
    }

    pub fn contains(&self, kind: EventKind) -> bool {
        self.decoders.contains_key(&kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pftp::codec::to_wire;

    #[test]
    fn test_battery_fixture() {
        let registry = DecoderRegistry::with_defaults();
        let decoder = registry.get(EventKind::BatteryStatus).unwrap();
        assert_eq!(
            decoder(&[80, 1]).unwrap(),
            TypedValue::BatteryStatus(BatteryStatus {
                level: 80,
                charging: true
            })
        );
    }

    #[test]
    fn test_battery_out_of_range() {
        let registry = DecoderRegistry::with_defaults();
        let decoder = registry.get(EventKind::BatteryStatus).unwrap();
        assert!(matches!(decoder(&[180, 0]), Err(DecodeError::Invalid(_))));
        assert!(matches!(decoder(&[80, 7]), Err(DecodeError::Malformed(_))));
    }

    #[test]
    fn test_filesystem_modified() {
        let payload = FilesystemModified {
            action: FileAction::Created,
            path: "/U/0/20240101/E/0900/".to_string(),
        };
        let bytes = to_wire(&payload).unwrap();
        let registry = DecoderRegistry::with_defaults();
        let decoder = registry.get(EventKind::FilesystemModified).unwrap();
        assert_eq!(
            decoder(&bytes).unwrap(),
            TypedValue::FilesystemModified(payload)
        );
    }

    #[test]
    fn test_parameterless_kinds_have_no_decoder() {
        let registry = DecoderRegistry::with_defaults();
        assert!(!registry.contains(EventKind::StopGpsMeasurement));
        assert!(!registry.contains(EventKind::Idling));
    }
}
