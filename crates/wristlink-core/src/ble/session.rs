//! BLE 会话 - 基于 btleplug 的 [`TransportSession`] 实现
//!
//! 流程:
//! 1. 发现服务，找到 MTU 和 D2H 两个特征
//! 2. 订阅两个特征的通知，成功后置位对应的就绪标志
//! 3. 请求: 分帧写入 MTU 特征，再从 MTU 通知中重组响应
//! 4. 推送事件: D2H 通知的第一个字节是 tag，其余是载荷

use crate::ble::frame::{self, FrameReader, FrameWriter, Progress};
use crate::ble::{PFTP_D2H_CHAR_UUID, PFTP_MTU_CHAR_UUID, PFTP_SERVICE_UUID};
use crate::config::ClientSettings;
use crate::error::{Error, Result, TransportError};
use crate::transport::{
    BodyStream, Channel, EventStream, RequestSlot, SessionState, TransportSession,
};
use btleplug::api::{Characteristic, Peripheral as _, ValueNotification, WriteType};
use btleplug::platform::Peripheral as PlatformPeripheral;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use uuid::Uuid;

pub struct BleSession {
    id: String,
    peripheral: PlatformPeripheral,
    mtu_char: Option<Characteristic>,
    d2h_char: Option<Characteristic>,
    mtu_enabled: AtomicBool,
    d2h_enabled: AtomicBool,
    rssi: Option<i16>,
    frame_size: usize,
    request_timeout: Duration,
    slot: RequestSlot,
}

impl BleSession {
    /// 在已连接、已发现服务的外设上建立会话
    ///
    /// 重连同一设备时应传入旧会话的 `slot`，使新旧会话上的请求仍然互斥。
    pub async fn open(
        id: String,
        peripheral: PlatformPeripheral,
        rssi: Option<i16>,
        slot: RequestSlot,
        settings: &ClientSettings,
    ) -> Result<Self> {
        if !peripheral
            .services()
            .iter()
            .any(|service| service.uuid == PFTP_SERVICE_UUID)
        {
            return Err(Error::ServiceNotFound(PFTP_SERVICE_UUID.to_string()));
        }

        let session = Self {
            mtu_char: find_characteristic(&peripheral, PFTP_MTU_CHAR_UUID),
            d2h_char: find_characteristic(&peripheral, PFTP_D2H_CHAR_UUID),
            id,
            peripheral,
            mtu_enabled: AtomicBool::new(false),
            d2h_enabled: AtomicBool::new(false),
            rssi,
            frame_size: settings.frame_size,
            request_timeout: settings.request_timeout(),
            slot,
        };

        for (char, flag) in [
            (&session.mtu_char, &session.mtu_enabled),
            (&session.d2h_char, &session.d2h_enabled),
        ] {
            if let Some(char) = char {
                match session.peripheral.subscribe(char).await {
                    Ok(()) => flag.store(true, Ordering::SeqCst),
                    Err(e) => warn!("Failed to subscribe to {}: {}", char.uuid, e),
                }
            }
        }

        info!(
            "PFTP session {} opened (mtu={}, d2h={})",
            session.id,
            session.mtu_enabled.load(Ordering::SeqCst),
            session.d2h_enabled.load(Ordering::SeqCst)
        );
        Ok(session)
    }

    fn mtu(&self) -> std::result::Result<&Characteristic, TransportError> {
        self.mtu_char.as_ref().ok_or(TransportError::Closed)
    }

    async fn write_frame(&self, frame: &[u8]) -> std::result::Result<(), TransportError> {
        self.peripheral
            .write(self.mtu()?, frame, WriteType::WithoutResponse)
            .await?;
        Ok(())
    }

    /// 从 MTU 通知中重组一条响应，超时由设置决定
    async fn read_response(
        &self,
        notifications: &mut BoxStream<'static, ValueNotification>,
    ) -> std::result::Result<Vec<u8>, TransportError> {
        tokio::time::timeout(self.request_timeout, self.reassemble(notifications))
            .await
            .map_err(|_| TransportError::Timeout(self.request_timeout))?
    }

    async fn reassemble(
        &self,
        notifications: &mut BoxStream<'static, ValueNotification>,
    ) -> std::result::Result<Vec<u8>, TransportError> {
        let mut reader = FrameReader::new();
        while let Some(notification) = notifications.next().await {
            if notification.uuid != PFTP_MTU_CHAR_UUID {
                continue;
            }
            if let Progress::Complete(data) = reader.push(&notification.value)? {
                debug!("{}: response {} bytes", self.id, data.len());
                return Ok(data);
            }
        }
        Err(TransportError::Closed)
    }

    async fn subscribe_mtu(
        &self,
    ) -> std::result::Result<BoxStream<'static, ValueNotification>, TransportError> {
        Ok(self.peripheral.notifications().await?)
    }
}

fn find_characteristic(peripheral: &PlatformPeripheral, uuid: Uuid) -> Option<Characteristic> {
    peripheral
        .services()
        .into_iter()
        .filter(|service| service.uuid == PFTP_SERVICE_UUID)
        .flat_map(|service| service.characteristics)
        .find(|char| char.uuid == uuid)
}

#[async_trait::async_trait]
impl TransportSession for BleSession {
    fn id(&self) -> &str {
        &self.id
    }

    async fn state(&self) -> SessionState {
        match self.peripheral.is_connected().await {
            Ok(true) => SessionState::Open,
            Ok(false) => SessionState::NotConnected,
            Err(e) => {
                debug!("{}: connection state unavailable: {}", self.id, e);
                SessionState::NotFound
            }
        }
    }

    fn has_channel(&self, channel: Channel) -> bool {
        match channel {
            Channel::Mtu => self.mtu_char.is_some(),
            Channel::DeviceToHost => self.d2h_char.is_some(),
        }
    }

    fn is_notification_enabled(&self, channel: Channel) -> bool {
        match channel {
            Channel::Mtu => self.mtu_enabled.load(Ordering::SeqCst),
            Channel::DeviceToHost => self.d2h_enabled.load(Ordering::SeqCst),
        }
    }

    fn rssi(&self) -> Option<i16> {
        self.rssi
    }

    fn request_slot(&self) -> RequestSlot {
        self.slot.clone()
    }

    async fn request(&self, header: Vec<u8>) -> std::result::Result<Vec<u8>, TransportError> {
        // 先订阅再写入，避免丢失第一帧响应
        let mut notifications = self.subscribe_mtu().await?;
        for frame in frame::split(&frame::request_prefix(&header)?, self.frame_size) {
            self.write_frame(&frame).await?;
        }
        self.read_response(&mut notifications).await
    }

    async fn write_stream(
        &self,
        header: Vec<u8>,
        mut body: BodyStream,
    ) -> std::result::Result<(), TransportError> {
        let mut notifications = self.subscribe_mtu().await?;
        let mut writer = FrameWriter::new(self.frame_size);
        let mut sent = 0usize;

        for frame in writer.push(&frame::request_prefix(&header)?) {
            self.write_frame(&frame).await?;
        }
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| TransportError::Link(format!("body: {}", e)))?;
            sent += chunk.len();
            for frame in writer.push(&chunk) {
                self.write_frame(&frame).await?;
            }
        }
        self.write_frame(&writer.finish()).await?;
        debug!("{}: streamed {} body bytes", self.id, sent);

        self.read_response(&mut notifications).await.map(|_| ())
    }

    async fn events(&self) -> std::result::Result<EventStream, TransportError> {
        let notifications = self.peripheral.notifications().await?;
        Ok(notifications
            .filter_map(|notification| {
                let event = (notification.uuid == PFTP_D2H_CHAR_UUID)
                    .then_some(notification.value)
                    .and_then(|value| {
                        value
                            .split_first()
                            .map(|(&tag, payload)| (i32::from(tag), payload.to_vec()))
                    });
                futures_util::future::ready(event)
            })
            .boxed())
    }
}
