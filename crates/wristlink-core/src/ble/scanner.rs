//! BLE 扫描与会话解析
//!
//! 使用 btleplug 扫描广播 PFTP 服务的设备，并把 [`DeviceIdentity`] 解析为
//! 已连接的 [`BleSession`]。
//!
//! # 设备识别
//!
//! - 硬件地址形式: 与外设标识符比较（macOS 上是 UUID 形式）
//! - 设备 ID 形式: 与广播名称的最后一个单词比较，如 `Polar Ignite 3 1A2B3C4D`

use crate::ble::{BleSession, PFTP_SERVICE_UUID};
use crate::config::ClientSettings;
use crate::error::{Error, Result};
use crate::identity::DeviceIdentity;
use crate::transport::{
    RequestSlot, SessionResolver, SessionState, TransportSession, new_request_slot,
};
use btleplug::api::{Central, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral as PlatformPeripheral};
use log::{debug, info};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time;

#[derive(Debug, Clone)]
pub struct DiscoveredDevice {
    pub name: String,
    pub address: String,
    /// 广播名称末尾的设备 ID（如果有）
    pub device_id: Option<String>,
    pub rssi: Option<i16>,
}

pub struct BleResolver {
    adapter: Adapter,
    settings: ClientSettings,
    sessions: Mutex<HashMap<DeviceIdentity, Arc<BleSession>>>,
}

impl BleResolver {
    pub async fn new(settings: ClientSettings) -> Result<Self> {
        let manager = Manager::new().await?;
        let adapters = manager.adapters().await?;
        let adapter = adapters
            .into_iter()
            .next()
            .ok_or_else(|| Error::DeviceNotFound("no Bluetooth adapter".to_string()))?;

        Ok(Self {
            adapter,
            settings,
            sessions: Mutex::new(HashMap::new()),
        })
    }

    /// 扫描附近的 PFTP 设备
    pub async fn scan(&self, duration: Duration) -> Result<Vec<DiscoveredDevice>> {
        self.run_scan(duration).await?;

        let mut devices = Vec::new();
        for peripheral in self.adapter.peripherals().await? {
            let Some(props) = peripheral.properties().await? else {
                continue;
            };
            if !props.services.contains(&PFTP_SERVICE_UUID) {
                continue;
            }
            let name = props
                .local_name
                .clone()
                .unwrap_or_else(|| "<unknown>".to_string());
            let device_id = name
                .split_whitespace()
                .last()
                .filter(|suffix| matches!(DeviceIdentity::parse(suffix), Ok(DeviceIdentity::DeviceId(_))))
                .map(str::to_uppercase);
            devices.push(DiscoveredDevice {
                name,
                address: format!("{:?}", peripheral.id()),
                device_id,
                rssi: props.rssi,
            });
        }

        info!("Scan complete: found {} PFTP device(s)", devices.len());
        Ok(devices)
    }

    async fn run_scan(&self, duration: Duration) -> Result<()> {
        info!("Starting BLE scan for {} seconds", duration.as_secs());
        self.adapter
            .start_scan(ScanFilter {
                services: vec![PFTP_SERVICE_UUID],
            })
            .await?;
        time::sleep(duration).await;
        self.adapter.stop_scan().await?;
        Ok(())
    }

    async fn find_device(
        &self,
        identity: &DeviceIdentity,
    ) -> Result<Option<(PlatformPeripheral, Option<i16>)>> {
        for peripheral in self.adapter.peripherals().await? {
            let props = peripheral.properties().await?;
            let local_name = props.as_ref().and_then(|p| p.local_name.as_deref());
            if identity.matches(&format!("{:?}", peripheral.id()), local_name) {
                let rssi = props.as_ref().and_then(|p| p.rssi);
                return Ok(Some((peripheral, rssi)));
            }
        }
        Ok(None)
    }

    async fn connect(&self, identity: &DeviceIdentity, slot: RequestSlot) -> Result<BleSession> {
        // 先查缓存的外设，找不到再扫描一次
        let found = match self.find_device(identity).await? {
            Some(found) => Some(found),
            None => {
                self.run_scan(self.settings.scan_timeout()).await?;
                self.find_device(identity).await?
            }
        };
        let (peripheral, rssi) = found.ok_or_else(|| Error::DeviceNotFound(identity.to_string()))?;

        if !peripheral.is_connected().await? {
            info!("Connecting to {}", identity);
            peripheral.connect().await?;
        }

        debug!("Discovering services...");
        peripheral.discover_services().await?;

        BleSession::open(identity.to_string(), peripheral, rssi, slot, &self.settings).await
    }
}

#[async_trait::async_trait]
impl SessionResolver for BleResolver {
    async fn resolve(&self, identity: &DeviceIdentity) -> Result<Arc<dyn TransportSession>> {
        let cached = self
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(identity)
            .cloned();
        // 重连时沿用旧会话的请求锁
        let slot = match cached {
            Some(session) => {
                if session.state().await == SessionState::Open {
                    return Ok(session);
                }
                debug!("Cached session for {} is stale, reconnecting", identity);
                session.request_slot()
            }
            None => new_request_slot(),
        };

        let session = Arc::new(self.connect(identity, slot).await?);
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(identity.clone(), session.clone());
        Ok(session)
    }
}
