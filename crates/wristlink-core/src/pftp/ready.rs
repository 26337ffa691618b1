//! 就绪门
//!
//! 发送任何命令前，轮询两个控制通道的通知开关，直到都开启或超时。
//! 时钟来自 `tokio::time`，测试中可用暂停时间驱动。

use crate::error::{Error, Result};
use crate::transport::{Channel, SessionState, TransportSession};
use log::debug;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(5);

/// 就绪凭证，记录等待时长
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ready {
    pub waited: Duration,
}

#[derive(Debug, Clone, Copy)]
pub struct ReadinessGate {
    interval: Duration,
    deadline: Duration,
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL, DEFAULT_DEADLINE)
    }
}

impl ReadinessGate {
    /// `interval` 为零时按 1ms 处理，避免空转
    pub fn new(interval: Duration, deadline: Duration) -> Self {
        Self {
            interval: interval.max(Duration::from_millis(1)),
            deadline,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    pub async fn wait_ready(
        &self,
        session: &dyn TransportSession,
        cancel: Option<&CancellationToken>,
    ) -> Result<Ready> {
        match session.state().await {
            SessionState::NotFound => return Err(Error::DeviceNotFound(session.id().to_string())),
            SessionState::NotConnected => return Err(Error::DeviceNotConnected),
            SessionState::Open => {}
        }
        if let Some(missing) = Channel::ALL.iter().find(|c| !session.has_channel(**c)) {
            return Err(Error::ServiceNotFound(format!("{:?} channel", missing)));
        }

        let start = Instant::now();
        loop {
            if Channel::ALL
                .iter()
                .all(|c| session.is_notification_enabled(*c))
            {
                let waited = start.elapsed();
                debug!("Session {} ready after {:?}", session.id(), waited);
                return Ok(Ready { waited });
            }

            let waited = start.elapsed();
            if waited >= self.deadline {
                debug!(
                    "Session {} notifications still disabled after {:?}",
                    session.id(),
                    waited
                );
                return Err(Error::NotificationNotEnabled { waited });
            }

            match cancel {
                Some(token) => {
                    tokio::select! {
                        _ = token.cancelled() => return Err(Error::Cancelled),
                        _ = tokio::time::sleep(self.interval) => {}
                    }
                }
                None => tokio::time::sleep(self.interval).await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::memory::MemoryDevice;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_ready_immediately() {
        let device = MemoryDevice::new("dev");
        let ready = ReadinessGate::default()
            .wait_ready(&device, None)
            .await
            .unwrap();
        assert_eq!(ready.waited, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_within_one_interval() {
        let device = Arc::new(MemoryDevice::new("dev"));
        device.set_notification_enabled(Channel::DeviceToHost, false);

        let flip = device.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1250)).await;
            flip.set_notification_enabled(Channel::DeviceToHost, true);
        });

        let ready = ReadinessGate::default()
            .wait_ready(device.as_ref(), None)
            .await
            .unwrap();
        assert!(ready.waited >= Duration::from_millis(1250));
        assert!(ready.waited <= Duration::from_millis(1350));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout() {
        let device = MemoryDevice::new("dev");
        device.set_notification_enabled(Channel::Mtu, false);

        let gate = ReadinessGate::default();
        let err = gate.wait_ready(&device, None).await.unwrap_err();
        match err {
            Error::NotificationNotEnabled { waited } => {
                assert!(waited >= gate.deadline());
                assert!(waited <= gate.deadline() + gate.interval());
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_at_interval() {
        let device = MemoryDevice::new("dev");
        device.set_notification_enabled(Channel::Mtu, false);

        let gate = ReadinessGate::new(Duration::from_millis(100), Duration::from_secs(1));
        let _ = gate.wait_ready(&device, None).await;
        // 0ms..1000ms 每 100ms 一次
        assert_eq!(device.notification_polls(), 11);
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_connected_fails_fast() {
        let device = MemoryDevice::new("dev");
        device.set_state(SessionState::NotConnected);
        let err = ReadinessGate::default()
            .wait_ready(&device, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DeviceNotConnected));
        assert_eq!(device.notification_polls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_between_polls() {
        let device = MemoryDevice::new("dev");
        device.set_notification_enabled(Channel::Mtu, false);

        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(250)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        let err = ReadinessGate::default()
            .wait_ready(&device, Some(&token))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert!(start.elapsed() < Duration::from_millis(300));
    }
}
