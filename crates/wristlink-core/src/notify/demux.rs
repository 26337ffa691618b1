//! 通知分发
//!
//! 状态: `NotSubscribed` -> (第一个订阅者) -> `Active` -> (最后一个订阅者退出)
//! -> `NotSubscribed`。状态按会话 id 分别计数。每个订阅独立，只看到订阅之后的
//! 事件，没有回放。

use crate::error::Result;
use crate::notify::{DecoderRegistry, EventKind, NotificationEvent};
use crate::transport::TransportSession;
use futures_util::stream::{BoxStream, Stream, StreamExt};
use log::{debug, error, trace};
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

/// 会话 id -> 活跃订阅数，计数归零时移除
type SubscriberCounts = Arc<Mutex<HashMap<String, usize>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    NotSubscribed,
    Active,
}

/// 单条事件的无状态转换：未知 tag 返回 `None`
pub fn classify(registry: &DecoderRegistry, tag: i32, payload: Vec<u8>) -> Option<NotificationEvent> {
    let Some(kind) = EventKind::from_tag(tag) else {
        trace!("Dropping notification with unknown tag {}", tag);
        return None;
    };

    let parsed = if payload.is_empty() {
        None
    } else {
        registry.get(kind).and_then(|decoder| match decoder(&payload) {
            Ok(value) => Some(value),
            Err(e) => {
                error!("Failed to decode {} payload ({} bytes): {}", kind, payload.len(), e);
                None
            }
        })
    };

    Some(NotificationEvent {
        kind,
        raw: payload,
        parsed,
    })
}

pub struct Demultiplexer {
    registry: Arc<DecoderRegistry>,
    subscribers: SubscriberCounts,
}

impl Default for Demultiplexer {
    fn default() -> Self {
        Self::new(DecoderRegistry::with_defaults())
    }
}

impl Demultiplexer {
    pub fn new(registry: DecoderRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            subscribers: Arc::default(),
        }
    }

    pub fn registry(&self) -> &DecoderRegistry {
        &self.registry
    }

    pub fn state(&self, session_id: &str) -> SubscriptionState {
        if self.subscribers(session_id) == 0 {
            SubscriptionState::NotSubscribed
        } else {
            SubscriptionState::Active
        }
    }

    pub fn subscribers(&self, session_id: &str) -> usize {
        let counts = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        counts.get(session_id).copied().unwrap_or(0)
    }

    /// 订阅会话的推送事件
    ///
    /// 流在会话断开或被 drop 时结束，单条坏事件不会终止它。
    pub async fn subscribe(&self, session: &dyn TransportSession) -> Result<NotificationStream> {
        let events = session.events().await?;
        let registry = self.registry.clone();
        let inner = events
            .filter_map(move |(tag, payload)| {
                futures_util::future::ready(classify(&registry, tag, payload))
            })
            .boxed();

        let session_id = session.id().to_string();
        {
            let mut counts = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
            let count = counts.entry(session_id.clone()).or_insert(0);
            if *count == 0 {
                debug!("Notifications for {} now active", session_id);
            }
            *count += 1;
        }
        Ok(NotificationStream {
            inner,
            session_id,
            subscribers: self.subscribers.clone(),
        })
    }
}

/// 类型化的通知流，drop 即退订
pub struct NotificationStream {
    inner: BoxStream<'static, NotificationEvent>,
    session_id: String,
    subscribers: SubscriberCounts,
}

impl Stream for NotificationStream {
    type Item = NotificationEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl Drop for NotificationStream {
    fn drop(&mut self) {
        let mut counts = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(count) = counts.get_mut(&self.session_id) {
            *count -= 1;
            if *count == 0 {
                counts.remove(&self.session_id);
                debug!("Last notification subscriber for {} gone", self.session_id);
            }
        }
    }
}
