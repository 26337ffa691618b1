//! 内存设备
//!
//! 在内存中模拟一台带文件系统的设备，用于测试和离线开发：
//! - 用同一套编解码处理 GET / PUT / REMOVE
//! - 记录收到的每个操作，便于断言调用次数和顺序
//! - 可注入设备错误码、切换连接状态和通知开关
//! - 推送事件只发给当前订阅者，不回放

use crate::error::{Result, TransportError};
use crate::identity::DeviceIdentity;
use crate::pftp::codec::{BincodeCodec, Command, Directory, DirectoryEntry, Operation, OperationCodec};
use crate::transport::{
    BodyStream, Channel, EventStream, RequestSlot, SessionResolver, SessionState,
    TransportSession, new_request_slot,
};
use futures_util::StreamExt;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

const NO_SUCH_FILE: u16 = 203;
const DIRECTORY_NOT_EMPTY: u16 = 310;

#[derive(Debug, Clone)]
enum Node {
    Dir,
    File(Vec<u8>),
}

#[derive(Default)]
struct Inner {
    /// 完整路径 -> 节点，目录路径以 `/` 结尾
    nodes: BTreeMap<String, Node>,
    failures: HashMap<String, u16>,
    log: Vec<Operation>,
    reverse_listings: bool,
}

pub struct MemoryDevice {
    id: String,
    codec: Arc<dyn OperationCodec>,
    state: Mutex<SessionState>,
    mtu_enabled: AtomicBool,
    d2h_enabled: AtomicBool,
    polls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    latency: Mutex<Duration>,
    inner: Mutex<Inner>,
    events: Mutex<Option<broadcast::Sender<(i32, Vec<u8>)>>>,
    slot: RequestSlot,
}

impl MemoryDevice {
    pub fn new(id: &str) -> Self {
        Self::with_codec(id, Arc::new(BincodeCodec))
    }

    pub fn with_codec(id: &str, codec: Arc<dyn OperationCodec>) -> Self {
        let (tx, _) = broadcast::channel(64);
        let mut inner = Inner::default();
        inner.nodes.insert("/".to_string(), Node::Dir);
        Self {
            id: id.to_string(),
            codec,
            state: Mutex::new(SessionState::Open),
            mtu_enabled: AtomicBool::new(true),
            d2h_enabled: AtomicBool::new(true),
            polls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            latency: Mutex::new(Duration::ZERO),
            inner: Mutex::new(inner),
            events: Mutex::new(Some(tx)),
            slot: new_request_slot(),
        }
    }

    /// 添加文件，自动创建父目录
    pub fn add_file(&self, path: &str, content: &[u8]) {
        let mut inner = self.lock();
        insert_parents(&mut inner.nodes, path);
        inner
            .nodes
            .insert(path.to_string(), Node::File(content.to_vec()));
    }

    /// 添加目录，`path` 必须以 `/` 结尾
    pub fn add_dir(&self, path: &str) {
        let mut inner = self.lock();
        insert_parents(&mut inner.nodes, path);
        inner.nodes.insert(path.to_string(), Node::Dir);
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        match self.lock().nodes.get(path) {
            Some(Node::File(content)) => Some(content.clone()),
            _ => None,
        }
    }

    pub fn exists(&self, path: &str) -> bool {
        self.lock().nodes.contains_key(path)
    }

    /// 对该路径的任何操作都返回设备错误码
    pub fn fail_on(&self, path: &str, code: u16) {
        self.lock().failures.insert(path.to_string(), code);
    }

    /// 目录列表倒序返回（测试顺序无关性）
    pub fn set_reverse_listings(&self, reverse: bool) {
        self.lock().reverse_listings = reverse;
    }

    pub fn set_state(&self, state: SessionState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    pub fn set_notification_enabled(&self, channel: Channel, enabled: bool) {
        self.flag(channel).store(enabled, Ordering::SeqCst);
    }

    /// 每个请求的模拟耗时
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap_or_else(PoisonError::into_inner) = latency;
    }

    /// 已收到的操作（按到达顺序）
    pub fn operations(&self) -> Vec<Operation> {
        self.lock().log.clone()
    }

    pub fn count(&self, command: Command) -> usize {
        self.lock()
            .log
            .iter()
            .filter(|op| op.command == command)
            .count()
    }

    /// 通知开关被查询的次数
    pub fn notification_polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    /// 观察到的最大并发请求数
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// 推送事件，返回收到的订阅者数量
    pub fn push_event(&self, tag: i32, payload: &[u8]) -> usize {
        match self.events.lock().unwrap_or_else(PoisonError::into_inner).as_ref() {
            Some(tx) => tx.send((tag, payload.to_vec())).unwrap_or(0),
            None => 0,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(0, broadcast::Sender::receiver_count)
    }

    /// 模拟链路断开：结束所有事件流
    pub fn disconnect(&self) {
        self.set_state(SessionState::NotConnected);
        self.events.lock().unwrap_or_else(PoisonError::into_inner).take();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn flag(&self, channel: Channel) -> &AtomicBool {
        match channel {
            Channel::Mtu => &self.mtu_enabled,
            Channel::DeviceToHost => &self.d2h_enabled,
        }
    }

    async fn enter(&self) -> InFlight<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let guard = InFlight(&self.in_flight);
        let latency = *self.latency.lock().unwrap_or_else(PoisonError::into_inner);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        guard
    }

    fn decode(&self, header: &[u8]) -> std::result::Result<Operation, TransportError> {
        self.codec
            .decode_operation(header)
            .map_err(|e| TransportError::Link(format!("bad header: {}", e)))
    }

    fn handle(&self, op: Operation) -> std::result::Result<Vec<u8>, TransportError> {
        let mut inner = self.lock();
        inner.log.push(op.clone());
        if let Some(code) = inner.failures.get(&op.path) {
            return Err(TransportError::DeviceCode(*code));
        }
        match op.command {
            Command::Get => match inner.nodes.get(&op.path) {
                Some(Node::File(content)) => Ok(content.clone()),
                Some(Node::Dir) => {
                    let mut entries = list(&inner.nodes, &op.path);
                    if inner.reverse_listings {
                        entries.reverse();
                    }
                    self.codec
                        .encode_directory(&Directory::new(entries))
                        .map_err(|e| TransportError::Link(e.to_string()))
                }
                None => Err(TransportError::DeviceCode(NO_SUCH_FILE)),
            },
            Command::Remove => {
                let occupied = match inner.nodes.get(&op.path) {
                    Some(Node::Dir) => !list(&inner.nodes, &op.path).is_empty(),
                    Some(Node::File(_)) => false,
                    None => return Err(TransportError::DeviceCode(NO_SUCH_FILE)),
                };
                if occupied {
                    return Err(TransportError::DeviceCode(DIRECTORY_NOT_EMPTY));
                }
                inner.nodes.remove(&op.path);
                Ok(Vec::new())
            }
            Command::Put => Err(TransportError::Link(
                "PUT must be sent as a stream".to_string(),
            )),
        }
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn insert_parents(nodes: &mut BTreeMap<String, Node>, path: &str) {
    let trimmed = path.trim_end_matches('/');
    for (idx, _) in trimmed.match_indices('/') {
        nodes
            .entry(trimmed[..=idx].to_string())
            .or_insert(Node::Dir);
    }
}

fn list(nodes: &BTreeMap<String, Node>, dir: &str) -> Vec<DirectoryEntry> {
    nodes
        .range(dir.to_string()..)
        .skip(1)
        .take_while(|(path, _)| path.starts_with(dir))
        .filter_map(|(path, node)| {
            let name = &path[dir.len()..];
            let direct = match name.find('/') {
                Some(idx) => idx == name.len() - 1,
                None => true,
            };
            direct.then(|| match node {
                Node::Dir => DirectoryEntry::new(name, 0),
                Node::File(content) => DirectoryEntry::new(name, content.len() as u64),
            })
        })
        .collect()
}

#[async_trait::async_trait]
impl TransportSession for MemoryDevice {
    fn id(&self) -> &str {
        &self.id
    }

    async fn state(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn has_channel(&self, _channel: Channel) -> bool {
        true
    }

    fn is_notification_enabled(&self, channel: Channel) -> bool {
        self.polls.fetch_add(1, Ordering::SeqCst);
        self.flag(channel).load(Ordering::SeqCst)
    }

    fn request_slot(&self) -> RequestSlot {
        self.slot.clone()
    }

    fn rssi(&self) -> Option<i16> {
        Some(-60)
    }

    async fn request(&self, header: Vec<u8>) -> std::result::Result<Vec<u8>, TransportError> {
        let _guard = self.enter().await;
        if self.state().await != SessionState::Open {
            return Err(TransportError::Closed);
        }
        let op = self.decode(&header)?;
        self.handle(op)
    }

    async fn write_stream(
        &self,
        header: Vec<u8>,
        mut body: BodyStream,
    ) -> std::result::Result<(), TransportError> {
        let _guard = self.enter().await;
        let op = self.decode(&header)?;
        if op.command != Command::Put {
            return Err(TransportError::Link("stream requires PUT".to_string()));
        }

        let mut content = Vec::new();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| TransportError::Link(e.to_string()))?;
            content.extend_from_slice(&chunk);
        }

        let mut inner = self.lock();
        inner.log.push(op.clone());
        if let Some(code) = inner.failures.get(&op.path) {
            return Err(TransportError::DeviceCode(*code));
        }
        insert_parents(&mut inner.nodes, &op.path);
        inner.nodes.insert(op.path, Node::File(content));
        Ok(())
    }

    async fn events(&self) -> std::result::Result<EventStream, TransportError> {
        let rx = self
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(broadcast::Sender::subscribe)
            .ok_or(TransportError::Closed)?;
        Ok(BroadcastStream::new(rx)
            .filter_map(|item| futures_util::future::ready(item.ok()))
            .boxed())
    }
}

/// 按标识查找内存设备
#[derive(Default)]
pub struct MemoryResolver {
    devices: HashMap<DeviceIdentity, Arc<MemoryDevice>>,
}

impl MemoryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, identity: DeviceIdentity, device: Arc<MemoryDevice>) {
        self.devices.insert(identity, device);
    }
}

#[async_trait::async_trait]
impl SessionResolver for MemoryResolver {
    async fn resolve(&self, identity: &DeviceIdentity) -> Result<Arc<dyn TransportSession>> {
        self.devices
            .get(identity)
            .map(|device| device.clone() as Arc<dyn TransportSession>)
            .ok_or_else(|| crate::error::Error::DeviceNotFound(identity.to_string()))
    }
}
