//! 设备文件操作
//!
//! 高层 API，每次调用:
//! 1. 解析设备标识并获取会话
//! 2. 等待控制通道就绪
//! 3. 通过会话共享的请求锁执行命令

use crate::config::ClientSettings;
use crate::error::Result;
use crate::identity::DeviceIdentity;
use crate::notify::{DecoderRegistry, Demultiplexer, NotificationStream};
use crate::pftp::{
    BincodeCodec, CommandClient, Directory, OperationCodec, ReadinessGate, TreeWalker,
    WalkEntry, normalize_dir, normalize_file,
};
use crate::transport::{BodyStream, SessionResolver};
use futures_util::StreamExt;
use log::debug;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// GET 的结果：目录列表或文件内容
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetched {
    Directory(Directory),
    File(Vec<u8>),
}

pub struct DeviceClient {
    resolver: Arc<dyn SessionResolver>,
    codec: Arc<dyn OperationCodec>,
    gate: ReadinessGate,
    max_walk_depth: usize,
    demux: Demultiplexer,
}

impl DeviceClient {
    pub fn new(resolver: Arc<dyn SessionResolver>, settings: &ClientSettings) -> Self {
        Self {
            resolver,
            codec: Arc::new(BincodeCodec),
            gate: settings.readiness_gate(),
            max_walk_depth: settings.max_walk_depth,
            demux: Demultiplexer::default(),
        }
    }

    /// 替换线格式
    pub fn with_codec(mut self, codec: Arc<dyn OperationCodec>) -> Self {
        self.codec = codec;
        self
    }

    /// 替换通知解码器（必须在首次订阅前设置）
    pub fn with_registry(mut self, registry: DecoderRegistry) -> Self {
        self.demux = Demultiplexer::new(registry);
        self
    }

    pub fn demultiplexer(&self) -> &Demultiplexer {
        &self.demux
    }

    /// 为设备创建命令客户端，请求锁来自会话本身
    pub async fn command_client(&self, identity: &str) -> Result<CommandClient> {
        let identity = DeviceIdentity::parse(identity)?;
        let session = self.resolver.resolve(&identity).await?;
        Ok(CommandClient::new(session, self.codec.clone(), self.gate))
    }

    /// 可取消的命令客户端
    pub async fn cancellable_client(
        &self,
        identity: &str,
        token: CancellationToken,
    ) -> Result<CommandClient> {
        Ok(self.command_client(identity).await?.with_cancellation(token))
    }

    pub async fn read_file(&self, identity: &str, path: &str) -> Result<Vec<u8>> {
        self.command_client(identity)
            .await?
            .get(&normalize_file(path))
            .await
    }

    /// GET 并区分目录和文件
    ///
    /// 以 `/` 结尾的路径必须能按目录解析；其他路径先尝试目录解析，失败则视为文件。
    pub async fn fetch(&self, identity: &str, path: &str) -> Result<Fetched> {
        let client = self.command_client(identity).await?;
        let path = normalize_file(path);
        let bytes = client.get(&path).await?;
        if path.ends_with('/') {
            return client.codec().decode_directory(&bytes).map(Fetched::Directory);
        }
        match client.codec().decode_directory(&bytes) {
            Ok(directory) => Ok(Fetched::Directory(directory)),
            Err(e) => {
                debug!("{} is not a directory listing ({}), returning raw bytes", path, e);
                Ok(Fetched::File(bytes))
            }
        }
    }

    pub async fn write_file(&self, identity: &str, path: &str, content: Vec<u8>) -> Result<()> {
        let body = futures_util::stream::once(async move { Ok::<_, std::io::Error>(content) }).boxed();
        self.write_file_stream(identity, path, body).await
    }

    pub async fn write_file_stream(
        &self,
        identity: &str,
        path: &str,
        body: BodyStream,
    ) -> Result<()> {
        self.command_client(identity)
            .await?
            .put(&normalize_file(path), body)
            .await
    }

    pub async fn delete(&self, identity: &str, path: &str) -> Result<()> {
        self.command_client(identity)
            .await?
            .remove(&normalize_file(path))
            .await
    }

    /// 按顺序删除，第一个失败即停止
    pub async fn delete_many<S: AsRef<str>>(&self, identity: &str, paths: &[S]) -> Result<()> {
        let client = self.command_client(identity).await?;
        client
            .remove_many(paths.iter().map(|p| normalize_file(p.as_ref())))
            .await
    }

    /// 列出路径
    pub async fn list(&self, identity: &str, root: &str, recurse_deep: bool) -> Result<Vec<String>> {
        let client = self.command_client(identity).await?;
        TreeWalker::new(&client)
            .with_max_depth(self.max_walk_depth)
            .paths(root, recurse_deep, &|_| true)
            .await
    }

    /// 带过滤器和大小的列表
    pub async fn list_filtered(
        &self,
        identity: &str,
        root: &str,
        recurse_deep: bool,
        accepts: &(dyn Fn(&str) -> bool + Send + Sync),
    ) -> Result<Vec<WalkEntry>> {
        let client = self.command_client(identity).await?;
        TreeWalker::new(&client)
            .with_max_depth(self.max_walk_depth)
            .walk(root, recurse_deep, accepts)
            .await
    }

    /// 仅当目录为空时删除，返回是否删除
    pub async fn delete_directory_if_empty(&self, identity: &str, path: &str) -> Result<bool> {
        let client = self.command_client(identity).await?;
        TreeWalker::new(&client)
            .with_max_depth(self.max_walk_depth)
            .delete_directory_if_empty(&normalize_dir(path))
            .await
    }

    /// 订阅设备推送通知
    pub async fn notifications(&self, identity: &str) -> Result<NotificationStream> {
        let identity = DeviceIdentity::parse(identity)?;
        let session = self.resolver.resolve(&identity).await?;
        self.demux.subscribe(session.as_ref()).await
    }
}
