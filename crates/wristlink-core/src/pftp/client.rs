//! PFTP 命令客户端
//!
//! 把一个 [`Operation`] 变成一次请求/响应往返。
//!
//! # 单请求约束
//!
//! 传输层同一时间只允许一个在途请求。锁由会话自身提供
//! ([`TransportSession::request_slot`])，同一会话上的所有客户端共用一把，
//! 调用方无法绕过。请求在独立任务中持有该锁执行：调用方取消时任务仍会
//! 跑完并丢弃结果，锁随之释放，不会永久占用。

use crate::error::{Error, Result, TransportError};
use crate::pftp::codec::{Command, Directory, Operation, OperationCodec};
use crate::pftp::errors;
use crate::pftp::ready::ReadinessGate;
use crate::transport::{BodyStream, RequestSlot, TransportSession};
use log::debug;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct CommandClient {
    session: Arc<dyn TransportSession>,
    codec: Arc<dyn OperationCodec>,
    gate: ReadinessGate,
    slot: RequestSlot,
    cancel: Option<CancellationToken>,
}

impl CommandClient {
    pub fn new(
        session: Arc<dyn TransportSession>,
        codec: Arc<dyn OperationCodec>,
        gate: ReadinessGate,
    ) -> Self {
        let slot = session.request_slot();
        Self {
            session,
            codec,
            gate,
            slot,
            cancel: None,
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn session(&self) -> &Arc<dyn TransportSession> {
        &self.session
    }

    pub fn codec(&self) -> &dyn OperationCodec {
        self.codec.as_ref()
    }

    /// GET，返回原始响应（目录列表或文件内容，由调用方决定如何解析）
    pub async fn get(&self, path: &str) -> Result<Vec<u8>> {
        debug!("GET {}", path);
        self.round_trip(Operation::new(Command::Get, path), None)
            .await
    }

    /// GET 并按目录解析
    pub async fn get_directory(&self, path: &str) -> Result<Directory> {
        let bytes = self.get(path).await?;
        self.codec.decode_directory(&bytes)
    }

    /// PUT，操作头之后流式发送 `body`
    pub async fn put(&self, path: &str, body: BodyStream) -> Result<()> {
        debug!("PUT {}", path);
        self.round_trip(Operation::new(Command::Put, path), Some(body))
            .await
            .map(|_| ())
    }

    /// REMOVE，不检查目录是否为空（由设备决定）
    pub async fn remove(&self, path: &str) -> Result<()> {
        debug!("REMOVE {}", path);
        self.round_trip(Operation::new(Command::Remove, path), None)
            .await
            .map(|_| ())
    }

    /// 按顺序逐个删除，遇到第一个错误立即停止
    pub async fn remove_many<I, S>(&self, paths: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for path in paths {
            self.remove(path.as_ref()).await?;
        }
        Ok(())
    }

    async fn round_trip(&self, operation: Operation, body: Option<BodyStream>) -> Result<Vec<u8>> {
        self.gate
            .wait_ready(self.session.as_ref(), self.cancel.as_ref())
            .await?;
        let header = self.codec.encode(&operation)?;

        let session = self.session.clone();
        let slot = self.slot.clone();
        let task = tokio::spawn(async move {
            let _permit = slot.lock_owned().await;
            match body {
                Some(body) => session.write_stream(header, body).await.map(|()| Vec::new()),
                None => session.request(header).await,
            }
        });

        let joined = match &self.cancel {
            Some(token) => tokio::select! {
                _ = token.cancelled() => {
                    debug!(
                        "{:?} {} cancelled, response will be discarded",
                        operation.command, operation.path
                    );
                    return Err(Error::Cancelled);
                }
                joined = task => joined,
            },
            None => task.await,
        };

        joined
            .map_err(|e| Error::Transport(TransportError::Link(format!("request task: {}", e))))?
            .map_err(errors::translate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RemoteError;
    use crate::pftp::codec::BincodeCodec;
    use crate::transport::memory::MemoryDevice;
    use futures_util::StreamExt;
    use std::time::Duration;

    fn client(device: &Arc<MemoryDevice>) -> CommandClient {
        CommandClient::new(
            device.clone(),
            Arc::new(BincodeCodec),
            ReadinessGate::default(),
        )
    }

    fn body(chunks: &[&[u8]]) -> BodyStream {
        let chunks: Vec<std::io::Result<Vec<u8>>> =
            chunks.iter().map(|c| Ok(c.to_vec())).collect();
        futures_util::stream::iter(chunks).boxed()
    }

    #[tokio::test]
    async fn test_get_file_and_directory() {
        let device = Arc::new(MemoryDevice::new("dev"));
        device.add_file("/U/0/USERID.BPB", b"user");
        let client = client(&device);

        assert_eq!(client.get("/U/0/USERID.BPB").await.unwrap(), b"user");
        let dir = client.get_directory("/U/0/").await.unwrap();
        assert_eq!(dir.entries.len(), 1);
        assert_eq!(dir.entries[0].name, "USERID.BPB");
    }

    #[tokio::test]
    async fn test_put_streams_body() {
        let device = Arc::new(MemoryDevice::new("dev"));
        let client = client(&device);

        client
            .put("/U/0/S/PHYSDATA.BPB", body(&[b"ab", b"cd", b"e"]))
            .await
            .unwrap();
        assert_eq!(device.file("/U/0/S/PHYSDATA.BPB").unwrap(), b"abcde");
    }

    #[tokio::test]
    async fn test_remote_error_translated() {
        let device = Arc::new(MemoryDevice::new("dev"));
        let client = client(&device);

        match client.remove("/MISSING.BPB").await.unwrap_err() {
            Error::Remote(RemoteError { code, .. }) => assert_eq!(code, 203),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_remove_many_fail_fast() {
        let device = Arc::new(MemoryDevice::new("dev"));
        device.add_file("/a/b/c", b"x");
        device.fail_on("/a/b/c", 302);
        let client = client(&device);

        assert!(client.remove_many(["/a/b/c", "/a/b/"]).await.is_err());
        assert_eq!(device.count(Command::Remove), 1);
        assert!(device.exists("/a/b/"));
    }

    #[tokio::test]
    async fn test_remove_many_in_order() {
        let device = Arc::new(MemoryDevice::new("dev"));
        device.add_file("/a/b/c", b"x");
        let client = client(&device);

        client.remove_many(["/a/b/c", "/a/b/"]).await.unwrap();
        let paths: Vec<String> = device.operations().into_iter().map(|op| op.path).collect();
        assert_eq!(paths, vec!["/a/b/c", "/a/b/"]);
        assert!(!device.exists("/a/b/"));
    }

    /// 测试同一会话上独立创建的客户端也不会并发请求
    #[tokio::test(start_paused = true)]
    async fn test_single_request_in_flight() {
        let device = Arc::new(MemoryDevice::new("dev"));
        device.add_file("/A", b"1");
        device.add_file("/B", b"2");
        device.set_latency(Duration::from_millis(50));

        // 两个独立创建的客户端，没有显式共享任何东西
        let first = client(&device);
        let second = client(&device);

        let (a, b) = tokio::join!(first.get("/A"), second.get("/B"));
        assert_eq!(a.unwrap(), b"1");
        assert_eq!(b.unwrap(), b"2");
        assert_eq!(device.max_in_flight(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_releases_slot() {
        let device = Arc::new(MemoryDevice::new("dev"));
        device.add_file("/A", b"1");
        device.set_latency(Duration::from_millis(500));

        let token = CancellationToken::new();
        let cancellable = client(&device).with_cancellation(token.clone());

        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });
        assert!(matches!(
            cancellable.get("/A").await,
            Err(Error::Cancelled)
        ));

        // 被取消的请求跑完后锁被释放
        let follow_up = client(&device);
        assert_eq!(follow_up.get("/A").await.unwrap(), b"1");
        assert_eq!(device.count(Command::Get), 2);
        assert_eq!(device.max_in_flight(), 1);
    }

    /// 测试 GET/PUT/REMOVE 混合并发时仍共用会话锁
    #[tokio::test(start_paused = true)]
    async fn test_mixed_commands_share_session_lock() {
        let device = Arc::new(MemoryDevice::new("dev"));
        device.add_file("/A", b"1");
        device.add_file("/B", b"2");
        device.set_latency(Duration::from_millis(50));

        let reader = client(&device);
        let writer = client(&device);
        let remover = client(&device);

        let (a, put, removed) = tokio::join!(
            reader.get("/A"),
            writer.put("/C", body(&[b"3"])),
            remover.remove("/B"),
        );
        assert_eq!(a.unwrap(), b"1");
        put.unwrap();
        removed.unwrap();
        assert_eq!(device.max_in_flight(), 1);
        assert!(Arc::ptr_eq(&reader.slot, &writer.slot));
    }
}
