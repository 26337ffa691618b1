//! 集成测试 - 高层设备 API
//!
//! 通过 [`DeviceClient`] 和内存设备验证完整调用链：
//! 标识解析 -> 会话获取 -> 就绪等待 -> 编解码 -> 设备错误翻译。

use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use wristlink_core::notify::decoders::BatteryStatus;
use wristlink_core::{
    ClientSettings, Command, DeviceClient, DeviceIdentity, Error, EventKind, Fetched,
    MemoryDevice, MemoryResolver, TypedValue,
};
use wristlink_core::{Channel, SessionState};

const DEVICE: &str = "1a2b3c4d";

fn setup() -> (DeviceClient, Arc<MemoryDevice>) {
    let device = Arc::new(MemoryDevice::new("memory-1A2B3C4D"));
    device.add_file("/U/0/USERID.BPB", b"user");
    device.add_file("/U/0/20240101/E/101010/00/BASE.BPB", b"base");
    device.add_file("/U/0/20240101/E/101010/00/ROUTE.GZB", b"route");
    device.add_file("/U/0/20240102/E/080000/00/BASE.BPB", b"base2");

    let mut resolver = MemoryResolver::new();
    resolver.insert(DeviceIdentity::parse(DEVICE).unwrap(), device.clone());
    let client = DeviceClient::new(Arc::new(resolver), &ClientSettings::default());
    (client, device)
}

/// 测试非法设备标识在任何 I/O 之前被拒绝
#[tokio::test]
async fn test_invalid_identity_rejected() {
    let (client, device) = setup();

    let err = client.read_file("not a device", "/U/0/USERID.BPB").await;
    assert!(matches!(err, Err(Error::InvalidArgument(_))));
    assert!(device.operations().is_empty());
}

/// 测试未知设备返回 DeviceNotFound
#[tokio::test]
async fn test_unknown_device() {
    let (client, _) = setup();

    let err = client.read_file("FFEEDDCC", "/U/0/USERID.BPB").await;
    assert!(matches!(err, Err(Error::DeviceNotFound(_))));
}

/// 测试读写删除的完整流程
#[tokio::test]
async fn test_read_write_delete() {
    let (client, device) = setup();

    assert_eq!(client.read_file(DEVICE, "U/0/USERID.BPB").await.unwrap(), b"user");

    client
        .write_file(DEVICE, "/U/0/S/PHYSDATA.BPB", b"physical".to_vec())
        .await
        .unwrap();
    assert_eq!(device.file("/U/0/S/PHYSDATA.BPB").unwrap(), b"physical");

    client.delete(DEVICE, "/U/0/S/PHYSDATA.BPB").await.unwrap();
    assert!(!device.exists("/U/0/S/PHYSDATA.BPB"));
}

/// 测试读取不存在的文件得到带描述的远端错误
#[tokio::test]
async fn test_missing_file_remote_error() {
    let (client, _) = setup();

    match client.read_file(DEVICE, "/U/0/NOPE.BPB").await {
        Err(Error::Remote(remote)) => {
            assert_eq!(remote.domain, "PFTP");
            assert_eq!(remote.code, 203);
        }
        other => panic!("expected remote error, got {:?}", other),
    }
}

/// 测试批量删除按顺序执行，遇错即停
#[tokio::test]
async fn test_delete_many_fail_fast() {
    let (client, device) = setup();
    device.add_file("/A", b"1");
    device.add_file("/C", b"3");

    let result = client.delete_many(DEVICE, &["/A", "/B", "/C"]).await;
    assert!(result.is_err());

    let removed: Vec<String> = device
        .operations()
        .into_iter()
        .filter(|op| op.command == Command::Remove)
        .map(|op| op.path)
        .collect();
    assert_eq!(removed, vec!["/A".to_string(), "/B".to_string()]);
    assert!(device.exists("/C"));
}

/// 测试递归列表只返回文件，深度优先
#[tokio::test]
async fn test_list_deep() {
    let (client, _) = setup();

    let paths = client.list(DEVICE, "/U/0/", true).await.unwrap();
    assert_eq!(
        paths,
        vec![
            "/U/0/20240101/E/101010/00/BASE.BPB",
            "/U/0/20240101/E/101010/00/ROUTE.GZB",
            "/U/0/20240102/E/080000/00/BASE.BPB",
            "/U/0/USERID.BPB",
        ]
    );
}

/// 测试浅层列表只发出一次 GET
#[tokio::test]
async fn test_list_shallow() {
    let (client, device) = setup();

    let paths = client.list(DEVICE, "U/0", false).await.unwrap();
    assert_eq!(
        paths,
        vec!["/U/0/20240101/", "/U/0/20240102/", "/U/0/USERID.BPB"]
    );
    assert_eq!(device.count(Command::Get), 1);
}

/// 测试配置的最大深度限制递归列表
#[tokio::test]
async fn test_list_respects_max_walk_depth() {
    let device = Arc::new(MemoryDevice::new("memory-1A2B3C4D"));
    device.add_file("/U/0/20240101/E/101010/00/BASE.BPB", b"base");

    let mut resolver = MemoryResolver::new();
    resolver.insert(DeviceIdentity::parse(DEVICE).unwrap(), device.clone());
    let settings = ClientSettings {
        max_walk_depth: 3,
        ..Default::default()
    };
    let client = DeviceClient::new(Arc::new(resolver), &settings);

    let err = client.list(DEVICE, "/U/0/", true).await;
    assert!(matches!(err, Err(Error::Protocol(_))));

    // 浅层列表不受影响
    let paths = client.list(DEVICE, "/U/0/", false).await.unwrap();
    assert_eq!(paths, vec!["/U/0/20240101/"]);
}

/// 测试带过滤器的列表携带文件大小
#[tokio::test]
async fn test_list_filtered_sizes() {
    let (client, _) = setup();

    let accepts = |name: &str| name.ends_with('/') || name.ends_with(".BPB");
    let entries = client
        .list_filtered(DEVICE, "/U/0/20240101/", true, &accepts)
        .await
        .unwrap();

    let base = entries
        .iter()
        .find(|entry| entry.path == "/U/0/20240101/E/101010/00/BASE.BPB")
        .unwrap();
    assert_eq!(base.size, 4);
    assert!(entries.iter().all(|entry| !entry.path.ends_with(".GZB")));
}

/// 测试非空目录不会发出 REMOVE
#[tokio::test]
async fn test_delete_directory_if_empty() {
    let (client, device) = setup();
    device.add_dir("/U/0/EMPTY/");

    assert!(!client.delete_directory_if_empty(DEVICE, "/U/0/20240101").await.unwrap());
    assert_eq!(device.count(Command::Remove), 0);

    assert!(client.delete_directory_if_empty(DEVICE, "/U/0/EMPTY/").await.unwrap());
    assert!(!device.exists("/U/0/EMPTY/"));
}

/// 测试 GET 结果区分目录和文件
#[tokio::test]
async fn test_fetch_directory_or_file() {
    let (client, _) = setup();

    match client.fetch(DEVICE, "/U/0/").await.unwrap() {
        Fetched::Directory(dir) => assert_eq!(dir.entries.len(), 3),
        other => panic!("expected directory, got {:?}", other),
    }

    assert_eq!(
        client.fetch(DEVICE, "/U/0/USERID.BPB").await.unwrap(),
        Fetched::File(b"user".to_vec())
    );
}

/// 测试通知流解码电量事件
#[tokio::test]
async fn test_notification_stream() {
    let (client, device) = setup();

    let mut events = client.notifications(DEVICE).await.unwrap();
    assert_eq!(device.subscriber_count(), 1);

    device.push_event(6, b"reserved");
    device.push_event(3, &[80, 1]);

    let event = events.next().await.unwrap();
    assert_eq!(event.kind, EventKind::BatteryStatus);
    assert_eq!(
        event.parsed,
        Some(TypedValue::BatteryStatus(BatteryStatus {
            level: 80,
            charging: true,
        }))
    );

    drop(events);
    assert_eq!(client.demultiplexer().subscribers("memory-1A2B3C4D"), 0);
}

/// 测试控制通道未就绪时在截止时间后失败
#[tokio::test(start_paused = true)]
async fn test_readiness_timeout() {
    let (client, device) = setup();
    device.set_notification_enabled(Channel::Mtu, false);

    let started = tokio::time::Instant::now();
    let err = client.read_file(DEVICE, "/U/0/USERID.BPB").await;
    assert!(matches!(err, Err(Error::NotificationNotEnabled { .. })));
    assert!(started.elapsed() >= Duration::from_secs(5));
    assert!(device.operations().is_empty());
}

/// 测试连接断开时立即失败，不等待
#[tokio::test(start_paused = true)]
async fn test_not_connected_fails_fast() {
    let (client, device) = setup();
    device.set_state(SessionState::NotConnected);

    let started = tokio::time::Instant::now();
    let err = client.read_file(DEVICE, "/U/0/USERID.BPB").await;
    assert!(matches!(err, Err(Error::DeviceNotConnected)));
    assert!(started.elapsed() < Duration::from_millis(100));
}
