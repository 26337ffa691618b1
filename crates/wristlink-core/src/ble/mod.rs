pub mod frame;
pub mod scanner;
pub mod session;

pub use scanner::{BleResolver, DiscoveredDevice};
pub use session::BleSession;

use uuid::Uuid;

pub const PFTP_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000feee_0000_1000_8000_00805f9b34fb);
/// 命令请求/响应（控制通道 1）
pub const PFTP_MTU_CHAR_UUID: Uuid = Uuid::from_u128(0xfb005c51_02e7_f387_1cad_8acd2d8df0c8);
/// 设备到主机的推送通知（控制通道 2）
pub const PFTP_D2H_CHAR_UUID: Uuid = Uuid::from_u128(0xfb005c52_02e7_f387_1cad_8acd2d8df0c8);
/// 主机到设备的通知
pub const PFTP_H2D_CHAR_UUID: Uuid = Uuid::from_u128(0xfb005c53_02e7_f387_1cad_8acd2d8df0c8);
