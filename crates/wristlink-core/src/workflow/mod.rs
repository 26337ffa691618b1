//! 工作流模块
//!
//! 提供面向应用层的高层 API

pub mod device;

pub use device::{DeviceClient, Fetched};
