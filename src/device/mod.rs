//! 存储设备模块
//!
//! 物理存储介质的抽象: 安装/卸载生命周期、设备信息、分区登记。
//! 当前提供 SPI Flash 实现，SD 卡为预留变体。
//!
//! - `flash`: SPI Flash 设备
//! - `partition`: 分区注册表
//! - `blockdev`: 分区块设备视图
//! - `registry`: 设备 ID 注册表

pub mod blockdev;
pub mod flash;
pub mod partition;
pub mod registry;

use core::fmt;

use crate::error::StorageError;
use crate::log_info;

/// 设备在线状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DeviceStatus {
    /// 已安装且可用
    Online,
    /// 未安装或安装失败
    Offline,
    /// 介质损坏
    Corrupt,
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Online => write!(f, "ONLINE"),
            Self::Offline => write!(f, "OFFLINE"),
            Self::Corrupt => write!(f, "CORRUPTED"),
        }
    }
}

/// 设备类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DeviceKind {
    /// 未探测
    Unknown,
    /// SPI Flash
    Flash,
    /// SD 卡 (预留)
    Sd,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "UNKNOWN"),
            Self::Flash => write!(f, "FLASH"),
            Self::Sd => write!(f, "SD"),
        }
    }
}

/// 设备信息
///
/// 由 `install` 填充，`uninstall` 重置，期间只读
#[derive(Debug, Clone, Copy)]
pub struct StorageDeviceInfo {
    /// 在线状态
    pub status: DeviceStatus,
    /// 设备类型
    pub kind: DeviceKind,
    /// 容量 (字节)
    pub capacity_bytes: u32,
}

impl StorageDeviceInfo {
    /// 未安装设备的初始信息
    pub const fn offline() -> Self {
        Self {
            status: DeviceStatus::Offline,
            kind: DeviceKind::Unknown,
            capacity_bytes: 0,
        }
    }

    /// 是否在线
    pub fn is_online(&self) -> bool {
        matches!(self.status, DeviceStatus::Online)
    }
}

/// 物理存储设备能力接口
///
/// 失败通过 `Result` 上报；`install` 失败时设备保持 Offline，
/// 不存在部分在线状态
pub trait StorageDevice {
    /// 探测并初始化物理介质，成功后设备进入 Online
    fn install(&mut self) -> Result<(), StorageError>;

    /// 释放介质，设备信息重置为 Offline
    fn uninstall(&mut self) -> Result<(), StorageError>;

    /// 在设备上登记一个命名分区
    ///
    /// 设备不在 Online 状态、标签重复或分区校验失败时返回错误
    fn register_partition(&mut self, label: &str, size: u32) -> Result<(), StorageError>;

    /// 当前设备信息
    fn info(&self) -> &StorageDeviceInfo;

    /// 打印设备信息到日志
    fn print_info(&self) {
        let info = self.info();
        log_info!("status: {}", info.status);
        log_info!("type: {}", info.kind);
        log_info!("capacity: {} bytes", info.capacity_bytes);
    }
}

pub use blockdev::{FlashConfig, FlashStorage};
pub use flash::{SpiFlash, SpiFlashConfig};
pub use partition::{PartitionEntry, PartitionTable};
pub use registry::DeviceRegistry;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offline_info() {
        let info = StorageDeviceInfo::offline();
        assert!(!info.is_online());
        assert_eq!(info.capacity_bytes, 0);
        assert_eq!(info.kind, DeviceKind::Unknown);
    }
}
