//! SPI Flash 存储设备
//!
//! `StorageDevice` 的 Flash 实现。总线与片选的建立由调用方完成
//! (通过 `with_spi` 注入已配置的 SPI 总线)，`install` 只负责探测
//! 芯片并发布设备信息。

use esp_hal::spi::master::SpiDmaBus;

use crate::config::SECTOR_SIZE;
use crate::device::blockdev::FlashStorage;
use crate::device::partition::{PartitionEntry, PartitionTable};
use crate::device::{DeviceKind, DeviceStatus, StorageDevice, StorageDeviceInfo};
use crate::error::StorageError;
use crate::{log_debug, log_error, log_info};

/// SPI Flash 几何配置
#[derive(Debug, Clone, Copy)]
pub struct SpiFlashConfig {
    /// 芯片容量 (字节)
    pub capacity: u32,
    /// 页面大小 (编程单位)
    pub page_size: u32,
    /// 第一个可分配分区偏移 (起始保留区之后)
    pub first_partition_offset: u32,
}

impl Default for SpiFlashConfig {
    fn default() -> Self {
        Self {
            capacity: 16 * 1024 * 1024,
            page_size: 256,
            first_partition_offset: 0x1000,
        }
    }
}

/// SPI Flash 设备
pub struct SpiFlash<'d> {
    config: SpiFlashConfig,
    spi: Option<SpiDmaBus<'d, esp_hal::Blocking>>,
    info: StorageDeviceInfo,
    partitions: PartitionTable,
}

impl<'d> SpiFlash<'d> {
    /// 创建 Flash 设备实例 (尚未安装)
    pub fn new(config: SpiFlashConfig) -> Self {
        Self {
            config,
            spi: None,
            info: StorageDeviceInfo::offline(),
            partitions: PartitionTable::new(config.first_partition_offset, config.capacity),
        }
    }

    /// 注入已配置的 SPI 总线
    pub fn with_spi(mut self, spi: SpiDmaBus<'d, esp_hal::Blocking>) -> Self {
        self.spi = Some(spi);
        self
    }

    /// 读取 JEDEC ID
    ///
    /// 当前为占位实现，返回全零 ID。
    /// 实际应用应使用 `SpiDmaBus::transfer()` 发送 0x9F 命令。
    pub fn read_jedec_id(&mut self) -> Result<[u8; 3], StorageError> {
        let _spi = self.spi.as_mut().ok_or(StorageError::NotInitialized)?;

        // JEDEC ID 命令: 0x9F
        // 响应: 3 字节 (Manufacturer, Memory Type, Capacity)
        let id = [0u8; 3];
        Ok(id)
    }

    /// 设备上的分区注册表
    pub fn partitions(&self) -> &PartitionTable {
        &self.partitions
    }

    /// 按标签查找已登记分区
    pub fn partition(&self, label: &str) -> Option<&PartitionEntry> {
        self.partitions.find_by_label(label)
    }
}

impl StorageDevice for SpiFlash<'_> {
    fn install(&mut self) -> Result<(), StorageError> {
        log_info!("Initializing SPI flash");

        // 任何失败路径都保持 Offline，不存在部分在线
        self.info = StorageDeviceInfo::offline();

        if self.config.capacity == 0 || self.config.first_partition_offset >= self.config.capacity {
            log_error!("Invalid SPI flash geometry");
            return Err(StorageError::InvalidParam);
        }

        if self.spi.is_some() {
            let id = self.read_jedec_id()?;
            log_debug!("JEDEC id: {:?}", id);
        }

        self.info = StorageDeviceInfo {
            status: DeviceStatus::Online,
            kind: DeviceKind::Flash,
            capacity_bytes: self.config.capacity,
        };
        log_info!("Flash installed, size: {}", self.config.capacity);
        Ok(())
    }

    fn uninstall(&mut self) -> Result<(), StorageError> {
        self.info = StorageDeviceInfo::offline();
        self.partitions =
            PartitionTable::new(self.config.first_partition_offset, self.config.capacity);
        Ok(())
    }

    fn register_partition(&mut self, label: &str, size: u32) -> Result<(), StorageError> {
        if !self.info.is_online() {
            log_error!("Cannot register partition, device is not online");
            return Err(StorageError::NotInitialized);
        }

        let entry = self.partitions.register(label, size)?.clone();

        // 完整性校验: 以块设备视角验证边界和对齐，失败则回滚登记
        let mut view = FlashStorage::from_partition(&entry, self.info.capacity_bytes);
        if let Err(e) = view.init() {
            log_error!("Partition verification failed");
            self.partitions.remove(label).ok();
            return Err(e);
        }

        log_info!("Successfully registered storage partition");
        log_info!("part_label:  {}", entry.label.as_str());
        log_info!("offset:      0x{:x}", entry.offset);
        log_info!("size:        0x{:x}", entry.size);
        log_info!("blocks:      {}", entry.block_count(SECTOR_SIZE));
        Ok(())
    }

    fn info(&self) -> &StorageDeviceInfo {
        &self.info
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_publishes_info() {
        let mut flash = SpiFlash::new(SpiFlashConfig::default());
        assert!(!flash.info().is_online());

        assert!(flash.install().is_ok());
        let info = flash.info();
        assert_eq!(info.status, DeviceStatus::Online);
        assert_eq!(info.kind, DeviceKind::Flash);
        assert_eq!(info.capacity_bytes, 16 * 1024 * 1024);
    }

    #[test]
    fn test_install_failure_stays_offline() {
        let mut flash = SpiFlash::new(SpiFlashConfig {
            capacity: 0,
            ..SpiFlashConfig::default()
        });
        assert_eq!(flash.install().err(), Some(StorageError::InvalidParam));
        assert_eq!(flash.info().status, DeviceStatus::Offline);
        assert_eq!(flash.info().kind, DeviceKind::Unknown);
    }

    #[test]
    fn test_register_requires_online() {
        let mut flash = SpiFlash::new(SpiFlashConfig::default());
        assert_eq!(
            flash.register_partition("sys", 0x100000).err(),
            Some(StorageError::NotInitialized)
        );
    }

    #[test]
    fn test_register_and_lookup() {
        let mut flash = SpiFlash::new(SpiFlashConfig::default());
        assert!(flash.install().is_ok());
        assert!(flash.register_partition("sys", 0x100000).is_ok());

        let entry = flash.partition("sys");
        assert!(entry.is_some());
        assert_eq!(entry.map(|p| p.offset), Some(0x1000));

        // 同标签二次登记被拒绝
        assert_eq!(
            flash.register_partition("sys", 0x100000).err(),
            Some(StorageError::AlreadyExists)
        );
    }

    #[test]
    fn test_uninstall_resets() {
        let mut flash = SpiFlash::new(SpiFlashConfig::default());
        assert!(flash.install().is_ok());
        assert!(flash.register_partition("sys", 0x1000).is_ok());
        assert!(flash.uninstall().is_ok());
        assert!(!flash.info().is_online());
        assert!(flash.partition("sys").is_none());
    }
}
