//! 设备注册表
//!
//! 小整数设备 ID 到设备实例的映射。设备由注册表独占持有；
//! `mkdev` 只在 `install` 成功后插入，不存在半插入状态。

use heapless::Vec;

use crate::config::MAX_DEVICES;
use crate::device::flash::{SpiFlash, SpiFlashConfig};
use crate::device::partition::PartitionEntry;
use crate::device::{DeviceKind, StorageDevice, StorageDeviceInfo};
use crate::error::StorageError;
use crate::{log_debug, log_error, log_warn};

/// 已注册设备变体
///
/// 按 `DeviceKind` 标签选择具体实现；SD 卡为预留变体
pub enum Device<'d> {
    /// SPI Flash 设备
    Flash(SpiFlash<'d>),
}

impl StorageDevice for Device<'_> {
    fn install(&mut self) -> Result<(), StorageError> {
        match self {
            Self::Flash(dev) => dev.install(),
        }
    }

    fn uninstall(&mut self) -> Result<(), StorageError> {
        match self {
            Self::Flash(dev) => dev.uninstall(),
        }
    }

    fn register_partition(&mut self, label: &str, size: u32) -> Result<(), StorageError> {
        match self {
            Self::Flash(dev) => dev.register_partition(label, size),
        }
    }

    fn info(&self) -> &StorageDeviceInfo {
        match self {
            Self::Flash(dev) => dev.info(),
        }
    }
}

impl Device<'_> {
    /// 按标签查找设备上的分区
    pub fn partition(&self, label: &str) -> Option<&PartitionEntry> {
        match self {
            Self::Flash(dev) => dev.partition(label),
        }
    }
}

struct Slot<'d> {
    id: u8,
    device: Device<'d>,
}

/// 设备 ID 注册表
pub struct DeviceRegistry<'d> {
    slots: Vec<Slot<'d>, MAX_DEVICES>,
}

impl<'d> DeviceRegistry<'d> {
    /// 创建空注册表
    pub const fn new() -> Self {
        Self { slots: Vec::new() }
    }

    /// 用默认配置创建并安装指定类型的设备
    ///
    /// ID 已被占用时拒绝；`install` 失败时不插入。
    /// ID 只有在 `rmdev` 之后才可复用
    pub fn mkdev(&mut self, id: u8, kind: DeviceKind) -> Result<(), StorageError> {
        let device = match kind {
            DeviceKind::Flash => Device::Flash(SpiFlash::new(SpiFlashConfig::default())),
            DeviceKind::Sd | DeviceKind::Unknown => {
                log_error!("Unsupported storage device kind");
                return Err(StorageError::Unsupported);
            }
        };
        self.insert(id, device)
    }

    /// 安装并插入一个外部构造的设备 (如已注入 SPI 总线的 Flash)
    pub fn insert(&mut self, id: u8, mut device: Device<'d>) -> Result<(), StorageError> {
        if self.find(id).is_some() {
            log_warn!("Storage device [{}] already exists", id);
            return Err(StorageError::AlreadyExists);
        }
        if self.slots.is_full() {
            return Err(StorageError::NoSpace);
        }

        device.install().map_err(|e| {
            log_error!("Failed to install storage device [{}]", id);
            e
        })?;

        // is_full 已检查，push 不会失败
        self.slots.push(Slot { id, device }).map_err(|_| StorageError::NoSpace)?;
        Ok(())
    }

    /// 卸载并移除设备
    pub fn rmdev(&mut self, id: u8) -> Result<(), StorageError> {
        let index = self
            .slots
            .iter()
            .position(|s| s.id == id)
            .ok_or(StorageError::NotFound)?;
        self.slots[index].device.uninstall()?;
        self.slots.swap_remove(index);
        Ok(())
    }

    /// 在指定设备上登记分区
    pub fn mkpartition(&mut self, id: u8, label: &str, size: u32) -> Result<(), StorageError> {
        let Some(slot) = self.slots.iter_mut().find(|s| s.id == id) else {
            log_warn!("Failed to create partition, storage device [{}] not found", id);
            return Err(StorageError::NotFound);
        };

        slot.device.register_partition(label, size)?;
        log_debug!("Create partition {} (id:{}) success", label, id);
        Ok(())
    }

    /// 查找设备
    pub fn find(&self, id: u8) -> Option<&Device<'d>> {
        self.slots.iter().find(|s| s.id == id).map(|s| &s.device)
    }

    /// 设备信息
    pub fn device_info(&self, id: u8) -> Option<&StorageDeviceInfo> {
        self.find(id).map(|d| d.info())
    }

    /// 查找设备上的分区
    pub fn partition(&self, id: u8, label: &str) -> Option<&PartitionEntry> {
        self.find(id).and_then(|d| d.partition(label))
    }

    /// 已注册设备数量
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// 注册表是否为空
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl Default for DeviceRegistry<'_> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mkdev_then_mkpartition() {
        let mut registry = DeviceRegistry::new();
        assert!(registry.mkdev(1, DeviceKind::Flash).is_ok());
        assert!(registry.mkpartition(1, "sys", 0x100000).is_ok());
        assert!(registry.partition(1, "sys").is_some());
    }

    #[test]
    fn test_mkpartition_unknown_device() {
        let mut registry = DeviceRegistry::new();
        assert_eq!(
            registry.mkpartition(7, "sys", 0x1000).err(),
            Some(StorageError::NotFound)
        );
    }

    #[test]
    fn test_mkdev_duplicate_id() {
        let mut registry = DeviceRegistry::new();
        assert!(registry.mkdev(1, DeviceKind::Flash).is_ok());
        assert_eq!(
            registry.mkdev(1, DeviceKind::Flash).err(),
            Some(StorageError::AlreadyExists)
        );
    }

    #[test]
    fn test_mkdev_unsupported_kind() {
        let mut registry = DeviceRegistry::new();
        assert_eq!(
            registry.mkdev(2, DeviceKind::Sd).err(),
            Some(StorageError::Unsupported)
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn test_failed_install_not_inserted() {
        let mut registry = DeviceRegistry::new();
        let broken = Device::Flash(SpiFlash::new(SpiFlashConfig {
            capacity: 0,
            ..SpiFlashConfig::default()
        }));
        assert!(registry.insert(3, broken).is_err());
        assert!(registry.find(3).is_none());
    }

    #[test]
    fn test_id_reuse_after_rmdev() {
        let mut registry = DeviceRegistry::new();
        assert!(registry.mkdev(1, DeviceKind::Flash).is_ok());
        assert!(registry.rmdev(1).is_ok());
        assert!(registry.mkdev(1, DeviceKind::Flash).is_ok());
    }

    #[test]
    fn test_duplicate_label_second_device_ok() {
        // 标签唯一性约束的作用域是单个设备
        let mut registry = DeviceRegistry::new();
        assert!(registry.mkdev(1, DeviceKind::Flash).is_ok());
        assert!(registry.mkdev(2, DeviceKind::Flash).is_ok());
        assert!(registry.mkpartition(1, "sys", 0x1000).is_ok());
        assert!(registry.mkpartition(2, "sys", 0x1000).is_ok());
        assert_eq!(
            registry.mkpartition(1, "sys", 0x1000).err(),
            Some(StorageError::AlreadyExists)
        );
    }
}
