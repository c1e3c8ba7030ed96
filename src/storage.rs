//! 存储管理器
//!
//! [`DataStorage`] 是整套存储层的唯一入口: 持有设备注册表和进程级
//! 闸门，设备/分区管理操作与文件操作都经由同一个闸门串行化。
//! 管理器是显式对象，可放入 `static_cell` 在任务间共享；
//! 不依赖隐式全局状态，也没有独立的 init/done 阶段。

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex as BlockingMutex;

use crate::device::partition::PartitionEntry;
use crate::device::registry::{Device, DeviceRegistry};
use crate::device::{DeviceKind, StorageDeviceInfo};
use crate::error::StorageError;
use crate::sync::gate::Gate;
use crate::volume::{Volume, VolumeMount};

/// 存储管理器
///
/// 所有方法通过共享引用调用，内部一致性由闸门和临界区单元保证
pub struct DataStorage<'d> {
    registry: BlockingMutex<CriticalSectionRawMutex, RefCell<DeviceRegistry<'d>>>,
    gate: Gate,
}

impl<'d> DataStorage<'d> {
    /// 使用默认闸门超时创建管理器
    pub const fn new() -> Self {
        Self {
            registry: BlockingMutex::new(RefCell::new(DeviceRegistry::new())),
            gate: Gate::new(),
        }
    }

    /// 使用指定闸门超时 (毫秒) 创建管理器
    pub const fn with_gate_timeout(timeout_ms: u64) -> Self {
        Self {
            registry: BlockingMutex::new(RefCell::new(DeviceRegistry::new())),
            gate: Gate::with_timeout(timeout_ms),
        }
    }

    fn with_registry<R>(&self, f: impl FnOnce(&mut DeviceRegistry<'d>) -> R) -> R {
        self.registry.lock(|cell| f(&mut cell.borrow_mut()))
    }

    /// 用默认配置创建并安装指定类型的设备
    pub async fn mkdev(&self, id: u8, kind: DeviceKind) -> Result<(), StorageError> {
        let _guard = self.gate.acquire().await?;
        self.with_registry(|r| r.mkdev(id, kind))
    }

    /// 安装并注册一个外部构造的设备 (如已注入 SPI 总线的 Flash)
    pub async fn insert_device(&self, id: u8, device: Device<'d>) -> Result<(), StorageError> {
        let _guard = self.gate.acquire().await?;
        self.with_registry(|r| r.insert(id, device))
    }

    /// 卸载并移除设备
    pub async fn rmdev(&self, id: u8) -> Result<(), StorageError> {
        let _guard = self.gate.acquire().await?;
        self.with_registry(|r| r.rmdev(id))
    }

    /// 在指定设备上登记分区
    pub async fn mkpartition(&self, id: u8, label: &str, size: u32) -> Result<(), StorageError> {
        let _guard = self.gate.acquire().await?;
        self.with_registry(|r| r.mkpartition(id, label, size))
    }

    /// 查询设备信息 (副本)，设备不存在时返回 `None`
    pub fn device_info(&self, id: u8) -> Option<StorageDeviceInfo> {
        self.with_registry(|r| r.device_info(id).copied())
    }

    /// 查询分区条目 (副本)，设备或分区不存在时返回 `None`
    pub fn partition(&self, id: u8, label: &str) -> Option<PartitionEntry> {
        self.with_registry(|r| r.partition(id, label).cloned())
    }

    /// 已注册设备数量
    pub fn device_count(&self) -> usize {
        self.with_registry(|r| r.len())
    }

    /// 挂载卷，返回与本管理器共享闸门的操作句柄
    ///
    /// 绑定在闸门持有期间完成；绑定失败时卷实例释放，无残留状态
    pub async fn mount<V: Volume>(
        &self,
        volume: V,
        base_path: &str,
        format_on_fail: bool,
    ) -> Result<VolumeMount<'_, V>, StorageError> {
        let _guard = self.gate.acquire().await?;
        VolumeMount::mount(volume, &self.gate, base_path, format_on_fail)
    }

    /// 探测闸门是否被占用
    pub fn is_busy(&self) -> bool {
        self.gate.is_busy()
    }

    /// 管理器的闸门引用
    pub fn gate(&self) -> &Gate {
        &self.gate
    }
}

impl Default for DataStorage<'_> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_const_construction() {
        static STORAGE: DataStorage<'static> = DataStorage::new();
        assert!(!STORAGE.is_busy());
        assert_eq!(STORAGE.device_count(), 0);
        assert!(STORAGE.device_info(1).is_none());
    }

    #[test]
    fn test_registry_queries() {
        let storage = DataStorage::new();
        // 同步查询不经过闸门，设备不存在时返回 None 而非错误
        assert!(storage.partition(1, "sys").is_none());
        assert!(storage.device_info(9).is_none());
    }

    #[test]
    fn test_gate_shared_across_operations() {
        let storage = DataStorage::with_gate_timeout(100);
        let held = storage.gate().try_acquire();
        assert!(held.is_some());
        assert!(storage.is_busy());
        drop(held);
        assert!(!storage.is_busy());
    }
}
