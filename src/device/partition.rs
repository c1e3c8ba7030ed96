//! 分区注册表
//!
//! 管理单个物理设备上已划分的命名区域。与 ESP-IDF 分区表不同，
//! 这里的条目由运行时 `register_partition` 调用动态登记，
//! 偏移由表自动顺序分配 (原实现遗留 TODO: automatic offset)

use core::fmt;

use heapless::{String, Vec};

use crate::config::{MAX_PARTITIONS, SECTOR_SIZE};
use crate::error::StorageError;

/// 分区标签最大长度 (15 字符 + null，对齐 ESP-IDF 约定)
pub const MAX_LABEL_LEN: usize = 15;

/// 单个分区登记条目
#[derive(Clone)]
pub struct PartitionEntry {
    /// 分区标签，设备内唯一
    pub label: String<16>,
    /// 分区在设备地址空间中的偏移
    pub offset: u32,
    /// 分区大小 (字节，扇区对齐)
    pub size: u32,
}

impl PartitionEntry {
    /// 分区结束地址
    pub fn end_offset(&self) -> u32 {
        self.offset + self.size
    }

    /// 给定块大小下的块数
    pub fn block_count(&self, block_size: u32) -> u32 {
        self.size / block_size
    }
}

impl fmt::Debug for PartitionEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartitionEntry")
            .field("label", &self.label.as_str())
            .field("offset", &format_args!("0x{:08X}", self.offset))
            .field("size", &format_args!("0x{:08X} ({}KB)", self.size, self.size / 1024))
            .finish()
    }
}

/// 设备级分区注册表
///
/// 偏移从 `first_offset` 起顺序分配；条目移除后留下的空洞不回收
pub struct PartitionTable {
    entries: Vec<PartitionEntry, MAX_PARTITIONS>,
    next_offset: u32,
    capacity: u32,
}

impl PartitionTable {
    /// 创建空注册表
    ///
    /// # 参数
    /// - `first_offset`: 第一个可分配偏移 (保留区之后)
    /// - `capacity`: 设备总容量 (字节)
    pub const fn new(first_offset: u32, capacity: u32) -> Self {
        Self {
            entries: Vec::new(),
            next_offset: first_offset,
            capacity,
        }
    }

    /// 登记一个新分区，返回分配到的条目
    ///
    /// 失败条件: 标签为空/过长/重复、大小为 0、剩余空间不足、表已满
    pub fn register(&mut self, label: &str, size: u32) -> Result<&PartitionEntry, StorageError> {
        if label.is_empty() || label.len() > MAX_LABEL_LEN {
            return Err(StorageError::InvalidParam);
        }
        if size == 0 {
            return Err(StorageError::InvalidParam);
        }
        if self.find_by_label(label).is_some() {
            return Err(StorageError::AlreadyExists);
        }

        // 大小向上对齐到扇区边界，对齐或末地址回绕按空间不足处理
        let size = size
            .div_ceil(SECTOR_SIZE)
            .checked_mul(SECTOR_SIZE)
            .ok_or(StorageError::NoSpace)?;
        let offset = self.next_offset;
        let end = offset.checked_add(size).ok_or(StorageError::NoSpace)?;
        if end > self.capacity {
            return Err(StorageError::NoSpace);
        }

        let mut label_str = String::new();
        label_str.push_str(label).map_err(|_| StorageError::InvalidParam)?;

        self.entries
            .push(PartitionEntry {
                label: label_str,
                offset,
                size,
            })
            .map_err(|_| StorageError::NoSpace)?;

        let entry = &self.entries[self.entries.len() - 1];
        self.next_offset = entry.end_offset();
        Ok(entry)
    }

    /// 按标签查找分区
    pub fn find_by_label(&self, label: &str) -> Option<&PartitionEntry> {
        self.entries.iter().find(|p| p.label.as_str() == label)
    }

    /// 按标签移除分区
    pub fn remove(&mut self, label: &str) -> Result<(), StorageError> {
        let index = self
            .entries
            .iter()
            .position(|p| p.label.as_str() == label)
            .ok_or(StorageError::NotFound)?;
        self.entries.swap_remove(index);
        Ok(())
    }

    /// 所有已登记分区
    pub fn entries(&self) -> &[PartitionEntry] {
        &self.entries
    }

    /// 已登记分区数量
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 注册表是否为空
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_allocates_sequential_offsets() {
        let mut table = PartitionTable::new(0x1000, 0x100000);

        let first = table.register("sys", 0x8000).map(|p| p.offset);
        assert_eq!(first, Ok(0x1000));

        let second = table.register("data", 0x4000).map(|p| p.offset);
        assert_eq!(second, Ok(0x9000));
    }

    #[test]
    fn test_register_rejects_duplicate_label() {
        let mut table = PartitionTable::new(0x1000, 0x100000);
        assert!(table.register("sys", 0x1000).is_ok());
        assert_eq!(
            table.register("sys", 0x1000).err(),
            Some(StorageError::AlreadyExists)
        );
    }

    #[test]
    fn test_register_aligns_size() {
        let mut table = PartitionTable::new(0, 0x100000);
        let entry = table.register("odd", 100).cloned();
        assert_eq!(entry.map(|p| p.size), Ok(SECTOR_SIZE));
    }

    #[test]
    fn test_register_rejects_overflow() {
        let mut table = PartitionTable::new(0x1000, 0x4000);
        assert_eq!(
            table.register("big", 0x8000).err(),
            Some(StorageError::NoSpace)
        );
    }

    #[test]
    fn test_register_rejects_huge_size() {
        let mut table = PartitionTable::new(0x1000, u32::MAX);
        // 扇区对齐不得回绕到 0 (回绕会绕过 size == 0 检查)
        assert_eq!(
            table.register("huge", 0xFFFF_F001).err(),
            Some(StorageError::NoSpace)
        );
        assert_eq!(
            table.register("max", u32::MAX).err(),
            Some(StorageError::NoSpace)
        );
        assert!(table.is_empty());
    }

    #[test]
    fn test_entry_geometry() {
        let mut table = PartitionTable::new(0x1000, 0x100000);
        let entry = table.register("sys", 0x8000).cloned();
        assert_eq!(entry.as_ref().map(|p| p.end_offset()), Ok(0x9000));
        assert_eq!(entry.map(|p| p.block_count(SECTOR_SIZE)), Ok(8));
        // 下一个分区从上一个的结束地址开始
        assert_eq!(table.register("data", 0x1000).map(|p| p.offset), Ok(0x9000));
    }

    #[test]
    fn test_register_rejects_bad_label() {
        let mut table = PartitionTable::new(0, 0x100000);
        assert_eq!(table.register("", 0x1000).err(), Some(StorageError::InvalidParam));
        assert_eq!(
            table.register("this_label_is_way_too_long", 0x1000).err(),
            Some(StorageError::InvalidParam)
        );
    }

    #[test]
    fn test_remove_frees_label() {
        let mut table = PartitionTable::new(0, 0x100000);
        assert!(table.register("tmp", 0x1000).is_ok());
        assert!(table.remove("tmp").is_ok());
        assert!(table.find_by_label("tmp").is_none());
        // 标签可复用，偏移继续顺序分配
        assert!(table.register("tmp", 0x1000).is_ok());
        assert_eq!(table.remove("missing").err(), Some(StorageError::NotFound));
    }
}
