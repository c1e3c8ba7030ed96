//! 分区块设备
//!
//! 把设备上的一个分区暴露为文件系统后端所需的只读块设备视图
//! (实现 embedded-storage 的 `ReadNorFlash`)，并承担分区登记时的
//! 完整性校验 (边界、对齐)

use embedded_storage::nor_flash::{ErrorType, NorFlashError, NorFlashErrorKind, ReadNorFlash};

use crate::config::SECTOR_SIZE;
use crate::device::partition::PartitionEntry;
use crate::error::StorageError;

/// 块设备几何配置
#[derive(Debug, Clone, Copy)]
pub struct FlashConfig {
    /// 设备总容量 (字节)
    pub total_size: u32,
    /// 扇区大小 (擦除单位，通常 4KB)
    pub sector_size: u32,
    /// 块大小 (文件系统视角，通常 4KB)
    pub block_size: u32,
    /// 页面大小 (编程单位，通常 256B)
    pub page_size: u32,
    /// 分区起始偏移
    pub partition_offset: u32,
    /// 分区大小
    pub partition_size: u32,
}

impl Default for FlashConfig {
    fn default() -> Self {
        Self {
            total_size: 16 * 1024 * 1024,
            sector_size: SECTOR_SIZE,
            block_size: SECTOR_SIZE,
            page_size: 256,
            partition_offset: 0x1000,
            partition_size: 0xF00000,
        }
    }
}

/// 分区上的块存储视图
pub struct FlashStorage {
    config: FlashConfig,
    initialized: bool,
}

impl FlashStorage {
    /// 创建块存储实例
    pub const fn new(config: FlashConfig) -> Self {
        Self {
            config,
            initialized: false,
        }
    }

    /// 从分区登记条目创建
    pub fn from_partition(partition: &PartitionEntry, total_size: u32) -> Self {
        Self::new(FlashConfig {
            total_size,
            sector_size: SECTOR_SIZE,
            block_size: SECTOR_SIZE,
            page_size: 256,
            partition_offset: partition.offset,
            partition_size: partition.size,
        })
    }

    /// 校验几何配置并初始化
    ///
    /// 分区登记流程用它验证新条目: 越界分区或未对齐配置在这里被拒绝
    pub fn init(&mut self) -> Result<(), StorageError> {
        let end = self
            .config
            .partition_offset
            .checked_add(self.config.partition_size)
            .ok_or(StorageError::OutOfRange)?;
        if end > self.config.total_size {
            return Err(StorageError::OutOfRange);
        }

        if self.config.block_size == 0
            || self.config.sector_size == 0
            || self.config.block_size % self.config.sector_size != 0
            || self.config.partition_offset % self.config.sector_size != 0
        {
            return Err(StorageError::InvalidParam);
        }

        self.initialized = true;
        Ok(())
    }

    /// 是否已初始化
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// 当前配置
    pub fn config(&self) -> &FlashConfig {
        &self.config
    }

    /// 分区内的块数
    pub fn block_count(&self) -> u32 {
        self.config.partition_size / self.config.block_size
    }

    /// 块大小
    pub fn block_size(&self) -> u32 {
        self.config.block_size
    }

    /// 按分区内偏移读取
    ///
    /// ESP32-S3 内部 Flash 数据映射到 0x3C000000 起的地址空间，可直接读取
    pub fn read_at(&self, offset: u32, buffer: &mut [u8]) -> Result<(), StorageError> {
        if !self.initialized {
            return Err(StorageError::NotInitialized);
        }
        let end = offset
            .checked_add(buffer.len() as u32)
            .ok_or(StorageError::OutOfRange)?;
        if end > self.config.partition_size {
            return Err(StorageError::OutOfRange);
        }

        const FLASH_DATA_BASE: u32 = 0x3C00_0000;
        let src = (FLASH_DATA_BASE + self.config.partition_offset + offset) as *const u8;
        unsafe {
            core::ptr::copy_nonoverlapping(src, buffer.as_mut_ptr(), buffer.len());
        }
        Ok(())
    }

    /// 读取块数据
    pub fn read_block(&self, block: u32, buffer: &mut [u8]) -> Result<(), StorageError> {
        if buffer.len() > self.config.block_size as usize {
            return Err(StorageError::OutOfRange);
        }
        let offset = block
            .checked_mul(self.config.block_size)
            .ok_or(StorageError::OutOfRange)?;
        if offset >= self.config.partition_size {
            return Err(StorageError::OutOfRange);
        }
        self.read_at(offset, buffer)
    }
}

impl NorFlashError for StorageError {
    fn kind(&self) -> NorFlashErrorKind {
        match self {
            Self::OutOfRange => NorFlashErrorKind::OutOfBounds,
            _ => NorFlashErrorKind::Other,
        }
    }
}

impl ErrorType for FlashStorage {
    type Error = StorageError;
}

impl ReadNorFlash for FlashStorage {
    const READ_SIZE: usize = 1;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        self.read_at(offset, bytes)
    }

    fn capacity(&self) -> usize {
        self.config.partition_size as usize
    }
}
