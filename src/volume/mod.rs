//! 卷抽象模块
//!
//! 块级文件系统不在本层实现范围内: [`Volume`] trait 描述本层对
//! 外部卷的全部依赖 (绑定、打开、逐字节读取、枚举、删除等)。
//! `RamVolume` 是内存实现，在 `FlashStorage` 之上的文件系统卷
//! 落地之前充当参考卷和测试目标。
//!
//! - `ram`: 内存卷实现
//! - `mount`: 挂载句柄与闸门仲裁的文件操作

pub mod mount;
pub mod ram;

use heapless::{String, Vec};

use crate::config::{MAX_DIR_ENTRIES, MAX_NAME_LEN, MAX_PATH_LEN};
use crate::error::StorageError;

pub use mount::VolumeMount;
pub use ram::RamVolume;

/// 卷内打开文件的句柄标识
pub type FileId = u32;

/// 文件打开模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// 只读，文件必须存在
    Read,
    /// 截断写入，不存在则创建
    Write,
    /// 追加写入，不存在则创建
    Append,
}

/// 目录枚举条目
#[derive(Debug, Clone)]
pub struct DirEntry {
    /// 条目名 (不含路径)
    pub name: String<MAX_NAME_LEN>,
    /// 是否为目录
    pub is_dir: bool,
    /// 文件大小 (目录为 0)
    pub size: u32,
}

impl DirEntry {
    /// 是否为普通文件
    pub fn is_file(&self) -> bool {
        !self.is_dir
    }
}

/// 一次目录枚举的有界结果集
pub type DirEntries = Vec<DirEntry, MAX_DIR_ENTRIES>;

/// 卷空间使用情况
#[derive(Debug, Clone, Copy, Default)]
pub struct VolumeUsage {
    /// 总容量 (字节)
    pub total_bytes: u32,
    /// 已用容量 (字节)
    pub used_bytes: u32,
}

/// 外部卷能力接口
///
/// 路径为以 `/` 开头的绝对路径。实现方负责自身的一致性；
/// 并发串行化由上层闸门保证，trait 方法本身无需加锁
pub trait Volume {
    /// 绑定卷 (挂载底层文件系统)
    ///
    /// `format_on_fail` 指示绑定失败时是否允许格式化后重试
    fn bind(&mut self, format_on_fail: bool) -> Result<(), StorageError>;

    /// 解除绑定，同步所有数据
    fn unbind(&mut self) -> Result<(), StorageError>;

    /// 查询空间使用情况
    fn usage(&self) -> Result<VolumeUsage, StorageError>;

    /// 路径是否存在 (文件或目录)
    fn exists(&self, path: &str) -> bool;

    /// 打开文件
    ///
    /// 以 [`OpenMode::Read`] 打开目录返回 [`StorageError::WrongType`]
    fn open(&mut self, path: &str, mode: OpenMode) -> Result<FileId, StorageError>;

    /// 关闭文件句柄 (已关闭的句柄忽略)
    fn close(&mut self, file: FileId);

    /// 打开文件的当前大小
    fn file_size(&self, file: FileId) -> Result<u32, StorageError>;

    /// 移动读写位置
    ///
    /// `pos` 超出文件长度时返回 [`StorageError::OutOfRange`]
    fn seek(&mut self, file: FileId, pos: u32) -> Result<(), StorageError>;

    /// 读取当前位置的一个字节，文件末尾返回 `None`
    fn read_byte(&mut self, file: FileId) -> Result<Option<u8>, StorageError>;

    /// 在当前位置写入数据
    fn write(&mut self, file: FileId, data: &[u8]) -> Result<(), StorageError>;

    /// 创建目录
    fn mkdir(&mut self, path: &str) -> Result<(), StorageError>;

    /// 删除空目录，非空时返回 [`StorageError::DirectoryNotEmpty`]
    fn rmdir(&mut self, path: &str) -> Result<(), StorageError>;

    /// 删除文件
    fn remove(&mut self, path: &str) -> Result<(), StorageError>;

    /// 枚举目录的直接子条目 (底层原生顺序)
    fn read_dir(&mut self, path: &str, entries: &mut DirEntries) -> Result<(), StorageError>;
}

/// 拼接目录路径与条目名
pub(crate) fn join_path(base: &str, name: &str) -> Result<String<MAX_PATH_LEN>, StorageError> {
    let mut path: String<MAX_PATH_LEN> = String::new();
    path.push_str(base).map_err(|_| StorageError::PathTooLong)?;
    if !base.ends_with('/') {
        path.push('/').map_err(|_| StorageError::PathTooLong)?;
    }
    path.push_str(name).map_err(|_| StorageError::PathTooLong)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("/", "a").as_deref(), Ok("/a"));
        assert_eq!(join_path("/logs", "boot.txt").as_deref(), Ok("/logs/boot.txt"));
        assert_eq!(join_path("/logs/", "boot.txt").as_deref(), Ok("/logs/boot.txt"));
    }

    #[test]
    fn test_join_path_too_long() {
        let mut long: String<MAX_PATH_LEN> = String::new();
        for _ in 0..MAX_PATH_LEN {
            long.push('x').ok();
        }
        assert_eq!(join_path(&long, "y").err(), Some(StorageError::PathTooLong));
    }
}
