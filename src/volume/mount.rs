//! 挂载句柄与文件操作
//!
//! [`VolumeMount`] 把一个已绑定的卷和进程级闸门组合成可跨任务共享的
//! 操作句柄: 每个文件/目录操作先在有界超时内获取闸门，执行后随
//! 作用域退出释放，所有退出路径 (成功、未找到、类型错误、缓冲区
//! 溢出) 都不会遗留持锁状态。
//!
//! 目录的递归列举与删除使用显式工作队列，在一次闸门持有期间完成
//! 整个遍历。与逐层释放-重获的做法相比，遍历期间目录树不会被其他
//! 任务修改。

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex as BlockingMutex;
use heapless::{String, Vec};

use super::{join_path, DirEntries, OpenMode, Volume};
use crate::config::{MAX_BASE_PATH_LEN, MAX_PATH_LEN, WORKLIST_CAPACITY};
use crate::error::{ReadOutcome, StorageError};
use crate::sync::gate::Gate;
use crate::{log_debug, log_error, log_info, log_warn};

type Path = String<MAX_PATH_LEN>;

/// 已挂载卷的操作句柄
///
/// 卷实例存放在临界区单元中，句柄可通过共享引用跨任务使用；
/// 互斥访问由闸门保证
pub struct VolumeMount<'g, V: Volume> {
    volume: BlockingMutex<CriticalSectionRawMutex, RefCell<V>>,
    gate: &'g Gate,
    base_path: String<MAX_BASE_PATH_LEN>,
}

impl<'g, V: Volume> VolumeMount<'g, V> {
    /// 挂载卷
    ///
    /// 绑定失败时返回错误，卷实例随之释放，不遗留资源。
    /// 挂载成功后的空间查询仅用于诊断，查询失败不影响挂载结果
    pub fn mount(
        mut volume: V,
        gate: &'g Gate,
        base_path: &str,
        format_on_fail: bool,
    ) -> Result<Self, StorageError> {
        let mut base = String::new();
        base.push_str(base_path)
            .map_err(|_| StorageError::PathTooLong)?;

        volume.bind(format_on_fail).map_err(|e| {
            log_error!("Failed to mount volume at {}", base_path);
            e
        })?;

        match volume.usage() {
            Ok(usage) => log_debug!(
                "Partition size: total: {}, used: {}",
                usage.total_bytes,
                usage.used_bytes
            ),
            Err(_) => log_warn!("Failed to get volume usage information"),
        }

        Ok(Self {
            volume: BlockingMutex::new(RefCell::new(volume)),
            gate,
            base_path: base,
        })
    }

    /// 卸载卷，消耗句柄
    pub async fn unmount(self) -> Result<(), StorageError> {
        let _guard = self.gate.acquire().await?;
        self.with_volume(|v| v.unbind())
    }

    /// 挂载点路径
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    fn with_volume<R>(&self, f: impl FnOnce(&mut V) -> R) -> R {
        self.volume.lock(|cell| f(&mut cell.borrow_mut()))
    }

    // ==================== 文件操作 ====================

    /// 路径是否存在
    pub async fn exists(&self, path: &str) -> Result<bool, StorageError> {
        let _guard = self.gate.acquire().await?;
        Ok(self.with_volume(|v| v.exists(path)))
    }

    /// 有界缓冲读取
    ///
    /// 从 `pos` 开始把文件内容逐字节复制进 `dest`:
    /// - 读到文件末尾: `Ok(ReadOutcome::Eof)`
    /// - 遇到 `terminator`: `Ok(ReadOutcome::Terminator)`，终止符不复制
    /// - 目标是目录: `Err(WrongType)`
    /// - `pos` 超出文件长度: `Err(OutOfRange)`
    /// - `dest` 容量不足: `Err(BufferOverflow)`，已写入的部分内容必须丢弃
    pub async fn read(
        &self,
        path: &str,
        dest: &mut [u8],
        terminator: Option<u8>,
        pos: u32,
    ) -> Result<ReadOutcome, StorageError> {
        let _guard = self.gate.acquire().await?;
        self.with_volume(|v| read_inner(v, path, dest, terminator, pos))
    }

    /// 追加写入，负载后补一个行结束符
    pub async fn append(&self, path: &str, data: &[u8]) -> Result<(), StorageError> {
        let _guard = self.gate.acquire().await?;
        self.with_volume(|v| write_inner(v, path, data, OpenMode::Append))
    }

    /// 截断覆盖写入，负载后补一个行结束符
    pub async fn write(&self, path: &str, data: &[u8]) -> Result<(), StorageError> {
        let _guard = self.gate.acquire().await?;
        self.with_volume(|v| write_inner(v, path, data, OpenMode::Write))
    }

    /// 确保文件存在 (已存在视为成功)
    pub async fn mkfile(&self, path: &str) -> Result<(), StorageError> {
        let _guard = self.gate.acquire().await?;
        self.with_volume(|v| mkfile_inner(v, path))
    }

    /// 删除文件
    pub async fn rm(&self, path: &str) -> Result<(), StorageError> {
        let _guard = self.gate.acquire().await?;
        self.with_volume(|v| rm_inner(v, path))
    }

    /// 文件大小 (字节)
    ///
    /// 空文件与路径不存在需要调用方配合 [`Self::exists`] 区分
    pub async fn fsize(&self, path: &str) -> Result<u32, StorageError> {
        let _guard = self.gate.acquire().await?;
        self.with_volume(|v| fsize_inner(v, path))
    }

    /// 创建目录
    pub async fn mkdir(&self, path: &str) -> Result<(), StorageError> {
        let _guard = self.gate.acquire().await?;
        self.with_volume(|v| v.mkdir(path))
    }

    /// 列举目录内容到日志，最多下探 `depth` 层子目录
    pub async fn listdir(&self, dirname: &str, depth: u8) -> Result<(), StorageError> {
        let _guard = self.gate.acquire().await?;
        self.with_volume(|v| listdir_inner(v, dirname, depth))
    }

    /// 递归删除目录及其所有子项
    ///
    /// 非原子操作: 任一子项删除失败即中止并返回该失败，
    /// 目录树可能处于部分删除状态
    pub async fn rmdir(&self, dirname: &str) -> Result<(), StorageError> {
        let _guard = self.gate.acquire().await?;
        self.with_volume(|v| rmdir_inner(v, dirname))
    }
}

// ==================== 持锁内部实现 ====================

fn read_inner<V: Volume>(
    volume: &mut V,
    path: &str,
    dest: &mut [u8],
    terminator: Option<u8>,
    pos: u32,
) -> Result<ReadOutcome, StorageError> {
    let file = volume.open(path, OpenMode::Read).map_err(|e| {
        log_error!("Failed to open file for reading");
        e
    })?;
    let result = read_stream(volume, file, dest, terminator, pos);
    volume.close(file);
    result
}

fn read_stream<V: Volume>(
    volume: &mut V,
    file: super::FileId,
    dest: &mut [u8],
    terminator: Option<u8>,
    pos: u32,
) -> Result<ReadOutcome, StorageError> {
    if pos > 0 {
        volume.seek(file, pos)?;
    }

    let mut count = 0usize;
    loop {
        let Some(byte) = volume.read_byte(file)? else {
            return Ok(ReadOutcome::Eof(count));
        };
        if Some(byte) == terminator {
            return Ok(ReadOutcome::Terminator(count));
        }
        if count >= dest.len() {
            log_warn!("Read aborted, destination buffer full");
            return Err(StorageError::BufferOverflow);
        }
        dest[count] = byte;
        count += 1;
    }
}

fn write_inner<V: Volume>(
    volume: &mut V,
    path: &str,
    data: &[u8],
    mode: OpenMode,
) -> Result<(), StorageError> {
    let file = volume.open(path, mode).map_err(|e| {
        log_error!("Failed to open file for writing");
        e
    })?;
    let result = volume
        .write(file, data)
        .and_then(|()| volume.write(file, b"\n"));
    volume.close(file);
    result
}

fn mkfile_inner<V: Volume>(volume: &mut V, path: &str) -> Result<(), StorageError> {
    if volume.exists(path) {
        // 目标已经是文件则无事可做；是目录则按类型错误上报
        let file = volume.open(path, OpenMode::Read)?;
        volume.close(file);
        log_debug!("File {} already exists", path);
        return Ok(());
    }

    let file = volume.open(path, OpenMode::Write).map_err(|e| {
        log_error!("Failed to create {}", path);
        e
    })?;
    volume.close(file);
    Ok(())
}

fn rm_inner<V: Volume>(volume: &mut V, path: &str) -> Result<(), StorageError> {
    volume.remove(path).map_err(|e| {
        log_warn!("Error deleting file");
        e
    })?;
    log_debug!("Successfully deleted file {}", path);
    Ok(())
}

fn fsize_inner<V: Volume>(volume: &mut V, path: &str) -> Result<u32, StorageError> {
    let file = volume.open(path, OpenMode::Read)?;
    let size = volume.file_size(file);
    volume.close(file);
    size
}

fn listdir_inner<V: Volume>(volume: &mut V, dirname: &str, depth: u8) -> Result<(), StorageError> {
    log_info!("Listing directory: {}", dirname);

    let mut root = Path::new();
    root.push_str(dirname).map_err(|_| StorageError::PathTooLong)?;

    let mut worklist: Vec<(Path, u8), WORKLIST_CAPACITY> = Vec::new();
    worklist
        .push((root, depth))
        .map_err(|_| StorageError::NoSpace)?;

    while let Some((dir, depth)) = worklist.pop() {
        let mut entries = DirEntries::new();
        volume.read_dir(&dir, &mut entries).map_err(|e| {
            log_warn!("Failed to open directory: {}", dir.as_str());
            e
        })?;

        for entry in &entries {
            if entry.is_dir {
                log_info!("  DIR: {}", entry.name.as_str());
                if depth > 0 {
                    let child = join_path(&dir, &entry.name)?;
                    worklist
                        .push((child, depth - 1))
                        .map_err(|_| StorageError::NoSpace)?;
                }
            } else {
                log_info!("  FILE: {}, SIZE: {}", entry.name.as_str(), entry.size);
            }
        }
    }
    Ok(())
}

fn rmdir_inner<V: Volume>(volume: &mut V, dirname: &str) -> Result<(), StorageError> {
    // 快速路径: 目录已空
    match volume.rmdir(dirname) {
        Ok(()) => return Ok(()),
        Err(StorageError::DirectoryNotEmpty) => {}
        Err(e) => return Err(e),
    }

    // 深度优先工作队列，条目为 (路径, 子项是否已清除)。
    // 目录先以未展开状态入队；展开时重新入队为已展开并压入所有
    // 子目录，文件当场删除。已展开条目出队时其子项必然已清空
    let mut root = Path::new();
    root.push_str(dirname).map_err(|_| StorageError::PathTooLong)?;

    let mut worklist: Vec<(Path, bool), WORKLIST_CAPACITY> = Vec::new();
    worklist
        .push((root, false))
        .map_err(|_| StorageError::NoSpace)?;

    while let Some((dir, expanded)) = worklist.pop() {
        if expanded {
            volume.rmdir(&dir)?;
            continue;
        }

        let mut entries = DirEntries::new();
        volume.read_dir(&dir, &mut entries)?;

        worklist
            .push((dir.clone(), true))
            .map_err(|_| StorageError::NoSpace)?;

        for entry in &entries {
            let child = join_path(&dir, &entry.name)?;
            if entry.is_dir {
                worklist
                    .push((child, false))
                    .map_err(|_| StorageError::NoSpace)?;
            } else {
                // 任一子项失败即中止，不再尝试删除目录本身
                volume.remove(&child)?;
            }
        }
    }
    Ok(())
}
