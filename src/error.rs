//! 统一错误类型
//!
//! 所有存储层操作通过 `Result<_, StorageError>` 上报失败，
//! 不使用 panic (编程错误类前置条件除外)

use core::fmt;

/// 存储操作错误
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StorageError {
    /// 设备或块存储未初始化
    NotInitialized,
    /// 未在超时时间内获取到锁，可重试
    Busy,
    /// 设备 ID 或路径不存在
    NotFound,
    /// 把目录当作文件操作 (或反之)
    WrongType,
    /// 偏移超出文件范围
    OutOfRange,
    /// 目标缓冲区容量不足，已写入的部分内容必须丢弃
    BufferOverflow,
    /// 底层创建/打开/写入/删除失败
    IoFailure,
    /// 分区标签或文件已存在
    AlreadyExists,
    /// 目录非空
    DirectoryNotEmpty,
    /// 容量不足 (设备、表项或工作队列)
    NoSpace,
    /// 路径过长
    PathTooLong,
    /// 打开的文件过多
    TooManyOpenFiles,
    /// 卷绑定失败
    MountFailed,
    /// 介质或文件系统损坏
    Corrupt,
    /// 无效参数
    InvalidParam,
    /// 设备类型暂不支持
    Unsupported,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotInitialized => write!(f, "Not initialized"),
            Self::Busy => write!(f, "Storage busy"),
            Self::NotFound => write!(f, "Not found"),
            Self::WrongType => write!(f, "Wrong entry type"),
            Self::OutOfRange => write!(f, "Position out of range"),
            Self::BufferOverflow => write!(f, "Destination buffer too small"),
            Self::IoFailure => write!(f, "IO failure"),
            Self::AlreadyExists => write!(f, "Already exists"),
            Self::DirectoryNotEmpty => write!(f, "Directory not empty"),
            Self::NoSpace => write!(f, "No space"),
            Self::PathTooLong => write!(f, "Path too long"),
            Self::TooManyOpenFiles => write!(f, "Too many open files"),
            Self::MountFailed => write!(f, "Mount failed"),
            Self::Corrupt => write!(f, "Corrupt"),
            Self::InvalidParam => write!(f, "Invalid parameter"),
            Self::Unsupported => write!(f, "Unsupported"),
        }
    }
}

/// 成功读取的两种结束方式
///
/// 与 `WrongType` / `OutOfRange` / `BufferOverflow` 共同构成
/// `read` 的五种可区分结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReadOutcome {
    /// 读到文件末尾，携带写入目标缓冲区的字节数
    Eof(usize),
    /// 遇到终止符提前结束，终止符本身不写入缓冲区
    Terminator(usize),
}

impl ReadOutcome {
    /// 写入目标缓冲区的字节数
    pub fn len(&self) -> usize {
        match self {
            Self::Eof(n) | Self::Terminator(n) => *n,
        }
    }

    /// 是否未读到任何字节
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_len() {
        assert_eq!(ReadOutcome::Eof(5).len(), 5);
        assert_eq!(ReadOutcome::Terminator(3).len(), 3);
        assert!(ReadOutcome::Eof(0).is_empty());
    }
}
