//! ESP32-S3 并发安全存储层
//!
//! 基于 Embassy 与 esp-hal 1.0 的嵌入式存储管理:
//! 设备注册、分区划分、卷挂载和闸门仲裁的文件操作。
//!
//! # 模块结构
//!
//! - `device`: 存储设备抽象 (SPI Flash)、分区注册表、块设备视图
//! - `volume`: 卷抽象、内存参考卷、挂载句柄与文件操作
//! - `storage`: 存储管理器 [`DataStorage`]
//! - `sync`: 并发闸门
//! - `error`: 错误类型与读取结果
//! - `util`: 日志宏
//!
//! # 并发模型
//!
//! 整个存储层共享一个进程级闸门: 每个操作在有界超时内获取闸门，
//! 超时返回 [`StorageError::Busy`]。目录递归操作在一次持锁期间
//! 完成，遍历中途目录树不会被其他任务修改。
//!
//! # 使用方式
//!
//! ```ignore
//! static STORAGE: DataStorage<'static> = DataStorage::new();
//!
//! STORAGE.mkdev(0, DeviceKind::Flash).await?;
//! STORAGE.mkpartition(0, "user", 0x100000).await?;
//! let mount = STORAGE.mount(volume, "/data", true).await?;
//! mount.append("/data.txt", b"hello").await?;
//! ```

#![no_std]

pub mod device;
pub mod error;
pub mod storage;
pub mod sync;
pub mod util;
pub mod volume;

pub use device::{DeviceKind, DeviceStatus, StorageDevice, StorageDeviceInfo};
pub use error::{ReadOutcome, StorageError};
pub use storage::DataStorage;
pub use sync::gate::Gate;
pub use volume::{Volume, VolumeMount};

/// 库版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 库名称
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// 容量与超时配置
///
/// 静态内存布局的编译期参数。调整后整库重新编译，
/// 所有容器大小随之变化
pub mod config {
    /// 闸门默认等待超时 (毫秒)
    pub const GATE_TIMEOUT_MS: u64 = 500;

    /// 可同时注册的设备数量上限
    pub const MAX_DEVICES: usize = 4;

    /// 单个设备上的分区数量上限
    pub const MAX_PARTITIONS: usize = 8;

    /// Flash 擦除扇区大小 (字节)，分区偏移与大小按此对齐
    pub const SECTOR_SIZE: u32 = 4096;

    /// 绝对路径最大长度
    pub const MAX_PATH_LEN: usize = 128;

    /// 挂载点路径最大长度
    pub const MAX_BASE_PATH_LEN: usize = 32;

    /// 目录条目名最大长度
    pub const MAX_NAME_LEN: usize = 64;

    /// 一次目录枚举返回的条目数上限
    pub const MAX_DIR_ENTRIES: usize = 16;

    /// 单个卷同时打开的文件句柄上限
    pub const MAX_OPEN_FILES: usize = 10;

    /// 目录递归遍历工作队列容量 (限制待处理目录数)
    pub const WORKLIST_CAPACITY: usize = 32;

    /// 内存卷文件数量上限
    pub const RAM_MAX_FILES: usize = 16;

    /// 内存卷目录数量上限
    pub const RAM_MAX_DIRS: usize = 8;

    /// 内存卷单文件容量 (字节)
    pub const RAM_FILE_CAPACITY: usize = 1024;
}
