//! 并发闸门
//!
//! 单个进程级互斥锁，串行化所有已挂载卷上的文件操作。
//! 基于 embassy-sync 异步互斥锁，通过 embassy-time 实现有界等待:
//! 超时未获取到锁时返回 [`StorageError::Busy`]，调用方可稍后重试。
//!
//! 锁不可重入。目录递归遍历 (listdir / rmdir) 使用显式工作队列，
//! 在一次持锁期间完成整个遍历，不存在释放-重获窗口。

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::{Mutex, MutexGuard};
use embassy_time::{with_timeout, Duration};

use crate::error::StorageError;
use crate::log_warn;

/// 存储操作闸门
///
/// 由 [`DataStorage`](crate::storage::DataStorage) 独占持有，
/// 所有 [`VolumeMount`](crate::volume::VolumeMount) 共享同一个引用
pub struct Gate {
    inner: Mutex<CriticalSectionRawMutex, ()>,
    timeout: Duration,
}

/// 闸门持有凭证，离开作用域时自动释放
pub struct GateGuard<'a> {
    _guard: MutexGuard<'a, CriticalSectionRawMutex, ()>,
}

impl Gate {
    /// 使用默认超时 (500ms) 创建闸门
    pub const fn new() -> Self {
        Self::with_timeout(crate::config::GATE_TIMEOUT_MS)
    }

    /// 使用指定超时创建闸门
    pub const fn with_timeout(timeout_ms: u64) -> Self {
        Self {
            inner: Mutex::new(()),
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    /// 获取闸门 (异步，有界等待)
    ///
    /// 超过配置的等待时间仍未获取到锁时返回 [`StorageError::Busy`]
    pub async fn acquire(&self) -> Result<GateGuard<'_>, StorageError> {
        match with_timeout(self.timeout, self.inner.lock()).await {
            Ok(guard) => Ok(GateGuard { _guard: guard }),
            Err(_) => {
                log_warn!("Gate acquire timed out after {}ms", self.timeout.as_millis());
                Err(StorageError::Busy)
            }
        }
    }

    /// 非阻塞获取闸门
    pub fn try_acquire(&self) -> Option<GateGuard<'_>> {
        self.inner.try_lock().ok().map(|g| GateGuard { _guard: g })
    }

    /// 探测闸门是否被占用
    ///
    /// 立即返回，不参与真实操作的超时等待
    pub fn is_busy(&self) -> bool {
        match self.inner.try_lock() {
            Ok(_guard) => false,
            Err(_) => true,
        }
    }

    /// 当前配置的等待超时
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_acquire_and_release() {
        let gate = Gate::new();
        assert!(!gate.is_busy());

        let guard = gate.try_acquire();
        assert!(guard.is_some());
        // 二次获取失败
        assert!(gate.try_acquire().is_none());

        drop(guard);
        assert!(gate.try_acquire().is_some());
    }

    #[test]
    fn test_is_busy_probe() {
        let gate = Gate::with_timeout(100);
        let _held = gate.try_acquire();
        assert!(gate.is_busy());
    }

    #[test]
    fn test_probe_does_not_hold() {
        let gate = Gate::new();
        // is_busy 的探测不会自己留下持有状态
        assert!(!gate.is_busy());
        assert!(!gate.is_busy());
        assert!(gate.try_acquire().is_some());
    }
}
