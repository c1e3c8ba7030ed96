//! 同步模块
//!
//! - `gate`: 串行化所有卷操作的进程级闸门

pub mod gate;

pub use gate::{Gate, GateGuard};
