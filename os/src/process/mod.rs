//! # 进程管理模块
//!
//! ## 核心组件
//!
//! - [`ProcessControlBlock`] - 进程控制块及其状态机
//! - [`ProcessManager`] - 定长进程表、pid 分配、就绪队列
//! - [`Processor`] - 当前进程、时间片和两种调度策略

mod manager;
#[allow(clippy::module_inception)]
mod process;
mod processor;

pub use manager::{ProcessManager, QueueFull, ReadyQueue};
pub use process::{BlockReason, Pid, ProcessControlBlock, ProcessStatus, STATUS_COUNT};
pub use processor::Processor;
