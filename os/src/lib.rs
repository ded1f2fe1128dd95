//! # simos
//!
//! 教学用计算机模拟器的监控程序核心。模拟 CPU 每次陷入时调用
//! [`Kernel::handle_interrupt`]，监控程序在这一次调用内完成中断处理、
//! 阻塞进程唤醒、调度和上下文恢复，然后告诉 CPU 继续执行还是停机。
//!
//! ## 模块组织
//!
//! ```text
//!            ┌────────────────────────────┐
//!  CPU ────► │ trap: 中断分发              │
//!            └──────┬─────────────┬───────┘
//!                   │             │
//!         ┌─────────▼───┐   ┌─────▼──────────┐
//!         │ syscall     │   │ process: 调度   │
//!         └─────────┬───┘   └─────┬──────────┘
//!                   │             │
//!            ┌──────▼─────────────▼───────┐
//!            │ mm: 请求分页与页面置换       │
//!            └──────────────┬─────────────┘
//!                           │
//!            ┌──────────────▼─────────────┐
//!            │ hal: 内存 / MMU / 设备 / 时钟 │
//!            └────────────────────────────┘
//! ```
//!
//! 统计由 [`metrics`] 汇总，根进程结束时输出最终报告。
//!
//! ## 使用
//!
//! ```no_run
//! use simos::{Board, Config, Kernel};
//! use simos::hal::{Irq, Program};
//!
//! simos::log::init();
//! let mut board = Board::new(1000);
//! board.add_program("trata_int.maq", Program::new(10, vec![0; 5]));
//! board.add_program("init.maq", Program::new(0, vec![0; 30]));
//! let mut kernel = Kernel::new(board, Config::from_env());
//! kernel.interrupt(Irq::Reset);
//! ```

pub mod board;
pub mod config;
pub mod hal;
pub mod kernel;
pub mod log;
pub mod metrics;
pub mod mm;
pub mod process;
mod syscall;
pub mod trap;

pub use board::Board;
pub use config::Config;
pub use kernel::{FatalError, Kernel, Verdict};
