//! # CPU 寄存器映像
//!
//! CPU 响应中断时把寄存器写入物理内存中的固定保存区，监控程序从那里
//! 读出当前进程的 [`CpuContext`]；调度结束后把选中进程的映像写回，
//! 中断处理程序返回时 CPU 再从保存区恢复寄存器。
//!
//! ```text
//!  addr  CPU_SAVE_PC  CPU_SAVE_A  CPU_SAVE_ERROR  CPU_SAVE_COMPLEMENT  CPU_SAVE_X
//!        ┌──────────┬───────────┬───────────────┬────────────────────┬──────────┐
//!        │    PC    │     A     │  error code   │  fault address     │    X     │
//!        └──────────┴───────────┴───────────────┴────────────────────┴──────────┘
//! ```

use crate::config::{CPU_SAVE_A, CPU_SAVE_COMPLEMENT, CPU_SAVE_ERROR, CPU_SAVE_PC, CPU_SAVE_X};
use crate::hal::{CpuFault, HwError, Memory, Word};

/// 进程的寄存器映像
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub struct CpuContext {
    pub pc: Word,
    pub a: Word,
    pub x: Word,
    /// 错误码，见 [`CpuFault`]
    pub error: Word,
    /// 错误的补充信息，缺页时是出错地址
    pub complement: Word,
}

impl CpuContext {
    /// 程序入口处的初始映像
    pub fn at_entry(pc: usize) -> Self {
        Self {
            pc: pc as Word,
            ..Self::default()
        }
    }

    pub fn fault(&self) -> CpuFault {
        CpuFault::from(self.error)
    }

    /// 从保存区读出
    pub fn load(mem: &dyn Memory) -> Result<Self, HwError> {
        Ok(Self {
            pc: mem.mem_read(CPU_SAVE_PC)?,
            a: mem.mem_read(CPU_SAVE_A)?,
            error: mem.mem_read(CPU_SAVE_ERROR)?,
            complement: mem.mem_read(CPU_SAVE_COMPLEMENT)?,
            x: mem.mem_read(CPU_SAVE_X)?,
        })
    }

    /// 写回保存区
    pub fn store(&self, mem: &mut dyn Memory) -> Result<(), HwError> {
        mem.mem_write(CPU_SAVE_PC, self.pc)?;
        mem.mem_write(CPU_SAVE_A, self.a)?;
        mem.mem_write(CPU_SAVE_ERROR, self.error)?;
        mem.mem_write(CPU_SAVE_COMPLEMENT, self.complement)?;
        mem.mem_write(CPU_SAVE_X, self.x)?;
        Ok(())
    }
}
