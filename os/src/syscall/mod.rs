//! # 系统调用处理模块
//!
//! 用户程序把调用号放在 A 寄存器、参数放在 X 寄存器，然后执行系统调用
//! 指令陷入监控程序。结果写回 A 寄存器。
//!
//! ## 支持的系统调用
//!
//! - **终端 I/O**:
//!   - `SYSCALL_READ` (1)        - 从进程终端的键盘读一个字符
//!   - `SYSCALL_WRITE` (2)       - 把 X 写到进程终端的屏幕
//! - **进程管理**:
//!   - `SYSCALL_CREATE_PROC` (7) - 按 X 指向的程序名创建进程，返回 pid
//!   - `SYSCALL_KILL_PROC` (8)   - 终止 pid 为 X 的进程，X 为 0 时终止自己
//!   - `SYSCALL_WAIT_PROC` (9)   - 等待 pid 为 X 的进程结束
//!
//! 未知的调用号终止调用进程。容量不足等可预期的失败返回 -1。

mod io;
mod process;

use log::warn;

use crate::hal::{Hardware, Irq, Word};
use crate::kernel::{FatalError, Kernel, Reap, TerminationCause};

const SYSCALL_READ: Word = 1;
const SYSCALL_WRITE: Word = 2;
const SYSCALL_CREATE_PROC: Word = 7;
const SYSCALL_KILL_PROC: Word = 8;
const SYSCALL_WAIT_PROC: Word = 9;

impl<H: Hardware> Kernel<H> {
    /// 系统调用分发器
    pub(crate) fn handle_syscall(&mut self) -> Result<(), FatalError> {
        let (idx, id, arg) = self
            .cpu
            .current()
            .and_then(|idx| self.procs.get(idx).map(|p| (idx, p.context.a, p.context.x)))
            .ok_or(FatalError::NoRunningProcess(Irq::SystemCall))?;

        match id {
            SYSCALL_READ => self.sys_read(idx),
            SYSCALL_WRITE => self.sys_write(idx),
            SYSCALL_CREATE_PROC => self.sys_create_proc(idx, arg)?,
            SYSCALL_KILL_PROC => self.sys_kill_proc(idx, arg),
            SYSCALL_WAIT_PROC => self.sys_wait_proc(idx, arg),
            _ => {
                warn!("unsupported system call {}", id);
                self.terminate(idx, TerminationCause::InvalidSyscall(id), Reap::Deferred);
            }
        }
        Ok(())
    }
}
