//! 进程管理系统调用

use log::warn;

use crate::config::{MAX_PROGRAM_NAME, SYSCALL_INSTRUCTION_LEN};
use crate::hal::{Hardware, HwError, Word};
use crate::kernel::{FatalError, Kernel, Reap, TerminationCause};
use crate::mm::VmError;
use crate::process::{BlockReason, Pid, ProcessStatus};

/// 从用户空间读取程序名的结果
enum NameRead {
    Name(String),
    /// 名字所在页不在内存，已发起换页，系统调用将重新执行
    Retry,
    Invalid,
}

impl<H: Hardware> Kernel<H> {
    /// 创建进程
    ///
    /// 返回新进程的 pid；没有空闲槽位、名字非法或程序无法装入时返回 -1。
    pub(super) fn sys_create_proc(&mut self, idx: usize, name_addr: Word) -> Result<(), FatalError> {
        let Some(slot) = self.procs.free_slot() else {
            warn!("create process: process table full");
            self.set_result(idx, -1);
            return Ok(());
        };
        let name = match self.read_user_string(idx, name_addr)? {
            NameRead::Name(name) => name,
            NameRead::Retry => return Ok(()),
            NameRead::Invalid => {
                warn!("create process: invalid program name at {}", name_addr);
                self.set_result(idx, -1);
                return Ok(());
            }
        };
        let result = match self.spawn(slot, &name) {
            Ok(pid) => pid as Word,
            Err(e) => {
                warn!("create process {:?}: {}", name, e);
                -1
            }
        };
        self.set_result(idx, result);
        Ok(())
    }

    /// 终止进程，`target` 为 0 时终止调用者自己
    pub(super) fn sys_kill_proc(&mut self, idx: usize, target: Word) {
        let Some(caller) = self.procs.get(idx).map(|p| p.pid) else {
            return;
        };
        let victim = if target == 0 {
            Some(idx)
        } else {
            Pid::try_from(target).ok().and_then(|pid| self.procs.find(pid))
        };
        let Some(victim) = victim.filter(|&v| {
            self.procs
                .get(v)
                .is_some_and(|p| p.status() != ProcessStatus::Terminated)
        }) else {
            self.set_result(idx, -1);
            return;
        };
        self.set_result(idx, 0);
        self.terminate(victim, TerminationCause::Killed { by: caller }, Reap::Deferred);
    }

    /// 等待进程结束
    ///
    /// 目标已结束时立即回收并返回 0，否则阻塞到目标结束。
    pub(super) fn sys_wait_proc(&mut self, idx: usize, target: Word) {
        let Some(caller) = self.procs.get(idx).map(|p| p.pid) else {
            return;
        };
        let found = Pid::try_from(target)
            .ok()
            .filter(|&pid| pid > 0 && pid != caller)
            .and_then(|pid| self.procs.find(pid).map(|t| (pid, t)));
        let Some((pid, t)) = found else {
            self.set_result(idx, -1);
            return;
        };
        if self.procs.get(t).map(|p| p.status()) == Some(ProcessStatus::Terminated) {
            self.collect(t);
            self.set_result(idx, 0);
        } else {
            self.block(idx, BlockReason::WaitPid(pid));
        }
    }

    /// 经 MMU 读取以 0 结尾的程序名
    ///
    /// 字值 1..=255 是字符；其他值或超过 [`MAX_PROGRAM_NAME`] 使名字非法。
    fn read_user_string(&mut self, idx: usize, addr: Word) -> Result<NameRead, FatalError> {
        let Ok(start) = usize::try_from(addr) else {
            return Ok(NameRead::Invalid);
        };
        let Some(table) = self
            .procs
            .get(idx)
            .and_then(|p| p.memory.as_ref())
            .map(|m| m.page_table().clone())
        else {
            return Ok(NameRead::Invalid);
        };
        self.hw.set_page_table(Some(table));

        let mut name = String::new();
        for vaddr in start..start + MAX_PROGRAM_NAME {
            match self.hw.mmu_read(vaddr) {
                Ok(0) => return Ok(NameRead::Name(name)),
                Ok(w @ 1..=255) => name.push(char::from(w as u8)),
                Ok(_) => return Ok(NameRead::Invalid),
                Err(HwError::PageAbsent) => return self.fault_in_name(idx, vaddr),
                Err(_) => return Err(FatalError::StringTranslation { addr: vaddr }),
            }
        }
        Ok(NameRead::Invalid)
    }

    /// 为名字所在页发起换页，并回退 PC 使系统调用重新执行
    fn fault_in_name(&mut self, idx: usize, vaddr: usize) -> Result<NameRead, FatalError> {
        match self.resolve_page_fault(idx, vaddr) {
            Ok(_) => {
                if let Some(pcb) = self.pcb_mut(idx).filter(|p| p.context.pc > 0) {
                    pcb.context.pc -= SYSCALL_INSTRUCTION_LEN;
                }
                Ok(NameRead::Retry)
            }
            Err(VmError::Storage(e)) => Err(FatalError::Paging(e)),
            Err(e) => {
                warn!("program name at {}: {}", vaddr, e);
                Ok(NameRead::Invalid)
            }
        }
    }
}
