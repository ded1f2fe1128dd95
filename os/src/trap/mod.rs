//! # 中断处理模块
//!
//! 模拟 CPU 的唯一入口。每次中断按固定顺序处理：
//!
//! ```text
//!  CPU 中断 (irq)
//!       │
//!       ▼
//!  保存寄存器映像到当前进程 PCB（没有当前进程时跳过）
//!       │
//!       ▼
//!  按中断类型分发 ──► Reset / CpuError / SystemCall / Clock
//!       │
//!       ▼
//!  扫描阻塞进程，条件满足的转为就绪
//!       │
//!       ▼
//!  调度
//!       │
//!       ▼
//!  恢复选中进程的寄存器映像和页表 ──► Resume
//!  没有进程可运行 ──────────────────► Halt
//! ```
//!
//! 阻塞进程的唤醒只在扫描中进行，处理程序本身只记录阻塞原因。因此
//! 同一次中断里刚被唤醒的进程可以立即参与调度。

mod context;

use log::{debug, info, warn};

pub use context::CpuContext;

use crate::config::TRAP_HANDLER_ADDR;
use crate::hal::{CpuFault, Device, Hardware, Irq, Word};
use crate::kernel::{FatalError, Kernel, Reap, TerminationCause, Verdict};
use crate::mm::VmError;
use crate::process::{BlockReason, ProcessStatus};

impl<H: Hardware> Kernel<H> {
    /// 处理一次中断，返回 CPU 接下来应当执行还是停机
    ///
    /// 内部错误发生后，本次及以后的每次中断都返回 [`Verdict::Halt`]。
    pub fn handle_interrupt(&mut self, irq: Word) -> Verdict {
        if self.fatal.is_some() {
            return Verdict::Halt;
        }
        match self.dispatch_interrupt(irq) {
            Ok(verdict) => verdict,
            Err(e) => {
                self.fail(e);
                Verdict::Halt
            }
        }
    }

    /// [`Kernel::handle_interrupt`] 的类型化版本
    pub fn interrupt(&mut self, irq: Irq) -> Verdict {
        self.handle_interrupt(irq as Word)
    }

    fn dispatch_interrupt(&mut self, raw: Word) -> Result<Verdict, FatalError> {
        let irq = Irq::try_from(raw).map_err(FatalError::UnknownIrq)?;
        if !(irq == Irq::Clock && self.halted) {
            debug!("IRQ {} ({})", raw, irq.name());
        }
        self.metrics.count_irq(irq);
        self.save_context()?;

        match irq {
            Irq::Reset => self.handle_reset()?,
            Irq::CpuError => self.handle_cpu_error()?,
            Irq::SystemCall => self.handle_syscall()?,
            Irq::Clock => self.handle_clock()?,
            Irq::Keyboard | Irq::Screen => return Err(FatalError::UnhandledIrq(irq)),
        }

        self.resolve_pending();
        let now = self.now();
        self.cpu.schedule(&mut self.procs, &mut self.metrics, now);
        self.restore_context()
    }

    /// CPU 保存区 -> 当前进程 PCB
    fn save_context(&mut self) -> Result<(), FatalError> {
        let Some(idx) = self.cpu.current() else {
            return Ok(());
        };
        let cx = CpuContext::load(&self.hw).map_err(FatalError::ContextSave)?;
        if let Some(pcb) = self.procs.get_mut(idx) {
            pcb.context = cx;
        }
        Ok(())
    }

    /// 选中进程 PCB -> CPU 保存区，并安装它的页表
    fn restore_context(&mut self) -> Result<Verdict, FatalError> {
        let chosen = self
            .cpu
            .current()
            .and_then(|idx| self.procs.get(idx))
            .map(|pcb| {
                let table = pcb.memory.as_ref().map(|m| m.page_table().clone());
                (pcb.pid, pcb.context, table)
            });
        match chosen {
            Some((pid, cx, table)) => {
                cx.store(&mut self.hw).map_err(FatalError::ContextRestore)?;
                self.hw.set_page_table(table);
                if self.halted {
                    debug!("pid {} resumes, CPU running", pid);
                    self.halted = false;
                }
                Ok(Verdict::Resume)
            }
            None => {
                self.hw.set_page_table(None);
                if !self.halted {
                    info!("no process ready, CPU halted");
                    self.halted = true;
                }
                Ok(Verdict::Halt)
            }
        }
    }

    /// 启动：装入中断处理程序，设置定时器，创建 init 进程
    fn handle_reset(&mut self) -> Result<(), FatalError> {
        if self.procs.get(0).is_some_and(|p| !p.is_free()) {
            return Err(FatalError::Boot("reset after boot".to_string()));
        }

        let name = self.config.trap_handler_program.clone();
        let handler = self
            .hw
            .load_program(&name)
            .ok_or_else(|| FatalError::Boot(format!("trap handler {:?} not found", name)))?;
        if handler.load_address != TRAP_HANDLER_ADDR {
            return Err(FatalError::Boot(format!(
                "trap handler loaded at {}, expected {}",
                handler.load_address, TRAP_HANDLER_ADDR
            )));
        }
        for (offset, word) in handler.words.iter().enumerate() {
            self.hw
                .mem_write(handler.load_address + offset, *word)
                .map_err(|e| FatalError::Boot(format!("cannot store trap handler: {}", e)))?;
        }

        self.hw
            .io_write(Device::Timer, self.config.timer_interval)
            .map_err(FatalError::Timer)?;

        let init = self.config.init_program.clone();
        self.spawn(0, &init)
            .map_err(|e| FatalError::Boot(format!("cannot create init process: {}", e)))?;
        Ok(())
    }

    fn handle_cpu_error(&mut self) -> Result<(), FatalError> {
        let idx = self
            .cpu
            .current()
            .ok_or(FatalError::NoRunningProcess(Irq::CpuError))?;
        let Some((pid, cx)) = self.procs.get(idx).map(|p| (p.pid, p.context)) else {
            return Err(FatalError::NoRunningProcess(Irq::CpuError));
        };

        match cx.fault() {
            CpuFault::PageAbsent => {
                let Ok(addr) = usize::try_from(cx.complement) else {
                    self.terminate(
                        idx,
                        TerminationCause::AccessViolation { addr: cx.complement },
                        Reap::Immediately,
                    );
                    return Ok(());
                };
                match self.resolve_page_fault(idx, addr) {
                    Ok(_) => {}
                    Err(VmError::Storage(e)) => return Err(FatalError::Paging(e)),
                    Err(e) => {
                        warn!("pid {} page fault at {} not resolved: {}", pid, addr, e);
                        self.terminate(
                            idx,
                            TerminationCause::AccessViolation { addr: cx.complement },
                            Reap::Immediately,
                        );
                    }
                }
            }
            CpuFault::InvalidAddress => {
                self.terminate(
                    idx,
                    TerminationCause::CpuFault(CpuFault::InvalidAddress),
                    Reap::Immediately,
                );
                return Err(FatalError::InvalidAddressFault { pid });
            }
            fault => self.terminate(idx, TerminationCause::CpuFault(fault), Reap::Immediately),
        }
        Ok(())
    }

    fn handle_clock(&mut self) -> Result<(), FatalError> {
        self.hw
            .io_write(Device::TimerInterrupt, 0)
            .map_err(FatalError::Timer)?;
        self.hw
            .io_write(Device::Timer, self.config.timer_interval)
            .map_err(FatalError::Timer)?;
        self.cpu.tick();
        self.vm.age(self.procs.slots());
        Ok(())
    }

    /// 扫描全部阻塞进程，唤醒条件已满足的
    fn resolve_pending(&mut self) {
        let now = self.now();
        for idx in 0..self.procs.capacity() {
            let Some(reason) = self
                .procs
                .get(idx)
                .filter(|p| p.status() == ProcessStatus::Blocked)
                .map(|p| p.block_reason)
            else {
                continue;
            };
            let done = match reason {
                BlockReason::WaitRead(term) => self.try_read(idx, term),
                BlockReason::WaitWrite(term) => self.try_write(idx, term),
                BlockReason::WaitPage { wake_at } => Ok(now >= wake_at),
                BlockReason::WaitPid(_) | BlockReason::None => Ok(false),
            };
            match done {
                Ok(true) => self.unblock(idx),
                Ok(false) => {}
                Err(e) => self.terminate(idx, TerminationCause::Device(e), Reap::Immediately),
            }
        }
    }
}
