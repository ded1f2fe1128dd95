//! # 监控程序上下文
//!
//! [`Kernel`] 持有监控程序的全部状态：硬件、进程表、处理器、虚拟内存和
//! 统计。模拟 CPU 每次陷入时调用 [`Kernel::handle_interrupt`]，所有操作
//! 都在这一次调用内同步完成，没有全局变量，也不需要加锁。
//!
//! ## 核心组件
//!
//! - [`Kernel`] - 监控程序上下文，对 [`Hardware`] 泛型
//! - [`Verdict`] - 返回给 CPU 的结论：继续执行或停机等待中断
//! - [`FatalError`] - 使模拟停止的内部错误
//! - [`TerminationCause`] - 进程被终止的原因
//!
//! ## 错误分类
//!
//! | 类别 | 处理 |
//! |------|------|
//! | 进程错误（非法系统调用、非法地址、其他 CPU 错误） | 终止该进程，继续运行 |
//! | 可解决的缺页 | 换页，进程阻塞到换页完成 |
//! | 容量不足（进程表、存储槽、就绪队列） | 系统调用返回 -1 |
//! | 内部错误 | 记录 [`FatalError`]，此后每次中断都返回 [`Verdict::Halt`] |

use core::fmt;

use log::{debug, error, info};

use crate::config::{Config, MAX_PROCESSES, ROOT_PID};
use crate::hal::{CpuFault, Hardware, HwError, Irq, Terminal, Tick, Word};
use crate::metrics::{Metrics, ProcessSummary, Report};
use crate::mm::{FaultResolution, VirtualMemory, VmError};
use crate::process::{
    BlockReason, Pid, ProcessControlBlock, ProcessManager, ProcessStatus, Processor, QueueFull,
};
use crate::trap::CpuContext;

/// 中断处理结束后交给 CPU 的结论
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[repr(i32)]
pub enum Verdict {
    /// 恢复选中进程的执行
    Resume = 0,
    /// 没有可运行的进程，CPU 停机直到下一次中断
    Halt = 1,
}

impl Verdict {
    pub fn as_word(self) -> Word {
        self as Word
    }
}

/// 内部错误，出现后模拟停止
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum FatalError {
    /// 无法从保存区读出寄存器
    ContextSave(HwError),
    /// 无法把寄存器写回保存区
    ContextRestore(HwError),
    UnknownIrq(Word),
    /// 合法但本监控程序不处理的中断
    UnhandledIrq(Irq),
    /// 需要当前进程的中断发生时没有进程在运行
    NoRunningProcess(Irq),
    /// 读取用户字符串时地址转换出错
    StringTranslation { addr: usize },
    /// CPU 报告物理地址非法
    InvalidAddressFault { pid: Pid },
    /// 定时器设备访问失败
    Timer(HwError),
    /// 换页时主存或二级存储访问失败
    Paging(HwError),
    Boot(String),
}

impl fmt::Display for FatalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FatalError::ContextSave(e) => write!(f, "cannot read CPU registers: {}", e),
            FatalError::ContextRestore(e) => write!(f, "cannot write CPU registers: {}", e),
            FatalError::UnknownIrq(irq) => write!(f, "unknown IRQ {}", irq),
            FatalError::UnhandledIrq(irq) => write!(f, "IRQ {} is not handled", irq.name()),
            FatalError::NoRunningProcess(irq) => {
                write!(f, "{} IRQ with no running process", irq.name())
            }
            FatalError::StringTranslation { addr } => {
                write!(f, "translation error reading user string at {}", addr)
            }
            FatalError::InvalidAddressFault { pid } => {
                write!(f, "pid {} raised an invalid physical address", pid)
            }
            FatalError::Timer(e) => write!(f, "timer access failed: {}", e),
            FatalError::Paging(e) => write!(f, "paging failed: {}", e),
            FatalError::Boot(msg) => write!(f, "boot failed: {}", msg),
        }
    }
}

impl std::error::Error for FatalError {}

/// 进程被终止的原因
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum TerminationCause {
    Killed { by: Pid },
    InvalidSyscall(Word),
    CpuFault(CpuFault),
    AccessViolation { addr: Word },
    Device(HwError),
}

impl fmt::Display for TerminationCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationCause::Killed { by } => write!(f, "killed by pid {}", by),
            TerminationCause::InvalidSyscall(id) => write!(f, "invalid system call {}", id),
            TerminationCause::CpuFault(fault) => write!(f, "CPU error: {}", fault),
            TerminationCause::AccessViolation { addr } => {
                write!(f, "invalid virtual address {}", addr)
            }
            TerminationCause::Device(e) => write!(f, "device error: {}", e),
        }
    }
}

/// 终止后何时回收槽位
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub(crate) enum Reap {
    /// 保持 Terminated，直到有进程等待它
    Deferred,
    /// 没有等待者时立即回收
    Immediately,
}

/// 进程创建失败
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum SpawnError {
    /// 进程表中没有这个槽位
    NoSlot(usize),
    ProgramNotFound(String),
    Vm(VmError),
    QueueFull,
}

impl fmt::Display for SpawnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpawnError::NoSlot(idx) => write!(f, "no process slot {}", idx),
            SpawnError::ProgramNotFound(name) => write!(f, "program {:?} not found", name),
            SpawnError::Vm(e) => write!(f, "cannot load program: {}", e),
            SpawnError::QueueFull => f.write_str("ready queue full"),
        }
    }
}

impl std::error::Error for SpawnError {}

impl From<QueueFull> for SpawnError {
    fn from(_: QueueFull) -> Self {
        SpawnError::QueueFull
    }
}

/// 监控程序上下文
pub struct Kernel<H: Hardware> {
    pub(crate) hw: H,
    pub(crate) config: Config,
    pub(crate) procs: ProcessManager,
    pub(crate) cpu: Processor,
    pub(crate) vm: VirtualMemory,
    pub(crate) metrics: Metrics,
    /// CPU 是否处于停机状态，只在状态变化时输出日志
    pub(crate) halted: bool,
    pub(crate) fatal: Option<FatalError>,
    report: Option<Report>,
}

impl<H: Hardware> Kernel<H> {
    /// 创建监控程序，物理内存大小取自 `hw`
    ///
    /// 真正的初始化在收到 [`Irq::Reset`] 时进行。
    pub fn new(mut hw: H, config: Config) -> Self {
        let vm = VirtualMemory::new(
            hw.mem_size(),
            config.page_size,
            config.replacement,
            config.page_transfer_time,
        );
        hw.set_page_table(None);
        info!(
            "supervisor: scheduler {:?}, quantum {}, replacement {:?}",
            config.scheduler, config.quantum, config.replacement
        );
        Self {
            procs: ProcessManager::new(MAX_PROCESSES),
            cpu: Processor::new(config.scheduler, config.quantum),
            vm,
            metrics: Metrics::new(),
            halted: false,
            fatal: None,
            report: None,
            hw,
            config,
        }
    }

    pub fn hw(&self) -> &H {
        &self.hw
    }

    pub fn hw_mut(&mut self) -> &mut H {
        &mut self.hw
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn processes(&self) -> &ProcessManager {
        &self.procs
    }

    pub fn processor(&self) -> &Processor {
        &self.cpu
    }

    pub fn vm(&self) -> &VirtualMemory {
        &self.vm
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// 根进程结束时生成的最终报告
    pub fn report(&self) -> Option<&Report> {
        self.report.as_ref()
    }

    pub fn fatal_error(&self) -> Option<&FatalError> {
        self.fatal.as_ref()
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// 非空闲进程的控制块
    pub fn process(&self, pid: Pid) -> Option<&ProcessControlBlock> {
        self.procs.find(pid).and_then(|idx| self.procs.get(idx))
    }

    pub fn running_pid(&self) -> Option<Pid> {
        self.cpu
            .current()
            .and_then(|idx| self.procs.get(idx))
            .map(|p| p.pid)
    }

    pub(crate) fn now(&self) -> Tick {
        self.hw.instructions()
    }

    /// 记录内部错误，只保留第一个
    pub(crate) fn fail(&mut self, e: FatalError) {
        error!("internal error: {}", e);
        if self.fatal.is_none() {
            self.fatal = Some(e);
        }
    }

    pub(crate) fn pcb_mut(&mut self, idx: usize) -> Option<&mut ProcessControlBlock> {
        self.procs.get_mut(idx)
    }

    /// 设置进程的 A 寄存器（系统调用结果）
    pub(crate) fn set_result(&mut self, idx: usize, value: Word) {
        if let Some(pcb) = self.procs.get_mut(idx) {
            pcb.context.a = value;
        }
    }

    /// 在槽位 `idx` 创建执行 `name` 的进程
    ///
    /// 程序装入二级存储，进程置为就绪；pid 只在成功时消耗。
    pub(crate) fn spawn(&mut self, idx: usize, name: &str) -> Result<Pid, SpawnError> {
        let now = self.now();
        let pid = self.procs.next_pid();
        let Some(pcb) = self.procs.get_mut(idx) else {
            return Err(SpawnError::NoSlot(idx));
        };
        let program = self
            .hw
            .load_program(name)
            .ok_or_else(|| SpawnError::ProgramNotFound(name.to_string()))?;
        let memory = self.vm.load(pid, &program).map_err(SpawnError::Vm)?;
        pcb.reset(pid, Terminal::for_slot(idx), now);
        pcb.context = CpuContext::at_entry(program.load_address);
        pcb.secondary_pages = memory.secondary_pages();
        pcb.memory = Some(memory);

        if let Err(e) = self.cpu.make_ready(&mut self.procs, idx, now) {
            if let Some(pcb) = self.procs.get_mut(idx) {
                self.vm.release(pid, &mut pcb.memory);
                pcb.set_status(ProcessStatus::Free, now);
            }
            return Err(e.into());
        }
        self.procs.commit_pid();
        self.metrics.processes_created += 1;
        info!(
            "pid {} created from {:?} on terminal {:?}",
            pid, name, Terminal::for_slot(idx)
        );
        Ok(pid)
    }

    /// 阻塞进程 `idx`
    pub(crate) fn block(&mut self, idx: usize, reason: BlockReason) {
        let now = self.now();
        if let Some(pcb) = self.procs.get_mut(idx) {
            pcb.block_reason = reason;
            pcb.set_status(ProcessStatus::Blocked, now);
        }
    }

    /// 解除阻塞，进程回到就绪状态
    pub(crate) fn unblock(&mut self, idx: usize) {
        let now = self.now();
        if let Some(pcb) = self.procs.get_mut(idx) {
            pcb.block_reason = BlockReason::None;
        }
        // 队列满时进程保持就绪，由优先级扫描或之后的入队找到
        if let Err(QueueFull(slot)) = self.cpu.make_ready(&mut self.procs, idx, now) {
            debug!("slot {} ready outside the queue", slot);
        }
    }

    /// 为进程 `idx` 处理 `addr` 处的缺页，成功后进程阻塞到换页完成
    pub(crate) fn resolve_page_fault(
        &mut self,
        idx: usize,
        addr: usize,
    ) -> Result<FaultResolution, VmError> {
        let now = self.now();
        let pid = self
            .procs
            .get(idx)
            .map(|p| p.pid)
            .ok_or(VmError::AccessViolation { addr })?;
        let res = self
            .vm
            .resolve_fault(&mut self.hw, self.procs.slots(), pid, addr, now)?;

        info!(
            "pid {} page fault at {}: page {} -> frame {}{}, {} transfer(s), wakes at {}",
            pid,
            addr,
            res.page,
            res.frame,
            res.victim
                .map(|v| format!(
                    " (evicted pid {} page {}{})",
                    v.pid,
                    v.page,
                    if v.written_back { ", written back" } else { "" }
                ))
                .unwrap_or_default(),
            res.transfers,
            res.wake_at
        );

        if let Some(pcb) = self.procs.get_mut(idx) {
            pcb.context.error = CpuFault::None.code();
            pcb.page_faults += 1;
        }
        self.block(idx, BlockReason::WaitPage { wake_at: res.wake_at });
        self.metrics.page_faults += 1;
        self.metrics.page_transfers += u64::from(res.transfers);
        Ok(res)
    }

    /// 终止进程 `idx`
    ///
    /// 释放虚拟内存资源，唤醒第一个等待它的进程并由此回收槽位。
    /// 根进程结束时输出最终报告。
    pub(crate) fn terminate(&mut self, idx: usize, cause: TerminationCause, reap: Reap) {
        let now = self.now();
        let Some(pcb) = self.procs.get_mut(idx) else {
            return;
        };
        if matches!(pcb.status(), ProcessStatus::Free | ProcessStatus::Terminated) {
            return;
        }
        let pid = pcb.pid;
        info!("pid {} terminated: {}", pid, cause);
        pcb.set_status(ProcessStatus::Terminated, now);
        self.vm.release(pid, &mut pcb.memory);
        self.procs.ready.remove(idx);

        if let Some(waiter) = self.procs.first_waiter_of(pid) {
            self.set_result(waiter, 0);
            self.unblock(waiter);
            self.collect(idx);
        } else if reap == Reap::Immediately {
            self.collect(idx);
        }
        if pid == ROOT_PID {
            self.emit_report();
        }
    }

    /// 回收槽位：保存统计快照，槽位变为 Free
    pub(crate) fn collect(&mut self, idx: usize) {
        let now = self.now();
        let Some(pcb) = self.procs.get_mut(idx) else {
            return;
        };
        if pcb.is_free() {
            return;
        }
        let pid = pcb.pid;
        self.vm.release(pid, &mut pcb.memory);
        self.metrics
            .record_finished(ProcessSummary::capture(pcb, now));
        pcb.set_status(ProcessStatus::Free, now);
        self.procs.ready.remove(idx);
    }

    fn emit_report(&mut self) {
        let report = self.metrics.report(self.now(), self.procs.iter());
        for line in report.to_string().lines() {
            info!("{}", line);
        }
        self.report = Some(report);
    }
}
