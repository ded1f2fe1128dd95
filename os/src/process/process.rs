//! # 进程控制块
//!
//! 进程表中每个槽位是一个 [`ProcessControlBlock`]。槽位在进程结束并被
//! 回收后重新变为 [`ProcessStatus::Free`]，可以被下一次创建复用。
//!
//! ## 核心组件
//!
//! - [`ProcessControlBlock`] - 寄存器映像、阻塞原因、优先级、地址空间和统计
//! - [`ProcessStatus`] - 五种进程状态
//! - [`BlockReason`] - 阻塞原因，决定待处理扫描如何唤醒进程
//!
//! ## 状态转换
//!
//! ```text
//!  Free ──create──► Ready ──dispatch──► Running
//!                     ▲                   │ │
//!                     │  quantum expiry   │ │ blocking syscall / page fault
//!                     ├───────────────────┘ ▼
//!                     └──condition met── Blocked
//!
//!  Running/Blocked ──kill / fatal error──► Terminated ──collected──► Free
//! ```
//!
//! 所有转换都经过 [`ProcessControlBlock::set_status`]，它负责结算上一个
//! 状态停留的时间，保证每个状态的累计时间和进入次数一致。

use crate::config::INITIAL_PRIORITY;
use crate::hal::{Terminal, Tick};
use crate::mm::MemorySet;
use crate::trap::CpuContext;

/// 进程标识符，从 1 开始单调分配
pub type Pid = u32;

/// 进程状态
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ProcessStatus {
    /// 槽位空闲
    Free,
    /// 等待调度
    Ready,
    /// 正在 CPU 上执行，任何时刻至多一个
    Running,
    /// 等待 [`BlockReason`] 描述的条件
    Blocked,
    /// 已结束，等待回收
    Terminated,
}

/// 状态种类数
pub const STATUS_COUNT: usize = 5;

impl ProcessStatus {
    pub const ALL: [ProcessStatus; STATUS_COUNT] = [
        ProcessStatus::Free,
        ProcessStatus::Ready,
        ProcessStatus::Running,
        ProcessStatus::Blocked,
        ProcessStatus::Terminated,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            ProcessStatus::Free => "free",
            ProcessStatus::Ready => "ready",
            ProcessStatus::Running => "running",
            ProcessStatus::Blocked => "blocked",
            ProcessStatus::Terminated => "terminated",
        }
    }
}

/// 阻塞原因
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum BlockReason {
    None,
    /// 等待该 pid 结束
    WaitPid(Pid),
    /// 等待终端键盘有数据
    WaitRead(Terminal),
    /// 等待终端屏幕可写
    WaitWrite(Terminal),
    /// 等待换页完成
    WaitPage { wake_at: Tick },
}

/// 进程控制块
pub struct ProcessControlBlock {
    pub pid: Pid,
    status: ProcessStatus,
    /// 最近一次中断时保存的寄存器映像
    pub context: CpuContext,
    pub terminal: Terminal,
    pub block_reason: BlockReason,
    /// 动态优先级，数值越小越优先
    pub priority: f64,

    pub created_at: Tick,
    pub terminated_at: Option<Tick>,
    pub preemptions: u32,
    /// 各状态的进入次数
    pub visits: [u32; STATUS_COUNT],
    /// 各状态的累计停留时间
    pub time_in: [Tick; STATUS_COUNT],
    last_change: Tick,
    ready_since: Tick,
    /// 累计就绪等待时间，除以运行次数即平均响应时间
    pub ready_time: Tick,

    /// 地址空间，空闲槽位为 `None`
    pub memory: Option<MemorySet>,
    pub page_faults: u32,
    /// 装入时占用的二级存储页数，资源释放后保留用于报告
    pub secondary_pages: usize,
}

impl ProcessControlBlock {
    /// 空闲槽位
    pub fn empty() -> Self {
        Self {
            pid: 0,
            status: ProcessStatus::Free,
            context: CpuContext::default(),
            terminal: Terminal::A,
            block_reason: BlockReason::None,
            priority: INITIAL_PRIORITY,
            created_at: 0,
            terminated_at: None,
            preemptions: 0,
            visits: [0; STATUS_COUNT],
            time_in: [0; STATUS_COUNT],
            last_change: 0,
            ready_since: 0,
            ready_time: 0,
            memory: None,
            page_faults: 0,
            secondary_pages: 0,
        }
    }

    /// 为新进程重置槽位，状态仍为 `Free`
    pub fn reset(&mut self, pid: Pid, terminal: Terminal, now: Tick) {
        *self = Self {
            pid,
            terminal,
            created_at: now,
            last_change: now,
            ..Self::empty()
        };
    }

    pub fn status(&self) -> ProcessStatus {
        self.status
    }

    pub fn is_free(&self) -> bool {
        self.status == ProcessStatus::Free
    }

    /// 状态转换
    ///
    /// 1. 结算离开的状态的停留时间
    /// 2. 进入的状态计数加一
    /// 3. 进入 Ready 时记录时刻；从 Ready 进入 Running 时累计等待时间
    /// 4. 从非 Free 状态进入 Terminated 或 Free 时记录结束时刻（只记一次）
    ///
    /// 转换到相同状态不做任何事。
    pub fn set_status(&mut self, new: ProcessStatus, now: Tick) {
        let old = self.status;
        if old == new {
            return;
        }
        let elapsed = now.saturating_sub(self.last_change);
        if elapsed > 0 {
            self.time_in[old.index()] += elapsed;
        }
        self.status = new;
        self.visits[new.index()] += 1;
        self.last_change = now;

        if new == ProcessStatus::Ready {
            self.ready_since = now;
        } else if old == ProcessStatus::Ready && new == ProcessStatus::Running {
            self.ready_time += now.saturating_sub(self.ready_since);
        }

        if matches!(new, ProcessStatus::Terminated | ProcessStatus::Free)
            && old != ProcessStatus::Free
            && self.terminated_at.is_none()
        {
            self.terminated_at = Some(now);
        }
    }

    /// 当前状态已停留的时间
    pub fn time_in_current(&self, now: Tick) -> Tick {
        now.saturating_sub(self.last_change)
    }

    /// 根据本次运行用掉的时间片比例更新优先级
    ///
    /// `priority = (priority + used) / 2`，`used = (total - remaining) / total`。
    pub fn recompute_priority(&mut self, quantum_total: u32, quantum_remaining: u32) {
        let total = quantum_total.max(1) as f64;
        let used = (quantum_total as f64 - quantum_remaining as f64).max(0.0) / total;
        self.priority = (self.priority + used) / 2.0;
    }

    /// 是否在等待 `pid` 结束
    pub fn is_waiting_for(&self, pid: Pid) -> bool {
        self.status == ProcessStatus::Blocked && self.block_reason == BlockReason::WaitPid(pid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh(now: Tick) -> ProcessControlBlock {
        let mut pcb = ProcessControlBlock::empty();
        pcb.reset(1, Terminal::A, now);
        pcb
    }

    #[test]
    fn same_status_is_a_no_op() {
        let mut pcb = fresh(0);
        pcb.set_status(ProcessStatus::Ready, 5);
        pcb.set_status(ProcessStatus::Ready, 9);
        assert_eq!(pcb.visits[ProcessStatus::Ready.index()], 1);
        assert_eq!(pcb.time_in_current(9), 4);
    }

    #[test]
    fn time_is_charged_to_outgoing_state() {
        let mut pcb = fresh(0);
        pcb.set_status(ProcessStatus::Ready, 10);
        pcb.set_status(ProcessStatus::Running, 25);
        pcb.set_status(ProcessStatus::Blocked, 40);
        assert_eq!(pcb.time_in[ProcessStatus::Free.index()], 10);
        assert_eq!(pcb.time_in[ProcessStatus::Ready.index()], 15);
        assert_eq!(pcb.time_in[ProcessStatus::Running.index()], 15);
        assert_eq!(pcb.ready_time, 15);
        assert_eq!(pcb.visits[ProcessStatus::Running.index()], 1);
    }

    #[test]
    fn ready_time_only_counts_ready_to_running() {
        let mut pcb = fresh(0);
        pcb.set_status(ProcessStatus::Ready, 0);
        pcb.set_status(ProcessStatus::Blocked, 20);
        pcb.set_status(ProcessStatus::Running, 30);
        assert_eq!(pcb.ready_time, 0);
    }

    #[test]
    fn termination_is_stamped_once() {
        let mut pcb = fresh(0);
        pcb.set_status(ProcessStatus::Ready, 1);
        pcb.set_status(ProcessStatus::Terminated, 50);
        pcb.set_status(ProcessStatus::Free, 80);
        assert_eq!(pcb.terminated_at, Some(50));
    }

    #[test]
    fn free_slot_recycled_from_free_is_not_stamped() {
        let mut pcb = fresh(0);
        pcb.set_status(ProcessStatus::Free, 10);
        assert_eq!(pcb.terminated_at, None);
    }

    #[test]
    fn unused_quantum_halves_priority() {
        let mut pcb = fresh(0);
        pcb.recompute_priority(3, 3);
        assert_eq!(pcb.priority, 0.25);
        pcb.recompute_priority(3, 0);
        assert_eq!(pcb.priority, 0.625);
    }
}
