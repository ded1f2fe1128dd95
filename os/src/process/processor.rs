//! # 处理器与调度器
//!
//! [`Processor`] 记录当前占用 CPU 的进程、时间片余量和抢占标志，并在每次
//! 中断的末尾选出下一个运行的进程。两种策略在启动时选定：
//!
//! ## 时间片轮转
//!
//! ```text
//!  preempt? ──是──► 抢占计数 +1，Running → Ready，加入队尾
//!     │否
//!  仍在运行？ ──是──► 继续运行
//!     │否
//!  队首出队 ──空──► 空闲计时
//!     │
//!     └──► Ready → Running，时间片重置
//! ```
//!
//! ## 动态优先级
//!
//! 运行中的进程阻塞或结束时、或时间片用完被抢占时，按
//! `priority = (priority + used) / 2` 更新优先级。选择时扫描整个进程表，
//! 取优先级数值最小的就绪进程，数值相同时下标小者胜出。这个平局规则
//! 只是扫描顺序的结果。
//!
//! ## 空闲计时
//!
//! 没有可运行进程时开始空闲计时，选中进程时结算，见
//! [`Metrics::enter_idle`] / [`Metrics::leave_idle`]。

use log::{debug, warn};

use super::manager::{ProcessManager, QueueFull};
use super::process::ProcessStatus;
use crate::config::SchedulerKind;
use crate::hal::Tick;
use crate::metrics::Metrics;

/// 处理器状态
pub struct Processor {
    policy: SchedulerKind,
    /// 正在运行的进程下标，其状态必为 Running
    current: Option<usize>,
    quantum: u32,
    quantum_left: u32,
    preempt_pending: bool,
}

impl Processor {
    pub fn new(policy: SchedulerKind, quantum: u32) -> Self {
        let quantum = quantum.max(1);
        Self {
            policy,
            current: None,
            quantum,
            quantum_left: quantum,
            preempt_pending: false,
        }
    }

    pub fn policy(&self) -> SchedulerKind {
        self.policy
    }

    pub fn current(&self) -> Option<usize> {
        self.current
    }

    pub fn quantum(&self) -> u32 {
        self.quantum
    }

    pub fn quantum_left(&self) -> u32 {
        self.quantum_left
    }

    pub fn preempt_pending(&self) -> bool {
        self.preempt_pending
    }

    /// 时钟中断：当前进程的时间片减一，用完时请求抢占
    pub fn tick(&mut self) {
        if self.current.is_some() {
            self.quantum_left = self.quantum_left.saturating_sub(1);
            if self.quantum_left == 0 {
                self.preempt_pending = true;
            }
        }
    }

    /// 把进程 `idx` 置为就绪
    ///
    /// 时间片轮转策略下同时加入就绪队列；队列满时进程保持就绪但不会被
    /// 队列选中，返回 [`QueueFull`]。
    pub fn make_ready(
        &self,
        procs: &mut ProcessManager,
        idx: usize,
        now: Tick,
    ) -> Result<(), QueueFull> {
        if let Some(pcb) = procs.get_mut(idx) {
            pcb.set_status(ProcessStatus::Ready, now);
        }
        if self.policy == SchedulerKind::RoundRobin {
            procs.ready.push(idx).inspect_err(|e| warn!("{}", e))?;
        }
        Ok(())
    }

    /// 调度
    pub fn schedule(&mut self, procs: &mut ProcessManager, metrics: &mut Metrics, now: Tick) {
        match self.policy {
            SchedulerKind::RoundRobin => self.schedule_round_robin(procs, metrics, now),
            SchedulerKind::Priority => self.schedule_priority(procs, metrics, now),
        }
    }

    fn schedule_round_robin(
        &mut self,
        procs: &mut ProcessManager,
        metrics: &mut Metrics,
        now: Tick,
    ) {
        if let Some(idx) = self.current {
            let running = procs.get(idx).map(|p| p.status()) == Some(ProcessStatus::Running);
            if running && self.preempt_pending {
                self.preempt(procs, metrics, idx, now);
                // 队列满时进程只是失去 CPU，仍然保持就绪
                let _ = procs.ready.push(idx).inspect_err(|e| warn!("{}", e));
                self.current = None;
            } else if !running {
                self.current = None;
            }
        }
        self.preempt_pending = false;
        if self.current.is_some() {
            return;
        }
        match procs.pop_ready() {
            Some(idx) => self.promote(procs, metrics, idx, now),
            None => metrics.enter_idle(now),
        }
    }

    fn schedule_priority(&mut self, procs: &mut ProcessManager, metrics: &mut Metrics, now: Tick) {
        if let Some(idx) = self.current {
            let status = procs.get(idx).map(|p| p.status());
            match status {
                Some(ProcessStatus::Running) => {
                    if self.preempt_pending {
                        if let Some(pcb) = procs.get_mut(idx) {
                            pcb.recompute_priority(self.quantum, self.quantum_left);
                        }
                        self.preempt(procs, metrics, idx, now);
                        self.current = None;
                    }
                }
                Some(ProcessStatus::Blocked) | Some(ProcessStatus::Terminated) => {
                    if let Some(pcb) = procs.get_mut(idx) {
                        pcb.recompute_priority(self.quantum, self.quantum_left);
                    }
                    self.current = None;
                }
                _ => self.current = None,
            }
        }
        self.preempt_pending = false;
        if self.current.is_some() {
            return;
        }
        match procs.highest_priority_ready() {
            Some(idx) => self.promote(procs, metrics, idx, now),
            None => metrics.enter_idle(now),
        }
    }

    fn preempt(&mut self, procs: &mut ProcessManager, metrics: &mut Metrics, idx: usize, now: Tick) {
        if let Some(pcb) = procs.get_mut(idx) {
            pcb.preemptions += 1;
            pcb.set_status(ProcessStatus::Ready, now);
            debug!("pid {} preempted, priority {:.3}", pcb.pid, pcb.priority);
        }
        metrics.preemptions += 1;
    }

    fn promote(&mut self, procs: &mut ProcessManager, metrics: &mut Metrics, idx: usize, now: Tick) {
        metrics.leave_idle(now);
        if let Some(pcb) = procs.get_mut(idx) {
            pcb.set_status(ProcessStatus::Running, now);
            debug!("dispatching pid {}", pcb.pid);
        }
        self.current = Some(idx);
        self.quantum_left = self.quantum;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::Terminal;

    fn setup(policy: SchedulerKind, n: usize) -> (Processor, ProcessManager, Metrics) {
        let cpu = Processor::new(policy, 3);
        let mut procs = ProcessManager::new(4);
        for idx in 0..n {
            let pid = procs.commit_pid();
            procs.get_mut(idx).unwrap().reset(pid, Terminal::for_slot(idx), 0);
            cpu.make_ready(&mut procs, idx, 0).unwrap();
        }
        (cpu, procs, Metrics::new())
    }

    fn running_pid(cpu: &Processor, procs: &ProcessManager) -> Option<u32> {
        cpu.current().and_then(|i| procs.get(i)).map(|p| p.pid)
    }

    #[test]
    fn round_robin_rotates_on_quantum_expiry() {
        let (mut cpu, mut procs, mut metrics) = setup(SchedulerKind::RoundRobin, 2);
        cpu.schedule(&mut procs, &mut metrics, 0);
        assert_eq!(running_pid(&cpu, &procs), Some(1));
        let mut order = vec![];
        for t in 1..=9 {
            cpu.tick();
            cpu.schedule(&mut procs, &mut metrics, t);
            order.push(running_pid(&cpu, &procs).unwrap());
        }
        assert_eq!(order, [1, 1, 2, 2, 2, 1, 1, 1, 2]);
        assert_eq!(metrics.preemptions, 3);
        assert_eq!(procs.running_count(), 1);
    }

    #[test]
    fn round_robin_single_process_is_preempted_back_onto_cpu() {
        let (mut cpu, mut procs, mut metrics) = setup(SchedulerKind::RoundRobin, 1);
        cpu.schedule(&mut procs, &mut metrics, 0);
        for t in 1..=3 {
            cpu.tick();
            cpu.schedule(&mut procs, &mut metrics, t);
        }
        assert_eq!(running_pid(&cpu, &procs), Some(1));
        assert_eq!(procs.get(0).unwrap().preemptions, 1);
    }

    #[test]
    fn blocked_process_gives_up_cpu_and_idle_is_accounted() {
        let (mut cpu, mut procs, mut metrics) = setup(SchedulerKind::RoundRobin, 1);
        cpu.schedule(&mut procs, &mut metrics, 0);
        procs.get_mut(0).unwrap().set_status(ProcessStatus::Blocked, 10);
        cpu.schedule(&mut procs, &mut metrics, 10);
        assert_eq!(cpu.current(), None);
        cpu.make_ready(&mut procs, 0, 40).unwrap();
        cpu.schedule(&mut procs, &mut metrics, 40);
        assert_eq!(running_pid(&cpu, &procs), Some(1));
        assert_eq!(metrics.idle_time, 30);
    }

    #[test]
    fn priority_never_uses_the_queue() {
        let (_, procs, _) = setup(SchedulerKind::Priority, 3);
        assert!(procs.ready.is_empty());
    }

    #[test]
    fn priority_blocked_immediately_uses_no_quantum() {
        let (mut cpu, mut procs, mut metrics) = setup(SchedulerKind::Priority, 2);
        cpu.schedule(&mut procs, &mut metrics, 0);
        assert_eq!(running_pid(&cpu, &procs), Some(1));
        procs.get_mut(0).unwrap().set_status(ProcessStatus::Blocked, 1);
        cpu.schedule(&mut procs, &mut metrics, 1);
        assert_eq!(procs.get(0).unwrap().priority, 0.25);
        assert_eq!(running_pid(&cpu, &procs), Some(2));
    }

    #[test]
    fn priority_preemption_penalizes_cpu_bound() {
        let (mut cpu, mut procs, mut metrics) = setup(SchedulerKind::Priority, 2);
        cpu.schedule(&mut procs, &mut metrics, 0);
        for t in 1..=3 {
            cpu.tick();
            cpu.schedule(&mut procs, &mut metrics, t);
        }
        // pid 1 用完整个时间片：(0.5 + 1) / 2
        assert_eq!(procs.get(0).unwrap().priority, 0.75);
        assert_eq!(procs.get(0).unwrap().preemptions, 1);
        assert_eq!(running_pid(&cpu, &procs), Some(2));
    }

    #[test]
    fn priority_keeps_the_running_process_without_preemption() {
        let (mut cpu, mut procs, mut metrics) = setup(SchedulerKind::Priority, 2);
        cpu.schedule(&mut procs, &mut metrics, 0);
        procs.get_mut(1).unwrap().priority = 0.0;
        cpu.tick();
        cpu.schedule(&mut procs, &mut metrics, 1);
        assert_eq!(running_pid(&cpu, &procs), Some(1));
    }
}
