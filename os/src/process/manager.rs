//! # 进程表与就绪队列
//!
//! ## 核心组件
//!
//! - [`ProcessManager`] - 定长进程表、pid 分配和就绪队列
//! - [`ReadyQueue`] - 有界 FIFO 队列，只有时间片轮转策略使用
//!
//! 进程表是定长数组，槽位用 [`ProcessStatus::Free`] 标记空闲，所有查找都是
//! 线性扫描。容量很小且固定，扫描顺序也决定了优先级调度的平局规则。
//!
//! ```text
//!  slots: ┌──────┬──────┬──────┬─────┬──────┐
//!         │ pid1 │ pid2 │ free │ ... │ free │   MAX_PROCESSES
//!         └──────┴──────┴──────┴─────┴──────┘
//!  ready: [1, 0]  (槽位下标，队首先出)
//! ```

use std::collections::VecDeque;

use core::fmt;

use super::process::{Pid, ProcessControlBlock, ProcessStatus};

/// 就绪队列已满
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct QueueFull(pub usize);

impl fmt::Display for QueueFull {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ready queue full, slot {} dropped", self.0)
    }
}

impl std::error::Error for QueueFull {}

/// 有界就绪队列，元素是进程表下标
pub struct ReadyQueue {
    queue: VecDeque<usize>,
    capacity: usize,
}

impl ReadyQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// 加入队尾
    pub fn push(&mut self, idx: usize) -> Result<(), QueueFull> {
        if self.queue.len() >= self.capacity {
            return Err(QueueFull(idx));
        }
        self.queue.push_back(idx);
        Ok(())
    }

    pub fn pop(&mut self) -> Option<usize> {
        self.queue.pop_front()
    }

    /// 从队列中删除 `idx` 的全部出现
    pub fn remove(&mut self, idx: usize) {
        self.queue.retain(|&i| i != idx);
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// 进程管理器
pub struct ProcessManager {
    slots: Vec<ProcessControlBlock>,
    pub ready: ReadyQueue,
    next_pid: Pid,
}

impl ProcessManager {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| ProcessControlBlock::empty()).collect(),
            ready: ReadyQueue::new(capacity),
            next_pid: 1,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn slots(&self) -> &[ProcessControlBlock] {
        &self.slots
    }

    pub fn get(&self, idx: usize) -> Option<&ProcessControlBlock> {
        self.slots.get(idx)
    }

    pub fn get_mut(&mut self, idx: usize) -> Option<&mut ProcessControlBlock> {
        self.slots.get_mut(idx)
    }

    /// 下一个将被分配的 pid
    pub fn next_pid(&self) -> Pid {
        self.next_pid
    }

    /// 消耗一个 pid，只在进程创建成功后调用
    pub fn commit_pid(&mut self) -> Pid {
        let pid = self.next_pid;
        self.next_pid += 1;
        pid
    }

    /// 第一个空闲槽位
    pub fn free_slot(&self) -> Option<usize> {
        self.slots.iter().position(ProcessControlBlock::is_free)
    }

    /// 按 pid 查找非空闲槽位
    pub fn find(&self, pid: Pid) -> Option<usize> {
        self.slots
            .iter()
            .position(|p| p.pid == pid && !p.is_free())
    }

    /// 第一个等待 `pid` 结束的进程
    pub fn first_waiter_of(&self, pid: Pid) -> Option<usize> {
        self.slots.iter().position(|p| p.is_waiting_for(pid))
    }

    /// 优先级数值最小的就绪进程，数值相同时下标小者胜出
    pub fn highest_priority_ready(&self) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (idx, pcb) in self.slots.iter().enumerate() {
            if pcb.status() != ProcessStatus::Ready {
                continue;
            }
            if best.is_none_or(|(_, prio)| pcb.priority < prio) {
                best = Some((idx, pcb.priority));
            }
        }
        best.map(|(idx, _)| idx)
    }

    /// 取出队首第一个仍处于就绪状态的进程
    ///
    /// 已经不再就绪的槽位（被杀死或回收）直接丢弃。
    pub fn pop_ready(&mut self) -> Option<usize> {
        while let Some(idx) = self.ready.pop() {
            if self.slots.get(idx).map(|p| p.status()) == Some(ProcessStatus::Ready) {
                return Some(idx);
            }
        }
        None
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProcessControlBlock> {
        self.slots.iter()
    }

    /// 处于 Running 状态的进程数
    pub fn running_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|p| p.status() == ProcessStatus::Running)
            .count()
    }
}
