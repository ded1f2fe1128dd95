//! # 页帧与二级存储槽分配器
//!
//! 纯记账模块：记录每个物理页帧和每个二级存储槽被谁占用，不做任何
//! 策略决定。置换策略见 [`replacement`](super::replacement)，
//! 数据搬运见 [`vmm`](super::vmm)。
//!
//! ## 核心组件
//!
//! - [`FrameTable`] - 物理页帧表，定长数组，线性扫描
//! - [`SlotTable`] - 二级存储槽表，每槽恰好一页
//!
//! ## 页帧状态
//!
//! ```text
//!            occupy                 release / evict
//!   Free ────────────► Owned{pid,page} ─────────────► Free
//!
//!   Reserved   (CPU 保护区，永不分配、永不置换)
//! ```

use crate::process::Pid;

/// 老化计数器的最高位，页被访问或刚装入时置位
pub const AGE_MSB: u64 = 1 << 63;

/// 页帧占用状态
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum FrameState {
    Free,
    /// 与 CPU 保护区重叠，不参与分配
    Reserved,
    Owned { pid: Pid, page: usize },
}

/// 物理页帧
#[derive(Copy, Clone, Debug)]
pub struct Frame {
    pub state: FrameState,
    /// FIFO 置换使用的装入序号
    pub fifo_stamp: u64,
    /// 老化计数器
    pub age: u64,
}

impl Frame {
    fn free() -> Self {
        Self {
            state: FrameState::Free,
            fifo_stamp: 0,
            age: 0,
        }
    }

    pub fn is_free(&self) -> bool {
        self.state == FrameState::Free
    }

    /// 占用者，空闲或保留页帧返回 `None`
    pub fn owner(&self) -> Option<(Pid, usize)> {
        match self.state {
            FrameState::Owned { pid, page } => Some((pid, page)),
            _ => None,
        }
    }
}

/// 物理页帧表
pub struct FrameTable {
    frames: Vec<Frame>,
}

impl FrameTable {
    pub fn new(count: usize) -> Self {
        Self {
            frames: vec![Frame::free(); count],
        }
    }

    /// 保留覆盖 `[0, protected_end]` 的页帧，返回保留的数量
    pub fn reserve_protected(&mut self, protected_end: usize, page_size: usize) -> usize {
        let count = (protected_end / page_size + 1).min(self.frames.len());
        for frame in &mut self.frames[..count] {
            frame.state = FrameState::Reserved;
        }
        count
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&Frame> {
        self.frames.get(idx)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Frame> {
        self.frames.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Frame> {
        self.frames.iter_mut()
    }

    /// 第一个空闲页帧
    pub fn find_free(&self) -> Option<usize> {
        self.frames.iter().position(Frame::is_free)
    }

    pub fn free_count(&self) -> usize {
        self.frames.iter().filter(|f| f.is_free()).count()
    }

    /// 把页帧交给 `(pid, page)`，刚装入的页视为最近被访问
    pub fn occupy(&mut self, idx: usize, pid: Pid, page: usize, stamp: u64) {
        if let Some(frame) = self.frames.get_mut(idx) {
            frame.state = FrameState::Owned { pid, page };
            frame.fifo_stamp = stamp;
            frame.age = AGE_MSB;
        }
    }

    /// 释放页帧；保留页帧不受影响
    pub fn release(&mut self, idx: usize) {
        if let Some(frame) = self.frames.get_mut(idx) {
            if frame.state != FrameState::Reserved {
                *frame = Frame::free();
            }
        }
    }

    /// 释放 `pid` 占用的全部页帧，返回释放的数量
    pub fn release_owned_by(&mut self, pid: Pid) -> usize {
        let mut released = 0;
        for frame in &mut self.frames {
            if matches!(frame.state, FrameState::Owned { pid: owner, .. } if owner == pid) {
                *frame = Frame::free();
                released += 1;
            }
        }
        released
    }

    /// 当前存放 `(pid, page)` 的页帧
    pub fn frame_of(&self, pid: Pid, page: usize) -> Option<usize> {
        self.frames
            .iter()
            .position(|f| f.state == FrameState::Owned { pid, page })
    }
}

/// 二级存储槽的占用者
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct SlotOwner {
    pub pid: Pid,
    pub page: usize,
}

/// 二级存储槽表
///
/// 槽 `i` 占据二级存储 `[i × page_size, (i + 1) × page_size)`，槽之间互不重叠。
pub struct SlotTable {
    slots: Vec<Option<SlotOwner>>,
    page_size: usize,
}

impl SlotTable {
    pub fn new(count: usize, page_size: usize) -> Self {
        Self {
            slots: vec![None; count],
            page_size,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// 槽在二级存储中的起始偏移
    pub fn base_of(&self, slot: usize) -> usize {
        slot * self.page_size
    }

    pub fn owner(&self, slot: usize) -> Option<SlotOwner> {
        self.slots.get(slot).copied().flatten()
    }

    pub fn free_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_none()).count()
    }

    /// 为 `(pid, page)` 分配第一个空闲槽
    pub fn alloc(&mut self, pid: Pid, page: usize) -> Option<usize> {
        let idx = self.slots.iter().position(Option::is_none)?;
        self.slots[idx] = Some(SlotOwner { pid, page });
        Some(idx)
    }

    /// 释放 `pid` 占用的全部槽，返回释放的数量
    pub fn release_owned_by(&mut self, pid: Pid) -> usize {
        let mut released = 0;
        for slot in &mut self.slots {
            if slot.is_some_and(|owner| owner.pid == pid) {
                *slot = None;
                released += 1;
            }
        }
        released
    }
}
