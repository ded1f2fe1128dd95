//! # 虚拟内存管理器
//!
//! 纯请求分页：装入程序时只把映像复制到二级存储，页在第一次被访问、
//! CPU 报告缺页时才调入主存。
//!
//! ## 缺页处理流程
//!
//! ```text
//! fault(addr) ──► 地址在 [base, base + pages × page_size) 内？ ──否──► AccessViolation
//!                    │是
//!                    ▼
//!             有空闲页帧？ ──否──► 选择牺牲页帧 ──► 修改位置位则写回 (+1 次传输)
//!                    │是                              │
//!                    ▼                                ▼
//!             从存储槽读入页 (1 次传输) ◄──── 使牺牲页的页表项失效
//!                    │
//!                    ▼
//!             建立映射，计算唤醒时间
//! ```
//!
//! 二级存储是一个串行资源：一次换页请求必须等前一次完成才能开始，
//! 唤醒时间为 `max(now, storage_free_at) + transfers × transfer_time`。
//!
//! 进程状态（阻塞、计数）由调用方根据返回的 [`FaultResolution`] 更新，
//! 本模块只处理页帧、存储槽和页表。

use core::fmt;

use log::debug;

use super::address::{VirtRange, pages_for};
use super::backing_store::BackingStore;
use super::frame_allocator::{FrameTable, SlotTable};
use super::memory_set::MemorySet;
use super::page_table::PageTable;
use super::replacement;
use crate::config::{PROTECTED_END, ReplacementPolicy};
use crate::hal::{HwError, Memory, Program, Tick};
use crate::process::{Pid, ProcessControlBlock};

/// 虚拟内存错误
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum VmError {
    /// 地址不在进程的合法区间内
    AccessViolation { addr: usize },
    /// 没有空闲页帧，也没有可以置换的页帧
    NoFrame,
    /// 二级存储槽不足以装入程序
    NoSlot { needed: usize },
    /// 主存或二级存储访问失败
    Storage(HwError),
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VmError::AccessViolation { addr } => write!(f, "access violation at {}", addr),
            VmError::NoFrame => f.write_str("no frame available"),
            VmError::NoSlot { needed } => {
                write!(f, "not enough secondary storage ({} pages needed)", needed)
            }
            VmError::Storage(e) => write!(f, "storage failure: {}", e),
        }
    }
}

impl std::error::Error for VmError {}

impl From<HwError> for VmError {
    fn from(e: HwError) -> Self {
        VmError::Storage(e)
    }
}

/// 被置换出的页
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Eviction {
    pub frame: usize,
    pub pid: Pid,
    pub page: usize,
    pub written_back: bool,
}

/// 一次缺页处理的结果
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct FaultResolution {
    pub page: usize,
    pub frame: usize,
    pub victim: Option<Eviction>,
    /// 本次换页的传输次数：1，写回脏页时为 2
    pub transfers: u32,
    /// 进程可以继续执行的时刻
    pub wake_at: Tick,
}

/// 虚拟内存管理器
pub struct VirtualMemory {
    frames: FrameTable,
    slots: SlotTable,
    store: BackingStore,
    policy: ReplacementPolicy,
    page_size: usize,
    transfer_time: Tick,
    /// 二级存储空闲的时刻
    storage_free_at: Tick,
    /// FIFO 装入序号
    next_stamp: u64,
}

impl VirtualMemory {
    /// 为 `memory_words` 字的主存创建管理器
    ///
    /// 二级存储槽数等于主存页帧数；与 CPU 保护区重叠的页帧被保留。
    pub fn new(
        memory_words: usize,
        page_size: usize,
        policy: ReplacementPolicy,
        transfer_time: Tick,
    ) -> Self {
        let frame_count = memory_words / page_size;
        let mut frames = FrameTable::new(frame_count);
        let reserved = frames.reserve_protected(PROTECTED_END, page_size);
        debug!(
            "vm: {} frames of {} words, {} reserved, policy {:?}",
            frame_count, page_size, reserved, policy
        );
        Self {
            frames,
            slots: SlotTable::new(frame_count, page_size),
            store: BackingStore::new(frame_count * page_size),
            policy,
            page_size,
            transfer_time,
            storage_free_at: 0,
            next_stamp: 0,
        }
    }

    pub fn frames(&self) -> &FrameTable {
        &self.frames
    }

    pub fn slots(&self) -> &SlotTable {
        &self.slots
    }

    pub fn store(&self) -> &BackingStore {
        &self.store
    }

    pub fn policy(&self) -> ReplacementPolicy {
        self.policy
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn storage_free_at(&self) -> Tick {
        self.storage_free_at
    }

    /// 把程序映像装入二级存储，每页一个槽，不足一页的部分补 0
    ///
    /// 失败时已分配的槽全部归还。
    pub fn load(&mut self, pid: Pid, program: &Program) -> Result<MemorySet, VmError> {
        let pages = pages_for(program.len(), self.page_size);
        if self.slots.free_count() < pages {
            return Err(VmError::NoSlot { needed: pages });
        }
        let mut slot_map = Vec::with_capacity(pages);
        for page in 0..pages {
            let Some(slot) = self.slots.alloc(pid, page) else {
                self.slots.release_owned_by(pid);
                return Err(VmError::NoSlot { needed: pages });
            };
            let start = page * self.page_size;
            let mut words = vec![0; self.page_size];
            for (i, word) in words.iter_mut().enumerate() {
                *word = program.words.get(start + i).copied().unwrap_or(0);
            }
            if let Err(e) = self.store.write_page(self.slots.base_of(slot), &words) {
                self.slots.release_owned_by(pid);
                return Err(e.into());
            }
            slot_map.push(slot);
        }
        let range = VirtRange::new(program.load_address, pages, self.page_size);
        let page_table = PageTable::new(range).into_ref();
        debug!("vm: pid {} loaded {:?} into slots {:?}", pid, range, slot_map);
        Ok(MemorySet::new(range, page_table, slot_map, program.len()))
    }

    /// 处理 `pid` 在 `addr` 处的缺页
    ///
    /// `procs` 用于查找牺牲页所属进程的页表和存储槽。
    pub fn resolve_fault(
        &mut self,
        mem: &mut dyn Memory,
        procs: &[ProcessControlBlock],
        pid: Pid,
        addr: usize,
        now: Tick,
    ) -> Result<FaultResolution, VmError> {
        let space = memory_of(procs, pid).ok_or(VmError::AccessViolation { addr })?;
        let page = space
            .range()
            .page_of(addr)
            .ok_or(VmError::AccessViolation { addr })?;

        if let Some(frame) = self.frames.frame_of(pid, page) {
            // 页已在内存中：映射仍有效时保留访问位和修改位
            let mut pt = space.page_table().borrow_mut();
            if pt.frame_of(page) != Some(frame) {
                pt.map(page, frame);
            }
            drop(pt);
            return Ok(FaultResolution {
                page,
                frame,
                victim: None,
                transfers: 0,
                wake_at: now,
            });
        }

        let mut transfers = 1;
        let mut victim = None;
        let frame = match self.frames.find_free() {
            Some(frame) => frame,
            None => {
                let frame = replacement::select_victim(&self.frames, self.policy)
                    .ok_or(VmError::NoFrame)?;
                let eviction = self.evict(mem, procs, frame)?;
                if eviction.written_back {
                    transfers += 1;
                }
                victim = Some(eviction);
                frame
            }
        };

        let slot = space
            .slot_of(page)
            .ok_or(VmError::AccessViolation { addr })?;
        let src = self.store.read_page(self.slots.base_of(slot), self.page_size)?;
        let frame_base = frame * self.page_size;
        for (i, word) in src.iter().enumerate() {
            mem.mem_write(frame_base + i, *word)?;
        }

        let stamp = self.next_stamp;
        self.next_stamp += 1;
        self.frames.occupy(frame, pid, page, stamp);
        space.page_table().borrow_mut().map(page, frame);

        let start = now.max(self.storage_free_at);
        let wake_at = start + Tick::from(transfers) * self.transfer_time;
        self.storage_free_at = wake_at;

        Ok(FaultResolution {
            page,
            frame,
            victim,
            transfers,
            wake_at,
        })
    }

    /// 腾空页帧 `frame`：脏页写回所属进程的存储槽，页表项失效
    fn evict(
        &mut self,
        mem: &mut dyn Memory,
        procs: &[ProcessControlBlock],
        frame: usize,
    ) -> Result<Eviction, VmError> {
        let (pid, page) = self
            .frames
            .get(frame)
            .and_then(|f| f.owner())
            .ok_or(VmError::NoFrame)?;
        let mut written_back = false;
        if let Some(owner) = memory_of(procs, pid) {
            let dirty = owner.page_table().borrow().is_dirty(page);
            if dirty {
                if let Some(slot) = owner.slot_of(page) {
                    let frame_base = frame * self.page_size;
                    let mut words = Vec::with_capacity(self.page_size);
                    for i in 0..self.page_size {
                        words.push(mem.mem_read(frame_base + i)?);
                    }
                    self.store.write_page(self.slots.base_of(slot), &words)?;
                    written_back = true;
                }
            }
            owner.page_table().borrow_mut().invalidate(page);
        }
        self.frames.release(frame);
        Ok(Eviction {
            frame,
            pid,
            page,
            written_back,
        })
    }

    /// 时钟中断时推进老化计数器，采样并清除各页表的访问位
    pub fn age(&mut self, procs: &[ProcessControlBlock]) {
        replacement::age_frames(&mut self.frames, |pid, page| {
            memory_of(procs, pid)
                .is_some_and(|space| space.page_table().borrow_mut().take_accessed(page))
        });
    }

    /// 归还 `pid` 的全部页帧和存储槽，并销毁其地址空间
    ///
    /// 重复调用没有额外效果。
    pub fn release(&mut self, pid: Pid, memory: &mut Option<MemorySet>) {
        let frames = self.frames.release_owned_by(pid);
        let slots = self.slots.release_owned_by(pid);
        if memory.take().is_some() || frames > 0 || slots > 0 {
            debug!(
                "vm: pid {} released {} frames and {} slots",
                pid, frames, slots
            );
        }
    }
}

/// 按 pid 查找非空闲进程的地址空间
fn memory_of(procs: &[ProcessControlBlock], pid: Pid) -> Option<&MemorySet> {
    procs
        .iter()
        .find(|p| p.pid == pid && !p.is_free())
        .and_then(|p| p.memory.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Board;
    use crate::hal::Mmu;
    use crate::process::{ProcessControlBlock, ProcessStatus};

    // 10 个保留页帧 + `user` 个用户页帧
    fn vm(user: usize, policy: ReplacementPolicy) -> VirtualMemory {
        VirtualMemory::new((10 + user) * 10, 10, policy, 30)
    }

    fn process(vm: &mut VirtualMemory, pid: Pid, program: &Program) -> ProcessControlBlock {
        let mut pcb = ProcessControlBlock::empty();
        pcb.pid = pid;
        pcb.set_status(ProcessStatus::Ready, 0);
        pcb.memory = Some(vm.load(pid, program).unwrap());
        pcb
    }

    fn program(pages: usize) -> Program {
        Program::new(0, (0..(pages * 10) as i32).collect())
    }

    #[test]
    fn load_uses_one_slot_per_page_and_no_frames() {
        let mut vm = vm(2, ReplacementPolicy::Fifo);
        let p = process(&mut vm, 1, &Program::new(0, vec![1; 25]));
        let space = p.memory.as_ref().unwrap();
        assert_eq!(space.pages(), 3);
        assert_eq!(vm.slots().free_count(), 12 - 3);
        assert_eq!(vm.frames().free_count(), 2);
        // 最后一页补 0
        let last = vm.store().read_page(vm.slots().base_of(2), 10).unwrap();
        assert_eq!(&last[..5], &[1; 5]);
        assert_eq!(&last[5..], &[0; 5]);
    }

    #[test]
    fn load_without_enough_slots_rolls_back() {
        let mut vm = vm(1, ReplacementPolicy::Fifo);
        let big = Program::new(0, vec![0; 200]);
        assert_eq!(vm.load(1, &big).err(), Some(VmError::NoSlot { needed: 20 }));
        assert_eq!(vm.slots().free_count(), 11);
    }

    #[test]
    fn boundary_addresses_are_access_violations() {
        let mut board = Board::new(200);
        let mut vm = vm(2, ReplacementPolicy::Fifo);
        let mut pcb = ProcessControlBlock::empty();
        pcb.pid = 1;
        pcb.set_status(ProcessStatus::Ready, 0);
        pcb.memory = Some(vm.load(1, &Program::new(40, vec![0; 20])).unwrap());
        let procs = [pcb];
        assert_eq!(
            vm.resolve_fault(&mut board, &procs, 1, 39, 0),
            Err(VmError::AccessViolation { addr: 39 })
        );
        assert_eq!(
            vm.resolve_fault(&mut board, &procs, 1, 60, 0),
            Err(VmError::AccessViolation { addr: 60 })
        );
        assert!(vm.resolve_fault(&mut board, &procs, 1, 59, 0).is_ok());
    }

    #[test]
    fn fifo_evicts_in_load_order_despite_access() {
        let mut board = Board::new(120);
        let mut vm = vm(2, ReplacementPolicy::Fifo);
        let procs = [process(&mut vm, 1, &program(3))];
        let table = procs[0].memory.as_ref().unwrap().page_table().clone();
        board.set_page_table(Some(table));

        let r0 = vm.resolve_fault(&mut board, &procs, 1, 0, 0).unwrap();
        let r1 = vm.resolve_fault(&mut board, &procs, 1, 10, 0).unwrap();
        assert_eq!((r0.frame, r1.frame), (10, 11));
        assert!(r0.victim.is_none() && r1.victim.is_none());

        // 访问第 0 页不影响 FIFO
        board.mmu_read(3).unwrap();
        vm.age(&procs);

        let r2 = vm.resolve_fault(&mut board, &procs, 1, 20, 0).unwrap();
        assert_eq!(r2.victim.map(|v| v.page), Some(0));
        let r3 = vm.resolve_fault(&mut board, &procs, 1, 5, 0).unwrap();
        assert_eq!(r3.victim.map(|v| v.page), Some(1));
    }

    #[test]
    fn aging_evicts_least_recently_used() {
        let mut board = Board::new(120);
        let mut vm = vm(2, ReplacementPolicy::Aging);
        let procs = [process(&mut vm, 1, &program(3))];
        let table = procs[0].memory.as_ref().unwrap().page_table().clone();
        board.set_page_table(Some(table));

        vm.resolve_fault(&mut board, &procs, 1, 0, 0).unwrap();
        vm.resolve_fault(&mut board, &procs, 1, 10, 0).unwrap();
        board.mmu_read(2).unwrap();
        vm.age(&procs);

        let r = vm.resolve_fault(&mut board, &procs, 1, 25, 0).unwrap();
        assert_eq!(r.victim.map(|v| v.page), Some(1));
    }

    #[test]
    fn dirty_victim_round_trips_through_storage() {
        let mut board = Board::new(110);
        let mut vm = vm(1, ReplacementPolicy::Fifo);
        let procs = [process(&mut vm, 1, &program(2))];
        let table = procs[0].memory.as_ref().unwrap().page_table().clone();
        board.set_page_table(Some(table));

        let first = vm.resolve_fault(&mut board, &procs, 1, 0, 0).unwrap();
        assert_eq!(first.transfers, 1);
        for addr in 0..10 {
            board.mmu_write(addr, 100 + addr as i32).unwrap();
        }

        let second = vm.resolve_fault(&mut board, &procs, 1, 10, 100).unwrap();
        assert_eq!(second.transfers, 2);
        assert!(second.victim.is_some_and(|v| v.written_back));

        let third = vm.resolve_fault(&mut board, &procs, 1, 0, 200).unwrap();
        // 第 1 页没有被写过，不需要写回
        assert_eq!(third.transfers, 1);
        for addr in 0..10 {
            assert_eq!(board.mmu_read(addr), Ok(100 + addr as i32));
        }
    }

    #[test]
    fn storage_serializes_transfers() {
        let mut board = Board::new(130);
        let mut vm = vm(3, ReplacementPolicy::Fifo);
        let procs = [process(&mut vm, 1, &program(3))];
        let a = vm.resolve_fault(&mut board, &procs, 1, 0, 100).unwrap();
        let b = vm.resolve_fault(&mut board, &procs, 1, 10, 110).unwrap();
        let c = vm.resolve_fault(&mut board, &procs, 1, 20, 500).unwrap();
        assert_eq!(a.wake_at, 130);
        assert_eq!(b.wake_at, 160);
        assert_eq!(c.wake_at, 530);
        assert_eq!(vm.storage_free_at(), 530);
    }

    #[test]
    fn release_is_idempotent() {
        let mut board = Board::new(130);
        let mut vm = vm(3, ReplacementPolicy::Fifo);
        let mut procs = [process(&mut vm, 1, &program(2)), process(&mut vm, 2, &program(1))];
        vm.resolve_fault(&mut board, &procs, 1, 0, 0).unwrap();
        vm.resolve_fault(&mut board, &procs, 2, 0, 0).unwrap();

        vm.release(1, &mut procs[0].memory);
        let frames: Vec<_> = vm.frames().iter().map(|f| f.state).collect();
        let slots = vm.slots().free_count();
        vm.release(1, &mut procs[0].memory);
        let again: Vec<_> = vm.frames().iter().map(|f| f.state).collect();
        assert_eq!(frames, again);
        assert_eq!(slots, vm.slots().free_count());
        assert!(procs[0].memory.is_none());
        assert_eq!(vm.frames().frame_of(2, 0), Some(11));
    }

    #[test]
    fn no_frame_when_memory_is_all_reserved() {
        let mut board = Board::new(100);
        let mut vm = VirtualMemory::new(100, 10, ReplacementPolicy::Aging, 30);
        let procs = [process(&mut vm, 1, &program(1))];
        assert_eq!(
            vm.resolve_fault(&mut board, &procs, 1, 0, 0),
            Err(VmError::NoFrame)
        );
    }
}
