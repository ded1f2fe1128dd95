//! # 进程地址空间
//!
//! [`MemorySet`] 汇集一个进程全部的虚拟内存资源：合法地址区间、页表
//! 和每页对应的二级存储槽。进程控制块以 `Option<MemorySet>` 持有它，
//! 空闲槽位持有 `None`，因此“空闲进程不拥有页表和存储槽”由类型保证。

use super::address::VirtRange;
use super::page_table::PageTableRef;

pub struct MemorySet {
    range: VirtRange,
    page_table: PageTableRef,
    /// 虚拟页号 -> 二级存储槽号
    slots: Vec<usize>,
    program_size: usize,
}

impl MemorySet {
    pub(super) fn new(
        range: VirtRange,
        page_table: PageTableRef,
        slots: Vec<usize>,
        program_size: usize,
    ) -> Self {
        Self {
            range,
            page_table,
            slots,
            program_size,
        }
    }

    pub fn range(&self) -> VirtRange {
        self.range
    }

    pub fn virtual_base(&self) -> usize {
        self.range.base
    }

    /// 程序映像大小（字）
    pub fn program_size(&self) -> usize {
        self.program_size
    }

    pub fn pages(&self) -> usize {
        self.range.pages
    }

    /// 页表句柄，交给 MMU 时克隆
    pub fn page_table(&self) -> &PageTableRef {
        &self.page_table
    }

    pub fn slot_of(&self, page: usize) -> Option<usize> {
        self.slots.get(page).copied()
    }

    /// 占用的二级存储页数
    pub fn secondary_pages(&self) -> usize {
        self.slots.len()
    }
}
