//! # 页表
//!
//! 每个进程一张单级页表，按相对于虚拟基址的页号索引。页表由监控程序
//! 创建和销毁，MMU 在转换时读取它，并在访问时设置访问位和修改位；
//! 老化算法读取并清除访问位，置换时检查修改位决定是否写回。
//!
//! ## 核心组件
//!
//! - [`PTEFlags`] - 页表项标志位
//! - [`PageTableEntry`] - 页表项：页帧号 + 标志位
//! - [`PageTable`] - 页表本身
//! - [`PageTableRef`] - 进程与 MMU 共享的页表句柄
//!
//! ## 页表项格式
//!
//! ```text
//! ┌────────────────────────────┬───┬───┬───┐
//! │        frame number        │ D │ A │ V │
//! └────────────────────────────┴───┴───┴───┘
//! ```

use std::cell::RefCell;
use std::rc::Rc;

use bitflags::*;

use super::address::VirtRange;
use crate::hal::HwError;

bitflags! {
    /// 页表项标志位
    #[derive(Copy, Clone, PartialEq, Eq, Debug)]
    pub struct PTEFlags: u8 {
        /// 有效位：页在某个页帧中
        const V = 1 << 0;
        /// 访问位：自上次清除以来被访问过
        const A = 1 << 1;
        /// 修改位：装入页帧后被写过
        const D = 1 << 2;
    }
}

/// 页表项
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct PageTableEntry {
    pub frame: usize,
    pub flags: PTEFlags,
}

impl PageTableEntry {
    pub fn new(frame: usize, flags: PTEFlags) -> Self {
        Self { frame, flags }
    }

    pub fn empty() -> Self {
        Self {
            frame: 0,
            flags: PTEFlags::empty(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.flags.contains(PTEFlags::V)
    }

    pub fn is_accessed(&self) -> bool {
        self.flags.contains(PTEFlags::A)
    }

    pub fn is_dirty(&self) -> bool {
        self.flags.contains(PTEFlags::D)
    }
}

/// 进程与 MMU 共享的页表句柄
///
/// 模拟是单线程的，进程控制块持有页表，调度时把同一句柄交给 MMU。
pub type PageTableRef = Rc<RefCell<PageTable>>;

/// 单级页表
pub struct PageTable {
    range: VirtRange,
    entries: Vec<PageTableEntry>,
}

impl PageTable {
    /// 为区间 `range` 创建一张全部无效的页表
    pub fn new(range: VirtRange) -> Self {
        Self {
            range,
            entries: vec![PageTableEntry::empty(); range.pages],
        }
    }

    pub fn into_ref(self) -> PageTableRef {
        Rc::new(RefCell::new(self))
    }

    pub fn range(&self) -> VirtRange {
        self.range
    }

    pub fn entry(&self, page: usize) -> Option<&PageTableEntry> {
        self.entries.get(page)
    }

    /// 建立 `page -> frame` 映射，访问位和修改位清零
    pub fn map(&mut self, page: usize, frame: usize) {
        if let Some(pte) = self.entries.get_mut(page) {
            *pte = PageTableEntry::new(frame, PTEFlags::V);
        }
    }

    /// 使 `page` 的映射失效
    pub fn invalidate(&mut self, page: usize) {
        if let Some(pte) = self.entries.get_mut(page) {
            *pte = PageTableEntry::empty();
        }
    }

    /// 页所在的页帧，页不在内存中时返回 `None`
    pub fn frame_of(&self, page: usize) -> Option<usize> {
        self.entries
            .get(page)
            .filter(|pte| pte.is_valid())
            .map(|pte| pte.frame)
    }

    pub fn is_dirty(&self, page: usize) -> bool {
        self.entries.get(page).is_some_and(|pte| pte.is_dirty())
    }

    pub fn is_accessed(&self, page: usize) -> bool {
        self.entries.get(page).is_some_and(|pte| pte.is_accessed())
    }

    /// 读取并清除访问位
    pub fn take_accessed(&mut self, page: usize) -> bool {
        match self.entries.get_mut(page) {
            Some(pte) if pte.is_accessed() => {
                pte.flags.remove(PTEFlags::A);
                true
            }
            _ => false,
        }
    }

    /// 把虚拟地址转换为 `(frame, offset)`
    ///
    /// 区间之外的地址同样报告 [`HwError::PageAbsent`]，由缺页处理判断合法性。
    pub fn translate(&self, vaddr: usize) -> Result<(usize, usize), HwError> {
        let page = self.range.page_of(vaddr).ok_or(HwError::PageAbsent)?;
        let frame = self.frame_of(page).ok_or(HwError::PageAbsent)?;
        Ok((frame, self.range.offset_in_page(vaddr)))
    }

    /// MMU 在访问后调用，设置访问位，写访问还设置修改位
    pub fn record_access(&mut self, vaddr: usize, write: bool) {
        if let Some(page) = self.range.page_of(vaddr) {
            if let Some(pte) = self.entries.get_mut(page) {
                pte.flags.insert(PTEFlags::A);
                if write {
                    pte.flags.insert(PTEFlags::D);
                }
            }
        }
    }
}
