//! # 地址空间窗口
//!
//! 进程的合法虚拟地址是一个连续区间 `[base, base + pages × page_size)`，
//! 页号相对 `base` 计算。本模块集中处理这些换算，避免各处重复边界判断。

use core::fmt::{self, Debug, Formatter};

/// 容纳 `len` 个字所需的页数，至少为 1
pub fn pages_for(len: usize, page_size: usize) -> usize {
    len.div_ceil(page_size).max(1)
}

/// 进程的虚拟地址区间
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct VirtRange {
    pub base: usize,
    pub pages: usize,
    pub page_size: usize,
}

impl VirtRange {
    pub fn new(base: usize, pages: usize, page_size: usize) -> Self {
        Self {
            base,
            pages,
            page_size,
        }
    }

    /// 区间结束地址（不含）
    pub fn end(&self) -> usize {
        self.base + self.pages * self.page_size
    }

    pub fn contains(&self, addr: usize) -> bool {
        addr >= self.base && addr < self.end()
    }

    /// 地址所在的页号，地址不在区间内时返回 `None`
    pub fn page_of(&self, addr: usize) -> Option<usize> {
        if self.contains(addr) {
            Some((addr - self.base) / self.page_size)
        } else {
            None
        }
    }

    pub fn offset_in_page(&self, addr: usize) -> usize {
        (addr - self.base) % self.page_size
    }

    /// 第 `page` 页的首个虚拟地址
    pub fn page_start(&self, page: usize) -> usize {
        self.base + page * self.page_size
    }
}

impl Debug for VirtRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!(
            "VA:[{}, {}) ({} pages)",
            self.base,
            self.end(),
            self.pages
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pages_round_up_and_never_zero() {
        assert_eq!(pages_for(0, 10), 1);
        assert_eq!(pages_for(10, 10), 1);
        assert_eq!(pages_for(11, 10), 2);
    }

    #[test]
    fn range_bounds_are_half_open() {
        let r = VirtRange::new(100, 3, 10);
        assert_eq!(r.page_of(99), None);
        assert_eq!(r.page_of(100), Some(0));
        assert_eq!(r.page_of(129), Some(2));
        assert_eq!(r.page_of(130), None);
        assert_eq!(r.offset_in_page(123), 3);
        assert_eq!(r.page_start(2), 120);
    }
}
