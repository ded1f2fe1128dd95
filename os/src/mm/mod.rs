//! # 内存管理模块
//!
//! 实现请求分页的虚拟内存：程序映像装入二级存储，页在第一次访问时
//! 调入主存，主存不足时按 FIFO 或老化算法置换。
//!
//! ## 模块组织
//!
//! - [`address`] - 虚拟地址区间与页号换算
//! - [`page_table`] - 单级页表，带访问位和修改位
//! - [`frame_allocator`] - 页帧表和二级存储槽表，纯记账
//! - [`backing_store`] - 二级存储内容
//! - [`replacement`] - 牺牲页帧选择和老化
//! - [`memory_set`] - 进程地址空间
//! - [`vmm`] - 装入、缺页处理、释放
//!
//! ## 核心类型
//!
//! - [`VirtualMemory`] - 虚拟内存管理器，由 [`Kernel`](crate::kernel::Kernel) 持有
//! - [`MemorySet`] - 进程的页表和存储槽
//! - [`PageTable`] / [`PageTableRef`] - 页表及其共享句柄
//! - [`FaultResolution`] / [`VmError`] - 缺页处理结果

pub mod address;
pub mod backing_store;
pub mod frame_allocator;
mod memory_set;
pub mod page_table;
pub mod replacement;
mod vmm;

pub use address::VirtRange;
pub use frame_allocator::{AGE_MSB, Frame, FrameState, FrameTable, SlotTable};
pub use memory_set::MemorySet;
pub use page_table::{PTEFlags, PageTable, PageTableEntry, PageTableRef};
pub use vmm::{Eviction, FaultResolution, VirtualMemory, VmError};
