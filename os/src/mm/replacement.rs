//! # 页面置换
//!
//! 选择被置换的页帧，并在每次时钟中断时推进老化计数器。
//!
//! - **FIFO**: 装入序号最小者
//! - **Aging**: 老化计数器最小者，即最久未被访问的页
//!
//! 空闲页帧总是优先于置换，这一判断在 [`vmm`](super::vmm) 中完成；
//! 这里只在已占用页帧中挑选。保留页帧永远不会被选中。
//! 多个页帧取值相同时，扫描顺序靠前者胜出。

use super::frame_allocator::{AGE_MSB, FrameTable};
use crate::config::ReplacementPolicy;
use crate::process::Pid;

/// 按策略挑选牺牲页帧，没有任何已占用页帧时返回 `None`
pub fn select_victim(frames: &FrameTable, policy: ReplacementPolicy) -> Option<usize> {
    let key = |idx: usize| -> Option<u64> {
        let frame = frames.get(idx)?;
        frame.owner()?;
        Some(match policy {
            ReplacementPolicy::Fifo => frame.fifo_stamp,
            ReplacementPolicy::Aging => frame.age,
        })
    };
    let mut victim: Option<(usize, u64)> = None;
    for idx in 0..frames.len() {
        if let Some(k) = key(idx) {
            if victim.is_none_or(|(_, best)| k < best) {
                victim = Some((idx, k));
            }
        }
    }
    victim.map(|(idx, _)| idx)
}

/// 老化一轮
///
/// 每个已占用页帧的计数器右移一位；若 `sample_accessed(pid, page)`
/// 报告该页自上次采样以来被访问过，则置最高位。`sample_accessed`
/// 负责读取并清除页表中的访问位。
pub fn age_frames<F>(frames: &mut FrameTable, mut sample_accessed: F)
where
    F: FnMut(Pid, usize) -> bool,
{
    for frame in frames.iter_mut() {
        let Some((pid, page)) = frame.owner() else {
            continue;
        };
        frame.age >>= 1;
        if pid > 0 && sample_accessed(pid, page) {
            frame.age |= AGE_MSB;
        }
    }
}
