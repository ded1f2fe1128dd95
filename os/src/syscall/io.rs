//! 终端读写
//!
//! 设备就绪时立即完成传输，进程继续运行；否则进程阻塞，由中断末尾的
//! 扫描重试 [`Kernel::try_read`] / [`Kernel::try_write`]。

use crate::hal::{Device, Hardware, HwError, Terminal};
use crate::kernel::{Kernel, Reap, TerminationCause};
use crate::process::BlockReason;

impl<H: Hardware> Kernel<H> {
    /// 键盘有数据时读入一个字符到进程的 A 寄存器
    pub(crate) fn try_read(&mut self, idx: usize, term: Terminal) -> Result<bool, HwError> {
        if self.hw.io_read(Device::KeyboardReady(term))? == 0 {
            return Ok(false);
        }
        let ch = self.hw.io_read(Device::Keyboard(term))?;
        self.set_result(idx, ch);
        Ok(true)
    }

    /// 屏幕可写时输出进程的 X 寄存器，A 置 0
    pub(crate) fn try_write(&mut self, idx: usize, term: Terminal) -> Result<bool, HwError> {
        if self.hw.io_read(Device::ScreenReady(term))? == 0 {
            return Ok(false);
        }
        let ch = self.procs.get(idx).map(|p| p.context.x).unwrap_or_default();
        self.hw.io_write(Device::Screen(term), ch)?;
        self.set_result(idx, 0);
        Ok(true)
    }

    pub(super) fn sys_read(&mut self, idx: usize) {
        let Some(term) = self.procs.get(idx).map(|p| p.terminal) else {
            return;
        };
        match self.try_read(idx, term) {
            Ok(true) => {}
            Ok(false) => self.block(idx, BlockReason::WaitRead(term)),
            Err(e) => self.terminate(idx, TerminationCause::Device(e), Reap::Immediately),
        }
    }

    pub(super) fn sys_write(&mut self, idx: usize) {
        let Some(term) = self.procs.get(idx).map(|p| p.terminal) else {
            return;
        };
        match self.try_write(idx, term) {
            Ok(true) => {}
            Ok(false) => self.block(idx, BlockReason::WaitWrite(term)),
            Err(e) => self.terminate(idx, TerminationCause::Device(e), Reap::Immediately),
        }
    }
}
