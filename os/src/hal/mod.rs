//! # 硬件抽象层
//!
//! 监控程序通过这里定义的 trait 访问模拟机器，本身不包含任何 CPU、
//! 内存或设备的模拟逻辑。
//!
//! ## 核心组件
//!
//! - [`Memory`] - 物理内存读写，可能失败
//! - [`Mmu`] - 经过页表的地址转换，记录访问位
//! - [`Io`] - 终端和时钟设备的寄存器
//! - [`Clock`] - 已执行指令数
//! - [`ProgramSource`] - 可执行映像加载器
//! - [`Hardware`] - 以上全部能力的组合，[`Kernel`](crate::kernel::Kernel) 对其泛型
//!
//! ## 协作关系
//!
//! ```text
//!   simulated CPU ──trap──► Kernel::handle_interrupt(irq)
//!                                │
//!        ┌───────────┬──────────┼───────────┬─────────────┐
//!        ▼           ▼          ▼           ▼             ▼
//!     Memory        Mmu         Io        Clock     ProgramSource
//! ```

use core::fmt;

use crate::config::TERMINAL_COUNT;
use crate::mm::PageTableRef;

/// 机器字
pub type Word = i32;

/// 指令计数形式的模拟时间
pub type Tick = u64;

/// 协作方返回的错误
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum HwError {
    /// 物理地址超出内存
    InvalidAddress,
    /// 页表中没有该页的有效映射
    PageAbsent,
    /// 设备不存在或不支持该操作
    InvalidDevice,
    /// 设备暂时无法完成操作
    DeviceBusy,
}

impl fmt::Display for HwError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            HwError::InvalidAddress => "invalid address",
            HwError::PageAbsent => "page absent",
            HwError::InvalidDevice => "invalid device",
            HwError::DeviceBusy => "device busy",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for HwError {}

/// 物理内存
pub trait Memory {
    fn mem_read(&self, addr: usize) -> Result<Word, HwError>;
    fn mem_write(&mut self, addr: usize, value: Word) -> Result<(), HwError>;
    /// 内存容量（字）
    fn mem_size(&self) -> usize;
}

/// 内存管理单元
///
/// 用户态访问经过当前安装的页表转换。页不在内存中时返回
/// [`HwError::PageAbsent`]，转换结果超出物理内存时返回
/// [`HwError::InvalidAddress`]。成功的读会设置页表中的访问位。
pub trait Mmu {
    /// 安装页表；`None` 表示不做转换
    fn set_page_table(&mut self, table: Option<PageTableRef>);
    fn mmu_read(&mut self, vaddr: usize) -> Result<Word, HwError>;
}

/// 设备寄存器
pub trait Io {
    fn io_read(&mut self, device: Device) -> Result<Word, HwError>;
    fn io_write(&mut self, device: Device, value: Word) -> Result<(), HwError>;
}

/// 指令计数时钟
pub trait Clock {
    fn instructions(&self) -> Tick;
}

/// 可执行映像来源
pub trait ProgramSource {
    fn load_program(&self, name: &str) -> Option<Program>;
}

/// 监控程序所需的全部硬件能力
pub trait Hardware: Memory + Mmu + Io + Clock + ProgramSource {}

impl<T: Memory + Mmu + Io + Clock + ProgramSource> Hardware for T {}

/// 可执行映像：加载地址和连续的字
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Program {
    pub load_address: usize,
    pub words: Vec<Word>,
}

impl Program {
    pub fn new(load_address: usize, words: Vec<Word>) -> Self {
        Self {
            load_address,
            words,
        }
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

/// 终端
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum Terminal {
    A,
    B,
    C,
    D,
}

impl Terminal {
    /// 进程表槽位 `idx` 对应的终端，按 4 取模轮流分配
    pub fn for_slot(idx: usize) -> Self {
        match idx % TERMINAL_COUNT {
            0 => Terminal::A,
            1 => Terminal::B,
            2 => Terminal::C,
            _ => Terminal::D,
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

/// 设备寄存器
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Device {
    Keyboard(Terminal),
    KeyboardReady(Terminal),
    Screen(Terminal),
    ScreenReady(Terminal),
    /// 定时器倒计数，写入即重新设定
    Timer,
    /// 定时器中断标志，写 0 表示确认
    TimerInterrupt,
}

/// 中断请求
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[repr(i32)]
pub enum Irq {
    Reset = 0,
    CpuError = 1,
    SystemCall = 2,
    Clock = 3,
    Keyboard = 4,
    Screen = 5,
}

/// 中断类型数量
pub const IRQ_COUNT: usize = 6;

impl Irq {
    pub const ALL: [Irq; IRQ_COUNT] = [
        Irq::Reset,
        Irq::CpuError,
        Irq::SystemCall,
        Irq::Clock,
        Irq::Keyboard,
        Irq::Screen,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Irq::Reset => "reset",
            Irq::CpuError => "cpu error",
            Irq::SystemCall => "system call",
            Irq::Clock => "clock",
            Irq::Keyboard => "keyboard",
            Irq::Screen => "screen",
        }
    }
}

impl TryFrom<Word> for Irq {
    type Error = Word;

    fn try_from(value: Word) -> Result<Self, Self::Error> {
        usize::try_from(value)
            .ok()
            .and_then(|i| Irq::ALL.get(i).copied())
            .ok_or(value)
    }
}

/// CPU 错误寄存器中的错误码
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum CpuFault {
    None,
    InvalidAddress,
    UndefinedInstruction,
    InvalidInstruction,
    Privileged,
    PageAbsent,
    Unknown(Word),
}

impl CpuFault {
    pub fn code(self) -> Word {
        match self {
            CpuFault::None => 0,
            CpuFault::InvalidAddress => 1,
            CpuFault::UndefinedInstruction => 2,
            CpuFault::InvalidInstruction => 3,
            CpuFault::Privileged => 4,
            CpuFault::PageAbsent => 5,
            CpuFault::Unknown(code) => code,
        }
    }
}

impl From<Word> for CpuFault {
    fn from(code: Word) -> Self {
        match code {
            0 => CpuFault::None,
            1 => CpuFault::InvalidAddress,
            2 => CpuFault::UndefinedInstruction,
            3 => CpuFault::InvalidInstruction,
            4 => CpuFault::Privileged,
            5 => CpuFault::PageAbsent,
            other => CpuFault::Unknown(other),
        }
    }
}

impl fmt::Display for CpuFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CpuFault::None => f.write_str("no error"),
            CpuFault::InvalidAddress => f.write_str("invalid address"),
            CpuFault::UndefinedInstruction => f.write_str("undefined instruction"),
            CpuFault::InvalidInstruction => f.write_str("invalid instruction"),
            CpuFault::Privileged => f.write_str("privileged instruction"),
            CpuFault::PageAbsent => f.write_str("page absent"),
            CpuFault::Unknown(code) => write!(f, "unknown error {}", code),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn irq_from_word() {
        assert_eq!(Irq::try_from(3), Ok(Irq::Clock));
        assert_eq!(Irq::try_from(6), Err(6));
        assert_eq!(Irq::try_from(-1), Err(-1));
    }

    #[test]
    fn terminals_rotate_by_slot() {
        assert_eq!(Terminal::for_slot(0), Terminal::A);
        assert_eq!(Terminal::for_slot(5), Terminal::B);
        assert_eq!(Terminal::for_slot(7), Terminal::D);
    }

    #[test]
    fn fault_codes_round_trip_through_words() {
        assert_eq!(CpuFault::from(5), CpuFault::PageAbsent);
        assert_eq!(CpuFault::from(42), CpuFault::Unknown(42));
        assert_eq!(CpuFault::PageAbsent.code(), 5);
    }
}
