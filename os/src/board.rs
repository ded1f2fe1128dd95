//! # 参考开发板
//!
//! 一台完全位于内存中的模拟机器，实现 [`Hardware`](crate::hal::Hardware)
//! 的全部 trait。它不执行指令：调用方扮演 CPU，写入寄存器保存区、
//! 推进指令时钟、通过 [`Board::mmu_write`] 模拟用户程序的写访问，
//! 然后调用 [`Kernel::handle_interrupt`](crate::kernel::Kernel::handle_interrupt)。
//!
//! ## 设备
//!
//! - 4 个终端，每个有键盘输入队列、屏幕输出缓冲和屏幕就绪标志
//! - 指令时钟，只能前进
//! - 定时器倒计数寄存器和中断标志

use std::collections::{HashMap, VecDeque};

use crate::config::TERMINAL_COUNT;
use crate::hal::{
    Clock, Device, HwError, Io, Memory, Mmu, Program, ProgramSource, Terminal, Tick, Word,
};
use crate::mm::PageTableRef;
use crate::trap::CpuContext;

#[derive(Default)]
struct TerminalPort {
    input: VecDeque<Word>,
    output: Vec<Word>,
    screen_blocked: bool,
}

pub struct Board {
    ram: Vec<Word>,
    page_table: Option<PageTableRef>,
    terminals: [TerminalPort; TERMINAL_COUNT],
    clock: Tick,
    timer: Word,
    timer_pending: bool,
    programs: HashMap<String, Program>,
}

impl Board {
    /// 创建 `words` 字内存的开发板
    pub fn new(words: usize) -> Self {
        Self {
            ram: vec![0; words],
            page_table: None,
            terminals: Default::default(),
            clock: 0,
            timer: 0,
            timer_pending: false,
            programs: HashMap::new(),
        }
    }

    pub fn add_program(&mut self, name: &str, program: Program) {
        self.programs.insert(name.to_string(), program);
    }

    /// 指令时钟前进 `ticks`
    pub fn advance(&mut self, ticks: Tick) {
        self.clock += ticks;
    }

    pub fn timer(&self) -> Word {
        self.timer
    }

    pub fn page_table(&self) -> Option<&PageTableRef> {
        self.page_table.as_ref()
    }

    pub fn feed_keyboard(&mut self, term: Terminal, chars: &[Word]) {
        self.terminals[term.index()].input.extend(chars.iter().copied());
    }

    pub fn screen_output(&self, term: Terminal) -> &[Word] {
        &self.terminals[term.index()].output
    }

    /// 屏幕忙时写请求会阻塞
    pub fn set_screen_busy(&mut self, term: Terminal, busy: bool) {
        self.terminals[term.index()].screen_blocked = busy;
    }

    /// CPU 保存区中的寄存器映像
    pub fn saved_context(&self) -> Result<CpuContext, HwError> {
        CpuContext::load(self)
    }

    /// 模拟 CPU 在中断前把寄存器写入保存区
    pub fn save_context(&mut self, cx: &CpuContext) -> Result<(), HwError> {
        cx.store(self)
    }

    /// 经过当前页表的写访问，设置访问位和修改位
    pub fn mmu_write(&mut self, vaddr: usize, value: Word) -> Result<(), HwError> {
        let phys = self.translate(vaddr, true)?;
        self.mem_write(phys, value)
    }

    fn translate(&mut self, vaddr: usize, write: bool) -> Result<usize, HwError> {
        let Some(table) = &self.page_table else {
            return Ok(vaddr);
        };
        let (frame, offset) = table.borrow().translate(vaddr)?;
        let page_size = table.borrow().range().page_size;
        let phys = frame * page_size + offset;
        if phys >= self.ram.len() {
            return Err(HwError::InvalidAddress);
        }
        table.borrow_mut().record_access(vaddr, write);
        Ok(phys)
    }
}

impl Memory for Board {
    fn mem_read(&self, addr: usize) -> Result<Word, HwError> {
        self.ram.get(addr).copied().ok_or(HwError::InvalidAddress)
    }

    fn mem_write(&mut self, addr: usize, value: Word) -> Result<(), HwError> {
        let word = self.ram.get_mut(addr).ok_or(HwError::InvalidAddress)?;
        *word = value;
        Ok(())
    }

    fn mem_size(&self) -> usize {
        self.ram.len()
    }
}

impl Mmu for Board {
    fn set_page_table(&mut self, table: Option<PageTableRef>) {
        self.page_table = table;
    }

    fn mmu_read(&mut self, vaddr: usize) -> Result<Word, HwError> {
        let phys = self.translate(vaddr, false)?;
        self.mem_read(phys)
    }
}

impl Io for Board {
    fn io_read(&mut self, device: Device) -> Result<Word, HwError> {
        match device {
            Device::Keyboard(t) => self.terminals[t.index()]
                .input
                .pop_front()
                .ok_or(HwError::DeviceBusy),
            Device::KeyboardReady(t) => Ok(Word::from(!self.terminals[t.index()].input.is_empty())),
            Device::ScreenReady(t) => Ok(Word::from(!self.terminals[t.index()].screen_blocked)),
            Device::Timer => Ok(self.timer),
            Device::TimerInterrupt => Ok(Word::from(self.timer_pending)),
            Device::Screen(_) => Err(HwError::InvalidDevice),
        }
    }

    fn io_write(&mut self, device: Device, value: Word) -> Result<(), HwError> {
        match device {
            Device::Screen(t) => {
                let port = &mut self.terminals[t.index()];
                if port.screen_blocked {
                    return Err(HwError::DeviceBusy);
                }
                port.output.push(value);
                Ok(())
            }
            Device::Timer => {
                self.timer = value;
                Ok(())
            }
            Device::TimerInterrupt => {
                self.timer_pending = value != 0;
                Ok(())
            }
            _ => Err(HwError::InvalidDevice),
        }
    }
}

impl Clock for Board {
    fn instructions(&self) -> Tick {
        self.clock
    }
}

impl ProgramSource for Board {
    fn load_program(&self, name: &str) -> Option<Program> {
        self.programs.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mm::{PageTable, VirtRange};

    #[test]
    fn translation_sets_access_and_dirty_bits() {
        let mut board = Board::new(100);
        let mut pt = PageTable::new(VirtRange::new(0, 2, 10));
        pt.map(1, 5);
        let pt = pt.into_ref();
        board.set_page_table(Some(pt.clone()));
        board.mmu_write(12, 9).unwrap();
        assert_eq!(board.mem_read(52), Ok(9));
        assert!(pt.borrow().is_dirty(1));
        assert_eq!(board.mmu_read(3), Err(HwError::PageAbsent));
    }

    #[test]
    fn keyboard_drains_in_order() {
        let mut board = Board::new(10);
        board.feed_keyboard(Terminal::C, &[65, 66]);
        assert_eq!(board.io_read(Device::KeyboardReady(Terminal::C)), Ok(1));
        assert_eq!(board.io_read(Device::Keyboard(Terminal::C)), Ok(65));
        assert_eq!(board.io_read(Device::Keyboard(Terminal::C)), Ok(66));
        assert_eq!(board.io_read(Device::KeyboardReady(Terminal::C)), Ok(0));
    }

    #[test]
    fn context_save_area_round_trip() {
        let mut board = Board::new(10);
        let cx = CpuContext {
            pc: 3,
            a: 4,
            x: 5,
            error: 1,
            complement: 77,
        };
        board.save_context(&cx).unwrap();
        assert_eq!(board.saved_context(), Ok(cx));
    }
}
