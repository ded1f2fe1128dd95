#![allow(dead_code)]

use simos::config::{PAGE_TRANSFER_TIME, TIMER_INTERVAL, TRAP_HANDLER_ADDR};
use simos::hal::{CpuFault, Irq, Program, Tick, Word};
use simos::process::{Pid, ProcessControlBlock, ProcessStatus};
use simos::trap::CpuContext;
use simos::{Board, Config, Kernel, Verdict};

pub const SYSCALL_READ: Word = 1;
pub const SYSCALL_WRITE: Word = 2;
pub const SYSCALL_CREATE_PROC: Word = 7;
pub const SYSCALL_KILL_PROC: Word = 8;
pub const SYSCALL_WAIT_PROC: Word = 9;

/// 用户程序的虚拟基址
pub const USER_BASE: usize = 100;
/// init 映像开头保存的程序名
pub const CHILD_NAME_ADDR: Word = USER_BASE as Word;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// 以 0 结尾的字符串映像
pub fn encode(s: &str) -> Vec<Word> {
    s.bytes().map(Word::from).chain([0]).collect()
}

/// 装好中断处理程序、init（`init_len` 字，开头是 "p2.maq"）和 p2 的开发板
pub fn board_with(words: usize, init_len: usize) -> Board {
    let mut board = Board::new(words);
    board.add_program("trata_int.maq", Program::new(TRAP_HANDLER_ADDR, vec![7; 5]));
    let mut init = encode("p2.maq");
    init.resize(init_len.max(init.len()), 1);
    board.add_program("init.maq", Program::new(USER_BASE, init));
    board.add_program("p2.maq", Program::new(USER_BASE, vec![2; 15]));
    board
}

pub fn board() -> Board {
    board_with(1000, 20)
}

/// 扮演 CPU 的测试台
pub struct Rig {
    pub kernel: Kernel<Board>,
}

impl Rig {
    pub fn new(board: Board, config: Config) -> Self {
        init_logger();
        Self {
            kernel: Kernel::new(board, config),
        }
    }

    /// 上电并确认 init 被调度
    pub fn boot(config: Config) -> Self {
        Self::boot_with(board(), config)
    }

    pub fn boot_with(board: Board, config: Config) -> Self {
        let mut rig = Self::new(board, config);
        assert_eq!(rig.kernel.interrupt(Irq::Reset), Verdict::Resume);
        rig
    }

    /// CPU 保存区中的寄存器
    pub fn cpu(&self) -> CpuContext {
        self.kernel.hw().saved_context().unwrap()
    }

    pub fn advance(&mut self, ticks: Tick) {
        self.kernel.hw_mut().advance(ticks);
    }

    /// 修改保存区中的寄存器后触发中断
    pub fn trap(&mut self, irq: Irq, edit: impl FnOnce(&mut CpuContext)) -> Verdict {
        let mut cx = self.cpu();
        edit(&mut cx);
        self.kernel.hw_mut().save_context(&cx).unwrap();
        self.kernel.interrupt(irq)
    }

    /// 当前进程执行一条系统调用指令
    pub fn syscall(&mut self, id: Word, x: Word) -> Verdict {
        self.advance(1);
        self.trap(Irq::SystemCall, |cx| {
            cx.a = id;
            cx.x = x;
            cx.pc += 1;
        })
    }

    /// 一个定时器周期后的时钟中断
    pub fn clock(&mut self) -> Verdict {
        self.advance(TIMER_INTERVAL as Tick);
        self.trap(Irq::Clock, |_| {})
    }

    /// 当前进程访问 `addr` 时缺页
    pub fn page_fault(&mut self, addr: Word) -> Verdict {
        self.trap(Irq::CpuError, |cx| {
            cx.error = CpuFault::PageAbsent.code();
            cx.complement = addr;
        })
    }

    /// 缺页并等到换页完成、进程重新被调度
    pub fn fault_in(&mut self, addr: Word) -> Verdict {
        self.page_fault(addr);
        self.advance(PAGE_TRANSFER_TIME);
        self.clock()
    }

    /// 创建子进程，名字所在页不在内存时先换入再重新执行
    pub fn create_child(&mut self) -> Word {
        let caller = self.running().unwrap();
        self.syscall(SYSCALL_CREATE_PROC, CHILD_NAME_ADDR);
        if self.status(caller) == Some(ProcessStatus::Blocked) {
            self.clock();
            assert_eq!(self.running(), Some(caller));
            self.syscall(SYSCALL_CREATE_PROC, CHILD_NAME_ADDR);
        }
        self.cpu().a
    }

    pub fn running(&self) -> Option<Pid> {
        self.kernel.running_pid()
    }

    pub fn pcb(&self, pid: Pid) -> &ProcessControlBlock {
        self.kernel.process(pid).unwrap()
    }

    pub fn status(&self, pid: Pid) -> Option<ProcessStatus> {
        self.kernel.process(pid).map(|p| p.status())
    }

    pub fn visits(&self, pid: Pid, status: ProcessStatus) -> u32 {
        self.pcb(pid).visits[status.index()]
    }
}
