//! # 监控程序配置
//!
//! 定义模拟机器的固定参数（进程表容量、页大小、寄存器保存区地址等）
//! 以及可在启动时选择的运行参数 [`Config`]。
//!
//! ## 环境变量
//!
//! 与日志系统读取 `LOG` 的方式一致，[`Config::from_env`] 会读取：
//!
//! - `SIMOS_SCHEDULER` - `rr` 或 `prio`
//! - `SIMOS_REPLACEMENT` - `fifo` 或 `lru`
//! - `SIMOS_QUANTUM` - 时间片长度（时钟中断次数）

use core::fmt;
use core::str::FromStr;

use log::warn;

use crate::hal::{Tick, Word};

/// 进程表容量，同时也是就绪队列容量
pub const MAX_PROCESSES: usize = 10;

/// 页大小（字）
pub const PAGE_SIZE: usize = 10;

/// 两次时钟中断之间执行的指令数
pub const TIMER_INTERVAL: Word = 50;

/// 默认时间片，单位是时钟中断次数
pub const DEFAULT_QUANTUM: u32 = 3;

/// 一页在主存与二级存储之间传输所需的时间
pub const PAGE_TRANSFER_TIME: Tick = 30;

/// 新进程的初始优先级
pub const INITIAL_PRIORITY: f64 = 0.5;

/// 中断处理程序必须被加载到的物理地址
pub const TRAP_HANDLER_ADDR: usize = 10;

/// CPU 保护区的最后一个地址，覆盖该区域的页帧永远不会分配给进程
pub const PROTECTED_END: usize = 99;

/// 根进程的 pid，它的结束会触发最终报告
pub const ROOT_PID: u32 = 1;

/// 终端数量
pub const TERMINAL_COUNT: usize = 4;

/// 程序名的最大长度（含结尾的 0）
pub const MAX_PROGRAM_NAME: usize = 100;

/// 系统调用指令占用的字数，缺页重试时 PC 回退这么多
pub const SYSCALL_INSTRUCTION_LEN: Word = 1;

// CPU 在中断时把寄存器保存到以下物理地址，恢复时从这里读回
pub const CPU_SAVE_PC: usize = 0;
pub const CPU_SAVE_A: usize = 1;
pub const CPU_SAVE_ERROR: usize = 2;
pub const CPU_SAVE_COMPLEMENT: usize = 3;
pub const CPU_SAVE_X: usize = 4;

/// 调度策略，启动时选定
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum SchedulerKind {
    /// 时间片轮转，使用就绪队列
    RoundRobin,
    /// 动态优先级，扫描进程表选择数值最小者
    Priority,
}

/// 页面置换算法
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ReplacementPolicy {
    Fifo,
    /// 基于老化计数器的近似 LRU
    Aging,
}

impl FromStr for SchedulerKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rr" | "round-robin" => Ok(SchedulerKind::RoundRobin),
            "prio" | "priority" => Ok(SchedulerKind::Priority),
            _ => Err(ConfigError::new("SIMOS_SCHEDULER", s)),
        }
    }
}

impl FromStr for ReplacementPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fifo" => Ok(ReplacementPolicy::Fifo),
            "lru" | "aging" => Ok(ReplacementPolicy::Aging),
            _ => Err(ConfigError::new("SIMOS_REPLACEMENT", s)),
        }
    }
}

/// 环境变量取值无法解析
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
}

impl ConfigError {
    fn new(key: &'static str, value: &str) -> Self {
        Self {
            key,
            value: value.to_string(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid value {:?} for {}", self.value, self.key)
    }
}

impl std::error::Error for ConfigError {}

/// 运行参数
///
/// 在构造 [`Kernel`](crate::kernel::Kernel) 时传入，之后不再改变。
#[derive(Clone, Debug)]
pub struct Config {
    pub scheduler: SchedulerKind,
    pub replacement: ReplacementPolicy,
    /// 时间片长度，至少为 1
    pub quantum: u32,
    pub timer_interval: Word,
    pub page_size: usize,
    pub page_transfer_time: Tick,
    /// 复位时物理加载的中断处理程序
    pub trap_handler_program: String,
    /// 复位时创建的第一个进程执行的程序
    pub init_program: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scheduler: SchedulerKind::Priority,
            replacement: ReplacementPolicy::Aging,
            quantum: DEFAULT_QUANTUM,
            timer_interval: TIMER_INTERVAL,
            page_size: PAGE_SIZE,
            page_transfer_time: PAGE_TRANSFER_TIME,
            trap_handler_program: "trata_int.maq".to_string(),
            init_program: "init.maq".to_string(),
        }
    }
}

impl Config {
    /// 以默认值为基础，叠加环境变量中的设置
    ///
    /// 无法解析的取值会被忽略并输出一条警告。
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(value) = std::env::var("SIMOS_SCHEDULER") {
            match value.parse() {
                Ok(kind) => config.scheduler = kind,
                Err(e) => warn!("{}, keeping {:?}", e, config.scheduler),
            }
        }
        if let Ok(value) = std::env::var("SIMOS_REPLACEMENT") {
            match value.parse() {
                Ok(policy) => config.replacement = policy,
                Err(e) => warn!("{}, keeping {:?}", e, config.replacement),
            }
        }
        if let Ok(value) = std::env::var("SIMOS_QUANTUM") {
            match value.parse::<u32>() {
                Ok(q) if q > 0 => config.quantum = q,
                _ => warn!(
                    "{}, keeping {}",
                    ConfigError::new("SIMOS_QUANTUM", &value),
                    config.quantum
                ),
            }
        }
        config
    }

    pub fn with_scheduler(mut self, scheduler: SchedulerKind) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn with_replacement(mut self, replacement: ReplacementPolicy) -> Self {
        self.replacement = replacement;
        self
    }

    /// 设置时间片长度，0 会被提升为 1
    pub fn with_quantum(mut self, quantum: u32) -> Self {
        self.quantum = quantum.max(1);
        self
    }

    pub fn with_timer_interval(mut self, interval: Word) -> Self {
        self.timer_interval = interval;
        self
    }

    pub fn with_page_transfer_time(mut self, time: Tick) -> Self {
        self.page_transfer_time = time;
        self
    }

    pub fn with_init_program(mut self, name: &str) -> Self {
        self.init_program = name.to_string();
        self
    }

    pub fn with_trap_handler_program(mut self, name: &str) -> Self {
        self.trap_handler_program = name.to_string();
        self
    }
}
