//! # 日志系统模块
//!
//! 实现 `log` crate 的 [`Log`] 接口，把监控程序的事件输出到标准错误。
//! 库内所有代码只使用 `log` 的宏，嵌入方可以改用任何其他实现。
//!
//! ## 功能特性
//!
//! - **多级别日志**: 支持 ERROR、WARN、INFO、DEBUG、TRACE 五个级别
//! - **彩色输出**: 不同级别使用不同颜色
//! - **序号**: 每条日志带单调递增的序号，便于对照中断顺序
//! - **环境配置**: 通过环境变量 `LOG` 控制日志级别
//!
//! ## 日志格式
//!
//! ```text
//! LEVEL [T0001] [module::name] [file.rs:42] message
//! ```
//!
//! ## 颜色方案
//!
//! - 🔴 **ERROR**: 红色 (31)
//! - 🟡 **WARN**: 亮黄色 (93)
//! - 🔵 **INFO**: 蓝色 (34)
//! - 🟢 **DEBUG**: 绿色 (32)
//! - ⚫ **TRACE**: 暗灰色 (90)

use std::sync::atomic::{AtomicUsize, Ordering};

use log::{Level, LevelFilter, Log, Metadata, Record};

/// 简单日志实现
struct SimpleLogger;

impl Log for SimpleLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        // 级别过滤由 `log::set_max_level` 完成
        true
    }

    /// 格式化日志消息并输出到标准错误
    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let color = match record.level() {
            Level::Error => 31,
            Level::Warn => 93,
            Level::Info => 34,
            Level::Debug => 32,
            Level::Trace => 90,
        };
        let location = match (record.file(), record.line()) {
            (Some(file), Some(line)) => {
                let file_name = file.rsplit('/').next().unwrap_or(file);
                format!("{}:{}", file_name, line)
            }
            _ => "unknown".to_string(),
        };
        eprintln!(
            "\u{1B}[{}m{:>5} [T{:>4}] [{}] [{}] {}\u{1B}[0m",
            color,
            record.level(),
            sequence(),
            record.target(),
            location,
            record.args()
        );
    }

    fn flush(&self) {}
}

/// 日志序号计数器
static SEQUENCE: AtomicUsize = AtomicUsize::new(0);

fn sequence() -> usize {
    SEQUENCE.fetch_add(1, Ordering::Relaxed) + 1
}

/// 把 `LOG` 环境变量的值转换为级别，默认 INFO
fn level_from(value: Option<&str>) -> LevelFilter {
    match value {
        Some("ERROR") => LevelFilter::Error,
        Some("WARN") => LevelFilter::Warn,
        Some("INFO") => LevelFilter::Info,
        Some("DEBUG") => LevelFilter::Debug,
        Some("TRACE") => LevelFilter::Trace,
        _ => LevelFilter::Info,
    }
}

/// 初始化日志系统
///
/// 日志级别由运行时环境变量 `LOG` 决定：
///
/// - `LOG=ERROR` - 只输出错误级别日志
/// - `LOG=WARN` - 输出警告及以上级别日志
/// - `LOG=INFO` - 输出信息及以上级别日志（默认）
/// - `LOG=DEBUG` - 输出调试及以上级别日志
/// - `LOG=TRACE` - 输出所有级别日志
///
/// 已经安装过日志实现时（包括其他 crate 安装的）不做任何事。
pub fn init() {
    static LOGGER: SimpleLogger = SimpleLogger;

    if log::set_logger(&LOGGER).is_ok() {
        let value = std::env::var("LOG").ok();
        log::set_max_level(level_from(value.as_deref()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_defaults_to_info() {
        assert_eq!(level_from(None), LevelFilter::Info);
        assert_eq!(level_from(Some("verbose")), LevelFilter::Info);
        assert_eq!(level_from(Some("TRACE")), LevelFilter::Trace);
    }

    #[test]
    fn sequence_is_increasing() {
        let a = sequence();
        let b = sequence();
        assert!(b > a);
    }
}
