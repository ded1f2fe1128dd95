//! # 运行统计与最终报告
//!
//! [`Metrics`] 汇总全局计数，[`Report`] 在根进程结束时生成，
//! 以文本形式输出到日志。

use core::fmt;

use crate::hal::{IRQ_COUNT, Irq, Tick};
use crate::process::{Pid, ProcessControlBlock, ProcessStatus, STATUS_COUNT};

/// 全局计数
#[derive(Clone, Debug, Default)]
pub struct Metrics {
    pub processes_created: u32,
    pub preemptions: u32,
    pub idle_time: Tick,
    idle_since: Option<Tick>,
    pub irq_counts: [u64; IRQ_COUNT],
    pub page_faults: u64,
    pub page_transfers: u64,
    /// 已被回收的进程，槽位复用后仍保留在报告中
    finished: Vec<ProcessSummary>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count_irq(&mut self, irq: Irq) {
        self.irq_counts[irq.index()] += 1;
    }

    /// 开始空闲计时，已经在空闲中则不做任何事
    pub fn enter_idle(&mut self, now: Tick) {
        if self.idle_since.is_none() {
            self.idle_since = Some(now);
        }
    }

    /// 结束空闲计时并累计
    pub fn leave_idle(&mut self, now: Tick) {
        if let Some(start) = self.idle_since.take() {
            self.idle_time += now.saturating_sub(start);
        }
    }

    pub fn is_idle(&self) -> bool {
        self.idle_since.is_some()
    }

    /// 截至 `now` 的空闲时间，包括尚未结束的空闲区间
    pub fn idle_time_at(&self, now: Tick) -> Tick {
        self.idle_time + self.idle_since.map_or(0, |start| now.saturating_sub(start))
    }

    pub fn record_finished(&mut self, summary: ProcessSummary) {
        self.finished.push(summary);
    }

    pub fn finished(&self) -> &[ProcessSummary] {
        &self.finished
    }

    /// 生成报告，`live` 是进程表中尚未回收的进程
    pub fn report<'a>(
        &self,
        now: Tick,
        live: impl Iterator<Item = &'a ProcessControlBlock>,
    ) -> Report {
        let mut processes = self.finished.clone();
        processes.extend(
            live.filter(|p| !p.is_free())
                .map(|p| ProcessSummary::capture(p, now)),
        );
        processes.sort_by_key(|p| p.pid);
        Report {
            processes_created: self.processes_created,
            total_time: now,
            idle_time: self.idle_time_at(now),
            preemptions: self.preemptions,
            irq_counts: self.irq_counts,
            page_faults: self.page_faults,
            page_transfers: self.page_transfers,
            processes,
        }
    }
}

/// 单个进程的统计快照
#[derive(Clone, PartialEq, Debug)]
pub struct ProcessSummary {
    pub pid: Pid,
    pub turnaround: Tick,
    pub preemptions: u32,
    pub visits: [u32; STATUS_COUNT],
    pub time_in: [Tick; STATUS_COUNT],
    /// 平均响应时间：就绪等待总时间 / 运行次数
    pub mean_response: f64,
    pub page_faults: u32,
    pub secondary_pages: usize,
}

impl ProcessSummary {
    /// 在 `now` 时刻为进程拍快照，当前状态已停留的时间计入该状态
    pub fn capture(pcb: &ProcessControlBlock, now: Tick) -> Self {
        let mut time_in = pcb.time_in;
        time_in[pcb.status().index()] += pcb.time_in_current(now);
        let end = pcb.terminated_at.unwrap_or(now);
        let runs = pcb.visits[ProcessStatus::Running.index()];
        let mean_response = if runs > 0 {
            pcb.ready_time as f64 / runs as f64
        } else {
            0.0
        };
        Self {
            pid: pcb.pid,
            turnaround: end.saturating_sub(pcb.created_at),
            preemptions: pcb.preemptions,
            visits: pcb.visits,
            time_in,
            mean_response,
            page_faults: pcb.page_faults,
            secondary_pages: pcb.secondary_pages,
        }
    }
}

/// 最终报告
#[derive(Clone, Debug)]
pub struct Report {
    pub processes_created: u32,
    pub total_time: Tick,
    pub idle_time: Tick,
    pub preemptions: u32,
    pub irq_counts: [u64; IRQ_COUNT],
    pub page_faults: u64,
    pub page_transfers: u64,
    pub processes: Vec<ProcessSummary>,
}

impl Report {
    pub fn idle_percent(&self) -> f64 {
        if self.total_time == 0 {
            0.0
        } else {
            self.idle_time as f64 * 100.0 / self.total_time as f64
        }
    }

    pub fn process(&self, pid: Pid) -> Option<&ProcessSummary> {
        self.processes.iter().find(|p| p.pid == pid)
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "==== final report ====")?;
        writeln!(f, "processes created: {}", self.processes_created)?;
        writeln!(f, "total time: {}", self.total_time)?;
        writeln!(
            f,
            "idle time: {} ({:.2}%)",
            self.idle_time,
            self.idle_percent()
        )?;
        writeln!(f, "preemptions: {}", self.preemptions)?;
        writeln!(f, "page faults: {}", self.page_faults)?;
        writeln!(f, "page transfers: {}", self.page_transfers)?;
        writeln!(f, "interrupts:")?;
        for irq in Irq::ALL {
            writeln!(f, "  {:<12} {}", irq.name(), self.irq_counts[irq.index()])?;
        }
        for p in &self.processes {
            writeln!(
                f,
                "pid {}: turnaround {}, preemptions {}, mean response {:.2}, page faults {}, secondary pages {}",
                p.pid, p.turnaround, p.preemptions, p.mean_response, p.page_faults, p.secondary_pages
            )?;
            for status in ProcessStatus::ALL {
                if status == ProcessStatus::Free {
                    continue;
                }
                writeln!(
                    f,
                    "  {:<10} visits {:>4}  time {:>8}",
                    status.name(),
                    p.visits[status.index()],
                    p.time_in[status.index()]
                )?;
            }
        }
        write!(f, "======================")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::Terminal;

    #[test]
    fn idle_is_reentrant_and_includes_open_span() {
        let mut m = Metrics::new();
        m.enter_idle(0);
        m.enter_idle(10);
        m.leave_idle(30);
        assert_eq!(m.idle_time, 30);
        m.enter_idle(50);
        assert_eq!(m.idle_time_at(70), 50);
        m.leave_idle(80);
        m.leave_idle(90);
        assert_eq!(m.idle_time, 60);
    }

    #[test]
    fn summary_includes_current_state_and_response() {
        let mut pcb = ProcessControlBlock::empty();
        pcb.reset(3, Terminal::A, 100);
        pcb.set_status(ProcessStatus::Ready, 100);
        pcb.set_status(ProcessStatus::Running, 120);
        pcb.set_status(ProcessStatus::Ready, 150);
        pcb.set_status(ProcessStatus::Running, 160);
        let s = ProcessSummary::capture(&pcb, 200);
        assert_eq!(s.turnaround, 100);
        assert_eq!(s.time_in[ProcessStatus::Running.index()], 70);
        assert_eq!(s.mean_response, 15.0);
    }

    #[test]
    fn report_lists_finished_and_live_processes() {
        let mut m = Metrics::new();
        m.count_irq(Irq::Clock);
        m.count_irq(Irq::Clock);
        let mut dead = ProcessControlBlock::empty();
        dead.reset(2, Terminal::B, 0);
        dead.set_status(ProcessStatus::Terminated, 40);
        m.record_finished(ProcessSummary::capture(&dead, 40));
        let mut live = ProcessControlBlock::empty();
        live.reset(1, Terminal::A, 0);
        live.set_status(ProcessStatus::Running, 0);
        let report = m.report(100, [live].iter());
        assert_eq!(report.processes.iter().map(|p| p.pid).collect::<Vec<_>>(), [1, 2]);
        assert_eq!(report.process(2).map(|p| p.turnaround), Some(40));
        let text = report.to_string();
        assert_eq!(report.irq_counts[Irq::Clock.index()], 2);
        assert!(text.contains("processes created: 0"));
        assert!(text.contains("pid 2: turnaround 40"));
    }
}
