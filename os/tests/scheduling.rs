mod common;

use common::*;
use simos::config::{ReplacementPolicy, SchedulerKind};
use simos::hal::Irq;
use simos::process::ProcessStatus;
use simos::Config;

fn round_robin() -> Config {
    Config::default()
        .with_scheduler(SchedulerKind::RoundRobin)
        .with_quantum(3)
}

#[test]
fn round_robin_alternates_every_quantum() {
    let mut rig = Rig::boot(round_robin());
    assert_eq!(rig.create_child(), 2);
    assert_eq!(rig.running(), Some(1));

    let mut order = vec![];
    for _ in 0..9 {
        rig.clock();
        order.push(rig.running().unwrap());
    }
    assert_eq!(order, [1, 1, 2, 2, 2, 1, 1, 1, 2]);
    assert_eq!(rig.pcb(1).preemptions, 2);
    assert_eq!(rig.pcb(2).preemptions, 1);
    assert_eq!(rig.kernel.metrics().preemptions, 3);
    assert_eq!(rig.kernel.metrics().irq_counts[Irq::Clock.index()], 10);
}

#[test]
fn round_robin_resumes_saved_registers() {
    let mut rig = Rig::boot(round_robin());
    rig.create_child();
    rig.trap(Irq::Clock, |cx| cx.x = 41);
    rig.clock();
    rig.clock();
    assert_eq!(rig.running(), Some(2));
    assert_eq!(rig.cpu().pc, USER_BASE as i32);
    for _ in 0..3 {
        rig.clock();
    }
    assert_eq!(rig.running(), Some(1));
    assert_eq!(rig.cpu().x, 41);
}

#[test]
fn priority_prefers_early_blockers() {
    let mut rig = Rig::boot(Config::default());
    rig.create_child();
    // init 因缺页立即阻塞过一次：(0.5 + 0) / 2
    assert_eq!(rig.pcb(1).priority, 0.25);
    assert_eq!(rig.pcb(2).priority, 0.5);
    for _ in 0..3 {
        rig.clock();
    }
    // 时间片用完被抢占，但仍是数值最小的就绪进程
    assert_eq!(rig.pcb(1).priority, 0.625);
    assert_eq!(rig.pcb(1).preemptions, 1);
    assert_eq!(rig.running(), Some(2));
}

#[test]
fn priority_ties_go_to_the_lowest_slot() {
    let mut rig = Rig::boot(Config::default());
    assert_eq!(rig.create_child(), 2);
    assert_eq!(rig.create_child(), 3);
    assert_eq!(rig.pcb(2).priority, rig.pcb(3).priority);

    rig.syscall(SYSCALL_WAIT_PROC, 3);
    assert_eq!(rig.status(1), Some(ProcessStatus::Blocked));
    // 平局只由扫描顺序决定
    assert_eq!(rig.running(), Some(2));
}

#[test]
fn only_one_process_is_running() {
    let mut rig = Rig::boot(round_robin().with_replacement(ReplacementPolicy::Fifo));
    rig.create_child();
    rig.create_child();
    for _ in 0..20 {
        rig.clock();
        assert_eq!(rig.kernel.processes().running_count(), 1);
        let current = rig.kernel.processor().current().unwrap();
        assert_eq!(
            rig.kernel.processes().get(current).map(|p| p.status()),
            Some(ProcessStatus::Running)
        );
    }
    assert!(rig.kernel.processes().ready.len() <= 2);
}
