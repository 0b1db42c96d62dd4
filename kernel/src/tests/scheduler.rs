//! 测试：时间片调度与进程管理
//!
//! 测试内容：
//! 1. 用户态滴答耗尽时间片时轮转，内核态滴答不抢占
//! 2. alarm() + pause()
//! 3. nice()、spawn() 的边界、reap()、SIGCHLD
//! 4. 任务 panic 导致内核停机

use std::sync::Arc;

use super::{boot, config, journal};
use crate::errno::Errno;
use crate::process::task::{Pid, TaskState};
use crate::sched::sched::Privilege;
use crate::signal::Signal;

/// 两个优先级为 2 的任务各执行 4 次 "记录 pid + 时钟滴答"
fn tick_twice_two_tasks(cpl: Privilege) -> (Vec<Pid>, [Pid; 2], u64) {
    let (kernel, _disk) = boot(config(4));
    let trace = journal();

    let mut pids = [0; 2];
    for pid in pids.iter_mut() {
        let trace = trace.clone();
        *pid = kernel
            .spawn_with_priority(2, move |k| {
                for _ in 0..4 {
                    trace.lock().push(k.getpid());
                    k.do_timer(cpl);
                }
                0
            })
            .unwrap();
    }
    kernel.run_until_idle();

    let utime = match cpl {
        Privilege::User => kernel.task_times(pids[1]).map(|(u, _)| u),
        Privilege::Kernel => kernel.task_times(pids[1]).map(|(_, s)| s),
    };
    assert_eq!(kernel.jiffies(), 8);
    let trace = trace.lock().clone();
    (trace, pids, utime.unwrap_or(0))
}

#[test]
fn user_ticks_rotate_tasks() {
    println!("test: user-mode ticks exhaust slices and rotate...");
    let (trace, [a, b], ticks) = tick_twice_two_tasks(Privilege::User);
    // 相同 counter 时任务号大的先运行
    assert_eq!(trace, vec![b, b, a, a, b, b, a, a]);
    assert_eq!(ticks, 4);
    println!("test:    SUCCESS - {:?}", trace);
}

#[test]
fn kernel_ticks_do_not_preempt() {
    println!("test: kernel-mode ticks never reschedule...");
    let (trace, [a, b], ticks) = tick_twice_two_tasks(Privilege::Kernel);
    assert_eq!(trace, vec![b, b, b, b, a, a, a, a]);
    assert_eq!(ticks, 4);
    println!("test:    SUCCESS - {:?}", trace);
}

#[test]
fn counter_never_goes_negative() {
    println!("test: counter is clamped at zero...");
    let (kernel, _disk) = boot(config(4));
    let pid = kernel
        .spawn_with_priority(1, |k| {
            for _ in 0..3 {
                k.do_timer(Privilege::Kernel);
            }
            k.task_counter(k.getpid()).unwrap_or(-1)
        })
        .unwrap();
    kernel.run_until_idle();
    assert_eq!(kernel.reap(pid), Ok(0));
}

#[test]
fn alarm_wakes_paused_task() {
    println!("test: alarm(1) + pause()...");
    let (kernel, _disk) = boot(config(4));
    let hz = kernel.config().sched.hz;

    let pid = kernel
        .spawn(|k| {
            assert_eq!(k.alarm(1), 0);
            k.pause();
            if k.signal_pending().has(Signal::SIGALRM) { 14 } else { 0 }
        })
        .unwrap();

    kernel.run_until_idle();
    assert_eq!(kernel.task_state(pid), Some(TaskState::Interruptible));

    // 闹钟在 jiffies 严格大于到期时间后才生效
    for _ in 0..hz {
        kernel.do_timer(Privilege::Kernel);
    }
    kernel.run_until_idle();
    assert_eq!(kernel.task_state(pid), Some(TaskState::Interruptible));

    kernel.do_timer(Privilege::Kernel);
    kernel.run_until_idle();
    assert_eq!(kernel.reap(pid), Ok(14));
    println!("test:    SUCCESS - woke after {} ticks", kernel.jiffies());
}

#[test]
fn alarm_returns_remaining_seconds() {
    println!("test: re-arming an alarm returns what was left...");
    let (kernel, _disk) = boot(config(4));
    let pid = kernel
        .spawn(|k| {
            k.alarm(5);
            let hz = k.config().sched.hz;
            for _ in 0..hz * 2 {
                k.do_timer(Privilege::Kernel);
            }
            let left = k.alarm(0);
            left as i32
        })
        .unwrap();
    kernel.run_until_idle();
    assert_eq!(kernel.reap(pid), Ok(3));
}

#[test]
fn nice_keeps_priority_positive() {
    println!("test: nice()...");
    let (kernel, _disk) = boot(config(4));
    let results = journal();
    let pid = {
        let results = results.clone();
        kernel
            .spawn_with_priority(15, move |k| {
                let mut out = results.lock();
                out.push(k.nice(5));
                out.push(k.nice(100));
                out.push(k.nice(-5));
                0
            })
            .unwrap()
    };
    kernel.run_until_idle();
    assert_eq!(*results.lock(), vec![10, 10, 15]);
    assert_eq!(kernel.reap(pid), Ok(0));
}

#[test]
fn spawn_limits() {
    println!("test: spawn() on a full task table...");
    let mut cfg = config(4);
    cfg.sched.nr_tasks = 3;
    let (kernel, _disk) = boot(cfg);

    assert_eq!(kernel.spawn_with_priority(0, |_| 0), Err(Errno::InvalidArgument));
    let first = kernel.spawn(|_| 1).unwrap();
    let second = kernel.spawn(|_| 2).unwrap();
    assert_eq!(kernel.spawn(|_| 3), Err(Errno::TryAgain));

    // 还没运行过的任务不能回收
    assert_eq!(kernel.reap(first), Err(Errno::TryAgain));
    kernel.run_until_idle();
    assert_eq!(kernel.reap(first), Ok(1));
    assert_eq!(kernel.reap(second), Ok(2));
    assert_eq!(kernel.reap(first), Err(Errno::NoSuchProcess));
    assert_eq!(kernel.reap(0), Err(Errno::OperationNotPermitted));

    // 槽位释放后可以再创建
    let third = kernel.spawn(|_| 3).unwrap();
    kernel.run_until_idle();
    assert_eq!(kernel.reap(third), Ok(3));
    println!("test:    SUCCESS");
}

#[test]
fn parent_is_signalled_when_child_exits() {
    println!("test: child exit sends SIGCHLD to a pausing parent...");
    let (kernel, _disk) = boot(config(4));
    let child_pid = journal();

    let parent = {
        let spawner = Arc::clone(&kernel);
        let child_pid = child_pid.clone();
        kernel
            .spawn_with_priority(20, move |k| {
                let me = k.getpid();
                let child = spawner
                    .spawn_with_priority(10, move |k| if k.getppid() == me { 0 } else { 1 })
                    .unwrap_or(0);
                child_pid.lock().push(child);
                k.pause();
                if k.signal_pending().has(Signal::SIGCHLD) { 17 } else { 0 }
            })
            .unwrap()
    };

    kernel.run_until_idle();
    assert_eq!(kernel.reap(parent), Ok(17));
    let child = child_pid.lock()[0];
    assert_ne!(child, 0);
    assert_eq!(kernel.reap(child), Ok(0));
    println!("test:    SUCCESS");
}

#[test]
fn idle_runs_when_everyone_sleeps() {
    println!("test: only idle is left to run...");
    let (kernel, _disk) = boot(config(4));
    let pid = kernel
        .spawn(|k| {
            k.pause();
            0
        })
        .unwrap();
    kernel.run_until_idle();
    assert_eq!(kernel.getpid(), 0);
    assert_eq!(kernel.task_state(pid), Some(TaskState::Interruptible));
    kernel.show_stat();

    kernel.kill(pid, Signal::SIGTERM).unwrap();
    kernel.run_until_idle();
    assert_eq!(kernel.reap(pid), Ok(0));
}

#[test]
#[should_panic(expected = "kernel halted")]
fn panic_in_task_halts_kernel() {
    println!("test: a task panics...");
    let (kernel, _disk) = boot(config(4));
    kernel.spawn(|_| panic!("bad task")).unwrap();
    kernel.run_until_idle();
}
