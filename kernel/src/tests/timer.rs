//! 测试：内核定时器

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::{boot, config, journal};
use crate::process::task::TaskState;
use crate::process::wait::WaitQueue;
use crate::sched::sched::Privilege;

#[test]
fn non_positive_delay_runs_immediately() {
    println!("test: add_timer(0) and add_timer(-3)...");
    let (kernel, _disk) = boot(config(4));
    let fired = Arc::new(AtomicUsize::new(0));
    for delay in [0, -3] {
        let fired = fired.clone();
        kernel.add_timer(delay, move |_| {
            fired.fetch_add(1, Ordering::SeqCst);
        });
    }
    assert_eq!(fired.load(Ordering::SeqCst), 2);
    assert_eq!(kernel.pending_timers(), 0);
}

#[test]
fn fires_on_the_fifth_tick() {
    println!("test: add_timer(5) + 5 ticks...");
    let (kernel, _disk) = boot(config(4));
    let fired = Arc::new(AtomicUsize::new(0));
    {
        let fired = fired.clone();
        kernel.add_timer(5, move |k| {
            fired.store(k.jiffies() as usize, Ordering::SeqCst);
        });
    }
    for _ in 0..4 {
        kernel.do_timer(Privilege::Kernel);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
    kernel.do_timer(Privilege::Kernel);
    assert_eq!(fired.load(Ordering::SeqCst), 5);
    assert_eq!(kernel.pending_timers(), 0);
    println!("test:    SUCCESS");
}

#[test]
fn equal_deadlines_fire_in_arrival_order() {
    println!("test: timers sharing a deadline...");
    let (kernel, _disk) = boot(config(4));
    let order = journal();
    for (delay, tag) in [(3, 'a'), (1, 'b'), (3, 'c'), (2, 'd')] {
        let order = order.clone();
        kernel.add_timer(delay, move |_| order.lock().push(tag));
    }
    assert_eq!(kernel.pending_timers(), 4);
    for _ in 0..3 {
        kernel.do_timer(Privilege::Kernel);
    }
    assert_eq!(*order.lock(), vec!['b', 'd', 'a', 'c']);
}

#[test]
fn callback_wakes_a_sleeping_task() {
    println!("test: a timer callback calls wake_up...");
    let (kernel, _disk) = boot(config(4));
    let wq = Arc::new(WaitQueue::new());

    let pid = {
        let wq = wq.clone();
        kernel
            .spawn(move |k| {
                k.sleep_on(&wq);
                k.jiffies() as i32
            })
            .unwrap()
    };
    kernel.run_until_idle();
    assert_eq!(kernel.task_state(pid), Some(TaskState::Uninterruptible));

    kernel.add_timer(3, move |k| k.wake_up(&wq));
    for _ in 0..3 {
        kernel.do_timer(Privilege::Kernel);
    }
    kernel.run_until_idle();
    assert_eq!(kernel.reap(pid), Ok(3));
}

#[test]
fn timer_added_from_a_task_fires_while_it_sleeps() {
    println!("test: a task arms a timer and sleeps until it fires...");
    let (kernel, _disk) = boot(config(4));
    let pid = kernel
        .spawn(|k| {
            let wq = Arc::new(WaitQueue::new());
            let waker = wq.clone();
            k.add_timer(2, move |k| k.wake_up(&waker));
            // 自己驱动时钟：内核态滴答不会切走
            k.do_timer(Privilege::Kernel);
            let pending = k.pending_timers() as i32;
            k.sleep_on(&wq);
            pending
        })
        .unwrap();
    kernel.run_until_idle();
    assert_eq!(kernel.task_state(pid), Some(TaskState::Uninterruptible));
    kernel.do_timer(Privilege::Kernel);
    kernel.run_until_idle();
    assert_eq!(kernel.reap(pid), Ok(1));
}

#[test]
#[should_panic(expected = "No more time requests free")]
fn exhausting_the_timer_pool_is_fatal() {
    println!("test: more timers than time_requests...");
    let (kernel, _disk) = boot(config(4));
    let capacity = kernel.config().timer.time_requests;
    for i in 0..=capacity {
        kernel.add_timer(i as i64 + 1, |_| {});
    }
}
