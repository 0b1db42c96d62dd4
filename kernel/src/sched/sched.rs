//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 调度器实现
//!
//! 单 CPU、内核态不可抢占的时间片衰减调度器 (kernel/sched.c)：
//!
//! - 每个任务带有 `counter`（剩余时间片）和 `priority`
//! - 调度入口: schedule() -> pick_next_task() -> context_switch()
//! - 选择 counter 最大的可运行任务；全部耗尽时按
//!   `counter = counter / 2 + priority` 重算后再选
//! - 时钟中断 do_timer() 只在用户态滴答耗尽时间片时触发调度
//!
//! 每个任务的内核栈是一个宿主线程，任何时刻只有 `current` 对应的线程
//! 在运行，其余线程都停在 `wait_for_cpu()` 里。切换就是改写 `current`
//! 后 unpark 下一个线程、park 自己。自旋锁从不跨越切换持有。

use std::thread::{self, Thread};

use log::{debug, info, trace};

use crate::kconfig::SchedConfig;
use crate::kernel::Kernel;
use crate::kernel_panic;
use crate::process::task::{Pid, Task, TaskState, IDLE_PID};
use crate::process::wait::WaitQueue;
use crate::signal::SigSet;

/// 时钟中断发生时 CPU 所处的特权级
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Privilege {
    /// 内核态：只记账，不触发调度
    Kernel,
    /// 用户态：时间片耗尽时调度
    User,
}

/// 任务表与运行状态
pub struct RunQueue {
    /// 任务表，下标即任务号 (task[NR_TASKS])
    pub(crate) task: Vec<Option<Task>>,
    /// 当前持有 CPU 的任务号
    pub(crate) current: usize,
    /// 自启动以来的时钟滴答数
    pub(crate) jiffies: u64,
    /// 每秒滴答数
    pub(crate) hz: u64,
    /// 新任务的默认优先级
    pub(crate) default_priority: i32,
    /// 最近分配的 pid
    last_pid: Pid,
}

impl RunQueue {
    /// 创建任务表，调用者线程成为 0 号空闲任务
    pub fn new(config: &SchedConfig, idle_thread: Thread) -> Self {
        let mut task: Vec<Option<Task>> = (0..config.nr_tasks).map(|_| None).collect();
        let mut idle = Task::new(IDLE_PID, IDLE_PID, config.idle_priority, 0);
        idle.thread = Some(idle_thread);
        task[0] = Some(idle);
        Self {
            task,
            current: 0,
            jiffies: 0,
            hz: config.hz,
            default_priority: config.default_priority,
            last_pid: IDLE_PID,
        }
    }

    /// 按 pid 查找任务号
    pub(crate) fn find_nr(&self, pid: Pid) -> Option<usize> {
        self.task.iter().position(|t| t.as_ref().is_some_and(|t| t.pid == pid))
    }

    pub(crate) fn task_by_pid(&self, pid: Pid) -> Option<&Task> {
        self.task.iter().flatten().find(|t| t.pid == pid)
    }

    pub(crate) fn task_by_pid_mut(&mut self, pid: Pid) -> Option<&mut Task> {
        self.task.iter_mut().flatten().find(|t| t.pid == pid)
    }

    /// 当前任务
    pub(crate) fn current_task(&self) -> &Task {
        match self.task[self.current].as_ref() {
            Some(task) => task,
            None => kernel_panic!("current task slot {} is empty", self.current),
        }
    }

    pub(crate) fn current_task_mut(&mut self) -> &mut Task {
        let nr = self.current;
        match self.task[nr].as_mut() {
            Some(task) => task,
            None => kernel_panic!("current task slot {} is empty", nr),
        }
    }

    /// 分配一个未使用的 pid
    pub(crate) fn alloc_pid(&mut self) -> Pid {
        loop {
            self.last_pid = self.last_pid.wrapping_add(1);
            if self.last_pid == IDLE_PID {
                continue;
            }
            if self.find_nr(self.last_pid).is_none() {
                return self.last_pid;
            }
        }
    }

    /// 除空闲任务外处于 Running 状态的任务数
    pub fn nr_running(&self) -> usize {
        self.task.iter().skip(1).flatten().filter(|t| t.state == TaskState::Running).count()
    }

    /// 调度前的信号检查
    ///
    /// 到期的闹钟变成 SIGALRM；有未屏蔽信号的可中断睡眠任务被唤醒。
    pub(crate) fn sweep_signals(&mut self) {
        let jiffies = self.jiffies;
        for task in self.task.iter_mut().flatten() {
            if task.alarm != 0 && task.alarm < jiffies {
                task.signal |= SigSet::SIGALRM;
                task.alarm = 0;
            }
            if task.state == TaskState::Interruptible && task.signal_pending() {
                task.state = TaskState::Running;
            }
        }
    }

    /// 选择下一个运行的任务
    ///
    /// 从高任务号向低扫描，counter 严格更大才替换，因此相同 counter
    /// 时任务号大的胜出，空闲任务永远排在最后。没有任务剩余时间片时
    /// 重算所有任务的 counter 再扫描；除空闲任务外没有可运行任务时
    /// 直接返回空闲任务。
    pub(crate) fn pick_next_task(&mut self) -> usize {
        loop {
            let mut next = 0;
            let mut c = -1;
            for (nr, slot) in self.task.iter().enumerate().rev() {
                if let Some(task) = slot {
                    if task.state == TaskState::Running && task.counter > c {
                        c = task.counter;
                        next = nr;
                    }
                }
            }
            if c > 0 {
                return next;
            }
            if self.nr_running() == 0 {
                return 0;
            }
            for task in self.task.iter_mut().flatten() {
                task.counter = (task.counter >> 1) + task.priority;
            }
        }
    }

    /// 唤醒 `pid`，并把 `cascade` 交给它继续唤醒
    ///
    /// 已经不存在的任务被跳过，由级联中的下一个顶替。
    pub(crate) fn wake_with_cascade(&mut self, pid: Pid, mut cascade: Vec<Pid>) {
        let mut pid = pid;
        loop {
            if let Some(task) = self.task_by_pid_mut(pid) {
                if task.state.is_sleeping() {
                    task.state = TaskState::Running;
                }
                cascade.append(&mut task.cascade);
                task.cascade = cascade;
                return;
            }
            match cascade.pop() {
                Some(next) => pid = next,
                None => return,
            }
        }
    }

    pub(crate) fn thread_of(&self, nr: usize) -> Thread {
        match self.task[nr].as_ref().and_then(|t| t.thread.clone()) {
            Some(thread) => thread,
            None => kernel_panic!("task[{}] has no kernel stack", nr),
        }
    }
}

impl Kernel {
    /// 主动调度
    ///
    /// 对应 Linux 的 schedule()。返回时调用者已重新获得 CPU。
    pub fn schedule(&self) {
        let prev = self.sched.lock().current;
        if let Some(next) = self.pick_and_switch() {
            next.unpark();
            self.wait_for_cpu(prev);
        }
    }

    /// 选出下一个任务并把 `current` 指向它
    ///
    /// 需要切换时返回下一个任务的线程，由调用者在锁外 unpark。
    pub(crate) fn pick_and_switch(&self) -> Option<Thread> {
        let mut rq = self.sched.lock();
        rq.sweep_signals();
        let next = rq.pick_next_task();
        let prev = rq.current;
        if next == prev {
            return None;
        }
        trace!("context_switch: task[{}] -> task[{}]", prev, next);
        rq.current = next;
        Some(rq.thread_of(next))
    }

    /// 停在这里直到任务 `nr` 重新持有 CPU
    pub(crate) fn wait_for_cpu(&self, nr: usize) {
        while self.sched.lock().current != nr {
            thread::park();
        }
        if nr == 0 {
            self.check_halted();
        }
    }

    /// 记录当前任务进入睡眠并加入等待队列
    fn prepare_to_wait(&self, wq: &WaitQueue, state: TaskState) -> Pid {
        let mut rq = self.sched.lock();
        if rq.current == 0 {
            drop(rq);
            kernel_panic!("task[0] trying to sleep");
        }
        let task = rq.current_task_mut();
        task.state = state;
        let pid = task.pid;
        wq.push(pid);
        pid
    }

    /// 睡眠结束：若仍挂在队列里（被信号唤醒），把下面的等待者收进级联；
    /// 然后唤醒级联中的下一个
    fn finish_wait(&self, wq: &WaitQueue, pid: Pid) {
        let older = wq.detach(pid).unwrap_or_default();
        let mut rq = self.sched.lock();
        let task = rq.current_task_mut();
        task.state = TaskState::Running;
        let mut cascade = older;
        cascade.append(&mut task.cascade);
        if let Some(next) = cascade.pop() {
            debug!("wake cascade: pid {} -> pid {}", pid, next);
            rq.wake_with_cascade(next, cascade);
        }
    }

    /// 不可中断睡眠
    ///
    /// 对应 Linux 的 sleep_on()。只有 wake_up() 能唤醒；返回前负责唤醒
    /// 比自己更早睡在同一队列上的任务。
    pub fn sleep_on(&self, wq: &WaitQueue) {
        let pid = self.prepare_to_wait(wq, TaskState::Uninterruptible);
        self.schedule();
        self.finish_wait(wq, pid);
    }

    /// 可中断睡眠
    ///
    /// 对应 Linux 的 interruptible_sleep_on()。被信号唤醒时，如果队列里
    /// 还有比自己晚到的任务，先唤醒队首并继续睡，直到后来者都离开。
    pub fn interruptible_sleep_on(&self, wq: &WaitQueue) {
        let pid = self.prepare_to_wait(wq, TaskState::Interruptible);
        loop {
            self.schedule();
            match wq.depth_of(pid) {
                Some(depth) if depth > 0 => {
                    let mut rq = self.sched.lock();
                    if let Some(top) = wq.top() {
                        if let Some(task) = rq.task_by_pid_mut(top) {
                            if task.state.is_sleeping() {
                                task.state = TaskState::Running;
                            }
                        }
                    }
                    // 信号仍挂起，下次调度还会选中自己；让出时间片以免饿死队首
                    let me = rq.current_task_mut();
                    me.state = TaskState::Interruptible;
                    me.counter = 0;
                }
                _ => break,
            }
        }
        self.finish_wait(wq, pid);
    }

    /// 唤醒等待队列
    ///
    /// 对应 Linux 的 wake_up()。只唤醒最后到达的等待者，其余等待者由它
    /// 在睡眠调用返回时逐个接力唤醒。
    pub fn wake_up(&self, wq: &WaitQueue) {
        let mut waiters = wq.take_all();
        if let Some(top) = waiters.pop() {
            trace!("wake_up: pid {} ({} more in cascade)", top, waiters.len());
            self.sched.lock().wake_with_cascade(top, waiters);
        }
    }

    /// 时钟中断处理
    ///
    /// 对应 Linux 的 do_timer()：记账、推进定时器、轮询块设备、
    /// 递减时间片；只有用户态滴答耗尽时间片才调度。
    pub fn do_timer(&self, cpl: Privilege) {
        {
            let mut rq = self.sched.lock();
            rq.jiffies += 1;
            let task = rq.current_task_mut();
            match cpl {
                Privilege::User => task.utime += 1,
                Privilege::Kernel => task.stime += 1,
            }
        }

        self.run_timers();
        self.do_block_irq();

        let resched = {
            let mut rq = self.sched.lock();
            let task = rq.current_task_mut();
            task.counter -= 1;
            if task.counter > 0 {
                false
            } else {
                task.counter = 0;
                cpl == Privilege::User
            }
        };
        if resched {
            self.schedule();
        }
    }

    /// 等待信号
    ///
    /// 对应 Linux 的 sys_pause()。空闲任务调用时只是让出 CPU。
    pub fn pause(&self) {
        {
            let mut rq = self.sched.lock();
            if rq.current != 0 {
                rq.current_task_mut().state = TaskState::Interruptible;
            }
        }
        self.schedule();
    }

    /// 设置闹钟，返回上一个闹钟剩余的秒数
    ///
    /// 对应 Linux 的 sys_alarm()。`seconds == 0` 取消闹钟。
    pub fn alarm(&self, seconds: u64) -> u64 {
        let mut rq = self.sched.lock();
        let (jiffies, hz) = (rq.jiffies, rq.hz);
        let task = rq.current_task_mut();
        let old = if task.alarm > jiffies { (task.alarm - jiffies) / hz } else { 0 };
        task.alarm = if seconds > 0 { jiffies + seconds * hz } else { 0 };
        old
    }

    /// 降低（或在结果仍为正时升高）当前任务的优先级，返回新优先级
    ///
    /// 对应 Linux 的 sys_nice()
    pub fn nice(&self, increment: i32) -> i32 {
        let mut rq = self.sched.lock();
        let task = rq.current_task_mut();
        if task.priority - increment > 0 {
            task.priority -= increment;
        }
        task.priority
    }

    pub fn getpid(&self) -> Pid {
        self.sched.lock().current_task().pid
    }

    pub fn getppid(&self) -> Pid {
        self.sched.lock().current_task().ppid
    }

    /// 当前任务挂起的信号
    pub fn signal_pending(&self) -> SigSet {
        self.sched.lock().current_task().signal
    }

    /// 清除当前任务挂起的信号
    pub fn clear_signals(&self, mask: SigSet) {
        let mut rq = self.sched.lock();
        let task = rq.current_task_mut();
        task.signal = SigSet::from_bits_retain(task.signal.bits() & !mask.bits());
    }

    pub fn jiffies(&self) -> u64 {
        self.sched.lock().jiffies
    }

    pub fn task_state(&self, pid: Pid) -> Option<TaskState> {
        self.sched.lock().task_by_pid(pid).map(|t| t.state)
    }

    pub fn task_counter(&self, pid: Pid) -> Option<i32> {
        self.sched.lock().task_by_pid(pid).map(|t| t.counter)
    }

    /// 用户态/内核态滴答数
    pub fn task_times(&self, pid: Pid) -> Option<(u64, u64)> {
        self.sched.lock().task_by_pid(pid).map(|t| (t.utime, t.stime))
    }

    /// 打印任务表
    ///
    /// 对应 Linux 的 show_stat()
    pub fn show_stat(&self) {
        let rq = self.sched.lock();
        for (nr, task) in rq.task.iter().enumerate() {
            if let Some(task) = task {
                info!(
                    "{:>2}: pid={} ppid={} state={} counter={} priority={} utime={} stime={}",
                    nr, task.pid, task.ppid, task.state, task.counter, task.priority,
                    task.utime, task.stime
                );
            }
        }
    }

    /// 空闲任务主循环
    ///
    /// 投递块设备完成事件，只要还有别的任务可运行就让出 CPU；没有可运行
    /// 任务且没有未完成的 I/O 时返回。
    pub fn run_until_idle(&self) {
        if self.sched.lock().current != 0 {
            kernel_panic!("run_until_idle called outside the idle task");
        }
        loop {
            self.check_halted();
            let delivered = self.do_block_irq();
            let runnable = {
                let mut rq = self.sched.lock();
                rq.sweep_signals();
                let n = rq.nr_running();
                if n > 0 {
                    // 空闲任务放弃剩余时间片
                    rq.current_task_mut().counter = 0;
                }
                n
            };
            if runnable > 0 {
                self.schedule();
                continue;
            }
            if delivered == 0 && self.blk_pending() == 0 {
                break;
            }
        }
    }
}
