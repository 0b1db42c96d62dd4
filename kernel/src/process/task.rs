//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 任务控制块 (Task Control Block)
//!
//! 遵循 Linux 的 `struct task_struct` 中与调度有关的部分 (include/linux/sched.h)
//!
//! 关键设计要点：
//! 1. 进程状态取值与经典 Linux 一致
//! 2. counter/priority 构成时间片衰减调度所需的全部信息
//! 3. 每个任务的内核栈由一个宿主线程承载，任务只在持有 CPU 时运行

use std::fmt;
use std::thread::Thread;

use crate::signal::SigSet;

/// 进程标识符
pub type Pid = u32;

/// 0 号任务：空闲任务
pub const IDLE_PID: Pid = 0;

/// 进程状态
///
/// 对应 Linux 的 TASK_RUNNING / TASK_INTERRUPTIBLE / ... (include/linux/sched.h)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum TaskState {
    /// 可运行状态 (TASK_RUNNING)
    /// 进程在 CPU 上运行或等待被调度
    Running = 0,

    /// 可中断睡眠 (TASK_INTERRUPTIBLE)
    /// 等待某个事件，未屏蔽的信号也能把它唤醒
    Interruptible = 1,

    /// 不可中断睡眠 (TASK_UNINTERRUPTIBLE)
    /// 只有显式 wake_up 才能唤醒
    Uninterruptible = 2,

    /// 僵死状态 (TASK_ZOMBIE)
    /// 已退出，等待回收
    Zombie = 3,

    /// 停止状态 (TASK_STOPPED)
    Stopped = 4,
}

impl TaskState {
    /// 是否处于两种睡眠状态之一
    pub fn is_sleeping(self) -> bool {
        matches!(self, TaskState::Interruptible | TaskState::Uninterruptible)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Running => "R",
            TaskState::Interruptible => "S",
            TaskState::Uninterruptible => "D",
            TaskState::Zombie => "Z",
            TaskState::Stopped => "T",
        };
        f.write_str(s)
    }
}

/// 任务控制块
pub struct Task {
    /// 进程 ID
    pub pid: Pid,
    /// 父进程 ID
    pub ppid: Pid,
    /// 进程状态
    pub state: TaskState,
    /// 剩余时间片，每个时钟滴答减一
    pub counter: i32,
    /// 优先级：重算时间片时加到 counter 上
    pub priority: i32,
    /// 挂起的信号
    pub signal: SigSet,
    /// 屏蔽的信号
    pub blocked: SigSet,
    /// 闹钟到期时刻（jiffies，0 表示未设置）
    pub alarm: u64,
    /// 用户态滴答数
    pub utime: u64,
    /// 内核态滴答数
    pub stime: u64,
    /// 创建时刻（jiffies）
    pub start_time: u64,
    /// 退出码
    pub exit_code: i32,
    /// 被唤醒后还要依次唤醒的等待者，栈顶最先
    pub(crate) cascade: Vec<Pid>,
    /// 承载内核栈的宿主线程
    pub(crate) thread: Option<Thread>,
}

impl Task {
    pub fn new(pid: Pid, ppid: Pid, priority: i32, jiffies: u64) -> Self {
        Self {
            pid,
            ppid,
            state: TaskState::Running,
            counter: priority,
            priority,
            signal: SigSet::empty(),
            blocked: SigSet::empty(),
            alarm: 0,
            utime: 0,
            stime: 0,
            start_time: jiffies,
            exit_code: 0,
            cascade: Vec::new(),
            thread: None,
        }
    }

    /// 是否有未被屏蔽的挂起信号
    pub fn signal_pending(&self) -> bool {
        !self.signal.unblocked(self.blocked).is_empty()
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("pid", &self.pid)
            .field("ppid", &self.ppid)
            .field("state", &self.state)
            .field("counter", &self.counter)
            .field("priority", &self.priority)
            .field("signal", &self.signal)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::Signal;

    #[test]
    fn taskstate_values() {
        assert_eq!(TaskState::Running as u32, 0, "TASK_RUNNING should be 0");
        assert_eq!(TaskState::Interruptible as u32, 1, "TASK_INTERRUPTIBLE should be 1");
        assert_eq!(TaskState::Uninterruptible as u32, 2, "TASK_UNINTERRUPTIBLE should be 2");
        assert_eq!(TaskState::Zombie as u32, 3);
        assert_eq!(TaskState::Stopped as u32, 4);
    }

    #[test]
    fn new_task_starts_with_full_slice() {
        let task = Task::new(7, 1, 15, 42);
        assert_eq!(task.state, TaskState::Running);
        assert_eq!(task.counter, 15);
        assert_eq!(task.start_time, 42);
        assert!(!task.signal_pending());
    }

    #[test]
    fn blocked_signal_is_not_pending() {
        let mut task = Task::new(2, 0, 15, 0);
        task.signal = Signal::SIGUSR1.mask();
        task.blocked = Signal::SIGUSR1.mask();
        assert!(!task.signal_pending());
        task.signal |= SigSet::SIGKILL;
        task.blocked |= SigSet::SIGKILL;
        assert!(task.signal_pending());
    }
}
