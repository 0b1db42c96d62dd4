//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 任务退出、回收与信号发送
//!
//! 对应经典 Linux 的 kernel/exit.c：do_exit() 把任务变成僵尸并让出
//! CPU，reap() 释放僵尸的任务槽，kill() 只负责把信号挂到目标任务上。

use std::any::Any;

use log::{debug, error};

use crate::errno::Errno;
use crate::kernel::Kernel;
use crate::process::task::{Pid, TaskState};
use crate::signal::{SigSet, Signal};

impl Kernel {
    /// 当前任务退出
    ///
    /// 之后当前线程不再持有 CPU，调用者（任务线程）随即结束。
    pub(crate) fn do_exit(&self, code: i32) {
        {
            let mut rq = self.sched.lock();
            let task = rq.current_task_mut();
            task.state = TaskState::Zombie;
            task.exit_code = code;
            task.thread = None;
            let (pid, ppid) = (task.pid, task.ppid);
            let mut cascade = core::mem::take(&mut task.cascade);
            debug!("do_exit: pid {} code {}", pid, code);

            // 还没来得及接力的等待者不能被丢下
            if let Some(next) = cascade.pop() {
                rq.wake_with_cascade(next, cascade);
            }
            if let Some(parent) = rq.task_by_pid_mut(ppid) {
                parent.signal |= SigSet::SIGCHLD;
            }
        }
        if let Some(next) = self.pick_and_switch() {
            next.unpark();
        }
    }

    /// 任务函数 panic：记录原因，把 CPU 直接交还空闲任务
    ///
    /// 空闲任务醒来后在 check_halted() 中重新抛出。
    pub(crate) fn halt(&self, nr: usize, payload: &(dyn Any + Send)) {
        let reason = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        error!("task[{}] died: {}", nr, reason);
        *self.halted.lock() = Some(format!("task[{}]: {}", nr, reason));

        let idle = {
            let mut rq = self.sched.lock();
            if let Some(task) = rq.task[nr].as_mut() {
                task.state = TaskState::Zombie;
                task.thread = None;
            }
            rq.current = 0;
            rq.thread_of(0)
        };
        idle.unpark();
    }

    /// 回收僵尸任务，返回其退出码
    ///
    /// # 返回
    /// - `Errno::NoSuchProcess`: 没有这个任务
    /// - `Errno::TryAgain`: 任务还没有退出
    pub fn reap(&self, pid: Pid) -> Result<i32, Errno> {
        let mut rq = self.sched.lock();
        let nr = rq.find_nr(pid).ok_or(Errno::NoSuchProcess)?;
        if nr == 0 {
            return Err(Errno::OperationNotPermitted);
        }
        match rq.task[nr].as_ref() {
            Some(task) if task.state == TaskState::Zombie => {
                let code = task.exit_code;
                rq.task[nr] = None;
                Ok(code)
            }
            Some(_) => Err(Errno::TryAgain),
            None => Err(Errno::NoSuchProcess),
        }
    }

    /// 向任务发送信号
    ///
    /// 只设置挂起位；可中断睡眠的目标会在下一次调度时被唤醒。
    pub fn kill(&self, pid: Pid, sig: Signal) -> Result<(), Errno> {
        let mut rq = self.sched.lock();
        let task = rq.task_by_pid_mut(pid).ok_or(Errno::NoSuchProcess)?;
        task.signal |= sig.mask();
        Ok(())
    }

    /// 设置当前任务的信号屏蔽字，返回旧值
    ///
    /// SIGKILL 和 SIGSTOP 的屏蔽位即使被设置也不起作用。
    pub fn sigsetmask(&self, mask: SigSet) -> SigSet {
        let mut rq = self.sched.lock();
        let task = rq.current_task_mut();
        core::mem::replace(&mut task.blocked, mask)
    }
}
