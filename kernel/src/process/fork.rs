//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 任务创建
//!
//! 地址空间复制不在本内核的范围内，这里只创建"内核线程"式的任务：
//!
//! 1. 在任务表里找一个空槽，分配 pid
//! 2. 为任务准备内核栈（一个宿主线程），线程先停在 wait_for_cpu()
//! 3. 内核栈就绪后才把任务置为 Running，交给调度器
//!
//! 任务函数返回后进入 do_exit()；任务函数 panic 则整个内核停机。

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use log::{debug, error};

use crate::errno::Errno;
use crate::kernel::Kernel;
use crate::process::task::{Pid, Task, TaskState};

impl Kernel {
    /// 以默认优先级创建任务
    ///
    /// # 参数
    /// * `f` - 任务函数，返回值作为退出码
    ///
    /// # 返回
    /// 新任务的 pid；任务表已满时返回 `Errno::TryAgain`
    pub fn spawn<F>(self: &Arc<Self>, f: F) -> Result<Pid, Errno>
    where
        F: FnOnce(&Kernel) -> i32 + Send + 'static,
    {
        let priority = self.sched.lock().default_priority;
        self.spawn_with_priority(priority, f)
    }

    /// 以指定优先级创建任务
    ///
    /// 对应 Linux 的 copy_process() + wake_up_new_task()
    pub fn spawn_with_priority<F>(self: &Arc<Self>, priority: i32, f: F) -> Result<Pid, Errno>
    where
        F: FnOnce(&Kernel) -> i32 + Send + 'static,
    {
        if priority <= 0 {
            return Err(Errno::InvalidArgument);
        }

        let (nr, pid) = {
            let mut rq = self.sched.lock();
            let Some(nr) = rq.task.iter().position(Option::is_none) else {
                return Err(Errno::TryAgain);
            };
            let pid = rq.alloc_pid();
            let ppid = rq.current_task().pid;
            let mut task = Task::new(pid, ppid, priority, rq.jiffies);
            // 内核栈就绪前不可调度
            task.state = TaskState::Uninterruptible;
            rq.task[nr] = Some(task);
            (nr, pid)
        };

        let kernel = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name(format!("task-{}", pid))
            .spawn(move || {
                kernel.wait_for_cpu(nr);
                match panic::catch_unwind(AssertUnwindSafe(|| f(&kernel))) {
                    Ok(code) => kernel.do_exit(code),
                    Err(payload) => kernel.halt(nr, &*payload),
                }
            });

        let mut rq = self.sched.lock();
        match spawned {
            Ok(handle) => {
                if let Some(task) = rq.task[nr].as_mut() {
                    task.thread = Some(handle.thread().clone());
                    task.state = TaskState::Running;
                }
                debug!("spawn: pid {} in task[{}], priority {}", pid, nr, priority);
                Ok(pid)
            }
            Err(err) => {
                rq.task[nr] = None;
                error!("spawn: cannot create kernel stack for pid {}: {}", pid, err);
                Err(Errno::TryAgain)
            }
        }
    }
}
