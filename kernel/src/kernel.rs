//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 内核上下文
//!
//! 经典内核把任务表、缓冲池、定时器表都放在全局变量里。这里把它们收进
//! 一个 `Kernel` 对象，各子系统的操作以 `impl Kernel` 的形式分散在
//! 各自的模块中：
//!
//! - `sched::sched`: schedule()、sleep_on()、wake_up()、do_timer()
//! - `sched::timer`: add_timer()
//! - `process`: spawn()、kill()、reap()
//! - `fs::bio` / `fs::buffer`: getblk()、bread()、sync_dev()
//! - `drivers::blkdev`: ll_rw_block()、end_request()
//!
//! 创建 `Kernel` 的线程成为 0 号空闲任务。

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;

use log::info;
use spin::Mutex;

use crate::drivers::blkdev::BlockDriver;
use crate::errno::Errno;
use crate::fs::bio::BufferPool;
use crate::fs::SuperOperations;
use crate::kconfig::KernelConfig;
use crate::kernel_panic;
use crate::process::wait::WaitQueue;
use crate::sched::sched::RunQueue;
use crate::sched::timer::TimerList;

/// 内核上下文
pub struct Kernel {
    pub(crate) config: KernelConfig,
    /// 任务表
    pub(crate) sched: Mutex<RunQueue>,
    /// 定时器表
    pub(crate) timers: Mutex<TimerList>,
    /// 缓冲池
    pub(crate) pool: Mutex<BufferPool>,
    /// 每个缓冲区的等待队列，与缓冲区一一对应
    pub(crate) b_wait: Vec<WaitQueue>,
    /// 等待空闲缓冲区
    pub(crate) buffer_wait: WaitQueue,
    /// 块设备驱动表，按主设备号索引
    pub(crate) blk_dev: Mutex<BTreeMap<u8, Box<dyn BlockDriver>>>,
    pub(crate) super_ops: Mutex<Option<Arc<dyn SuperOperations>>>,
    /// 任务 panic 后记录的停机原因
    pub(crate) halted: Mutex<Option<String>>,
}

impl Kernel {
    /// 创建内核，当前线程成为空闲任务
    ///
    /// # 返回
    /// 配置不可用时返回 `Errno::InvalidArgument`
    pub fn new(config: KernelConfig) -> Result<Arc<Self>, Errno> {
        config.validate()?;
        let nr_buffers = config.buffer.nr_buffers;
        let kernel = Self {
            sched: Mutex::new(RunQueue::new(&config.sched, thread::current())),
            timers: Mutex::new(TimerList::new(config.timer.time_requests)),
            pool: Mutex::new(BufferPool::new(&config.buffer)),
            b_wait: (0..nr_buffers).map(|_| WaitQueue::new()).collect(),
            buffer_wait: WaitQueue::new(),
            blk_dev: Mutex::new(BTreeMap::new()),
            super_ops: Mutex::new(None),
            halted: Mutex::new(None),
            config,
        };
        info!(
            "{} {}: {} buffers of {} bytes, {} task slots, HZ={}",
            crate::config::KERNEL_NAME,
            crate::config::KERNEL_VERSION,
            nr_buffers,
            kernel.config.buffer.block_size,
            kernel.config.sched.nr_tasks,
            kernel.config.sched.hz
        );
        Ok(Arc::new(kernel))
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn block_size(&self) -> usize {
        self.config.buffer.block_size
    }

    /// 某个任务 panic 过时，在空闲任务中重新抛出
    pub(crate) fn check_halted(&self) {
        let reason = self.halted.lock().clone();
        if let Some(reason) = reason {
            kernel_panic!("kernel halted: {}", reason);
        }
    }
}
