//! 场景测试
//!
//! 每个测试创建自己的 `Kernel`，测试线程就是 0 号空闲任务。可能睡眠的
//! 操作只能在 spawn() 出来的任务里调用，测试线程通过 run_until_idle()
//! 把 CPU 交给它们，等所有任务都睡下或退出后再检查结果。
//!
//! 运行测试：
//! ```bash
//! cargo test --package hearth
//! ```

mod scheduler;
mod timer;

use std::sync::Arc;

use spin::Mutex;

use crate::drivers::blkdev::{major, mkdev, DevT, RamDisk};
use crate::kconfig::KernelConfig;
use crate::kernel::Kernel;

/// 测试用设备
pub(crate) const DEV: DevT = mkdev(3, 0);

/// 测试用块大小，小一些方便比较内容
pub(crate) const BLOCK_SIZE: usize = 64;

/// 测试盘的块数
pub(crate) const DISK_BLOCKS: usize = 64;

/// 小容量配置
pub(crate) fn config(nr_buffers: usize) -> KernelConfig {
    let mut config = KernelConfig::with_buffers(nr_buffers);
    config.buffer.block_size = BLOCK_SIZE;
    config.buffer.nr_hash = 7;
    config.sched.nr_tasks = 16;
    config.timer.time_requests = 8;
    config
}

/// 启动内核并在主设备号 3 上挂一块内存盘
pub(crate) fn boot(config: KernelConfig) -> (Arc<Kernel>, RamDisk) {
    crate::klog::init(log::LevelFilter::Warn);
    let kernel = Kernel::new(config).unwrap();
    let disk = RamDisk::new(kernel.block_size());
    disk.add_disk(DEV, DISK_BLOCKS);
    kernel.register_blkdev(major(DEV), Box::new(disk.clone())).unwrap();
    (kernel, disk)
}

/// 任务之间共享的记录
pub(crate) type Journal<T> = Arc<Mutex<Vec<T>>>;

pub(crate) fn journal<T>() -> Journal<T> {
    Arc::new(Mutex::new(Vec::new()))
}

/// 内容为 `byte` 的整块数据
pub(crate) fn block_of(byte: u8) -> Vec<u8> {
    vec![byte; BLOCK_SIZE]
}

#[test]
fn boot_registers_the_ram_disk() {
    println!("test: boot with a ram disk on major 3...");
    let (kernel, _disk) = boot(config(4));
    assert_eq!(kernel.nr_buffers(), 4);
    assert_eq!(kernel.nr_buffers(), kernel.config().buffer.nr_buffers);
    assert_eq!(kernel.block_size(), BLOCK_SIZE);
    assert_eq!(kernel.getpid(), 0);
    assert_eq!(
        kernel.register_blkdev(major(DEV), Box::new(RamDisk::new(BLOCK_SIZE))),
        Err(crate::errno::Errno::DeviceOrResourceBusy)
    );
    assert!(kernel.check_buffers().is_ok());
}

#[test]
fn unusable_config_is_rejected() {
    println!("test: kernel refuses an empty buffer pool...");
    assert_eq!(Kernel::new(config(0)).err(), Some(crate::errno::Errno::InvalidArgument));
}
