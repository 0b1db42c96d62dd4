//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! Hearth - 块缓冲区缓存与协作式调度器
//!
//! 遵循经典 Linux 内核的设计：
//! - 固定数量的缓冲区缓存磁盘块，按 (设备号, 块号) 哈希查找，
//!   按引用计数和淘汰代价回收 (fs/buffer.c)
//! - 单 CPU、内核态不可抢占的调度器，任务在等待队列上睡眠，
//!   由时钟中断推进时间片和定时器 (kernel/sched.c)
//!
//! 内核以宿主机线程承载每个任务的内核栈，任何时刻只有一个任务在运行，
//! 因此可以直接用 `cargo test` 驱动。

pub mod config;
pub mod kconfig;
pub mod errno;
pub mod klog;
pub mod signal;
pub mod process;
pub mod sched;
pub mod drivers;
pub mod fs;
pub mod kernel;

pub use kernel::Kernel;

#[cfg(test)]
mod tests;
