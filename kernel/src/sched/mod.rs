//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 调度器模块
//!
//! - `sched`: 时间片衰减调度、睡眠/唤醒、时钟中断
//! - `timer`: 相对时间排序的内核定时器

pub mod sched;
pub mod timer;

pub use sched::{Privilege, RunQueue};
pub use timer::{TimerFn, TimerList};
