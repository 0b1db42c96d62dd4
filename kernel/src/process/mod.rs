//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 进程管理模块
//!
//! - `task`: 任务控制块 (task_struct)
//! - `wait`: 等待队列
//! - `fork`: 任务创建
//! - `exit`: 任务退出、回收与信号发送

pub mod task;
pub mod wait;
pub mod fork;
pub mod exit;

pub use task::{Pid, Task, TaskState, IDLE_PID};
pub use wait::WaitQueue;
