//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 文件系统层
//!
//! 遵循 Linux 的缓冲区缓存设计：
//! - `bio`: 缓冲区头、缓冲池、getblk()/brelse() (fs/buffer.c)
//! - `buffer`: bread()/breada()/sync_dev() 等基于缓冲区的读写
//!
//! 文件系统本身（inode、超级块）不在本内核中，只通过
//! [`SuperOperations`] 在回写和换盘时被回调。

pub mod bio;
pub mod buffer;

use std::sync::Arc;

pub use bio::{BufferHandle, BufferHead, BufferId, BufferInfo, BufferPool, BufferState, BufferStats};

use crate::drivers::blkdev::DevT;
use crate::kernel::Kernel;

/// 挂载的文件系统提供给缓冲区缓存的回调
///
/// 对应 Linux 的 struct super_operations 中与缓存相关的部分。回调运行在
/// 调用者任务的上下文中，可以使用 getblk()/bread() 等可能睡眠的操作。
pub trait SuperOperations: Send + Sync {
    /// 把内存中的 inode 写进缓冲区 (sync_inodes)
    fn sync_inodes(&self, kernel: &Kernel);

    /// 卸下设备上的超级块 (put_super)
    fn put_super(&self, _kernel: &Kernel, _dev: DevT) {}

    /// 丢弃设备上的 inode (invalidate_inodes)
    fn invalidate_inodes(&self, _kernel: &Kernel, _dev: DevT) {}
}

impl Kernel {
    /// 安装文件系统回调，返回之前的回调
    pub fn set_super_operations(&self, ops: Arc<dyn SuperOperations>) -> Option<Arc<dyn SuperOperations>> {
        self.super_ops.lock().replace(ops)
    }

    pub(crate) fn super_operations(&self) -> Option<Arc<dyn SuperOperations>> {
        self.super_ops.lock().clone()
    }
}
