//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 信号位图
//!
//! 调度器只关心两件事：信号是否挂起、是否被屏蔽。信号的投递和
//! 默认动作 (do_signal) 属于进程管理，不在这里实现。

use bitflags::bitflags;

/// 标准信号定义 (1-22)
///
/// 对应 Linux 的 signal 定义 (include/uapi/asm-generic/signal.h)
#[repr(i32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Signal {
    /// SIGHUP - 挂起
    SIGHUP = 1,
    /// SIGINT - 中断 (Ctrl+C)
    SIGINT = 2,
    /// SIGQUIT - 退出
    SIGQUIT = 3,
    /// SIGILL - 非法指令
    SIGILL = 4,
    /// SIGTRAP - 断点陷阱
    SIGTRAP = 5,
    /// SIGABRT - 异常终止
    SIGABRT = 6,
    /// SIGBUS - 总线错误
    SIGBUS = 7,
    /// SIGFPE - 浮点异常
    SIGFPE = 8,
    /// SIGKILL - 强制杀死 (不可屏蔽)
    SIGKILL = 9,
    /// SIGUSR1 - 用户定义信号1
    SIGUSR1 = 10,
    /// SIGSEGV - 段错误
    SIGSEGV = 11,
    /// SIGUSR2 - 用户定义信号2
    SIGUSR2 = 12,
    /// SIGPIPE - 管道破裂
    SIGPIPE = 13,
    /// SIGALRM - 定时器
    SIGALRM = 14,
    /// SIGTERM - 终止
    SIGTERM = 15,
    /// SIGSTKFLT - 栈错误
    SIGSTKFLT = 16,
    /// SIGCHLD - 子进程状态改变
    SIGCHLD = 17,
    /// SIGCONT - 继续
    SIGCONT = 18,
    /// SIGSTOP - 停止 (不可屏蔽)
    SIGSTOP = 19,
    /// SIGTSTP - 终端停止 (Ctrl+Z)
    SIGTSTP = 20,
    /// SIGTTIN - 后台读
    SIGTTIN = 21,
    /// SIGTTOU - 后台写
    SIGTTOU = 22,
}

impl Signal {
    /// 该信号在位图中的位：信号 n 占第 n-1 位
    pub const fn mask(self) -> SigSet {
        SigSet::from_bits_retain(1 << (self as u32 - 1))
    }
}

bitflags! {
    /// 信号位图 (task_struct::signal / task_struct::blocked)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SigSet: u32 {
        const SIGKILL = 1 << (Signal::SIGKILL as u32 - 1);
        const SIGALRM = 1 << (Signal::SIGALRM as u32 - 1);
        const SIGCHLD = 1 << (Signal::SIGCHLD as u32 - 1);
        const SIGSTOP = 1 << (Signal::SIGSTOP as u32 - 1);
    }
}

impl SigSet {
    /// 可以被屏蔽的信号：除 SIGKILL 和 SIGSTOP 外的全部
    pub const BLOCKABLE: SigSet = SigSet::from_bits_retain(!(SigSet::SIGKILL.bits() | SigSet::SIGSTOP.bits()));

    /// 在屏蔽字 `blocked` 下仍然有效的挂起信号
    pub fn unblocked(self, blocked: SigSet) -> SigSet {
        // 其余信号位没有具名常量，不能用会截断未知位的 `!`
        SigSet::from_bits_retain(self.bits() & !(blocked.bits() & Self::BLOCKABLE.bits()))
    }

    pub fn has(self, sig: Signal) -> bool {
        self.contains(sig.mask())
    }
}
