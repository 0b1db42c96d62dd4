//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 错误代码
//!
//! 数值与 include/uapi/asm-generic/errno-base.h 一致。
//! 块缓存、调度器和驱动层的可恢复错误都以 `Result<_, Errno>` 返回，
//! 数据结构损坏类错误则直接 `kernel_panic!`。

use core::fmt;

/// 标准错误代码
///
/// 使用方法：
/// ```rust
/// use hearth::errno::Errno;
///
/// fn read_superblock() -> Result<(), Errno> {
///     Err(Errno::IOError)
/// }
///
/// assert_eq!(read_superblock().unwrap_err().as_neg_i32(), -5);
/// ```
#[repr(i32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Errno {
    /// Operation not permitted (EPERM, 1)
    OperationNotPermitted = 1,

    /// No such process (ESRCH, 3)
    NoSuchProcess = 3,

    /// Interrupted system call (EINTR, 4)
    InterruptedSystemCall = 4,

    /// I/O error (EIO, 5)
    IOError = 5,

    /// No such device or address (ENXIO, 6)
    NoSuchDeviceOrAddress = 6,

    /// Try again (EAGAIN, 11)
    TryAgain = 11,

    /// Device or resource busy (EBUSY, 16)
    DeviceOrResourceBusy = 16,

    /// No such device (ENODEV, 19)
    NoSuchDevice = 19,

    /// Invalid argument (EINVAL, 22)
    InvalidArgument = 22,
}

impl Errno {
    /// 获取错误代码的正数值（用于比较）
    #[inline]
    pub const fn as_i32(self) -> i32 {
        self as i32
    }

    /// 获取错误代码的负数值（用于系统调用返回）
    #[inline]
    pub const fn as_neg_i32(self) -> i32 {
        -(self as i32)
    }

    /// 对应的符号名
    pub const fn name(self) -> &'static str {
        match self {
            Errno::OperationNotPermitted => "EPERM",
            Errno::NoSuchProcess => "ESRCH",
            Errno::InterruptedSystemCall => "EINTR",
            Errno::IOError => "EIO",
            Errno::NoSuchDeviceOrAddress => "ENXIO",
            Errno::TryAgain => "EAGAIN",
            Errno::DeviceOrResourceBusy => "EBUSY",
            Errno::NoSuchDevice => "ENODEV",
            Errno::InvalidArgument => "EINVAL",
        }
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.as_i32())
    }
}

impl std::error::Error for Errno {}
