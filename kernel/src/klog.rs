//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 内核日志
//!
//! 为 `log` 门面提供控制台后端 (对应 Linux 的 printk)，并提供
//! 不可恢复错误使用的 [`kernel_panic!`](crate::kernel_panic)。

use core::fmt::{self, Write};
use std::io::Write as _;

use log::{LevelFilter, Log, Metadata, Record};
use spin::Mutex;

/// 控制台（宿主机 stderr）
pub struct Console;

impl fmt::Write for Console {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        std::io::stderr()
            .lock()
            .write_all(s.as_bytes())
            .map_err(|_| fmt::Error)
    }
}

/// 整行输出锁，避免多个任务线程的日志交错
static CONSOLE: Mutex<Console> = Mutex::new(Console);

/// printk 风格的日志后端
struct KernelLogger;

impl Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let mut console = CONSOLE.lock();
        let _ = writeln!(console, "[{:>5}] {}: {}", record.level(), record.target(), record.args());
    }

    fn flush(&self) {}
}

static LOGGER: KernelLogger = KernelLogger;

/// 安装内核日志后端并设置日志级别
///
/// 可以重复调用：后端只安装一次，级别每次都会更新。
/// 打开 `debug_log` feature 时级别固定为 `Trace`。
pub fn init(level: LevelFilter) {
    let _ = log::set_logger(&LOGGER);
    if cfg!(feature = "debug_log") {
        log::set_max_level(LevelFilter::Trace);
    } else {
        log::set_max_level(level);
    }
}

/// 记录致命错误并停机
///
/// 由 [`kernel_panic!`](crate::kernel_panic) 调用。这里不做 sync：
/// 损坏发生时缓冲池本身可能已经不可信。
#[cold]
#[track_caller]
pub fn die(args: fmt::Arguments<'_>) -> ! {
    log::error!("Kernel panic: {}", args);
    panic!("{}", args)
}

/// 内核数据结构损坏，无法继续运行
///
/// 对应 Linux 的 panic()
#[macro_export]
macro_rules! kernel_panic {
    ($($arg:tt)*) => {
        $crate::klog::die(::core::format_args!($($arg)*))
    };
}
