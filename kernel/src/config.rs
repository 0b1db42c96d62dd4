//! Hearth 内核配置（自动生成）
//!
//! 此文件由 build.rs 根据 Kernel.toml 自动生成，请勿手动修改

// ============================================================
// 基本信息
// ============================================================

/// 内核名称
pub const KERNEL_NAME: &str = "Hearth";

/// 内核版本
pub const KERNEL_VERSION: &str = "0.1.0";

// ============================================================
// 块缓存配置
// ============================================================

/// 缓冲区数量
pub const NR_BUFFERS: usize = 64;

/// 块大小（字节）
pub const BLOCK_SIZE: usize = 1024;

/// 哈希桶数量
pub const NR_HASH: usize = 307;

// ============================================================
// 调度器配置
// ============================================================

/// 任务表大小
pub const NR_TASKS: usize = 64;

/// 时钟频率（每秒滴答数）
pub const HZ: u64 = 100;

/// 新任务默认优先级
pub const DEFAULT_PRIORITY: i32 = 15;

/// 空闲任务优先级
pub const IDLE_PRIORITY: i32 = 0;

// ============================================================
// 定时器配置
// ============================================================

/// 定时器请求池容量
pub const TIME_REQUESTS: usize = 64;

// ============================================================
// 调试配置
// ============================================================

/// 默认日志级别
pub const LOG_LEVEL: &str = "info";
