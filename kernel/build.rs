//! Hearth 内核构建脚本
//!
//! 这个脚本在编译前运行，负责：
//! 1. 解析 Kernel.toml 配置文件
//! 2. 生成 src/config.rs 中的编译期常量

use std::env;
use std::fs;
use std::path::PathBuf;

/// 读取 `[section] key` 对应的整数，缺省时使用 `default`
fn int_of(config: &toml::Value, section: &str, key: &str, default: i64) -> i64 {
    config.get(section)
        .and_then(|s| s.get(key))
        .and_then(|v| v.as_integer())
        .unwrap_or(default)
}

/// 读取 `[section] key` 对应的字符串，缺省时使用 `default`
fn str_of<'a>(config: &'a toml::Value, section: &str, key: &str, default: &'a str) -> &'a str {
    config.get(section)
        .and_then(|s| s.get(key))
        .and_then(|v| v.as_str())
        .unwrap_or(default)
}

fn main() {
    println!("cargo:rerun-if-changed=../Kernel.toml");

    let config_content = fs::read_to_string("../Kernel.toml")
        .expect("无法读取 Kernel.toml");

    let config: toml::Value = toml::from_str(&config_content)
        .expect("配置文件解析失败");

    let name = str_of(&config, "general", "name", "Hearth");
    let version = str_of(&config, "general", "version", "0.1.0");
    println!("cargo:rustc-env=CARGO_KERNEL_NAME={}", name);
    println!("cargo:rustc-env=CARGO_KERNEL_VERSION={}", version);

    let log_level = str_of(&config, "debug", "log_level", "info");
    println!("cargo:rustc-env=HEARTH_LOG_LEVEL={}", log_level);

    generate_config_code(&config);
}

fn generate_config_code(config: &toml::Value) {
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR 未设置"));

    let config_header = format!(
        r#"//! Hearth 内核配置（自动生成）
//!
//! 此文件由 build.rs 根据 Kernel.toml 自动生成，请勿手动修改

// ============================================================
// 基本信息
// ============================================================

/// 内核名称
pub const KERNEL_NAME: &str = "{}";

/// 内核版本
pub const KERNEL_VERSION: &str = "{}";

// ============================================================
// 块缓存配置
// ============================================================

/// 缓冲区数量
pub const NR_BUFFERS: usize = {};

/// 块大小（字节）
pub const BLOCK_SIZE: usize = {};

/// 哈希桶数量
pub const NR_HASH: usize = {};

// ============================================================
// 调度器配置
// ============================================================

/// 任务表大小
pub const NR_TASKS: usize = {};

/// 时钟频率（每秒滴答数）
pub const HZ: u64 = {};

/// 新任务默认优先级
pub const DEFAULT_PRIORITY: i32 = {};

/// 空闲任务优先级
pub const IDLE_PRIORITY: i32 = {};

// ============================================================
// 定时器配置
// ============================================================

/// 定时器请求池容量
pub const TIME_REQUESTS: usize = {};

// ============================================================
// 调试配置
// ============================================================

/// 默认日志级别
pub const LOG_LEVEL: &str = "{}";
"#,
        str_of(config, "general", "name", "Hearth"),
        str_of(config, "general", "version", "0.1.0"),
        int_of(config, "buffer", "nr_buffers", 64),
        int_of(config, "buffer", "block_size", 1024),
        int_of(config, "buffer", "nr_hash", 307),
        int_of(config, "sched", "nr_tasks", 64),
        int_of(config, "sched", "hz", 100),
        int_of(config, "sched", "default_priority", 15),
        int_of(config, "sched", "idle_priority", 0),
        int_of(config, "timer", "time_requests", 64),
        str_of(config, "debug", "log_level", "info"),
    );

    let config_file = manifest_dir.join("src").join("config.rs");
    let existing_content = fs::read_to_string(&config_file).unwrap_or_default();

    // 只有内容变化时才写入，避免每次编译都更新文件时间戳
    if existing_content != config_header {
        fs::write(&config_file, &config_header)
            .expect("写入配置文件失败");
    }
}
