//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 运行时内核配置
//!
//! `config.rs` 中的常量是编译期默认值；`KernelConfig` 允许在创建
//! [`Kernel`](crate::Kernel) 时用同样格式的 TOML 文本覆盖它们，
//! 测试用例借此构造小容量的缓冲池、任务表和定时器池。

use serde::Deserialize;

use crate::config;
use crate::errno::Errno;

/// 块缓存配置 (`[buffer]`)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// 缓冲区数量
    pub nr_buffers: usize,
    /// 块大小（字节）
    pub block_size: usize,
    /// 哈希桶数量
    pub nr_hash: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            nr_buffers: config::NR_BUFFERS,
            block_size: config::BLOCK_SIZE,
            nr_hash: config::NR_HASH,
        }
    }
}

/// 调度器配置 (`[sched]`)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SchedConfig {
    pub nr_tasks: usize,
    pub hz: u64,
    pub default_priority: i32,
    pub idle_priority: i32,
}

impl Default for SchedConfig {
    fn default() -> Self {
        Self {
            nr_tasks: config::NR_TASKS,
            hz: config::HZ,
            default_priority: config::DEFAULT_PRIORITY,
            idle_priority: config::IDLE_PRIORITY,
        }
    }
}

/// 定时器配置 (`[timer]`)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TimerConfig {
    pub time_requests: usize,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self { time_requests: config::TIME_REQUESTS }
    }
}

/// 调试配置 (`[debug]`)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub log_level: String,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self { log_level: config::LOG_LEVEL.to_string() }
    }
}

/// 内核配置
///
/// 与 Kernel.toml 的 section 一一对应，缺失的字段取编译期默认值，
/// 未知的 section（如 `[general]`）被忽略。
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    pub buffer: BufferConfig,
    pub sched: SchedConfig,
    pub timer: TimerConfig,
    pub debug: DebugConfig,
}

impl KernelConfig {
    /// 从 TOML 文本解析配置
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// 以缓冲区数量构造配置，其余取默认值
    pub fn with_buffers(nr_buffers: usize) -> Self {
        let mut config = Self::default();
        config.buffer.nr_buffers = nr_buffers;
        config
    }

    /// 检查配置是否可用
    ///
    /// 任务表至少要容纳空闲任务和一个普通任务；普通任务的优先级
    /// 必须为正，否则重算时间片后调度器可能永远找不到可运行任务。
    pub fn validate(&self) -> Result<(), Errno> {
        let ok = self.buffer.nr_buffers > 0
            && self.buffer.block_size > 0
            && self.buffer.nr_hash > 0
            && self.sched.nr_tasks >= 2
            && self.sched.hz > 0
            && self.sched.default_priority > 0
            && self.sched.idle_priority >= 0
            && self.timer.time_requests > 0;
        if ok { Ok(()) } else { Err(Errno::InvalidArgument) }
    }

    /// 解析日志级别，无法识别时返回 `Info`
    pub fn log_level(&self) -> log::LevelFilter {
        self.debug.log_level.parse().unwrap_or(log::LevelFilter::Info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_generated_constants() {
        let config = KernelConfig::default();
        assert_eq!(config.buffer.nr_buffers, config::NR_BUFFERS);
        assert_eq!(config.buffer.nr_hash, config::NR_HASH);
        assert_eq!(config.timer.time_requests, config::TIME_REQUESTS);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = KernelConfig::from_toml(
            "[general]\nname = \"x\"\n\n[buffer]\nnr_buffers = 3\n\n[sched]\nhz = 10\n",
        ).unwrap();
        assert_eq!(config.buffer.nr_buffers, 3);
        assert_eq!(config.buffer.block_size, config::BLOCK_SIZE);
        assert_eq!(config.sched.hz, 10);
        assert_eq!(config.sched.nr_tasks, config::NR_TASKS);
    }

    #[test]
    fn rejects_unusable_config() {
        let mut config = KernelConfig::with_buffers(0);
        assert_eq!(config.validate(), Err(Errno::InvalidArgument));
        config.buffer.nr_buffers = 4;
        config.sched.default_priority = 0;
        assert_eq!(config.validate(), Err(Errno::InvalidArgument));
    }

    #[test]
    fn bad_log_level_falls_back_to_info() {
        let mut config = KernelConfig::default();
        config.debug.log_level = "loud".into();
        assert_eq!(config.log_level(), log::LevelFilter::Info);
        config.debug.log_level = "trace".into();
        assert_eq!(config.log_level(), log::LevelFilter::Trace);
    }
}
