//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 时钟的核心操作（`now`/`after`/`advance`/`stop` 等）均不可失败，误用通过文档化的调用方义务约束；
//! - 只有测试扩展与配置加载存在可报告的失败，集中在 [`ClockError`] 中定义。
//!
//! ## 设计要求（What）
//! - 错误类型派生 `thiserror::Error`，可直接用 `?` 传播到测试或上层 harness；
//! - 变体携带足够的上下文（所需/观测到的消费者数量、等待时长、字段名），便于定位不稳定测试。

use std::time::Duration;

use thiserror::Error;

/// 时钟扩展操作的错误域。
#[derive(Debug, Error)]
pub enum ClockError {
    /// `wait_advance` 在截止时间内没有观察到足够多的消费者。
    ///
    /// - **意图 (Why)**：被测代码若从未取走通道，无界等待会让测试直接挂起；
    /// - **契约 (What)**：`observed` 为最后一次检查时处于监听状态的 waiter 数量，时钟未被推进。
    #[error(
        "timed out after {waited:?} waiting for {required} watched waiters (observed {observed})"
    )]
    WaitAdvanceTimeout {
        required: usize,
        observed: usize,
        waited: Duration,
    },

    /// 配置项取值非法。
    #[error("invalid clock configuration `{field}`: {reason}")]
    InvalidConfig {
        field: &'static str,
        reason: &'static str,
    },

    /// TOML 片段无法解析为时钟配置。
    #[cfg(feature = "toml-config")]
    #[error("failed to parse clock configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),
}
