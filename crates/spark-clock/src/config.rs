//! 虚拟时钟的运行参数。
//!
//! # 设计背景（Why）
//! - `wait_advance` 的检查间隔与等待上限在不同 CI 环境下需要不同取值：本地调试偏好较短的间隔，
//!   负载较高的共享 Runner 则需要更宽松的上限；
//! - 参数可由测试代码直接构造，也可以从测试夹具中的 TOML 片段加载。
//!
//! # 契约说明（What）
//! - `poll_interval` 必须大于零；
//! - `wait_timeout` 为 `None` 时 `wait_advance` 无限期等待，与真实测试 harness 的默认行为一致。

use std::time::Duration;

use serde::Deserialize;

use crate::error::ClockError;

/// `wait_advance` 默认的检查间隔。
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// 虚拟时钟配置。
///
/// 通过 serde 反序列化时使用毫秒字段：
///
/// ```toml
/// poll_interval_ms = 10
/// wait_timeout_ms = 5000
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawMockClockConfig")]
pub struct MockClockConfig {
    poll_interval: Duration,
    wait_timeout: Option<Duration>,
}

impl MockClockConfig {
    /// 以默认值构造配置。
    pub fn new() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            wait_timeout: None,
        }
    }

    /// 设置 `wait_advance` 两次检查之间的最长间隔。
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// 设置 `wait_advance` 的等待上限。
    pub fn with_wait_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.wait_timeout = timeout;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn wait_timeout(&self) -> Option<Duration> {
        self.wait_timeout
    }

    /// 校验配置取值。
    pub fn validate(&self) -> Result<(), ClockError> {
        if self.poll_interval.is_zero() {
            return Err(ClockError::InvalidConfig {
                field: "poll_interval",
                reason: "must be greater than zero",
            });
        }
        Ok(())
    }

    /// 从 TOML 片段加载配置，缺省字段取默认值。
    #[cfg(feature = "toml-config")]
    pub fn from_toml_str(source: &str) -> Result<Self, ClockError> {
        Ok(toml::from_str(source)?)
    }
}

impl Default for MockClockConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawMockClockConfig {
    #[serde(default = "default_poll_interval_ms")]
    poll_interval_ms: u64,
    #[serde(default)]
    wait_timeout_ms: Option<u64>,
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL.as_millis() as u64
}

impl TryFrom<RawMockClockConfig> for MockClockConfig {
    type Error = ClockError;

    fn try_from(raw: RawMockClockConfig) -> Result<Self, Self::Error> {
        let config = MockClockConfig::new()
            .with_poll_interval(Duration::from_millis(raw.poll_interval_ms))
            .with_wait_timeout(raw.wait_timeout_ms.map(Duration::from_millis));
        config.validate()?;
        Ok(config)
    }
}
