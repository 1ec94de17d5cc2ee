#![deny(unsafe_code)]
#![doc = "spark-clock: 可注入的时钟抽象与确定性虚拟时钟。"]
#![doc = ""]
#![doc = "业务代码依赖 [`Clock`]/[`Timer`] 两个能力集合；生产环境注入 [`SystemClock`]，"]
#![doc = "测试中注入 [`MockClock`] 并通过 `advance`/`wait_advance` 精确控制超时与定时器的触发时机，"]
#![doc = "无需真实等待。"]

//! # 模块结构（What）
//! - [`clock`]：`Clock`/`Timer` trait；
//! - [`mock`]：虚拟时钟与其定时器句柄；
//! - [`system`]：真实时钟与进程级共享实例 [`SYSTEM_CLOCK`]；
//! - [`notify`]：满则丢弃的单元素通知通道；
//! - [`config`]/[`error`]：虚拟时钟的运行参数与错误类型。
//!
//! # 使用指引（How）
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use spark_clock::{Clock, MockClock};
//!
//! fn expired(clock: &dyn Clock, budget: Duration) -> bool {
//!     clock.after(budget).try_recv().is_some()
//! }
//!
//! let mock = MockClock::new();
//! let clock: Arc<dyn Clock> = Arc::new(mock.clone());
//! let timeout = clock.after(Duration::from_secs(5));
//! mock.advance(Duration::from_secs(5));
//! assert!(timeout.try_recv().is_some());
//! assert!(!expired(clock.as_ref(), Duration::from_secs(1)));
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod mock;
pub mod notify;
pub mod system;

pub use clock::{Clock, Timer};
pub use config::{DEFAULT_POLL_INTERVAL, MockClockConfig};
pub use error::ClockError;
pub use mock::{MockClock, MockClockBuilder, MockTimer};
pub use notify::{NotificationReceiver, Recv};
pub use system::{SYSTEM_CLOCK, SystemClock, SystemTimer};
