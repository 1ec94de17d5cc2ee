//! 时钟能力集合：`Clock` 与 `Timer` 两个对象安全的 trait。
//!
//! # 设计背景（Why）
//! - 超时与定时器逻辑若直接依赖系统时间，测试只能真实等待，既慢又不可复现；
//! - 通过 trait 注入时钟，生产环境使用 [`SystemClock`](crate::SystemClock)，测试中替换为
//!   [`MockClock`](crate::MockClock) 并手动推进时间。
//!
//! # 使用指引（How）
//! - 业务组件持有 `Arc<dyn Clock>`（或泛型参数 `C: Clock`），构造时注入具体实现；
//! - 切换实现只依赖依赖注入，不应对 trait 对象做运行时类型判断。

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::notify::NotificationReceiver;

/// 获取当前时间、登记一次性超时与可重置定时器的能力集合。
///
/// # 契约说明（What）
/// - `now`：返回当前时间点，同一实例上单调不减；
/// - `after`：至少经过 `duration` 后向返回的通道投递当时的时间点，调用本身从不阻塞；
/// - `new_timer`：创建在至少 `duration` 后投递一次通知的定时器。
///
/// 两个实现的通知通道都采用“满则丢弃”语义：未读取的通知至多一条。
pub trait Clock: Send + Sync {
    /// 返回当前时间点。
    fn now(&self) -> Instant;

    /// 等待 `duration` 后向返回的通道投递当时的时间点。
    fn after(&self, duration: Duration) -> NotificationReceiver;

    /// 创建一个在 `duration` 后触发的定时器。
    fn new_timer(&self, duration: Duration) -> Box<dyn Timer>;
}

/// 通过某个时钟实例获得的定时器。
///
/// # 契约说明（What）
/// - `channel`：返回定时器到期时投递时间点的通道，可重复调用，始终返回同一个通道；
/// - `reset`：令定时器在 `duration` 后重新触发，对已触发或已停止的定时器同样有效；
/// - `stop`：阻止定时器继续触发，返回定时器在停止前是否**已经触发**。
///
/// # 调用方义务
/// `reset` 不会清空通道中已投递但未读取的通知。若 `stop` 返回 `true`，调用方应先排空
/// 通道再 `reset`，否则下一次到期的通知会因槽已占用而被丢弃。
pub trait Timer: Send + Sync {
    /// 返回定时器的通知通道。
    fn channel(&self) -> NotificationReceiver;

    /// 令定时器在至少 `duration` 后再次触发。
    fn reset(&self, duration: Duration);

    /// 停止定时器；返回其在停止前是否已经触发。
    fn stop(&self) -> bool;
}

impl<C> Clock for Arc<C>
where
    C: Clock + ?Sized,
{
    fn now(&self) -> Instant {
        (**self).now()
    }

    fn after(&self, duration: Duration) -> NotificationReceiver {
        (**self).after(duration)
    }

    fn new_timer(&self, duration: Duration) -> Box<dyn Timer> {
        (**self).new_timer(duration)
    }
}

impl<T> Timer for Box<T>
where
    T: Timer + ?Sized,
{
    fn channel(&self) -> NotificationReceiver {
        (**self).channel()
    }

    fn reset(&self, duration: Duration) {
        (**self).reset(duration)
    }

    fn stop(&self) -> bool {
        (**self).stop()
    }
}
