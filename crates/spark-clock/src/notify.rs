//! 通知槽：超时/定时器到期时投递触发时刻的单元素通道。
//!
//! # 模块定位（Why）
//! - 推进时钟的驱动线程绝不能被缓慢或缺席的消费者阻塞，因此投递一律采用“满则丢弃”的非阻塞语义；
//! - 同一个槽在任意时刻至多持有一个未读取的值，重复投递被静默丢弃而不会排队。
//!
//! # 结构概览（What）
//! - [`NotificationSlot`]：生产侧句柄，仅在 crate 内部由时钟实现持有；
//! - [`NotificationReceiver`]：只读的消费侧句柄，可克隆，支持非阻塞、阻塞、限时与异步四种读取方式；
//! - [`Recv`]：`recv_async` 返回的 Future，遵循标准 `Poll` 契约登记 waker。

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// 槽的共享状态。`value` 与 `wakers` 始终在同一把锁下读写。
#[derive(Default)]
struct SlotState {
    value: Option<Instant>,
    // 每个挂起的 `Recv` 至多登记一个 waker，以登记号区分。
    wakers: Vec<(u64, Waker)>,
    next_key: u64,
}

#[derive(Default)]
struct SlotInner {
    state: Mutex<SlotState>,
    ready: Condvar,
}

/// 通知槽的生产侧。
///
/// # 教案式说明
/// - **意图 (Why)**：把“容量为 1 的有界队列 + try-send”这一背压策略固化为独立类型，
///   避免时钟实现各自拼装通道语义；
/// - **契约 (What)**：[`try_send`](Self::try_send) 从不阻塞；槽已被占用时返回 `false` 且保留旧值；
/// - **实现 (How)**：写入成功后先释放锁，再唤醒条件变量上的阻塞读者与登记过的异步 waker。
#[derive(Clone, Default)]
pub(crate) struct NotificationSlot {
    inner: Arc<SlotInner>,
}

impl NotificationSlot {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// 返回绑定到同一槽的只读句柄。
    pub(crate) fn receiver(&self) -> NotificationReceiver {
        NotificationReceiver {
            inner: Arc::clone(&self.inner),
        }
    }

    /// 尝试投递触发时刻；若上一条通知尚未被读取则丢弃本次通知并返回 `false`。
    pub(crate) fn try_send(&self, at: Instant) -> bool {
        let wakers = {
            let mut state = self.inner.state.lock();
            if state.value.is_some() {
                return false;
            }
            state.value = Some(at);
            std::mem::take(&mut state.wakers)
        };
        self.inner.ready.notify_all();
        for (_, waker) in wakers {
            waker.wake();
        }
        true
    }
}

/// 通知槽的只读句柄，对应“到期时收到当前时刻”的通道读端。
///
/// # 契约说明（What）
/// - 句柄可自由克隆，所有克隆共享同一个槽；一个值只会被其中一次读取取走；
/// - 读取不会影响时钟内部的 waiter 状态，也不会触发重新计时；
/// - 所有读取方法都可在任意线程调用，阻塞读取期间不持有时钟的锁。
#[derive(Clone)]
pub struct NotificationReceiver {
    inner: Arc<SlotInner>,
}

impl NotificationReceiver {
    /// 非阻塞读取：若槽中有值则取走并返回。
    pub fn try_recv(&self) -> Option<Instant> {
        self.inner.state.lock().value.take()
    }

    /// 阻塞直至收到通知。
    ///
    /// 若对应的超时/定时器永远不会到期（例如已被 `stop`），该调用将永久阻塞；
    /// 测试代码应优先使用 [`recv_timeout`](Self::recv_timeout)。
    pub fn recv(&self) -> Instant {
        let mut state = self.inner.state.lock();
        loop {
            if let Some(at) = state.value.take() {
                return at;
            }
            self.inner.ready.wait(&mut state);
        }
    }

    /// 在 `timeout` 的真实时间内等待通知，超时返回 `None`。
    ///
    /// `timeout` 超出 [`Instant`] 的表示范围时等价于 [`recv`](Self::recv)。
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Instant> {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return Some(self.recv());
        };
        let mut state = self.inner.state.lock();
        loop {
            if let Some(at) = state.value.take() {
                return Some(at);
            }
            if self
                .inner
                .ready
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                return state.value.take();
            }
        }
    }

    /// 以 Future 形式等待通知，便于在异步执行器中消费时钟。
    pub fn recv_async(&self) -> Recv<'_> {
        Recv {
            receiver: self,
            key: None,
        }
    }

    /// 槽中当前是否存在尚未读取的通知。
    pub fn is_ready(&self) -> bool {
        self.inner.state.lock().value.is_some()
    }

    /// 判断两个句柄是否指向同一个槽。
    pub fn same_channel(&self, other: &NotificationReceiver) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn poll_recv(&self, key: &mut Option<u64>, cx: &mut Context<'_>) -> Poll<Instant> {
        let mut state = self.inner.state.lock();
        if let Some(at) = state.value.take() {
            Self::unregister(&mut state, key);
            return Poll::Ready(at);
        }
        // 投递时登记表被整体取走，旧登记号可能已失效。
        let existing = match *key {
            Some(k) => state.wakers.iter_mut().find(|(id, _)| *id == k),
            None => None,
        };
        match existing {
            Some((_, waker)) => {
                if !waker.will_wake(cx.waker()) {
                    *waker = cx.waker().clone();
                }
            }
            None => {
                let k = state.next_key;
                state.next_key += 1;
                state.wakers.push((k, cx.waker().clone()));
                *key = Some(k);
            }
        }
        Poll::Pending
    }

    fn unregister(state: &mut SlotState, key: &mut Option<u64>) {
        if let Some(k) = key.take() {
            state.wakers.retain(|(id, _)| *id != k);
        }
    }

    #[cfg(test)]
    fn registered_wakers(&self) -> usize {
        self.inner.state.lock().wakers.len()
    }
}

impl fmt::Debug for NotificationReceiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationReceiver")
            .field("ready", &self.is_ready())
            .finish()
    }
}

/// [`NotificationReceiver::recv_async`] 返回的 Future。
///
/// 在值到达前返回 `Poll::Pending` 并登记当前 waker；投递发生后 waker 被唤醒，
/// 下一次 `poll` 取走值并完成。被丢弃时撤销其 waker 登记，不会影响槽中的值。
#[must_use = "futures do nothing unless polled"]
pub struct Recv<'a> {
    receiver: &'a NotificationReceiver,
    key: Option<u64>,
}

impl Future for Recv<'_> {
    type Output = Instant;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        this.receiver.poll_recv(&mut this.key, cx)
    }
}

impl Drop for Recv<'_> {
    fn drop(&mut self) {
        if self.key.is_some() {
            let mut state = self.receiver.inner.state.lock();
            NotificationReceiver::unregister(&mut state, &mut self.key);
        }
    }
}
