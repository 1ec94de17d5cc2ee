//! 虚拟时钟：通过手动推进时间，在测试中确定性地控制超时与定时器的触发时机。
//!
//! # 行为概览（How）
//! - 内部维护 `origin` 与 `elapsed`，当前时间为二者之和；
//! - 每次 `after`/`new_timer` 登记一条 waiter 记录，保存剩余时长与通知槽；
//! - `advance` 在同一把锁下扣减所有 waiter 的剩余时长，并向到期者投递推进后的时间点；
//! - `wait_advance` 阻塞至足够多的消费者取走通道后再推进，用于消除“登记”与“推进”之间的竞态。
//!
//! # 并发模型（What）
//! - 时钟的全部可变状态（当前时间、waiter 集合、每条记录的剩余时长与监听标记）由单一互斥锁保护；
//! - 每个公开操作只在自身执行期间持锁，`wait_advance` 在等待期间释放锁；
//! - 通知投递从不阻塞：槽中已有未读通知时新通知被丢弃。

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace, warn};

use crate::clock::{Clock, Timer};
use crate::config::MockClockConfig;
use crate::error::ClockError;
use crate::notify::{NotificationReceiver, NotificationSlot};

type WaiterId = u64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum WaiterKind {
    /// `after` 登记的一次性超时，触发后即从集合中移除。
    Timeout,
    /// `new_timer` 创建的定时器，触发后保留以便 `reset`。
    Timer,
}

/// 一条待触发的超时/定时器记录。
///
/// `remaining == 0` 表示已到期；`fired` 标记本记录是否已在某次推进中完成投递，
/// 已触发的定时器在 `reset` 之前不会再次投递。
struct Waiter {
    id: WaiterId,
    kind: WaiterKind,
    remaining: Duration,
    fired: bool,
    consumer_waiting: bool,
    // 定时器句柄已被释放：记录仍会按时触发，触发后像一次性超时一样被移除。
    detached: bool,
    slot: NotificationSlot,
}

#[derive(Debug, Default, Clone, Copy)]
struct AdvanceOutcome {
    fired: usize,
    dropped: usize,
}

struct ClockState {
    origin: Instant,
    elapsed: Duration,
    waiters: Vec<Waiter>,
    // 被 `stop` 移出活跃集合的定时器记录，等待 `reset` 重新装填或句柄释放。
    parked: Vec<Waiter>,
    next_id: WaiterId,
}

impl ClockState {
    fn now(&self) -> Instant {
        // `elapsed` 只通过 `representable_elapsed` 更新，二者之和必然可表示。
        self.origin + self.elapsed
    }

    fn register(
        &mut self,
        kind: WaiterKind,
        duration: Duration,
        consumer_waiting: bool,
    ) -> (WaiterId, NotificationSlot) {
        let id = self.next_id;
        self.next_id += 1;
        let slot = NotificationSlot::new();
        self.waiters.push(Waiter {
            id,
            kind,
            remaining: duration,
            fired: false,
            consumer_waiting,
            detached: false,
            slot: slot.clone(),
        });
        trace!(id, ?kind, ?duration, "registered waiter");
        (id, slot)
    }

    fn watched(&self) -> usize {
        self.waiters.iter().filter(|w| w.consumer_waiting).count()
    }

    fn active_position(&self, id: WaiterId) -> Option<usize> {
        self.waiters.iter().position(|w| w.id == id)
    }

    fn parked_position(&self, id: WaiterId) -> Option<usize> {
        self.parked.iter().position(|w| w.id == id)
    }

    fn find_mut(&mut self, id: WaiterId) -> Option<&mut Waiter> {
        self.waiters
            .iter_mut()
            .chain(self.parked.iter_mut())
            .find(|w| w.id == id)
    }

    /// 推进虚拟时间并触发到期的 waiter。
    ///
    /// 所有 waiter 都按推进前的剩余时长判定，通知中携带的是推进后的时间点。
    fn advance(&mut self, delta: Duration) -> AdvanceOutcome {
        let elapsed = representable_elapsed(self.origin, self.elapsed, delta);
        let fired_at = self.origin + elapsed;
        let mut outcome = AdvanceOutcome::default();

        self.waiters.retain_mut(|waiter| {
            if waiter.fired {
                return true;
            }
            if waiter.remaining > delta {
                waiter.remaining -= delta;
                return true;
            }
            waiter.remaining = Duration::ZERO;
            waiter.fired = true;
            outcome.fired += 1;
            if !waiter.slot.try_send(fired_at) {
                // 消费者尚未读取上一条通知。
                outcome.dropped += 1;
                trace!(id = waiter.id, "notification slot occupied; dropped");
            }
            waiter.kind == WaiterKind::Timer && !waiter.detached
        });

        self.elapsed = elapsed;
        outcome
    }
}

/// 返回推进 `delta` 后的累计时长，截断到 `origin` 之后可表示的最大偏移。
///
/// 前置条件：`origin + current` 可表示。超出 `Instant` 范围的推进不会 panic，
/// 到期判定仍按完整的 `delta` 进行，只有时间点被截断。
fn representable_elapsed(origin: Instant, current: Duration, delta: Duration) -> Duration {
    let wanted = current.saturating_add(delta);
    if origin.checked_add(wanted).is_some() {
        return wanted;
    }
    // 不变量：`origin + lo` 可表示，`origin + hi` 溢出。
    let (mut lo, mut hi) = (current, wanted);
    while hi - lo > Duration::from_nanos(1) {
        let mid = lo + (hi - lo) / 2;
        if origin.checked_add(mid).is_some() {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    warn!(?delta, "advance overflows Instant; clamping mock clock time");
    lo
}

struct MockClockInner {
    state: Mutex<ClockState>,
    // 监听计数可能发生变化时通知 `wait_advance`。
    watchers: Condvar,
    config: MockClockConfig,
}

impl MockClockInner {
    fn lock(&self) -> parking_lot::MutexGuard<'_, ClockState> {
        self.state.lock()
    }
}

/// 虚拟时钟。
///
/// # 设计动机（Why）
/// - 超时、重试与心跳逻辑需要在 CI 中 100% 可复现；
/// - 虚拟时钟让测试显式控制时间推进，通知立即投递，不受真实时间抖动影响。
///
/// # 契约说明（What）
/// - 克隆得到的句柄共享同一条时间轴；
/// - [`advance`](Self::advance) 可多次调用，时间单调增加；
/// - 零时长登记不会在登记时立即触发，而是在下一次 `advance`（包括 `advance(Duration::ZERO)`）时触发；
/// - 已触发的定时器保留在集合中直至 `stop` 或句柄释放，且在 `reset` 之前不会再次触发；
/// - `advance` 的目标时间超出 [`Instant`] 的表示范围时截断到最大可表示时间点，不会 panic。
///
/// # 使用指引（How）
/// ```
/// use std::time::Duration;
/// use spark_clock::MockClock;
///
/// let clock = MockClock::new();
/// let timeout = clock.after(Duration::from_secs(30));
/// clock.advance(Duration::from_secs(30));
/// assert!(timeout.try_recv().is_some());
/// ```
#[derive(Clone)]
pub struct MockClock {
    inner: Arc<MockClockInner>,
}

impl MockClock {
    /// 创建起始时间为当前系统时间的虚拟时钟。
    pub fn new() -> Self {
        Self::with_start(Instant::now())
    }

    /// 以指定起始时间构造虚拟时钟，便于在测试中固定初始时间点。
    pub fn with_start(origin: Instant) -> Self {
        Self::from_parts(origin, MockClockConfig::default())
    }

    /// 返回构造器，可同时指定起始时间与运行参数。
    pub fn builder() -> MockClockBuilder {
        MockClockBuilder::default()
    }

    fn from_parts(origin: Instant, config: MockClockConfig) -> Self {
        let state = ClockState {
            origin,
            elapsed: Duration::ZERO,
            waiters: Vec::new(),
            parked: Vec::new(),
            next_id: 0,
        };
        Self {
            inner: Arc::new(MockClockInner {
                state: Mutex::new(state),
                watchers: Condvar::new(),
                config,
            }),
        }
    }

    /// 返回当前虚拟时间点。
    pub fn now(&self) -> Instant {
        self.inner.lock().now()
    }

    /// 返回自起始时间以来累计推进的虚拟时长。
    pub fn elapsed(&self) -> Duration {
        self.inner.lock().elapsed
    }

    /// 登记一次性超时。
    ///
    /// 返回的通道是使用该超时的唯一途径，因此登记即视为“消费者已在监听”。
    pub fn after(&self, duration: Duration) -> NotificationReceiver {
        let slot = {
            let mut state = self.inner.lock();
            state.register(WaiterKind::Timeout, duration, true).1
        };
        self.inner.watchers.notify_all();
        slot.receiver()
    }

    /// 创建定时器。
    ///
    /// 与 `after` 不同，定时器只有在调用 [`MockTimer::channel`] 之后才计入监听数量。
    pub fn new_timer(&self, duration: Duration) -> MockTimer {
        let (id, slot) = self
            .inner
            .lock()
            .register(WaiterKind::Timer, duration, false);
        MockTimer {
            clock: Arc::clone(&self.inner),
            id,
            slot,
        }
    }

    /// 推进时钟并触发所有到期的超时/定时器。
    ///
    /// 剩余时长不超过 `delta` 的 waiter 被置零并收到推进后的时间点；槽中已有未读通知时，
    /// 新通知被丢弃。其余 waiter 的剩余时长扣减 `delta`。
    pub fn advance(&self, delta: Duration) {
        let mut state = self.inner.lock();
        let outcome = state.advance(delta);
        let pending = state.waiters.len();
        drop(state);
        debug!(
            ?delta,
            fired = outcome.fired,
            dropped = outcome.dropped,
            pending,
            "advanced mock clock"
        );
    }

    /// 阻塞直至至少 `required` 个活跃 waiter 处于监听状态，然后推进 `delta`。
    ///
    /// 等待期间不持有时钟的锁；达到阈值时推进与判定在同一临界区内完成。
    /// 若配置了 `wait_timeout` 且在期限内未达到阈值，该调用 panic，以免测试无限挂起；
    /// 需要显式处理超时请使用 [`wait_advance_timeout`](Self::wait_advance_timeout)。
    pub fn wait_advance(&self, required: usize, delta: Duration) {
        let deadline = self.inner.config.wait_timeout();
        if let Err(err) = self.wait_then_advance(required, delta, deadline) {
            panic!("{err}");
        }
    }

    /// 与 [`wait_advance`](Self::wait_advance) 相同，但在 `timeout` 的真实时间内未达到阈值时返回错误，
    /// 此时时钟不会被推进。
    pub fn wait_advance_timeout(
        &self,
        required: usize,
        delta: Duration,
        timeout: Duration,
    ) -> Result<(), ClockError> {
        self.wait_then_advance(required, delta, Some(timeout))
    }

    fn wait_then_advance(
        &self,
        required: usize,
        delta: Duration,
        timeout: Option<Duration>,
    ) -> Result<(), ClockError> {
        let started = Instant::now();
        let poll_interval = self.inner.config.poll_interval();
        let mut state = self.inner.lock();
        loop {
            let observed = state.watched();
            if observed >= required {
                let outcome = state.advance(delta);
                drop(state);
                debug!(
                    required,
                    observed,
                    ?delta,
                    fired = outcome.fired,
                    "watched threshold reached; advanced mock clock"
                );
                return Ok(());
            }

            let wait = match timeout {
                Some(timeout) => {
                    let waited = started.elapsed();
                    if waited >= timeout {
                        return Err(ClockError::WaitAdvanceTimeout {
                            required,
                            observed,
                            waited,
                        });
                    }
                    (timeout - waited).min(poll_interval)
                }
                None => poll_interval,
            };
            trace!(required, observed, "waiting for consumers");
            self.inner.watchers.wait_for(&mut state, wait);
        }
    }

    /// 当前活跃（未被移除）的 waiter 数量。
    pub fn pending_waiters(&self) -> usize {
        self.inner.lock().waiters.len()
    }

    /// 当前处于监听状态的活跃 waiter 数量，即 `wait_advance` 判定所用的计数。
    pub fn watched_waiters(&self) -> usize {
        self.inner.lock().watched()
    }

    /// 返回时钟使用的运行参数。
    pub fn config(&self) -> MockClockConfig {
        self.inner.config
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MockClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("MockClock")
            .field("elapsed", &state.elapsed)
            .field("pending", &state.waiters.len())
            .field("watched", &state.watched())
            .finish()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        MockClock::now(self)
    }

    fn after(&self, duration: Duration) -> NotificationReceiver {
        MockClock::after(self, duration)
    }

    fn new_timer(&self, duration: Duration) -> Box<dyn Timer> {
        Box::new(MockClock::new_timer(self, duration))
    }
}

/// [`MockClock`] 构造器。
#[derive(Debug, Default)]
pub struct MockClockBuilder {
    start: Option<Instant>,
    config: MockClockConfig,
}

impl MockClockBuilder {
    /// 固定起始时间点；未设置时取构造时的 [`Instant::now`]。
    pub fn start(mut self, origin: Instant) -> Self {
        self.start = Some(origin);
        self
    }

    pub fn config(mut self, config: MockClockConfig) -> Self {
        self.config = config;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config = self.config.with_poll_interval(interval);
        self
    }

    pub fn wait_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.with_wait_timeout(Some(timeout));
        self
    }

    /// 校验配置并构造时钟。
    pub fn build(self) -> Result<MockClock, ClockError> {
        self.config.validate()?;
        let origin = self.start.unwrap_or_else(Instant::now);
        Ok(MockClock::from_parts(origin, self.config))
    }
}

/// 绑定到 [`MockClock`] 中一条 waiter 记录的定时器句柄。
///
/// # 教案式说明
/// - **意图 (Why)**：镜像真实定时器的 `channel`/`reset`/`stop` 三个操作，使被测代码无需感知时钟实现；
/// - **契约 (What)**：
///   - 句柄不拥有 waiter 记录，所有修改都经由时钟的锁完成，因此与并发的 `advance` 互斥；
///   - `stop` 将记录移出活跃集合，`reset` 可将其重新装填；
///   - 只有 `stop` 能取消尚未触发的定时器；句柄被 Drop 后，计时中的记录仍会触发并向已取出的通道投递，
///     随后被移除，已停止或已触发的记录则立即释放；
/// - **风险 (Trade-offs)**：`reset` 不会排空通道，若 `stop` 返回 `true` 需由调用方先行读取残留通知。
pub struct MockTimer {
    clock: Arc<MockClockInner>,
    id: WaiterId,
    slot: NotificationSlot,
}

impl MockTimer {
    /// 返回定时器的通知通道，并将其标记为“消费者已在监听”。
    pub fn channel(&self) -> NotificationReceiver {
        let newly_watched = {
            let mut state = self.clock.lock();
            match state.find_mut(self.id) {
                Some(waiter) if !waiter.consumer_waiting => {
                    waiter.consumer_waiting = true;
                    true
                }
                _ => false,
            }
        };
        if newly_watched {
            self.clock.watchers.notify_all();
        }
        self.slot.receiver()
    }

    /// 将剩余时长重置为 `duration` 并重新装填定时器。
    pub fn reset(&self, duration: Duration) {
        {
            let mut state = self.clock.lock();
            if let Some(pos) = state.active_position(self.id) {
                let waiter = &mut state.waiters[pos];
                waiter.remaining = duration;
                waiter.fired = false;
            } else if let Some(pos) = state.parked_position(self.id) {
                let mut waiter = state.parked.swap_remove(pos);
                waiter.remaining = duration;
                waiter.fired = false;
                state.waiters.push(waiter);
            }
        }
        trace!(id = self.id, ?duration, "timer reset");
        self.clock.watchers.notify_all();
    }

    /// 停止定时器，返回其在停止前是否已经触发。
    ///
    /// “已触发”指某次 `advance` 已向该记录投递（或尝试投递）通知；零时长定时器在首次推进前
    /// 尚未触发，此时 `stop` 返回 `false`。
    ///
    /// 判定与移除在同一临界区内完成，不会与并发的 `advance` 交错。
    pub fn stop(&self) -> bool {
        let mut state = self.clock.lock();
        let fired = if let Some(pos) = state.active_position(self.id) {
            let waiter = state.waiters.swap_remove(pos);
            let fired = waiter.fired;
            state.parked.push(waiter);
            fired
        } else if let Some(pos) = state.parked_position(self.id) {
            state.parked[pos].fired
        } else {
            false
        };
        drop(state);
        trace!(id = self.id, fired, "timer stopped");
        fired
    }
}

impl Drop for MockTimer {
    fn drop(&mut self) {
        let mut state = self.clock.lock();
        let id = self.id;
        // 已停止或已触发的记录无法再被 `reset`，直接释放；仍在计时的记录照常触发。
        state.parked.retain(|w| w.id != id);
        if let Some(pos) = state.active_position(id) {
            if state.waiters[pos].fired {
                state.waiters.swap_remove(pos);
            } else {
                state.waiters[pos].detached = true;
            }
        }
    }
}

impl fmt::Debug for MockTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockTimer").field("id", &self.id).finish()
    }
}

impl Timer for MockTimer {
    fn channel(&self) -> NotificationReceiver {
        MockTimer::channel(self)
    }

    fn reset(&self, duration: Duration) {
        MockTimer::reset(self, duration)
    }

    fn stop(&self) -> bool {
        MockTimer::stop(self)
    }
}
