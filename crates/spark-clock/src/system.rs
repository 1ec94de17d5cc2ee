//! 基于宿主单调时间与后台线程计时的真实时钟。
//!
//! - `now` 直接委托给 [`Instant::now`]；
//! - `after`/`new_timer` 为每次计时启动一个辅助线程，到期后以非阻塞方式投递通知；
//! - 调用频率较低的控制面逻辑（超时、重试节律）可以容忍每次等待一个线程的开销，
//!   高频场景应注入专用的时钟实现。

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::trace;

use crate::clock::{Clock, Timer};
use crate::notify::{NotificationReceiver, NotificationSlot};

/// 进程级共享的真实时钟实例；零尺寸、无状态，无需初始化或销毁。
pub static SYSTEM_CLOCK: SystemClock = SystemClock;

/// 真实时钟。
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl SystemClock {
    /// 以 trait 对象形式返回真实时钟，便于注入 `Arc<dyn Clock>` 形态的依赖。
    pub fn shared() -> Arc<dyn Clock> {
        Arc::new(SYSTEM_CLOCK)
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn after(&self, duration: Duration) -> NotificationReceiver {
        let slot = NotificationSlot::new();
        let receiver = slot.receiver();
        thread::spawn(move || {
            thread::sleep(duration);
            slot.try_send(Instant::now());
        });
        receiver
    }

    fn new_timer(&self, duration: Duration) -> Box<dyn Timer> {
        Box::new(SystemTimer::start(duration))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    /// `None` 表示截止时间超出 `Instant` 的可表示范围，永不触发。
    Armed(Option<Instant>),
    Fired,
    Stopped { fired: bool },
}

struct TimerState {
    // 每次装填递增，旧的计时线程发现代数不符即退出。
    generation: u64,
    phase: Phase,
}

struct TimerShared {
    state: Mutex<TimerState>,
    changed: Condvar,
    slot: NotificationSlot,
}

/// 真实时钟创建的定时器。
///
/// 与 [`MockTimer`](crate::MockTimer) 遵循相同契约：`stop` 返回定时器在停止前是否已经触发，
/// `reset` 可重新装填已触发或已停止的定时器。句柄被 Drop 时后台计时线程随之退出。
pub struct SystemTimer {
    shared: Arc<TimerShared>,
}

impl SystemTimer {
    fn start(duration: Duration) -> Self {
        let timer = Self {
            shared: Arc::new(TimerShared {
                state: Mutex::new(TimerState {
                    generation: 0,
                    phase: Phase::Stopped { fired: false },
                }),
                changed: Condvar::new(),
                slot: NotificationSlot::new(),
            }),
        };
        timer.arm(duration);
        timer
    }

    fn arm(&self, duration: Duration) {
        let generation = {
            let mut state = self.shared.state.lock();
            state.generation += 1;
            state.phase = Phase::Armed(Instant::now().checked_add(duration));
            state.generation
        };
        self.shared.changed.notify_all();

        let shared = Arc::clone(&self.shared);
        thread::spawn(move || run_timer(&shared, generation));
    }
}

fn run_timer(shared: &TimerShared, generation: u64) {
    let mut state = shared.state.lock();
    loop {
        if state.generation != generation {
            return;
        }
        match state.phase {
            Phase::Armed(Some(deadline)) => {
                let now = Instant::now();
                if now >= deadline {
                    state.phase = Phase::Fired;
                    let delivered = shared.slot.try_send(now);
                    trace!(generation, delivered, "system timer fired");
                    return;
                }
                shared.changed.wait_until(&mut state, deadline);
            }
            Phase::Armed(None) => shared.changed.wait(&mut state),
            Phase::Fired | Phase::Stopped { .. } => return,
        }
    }
}

impl Timer for SystemTimer {
    fn channel(&self) -> NotificationReceiver {
        self.shared.slot.receiver()
    }

    fn reset(&self, duration: Duration) {
        self.arm(duration);
    }

    fn stop(&self) -> bool {
        let fired = {
            let mut state = self.shared.state.lock();
            let fired = match state.phase {
                Phase::Armed(_) => false,
                Phase::Fired => true,
                Phase::Stopped { fired } => fired,
            };
            state.generation += 1;
            state.phase = Phase::Stopped { fired };
            fired
        };
        self.shared.changed.notify_all();
        fired
    }
}

impl Drop for SystemTimer {
    fn drop(&mut self) {
        self.stop();
    }
}
