pub mod mock_clock_scenarios {
    //! 虚拟时钟端到端场景。
    //!
    //! # 测试目标（Why）
    //! - 推进线程与消费线程分离时，到期通知必须在有限的真实时间内到达；
    //! - 定时器的 `stop` 返回值必须如实反映“停止前是否已触发”，`reset` 能重新装填；
    //! - `wait_advance` 只有在足够多的消费者取走通道后才推进时钟；
    //! - 并发的 `stop` 与 `advance` 对“是否已投递”的判断必须一致。

    use std::sync::{Arc, Barrier, mpsc};
    use std::thread;
    use std::time::{Duration, Instant};

    use spark_clock::MockClock;

    const MINUTE: Duration = Duration::from_secs(60);
    const PATIENCE: Duration = Duration::from_secs(3);

    /// 两个超时在另一线程的一次推进中同时到期，且到期记录被移出集合。
    #[test]
    pub fn advance_from_other_thread_fires_both_timeouts() {
        let start = Instant::now();
        let clock = MockClock::with_start(start);

        let first = clock.after(10 * MINUTE);
        let second = clock.after(11 * MINUTE);

        let driver = {
            let clock = clock.clone();
            thread::spawn(move || clock.advance(11 * MINUTE))
        };

        let first_at = first
            .recv_timeout(PATIENCE)
            .expect("10 分钟超时应在推进后触发");
        let second_at = second
            .recv_timeout(PATIENCE)
            .expect("11 分钟超时应在推进后触发");
        driver.join().expect("推进线程不应 panic");

        assert_eq!(first_at, start + 11 * MINUTE, "通知携带推进后的时间点");
        assert_eq!(second_at, start + 11 * MINUTE);
        assert_eq!(clock.pending_waiters(), 0, "到期的超时应从集合中移除");
    }

    /// 定时器到期后 stop 返回 true，通道中保留通知；重置后再次 stop 返回 false。
    #[test]
    pub fn timer_stop_reports_fired_and_reset_rearms() {
        let clock = MockClock::new();
        let timer = clock.new_timer(10 * MINUTE);

        clock.advance(10 * MINUTE);
        assert!(timer.stop(), "已触发的定时器 stop 应返回 true");
        assert!(
            timer.channel().recv_timeout(PATIENCE).is_some(),
            "到期时通知应已写入通道"
        );

        timer.reset(5 * MINUTE);
        assert!(!timer.stop(), "尚未触发的定时器 stop 应返回 false");
    }

    /// 触发、停止、排空、重置、再推进：定时器再次触发。
    #[test]
    pub fn reset_after_stop_fires_again() {
        let clock = MockClock::new();
        let timer = clock.new_timer(MINUTE);
        let rx = timer.channel();

        clock.advance(MINUTE);
        assert!(timer.stop());
        assert!(rx.try_recv().is_some());

        timer.reset(2 * MINUTE);
        clock.advance(MINUTE);
        assert_eq!(rx.try_recv(), None, "剩余一分钟时不应触发");
        clock.advance(MINUTE);
        assert_eq!(rx.try_recv(), Some(clock.now()));
    }

    /// 停止后的定时器在后续推进中不再触发，无论停止前是否已触发。
    #[test]
    pub fn stopped_waiters_stay_silent() {
        let clock = MockClock::new();
        let armed = clock.new_timer(MINUTE);
        let fired = clock.new_timer(MINUTE);
        let armed_rx = armed.channel();
        let fired_rx = fired.channel();

        assert!(!armed.stop());
        clock.advance(MINUTE);
        assert!(fired.stop());
        assert!(fired_rx.try_recv().is_some());

        clock.advance(10 * MINUTE);
        assert_eq!(armed_rx.try_recv(), None);
        assert_eq!(fired_rx.try_recv(), None);
    }

    /// `wait_advance` 在定时器通道被取走之前保持阻塞。
    #[test]
    pub fn wait_advance_unblocks_once_timer_channel_is_taken() {
        let clock = MockClock::builder()
            .poll_interval(Duration::from_millis(10))
            .build()
            .expect("合法配置");

        let timeout = clock.after(10 * MINUTE);
        let timer = clock.new_timer(10 * MINUTE);
        let (advanced_tx, advanced_rx) = mpsc::channel();

        let driver = {
            let clock = clock.clone();
            thread::spawn(move || {
                clock.wait_advance(2, 10 * MINUTE);
                let _ = advanced_tx.send(());
            })
        };

        assert!(
            advanced_rx.recv_timeout(Duration::from_millis(100)).is_err(),
            "只有一个消费者在监听时不应推进"
        );
        assert_eq!(clock.elapsed(), Duration::ZERO);

        let timer_rx = timer.channel();
        advanced_rx
            .recv_timeout(PATIENCE)
            .expect("两个消费者就绪后 wait_advance 应返回");
        driver.join().expect("推进线程不应 panic");

        assert!(timeout.recv_timeout(PATIENCE).is_some());
        assert!(timer_rx.recv_timeout(PATIENCE).is_some());
    }

    /// `stop` 与另一线程的 `advance` 竞争：返回值与通道中是否出现通知严格一致，停止后不再投递。
    #[test]
    pub fn concurrent_stop_and_advance_agree_on_delivery() {
        let mut outcomes = [0usize; 2];
        for _ in 0..500 {
            let clock = MockClock::new();
            let timer = clock.new_timer(MINUTE);
            let rx = timer.channel();
            let start = Arc::new(Barrier::new(2));

            let driver = {
                let clock = clock.clone();
                let start = Arc::clone(&start);
                thread::spawn(move || {
                    start.wait();
                    clock.advance(MINUTE);
                })
            };

            start.wait();
            let fired = timer.stop();
            driver.join().expect("推进线程不应 panic");

            let delivered = rx.try_recv().is_some();
            assert_eq!(fired, delivered, "stop 的返回值必须与通道中的通知一致");
            outcomes[usize::from(fired)] += 1;

            clock.advance(10 * MINUTE);
            assert_eq!(rx.try_recv(), None, "停止后的定时器不得再投递");
            assert_eq!(clock.pending_waiters(), 0);
        }
        assert_eq!(outcomes.iter().sum::<usize>(), 500);
    }

    /// 定时器句柄被释放后仍计入监听数量，`wait_advance` 推进后已取出的通道照常收到通知。
    #[test]
    pub fn wait_advance_counts_timer_whose_handle_was_dropped() {
        let clock = MockClock::builder()
            .poll_interval(Duration::from_millis(10))
            .build()
            .expect("合法配置");

        let driver = {
            let clock = clock.clone();
            thread::spawn(move || clock.wait_advance(1, 10 * MINUTE))
        };

        let rx = clock.new_timer(10 * MINUTE).channel();
        assert!(
            rx.recv_timeout(PATIENCE).is_some(),
            "只有 stop 能取消计时中的定时器"
        );
        driver.join().expect("推进线程不应 panic");
        assert_eq!(clock.pending_waiters(), 0);
    }
}
