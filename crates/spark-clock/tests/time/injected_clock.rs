pub mod injected_clock {
    //! 以 trait 对象注入时钟：被测组件只依赖 `Arc<dyn Clock>`，测试通过虚拟时钟驱动其超时分支。

    use std::sync::Arc;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    use spark_clock::{Clock, MockClock, NotificationReceiver, Timer};

    /// 最小的“等待结果或超时”组件，模拟调用方对时钟的典型用法。
    struct DeadlineWorker {
        clock: Arc<dyn Clock>,
        budget: Duration,
    }

    #[derive(Debug, PartialEq, Eq)]
    enum Outcome {
        Completed(u32),
        TimedOut,
    }

    impl DeadlineWorker {
        fn wait(&self, results: mpsc::Receiver<u32>) -> Outcome {
            let deadline: NotificationReceiver = self.clock.after(self.budget);
            loop {
                if let Ok(value) = results.try_recv() {
                    return Outcome::Completed(value);
                }
                if deadline.try_recv().is_some() {
                    return Outcome::TimedOut;
                }
                thread::sleep(Duration::from_millis(1));
            }
        }
    }

    #[test]
    pub fn injected_mock_clock_drives_timeout_branch() {
        let mock = MockClock::new();
        let worker = DeadlineWorker {
            clock: Arc::new(mock.clone()),
            budget: Duration::from_secs(30),
        };
        let (_tx, rx) = mpsc::channel();

        let handle = thread::spawn(move || worker.wait(rx));
        mock.wait_advance(1, Duration::from_secs(30));

        assert_eq!(handle.join().expect("工作线程不应 panic"), Outcome::TimedOut);
    }

    #[test]
    pub fn injected_mock_clock_lets_result_win_before_deadline() {
        let mock = MockClock::new();
        let worker = DeadlineWorker {
            clock: Arc::new(mock.clone()),
            budget: Duration::from_secs(30),
        };
        let (tx, rx) = mpsc::channel();

        let handle = thread::spawn(move || worker.wait(rx));
        mock.wait_advance(1, Duration::from_secs(29));
        tx.send(7).expect("工作线程仍在等待结果");

        assert_eq!(handle.join().expect("工作线程不应 panic"), Outcome::Completed(7));
    }

    #[test]
    pub fn async_consumer_resumes_after_advance() {
        let mock = MockClock::new();
        let clock: Arc<dyn Clock> = Arc::new(mock.clone());
        let timer = clock.new_timer(Duration::from_millis(250));
        let rx = timer.channel();

        let driver = thread::spawn(move || mock.wait_advance(1, Duration::from_millis(250)));
        let fired_at = futures::executor::block_on(rx.recv_async());
        driver.join().expect("推进线程不应 panic");

        assert!(timer.stop(), "通知已被读取，但定时器仍处于已触发状态");
        assert_eq!(fired_at, clock.now(), "通知携带推进后的虚拟时间点");
    }
}
