#[cfg(test)]
mod tests {
    use latchpool::{
        errors::{ParallelError, TaskError},
        latch::{CompletionLatch, WaitOutcome},
        worker::NamedWorkerFactory,
        Config,
        Parallelizer,
    };
    use std::{
        error::Error,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc, Mutex,
        },
        thread,
        time::{Duration, Instant},
    };
    use tokio_util::sync::CancellationToken;

    #[test]
    fn test_latch_zero_returns_immediately() {
        println!("\n=== TEST: Latch at zero ===");
        let latch = CompletionLatch::new(0);

        let now = Instant::now();
        latch.await_zero();
        assert!(now.elapsed() < Duration::from_millis(50));
        assert_eq!(latch.await_zero_timeout(Duration::ZERO), WaitOutcome::Zero);
        println!("  ✓ await_zero returned without blocking");
    }

    #[test]
    fn test_latch_releases_waiter() {
        println!("\n=== TEST: Latch releases waiter ===");
        let latch = Arc::new(CompletionLatch::default());
        for _ in 0..8 {
            latch.increment();
        }
        assert_eq!(latch.pending(), 8);

        let waiter = {
            let latch = latch.clone();
            thread::spawn(move || {
                latch.await_zero();
                latch.pending()
            })
        };

        let decrementers: Vec<_> = (0..4)
            .map(|_| {
                let latch = latch.clone();
                thread::spawn(move || {
                    for _ in 0..2 {
                        thread::sleep(Duration::from_millis(5));
                        latch.decrement();
                    }
                })
            })
            .collect();

        for d in decrementers {
            d.join().unwrap();
        }
        assert_eq!(waiter.join().unwrap(), 0);
        println!("  ✓ Waiter released at zero");
    }

    #[test]
    fn test_latch_timeout() {
        println!("\n=== TEST: Latch timeout ===");
        let latch = CompletionLatch::new(1);
        let outcome = latch.await_zero_timeout(Duration::from_millis(30));
        assert_eq!(outcome, WaitOutcome::TimedOut);
        assert_eq!(latch.pending(), 1);
    }

    #[test]
    fn test_latch_cancelled_wait_is_not_an_error() {
        println!("\n=== TEST: Cancelled latch wait ===");
        let latch = CompletionLatch::new(1);
        let token = CancellationToken::new();

        let canceller = {
            let token = token.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                token.cancel();
            })
        };

        let now = Instant::now();
        let outcome = latch.await_zero_cancellable(&token);
        canceller.join().unwrap();

        assert_eq!(outcome, WaitOutcome::Cancelled);
        assert!(now.elapsed() < Duration::from_secs(2));
        assert_eq!(latch.pending(), 1, "Cancellation must not touch the count");
        println!("  ✓ Wait returned early on cancellation");
    }

    #[test]
    fn test_latch_cancel_poll_interval() {
        println!("\n=== TEST: Cancellation poll interval ===");
        assert_eq!(
            CompletionLatch::with_cancel_poll(0, Duration::ZERO).cancel_poll(),
            Duration::from_millis(1)
        );

        let latch = CompletionLatch::with_cancel_poll(1, Duration::from_millis(200));
        let token = CancellationToken::new();
        let canceller = {
            let token = token.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                token.cancel();
            })
        };

        let now = Instant::now();
        let outcome = latch.await_zero_cancellable(&token);
        canceller.join().unwrap();

        assert_eq!(outcome, WaitOutcome::Cancelled);
        // Cancellation is only noticed on the next poll.
        assert!(now.elapsed() >= Duration::from_millis(150), "{:?}", now.elapsed());
        println!("  ✓ Cancellation noticed after {:?}", now.elapsed());
    }

    #[test]
    fn test_latch_zero_wakes_before_poll() {
        let latch = Arc::new(CompletionLatch::with_cancel_poll(1, Duration::from_secs(5)));
        let token = CancellationToken::new();
        let decrementer = {
            let latch = latch.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                latch.decrement();
            })
        };

        let now = Instant::now();
        assert_eq!(latch.await_zero_cancellable(&token), WaitOutcome::Zero);
        decrementer.join().unwrap();
        assert!(now.elapsed() < Duration::from_secs(2));
    }

    #[test]
    #[should_panic(expected = "below zero")]
    fn test_latch_underflow_panics() {
        let latch = CompletionLatch::new(0);
        latch.decrement();
    }

    #[test]
    fn test_worker_factory_naming() {
        println!("\n=== TEST: Worker names ===");
        let factory = NamedWorkerFactory::new(Some("cache"), Some("flush"));
        assert_eq!(factory.next_name(), "cache-flush-1");
        assert_eq!(factory.next_name(), "cache-flush-2");

        let shared = factory.clone();
        assert_eq!(shared.next_name(), "cache-flush-3");

        let name = factory
            .spawn(|| thread::current().name().map(str::to_owned))
            .unwrap()
            .join()
            .unwrap();
        assert_eq!(name.as_deref(), Some("cache-flush-4"));

        assert_eq!(NamedWorkerFactory::new(None, None).next_name(), "worker-1");
        assert_eq!(NamedWorkerFactory::new(Some("io"), None).next_name(), "io-1");
        assert!(!factory.is_daemon());
        assert!(factory.daemon(true).is_daemon());
        println!("  ✓ Names are unique and increasing");
    }

    #[test]
    fn test_zero_pool_size_rejected() {
        match Parallelizer::new(0) {
            Err(ParallelError::InvalidPoolSize(0)) => {}
            Err(e) => panic!("unexpected error: {e}"),
            Ok(_) => panic!("pool of size 0 must be rejected"),
        }
    }

    #[test]
    fn test_run_invokes_each_element_once() {
        println!("\n=== TEST: One call per element ===");
        for (n, k) in [(0usize, 1usize), (1, 4), (7, 3), (100, 4), (50, 64)] {
            let calls: Vec<AtomicUsize> = (0..n).map(|_| AtomicUsize::new(0)).collect();

            Parallelizer::new(k)
                .unwrap()
                .input(0..n)
                .run(|i| {
                    calls[i].fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .unwrap();

            assert!(
                calls.iter().all(|c| c.load(Ordering::SeqCst) == 1),
                "n={n} k={k}: every element must be visited exactly once"
            );
        }
        println!("  ✓ All sizes visited exactly once");
    }

    #[test]
    fn test_run_borrows_caller_data() {
        let words = vec!["alpha".to_string(), "beta".to_string(), "gamma".to_string()];
        let total = Mutex::new(0usize);

        Parallelizer::new(2)
            .unwrap()
            .input(words.iter())
            .run(|w| {
                *total.lock().unwrap() += w.len();
                Ok(())
            })
            .unwrap();

        assert_eq!(*total.lock().unwrap(), 14);
    }

    #[derive(Debug)]
    enum Item {
        Num(u32),
        Text(&'static str),
    }

    #[test]
    fn test_run_surfaces_failure_after_all_calls() {
        println!("\n=== TEST: Failure on 'boom' ===");
        let input = vec![Item::Num(1), Item::Num(2), Item::Text("boom"), Item::Num(4)];
        let seen: Vec<AtomicUsize> = (0..5).map(|_| AtomicUsize::new(0)).collect();

        let result = Parallelizer::new(2)
            .unwrap()
            .input(input.iter())
            .run(|item| match item {
                Item::Num(n) => {
                    thread::sleep(Duration::from_millis(20));
                    seen[*n as usize].fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
                Item::Text(s) => Err(format!("cannot handle {s}").into()),
            });

        let err = result.expect_err("run must fail");
        match &err {
            ParallelError::TaskFailed { failures, cause } => {
                assert_eq!(*failures, 1);
                assert!(matches!(cause, TaskError::Failed(_)));
                assert!(cause.to_string().contains("boom"));
            }
            other => panic!("unexpected error: {other}"),
        }
        let source = err.source().expect("cause must be attached");
        assert!(source.to_string().contains("boom"));

        for n in [1, 2, 4] {
            assert_eq!(seen[n].load(Ordering::SeqCst), 1, "element {n} must run once");
        }
        println!("  ✓ Failure raised, other elements still processed");
    }

    #[test]
    fn test_run_catches_panics() {
        let done = AtomicUsize::new(0);
        let result = Parallelizer::new(3).unwrap().input(0..9).run(|i| {
            if i == 4 {
                panic!("worker exploded at {i}");
            }
            done.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        match result {
            Err(ParallelError::TaskFailed { cause: TaskError::Panic(msg), .. }) => {
                assert!(msg.contains("exploded at 4"));
            }
            other => panic!("expected a panic failure, got {other:?}"),
        }
        assert_eq!(done.load(Ordering::SeqCst), 8);
    }

    #[test]
    fn test_run_counts_every_failure() {
        let result = Parallelizer::new(4)
            .unwrap()
            .input(0..20)
            .run(|i| if i % 5 == 0 { Err("multiple of five".into()) } else { Ok(()) });

        match result {
            Err(ParallelError::TaskFailed { failures, .. }) => assert_eq!(failures, 4),
            other => panic!("expected failures, got {other:?}"),
        }
    }

    #[test]
    fn test_run_worker_names() {
        let names = Mutex::new(Vec::new());
        Parallelizer::new(2)
            .unwrap()
            .input(0..4)
            .run(|_| {
                let name = thread::current().name().map(str::to_owned);
                names.lock().unwrap().push(name);
                Ok(())
            })
            .unwrap();

        for name in names.into_inner().unwrap() {
            let name = name.expect("workers are named");
            assert!(name.starts_with("parallelizer-"), "bad name {name}");
            assert!(name.contains("-worker-"), "bad name {name}");
        }
    }

    #[test]
    fn test_execute_and_await() {
        println!("\n=== TEST: execute + await_all ===");
        let counter = Arc::new(AtomicUsize::new(0));
        let mut p = Parallelizer::new(4).unwrap();

        for _ in 0..10 {
            let counter = counter.clone();
            p.execute(move || {
                thread::sleep(Duration::from_millis(5));
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();
        }

        p.await_all().unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 10);
        println!("  ✓ All executed tasks joined");
    }

    #[test]
    fn test_execute_failure_raised_on_await() {
        let mut p = Parallelizer::new(2).unwrap();
        p.execute(|| Ok(())).unwrap();
        p.execute(|| Err("disk full".into())).unwrap();

        let err = p.await_all().expect_err("failure must surface");
        let cause = err.task_error().expect("task failure");
        assert!(cause.to_string().contains("disk full"));
    }

    #[test]
    fn test_execute_metrics() {
        let mut p = Parallelizer::new(2).unwrap();
        for i in 0..6 {
            p.execute(move || if i == 5 { Err("last one".into()) } else { Ok(()) })
                .unwrap();
        }

        let deadline = Instant::now() + Duration::from_secs(5);
        while p.metrics().pending > 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }

        let metrics = p.metrics();
        assert_eq!(metrics.pending, 0);
        assert_eq!(metrics.completed, 5);
        assert_eq!(metrics.failed, 1);
        assert_eq!(metrics.total(), 6);
        assert!((metrics.success_rate() - 5.0 / 6.0).abs() < 1e-9);
        assert!(p.await_all().is_err());
    }

    #[test]
    fn test_await_cancellable_escalates() {
        println!("\n=== TEST: Interrupted await ===");
        let mut p = Parallelizer::new(1).unwrap();
        p.execute(|| {
            thread::sleep(Duration::from_millis(500));
            Ok(())
        })
        .unwrap();

        let token = CancellationToken::new();
        let canceller = {
            let token = token.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(30));
                token.cancel();
            })
        };

        let now = Instant::now();
        let result = p.await_cancellable(&token);
        canceller.join().unwrap();

        assert!(matches!(result, Err(ParallelError::Interrupted)));
        assert!(now.elapsed() < Duration::from_millis(400));
        println!("  ✓ Cancellation escalated as Interrupted");
    }

    #[test]
    fn test_await_timeout() {
        let mut p = Parallelizer::new(1)
            .unwrap()
            .await_timeout(Duration::from_millis(30));
        p.execute(|| {
            thread::sleep(Duration::from_millis(300));
            Ok(())
        })
        .unwrap();

        assert!(matches!(p.await_all(), Err(ParallelError::TimedOut)));
    }

    #[test]
    fn test_with_config_applies_timeouts() {
        println!("\n=== TEST: Parallelizer from Config ===");
        let config = Config {
            await_timeout: Duration::from_millis(30),
            ..Config::default()
        };
        let mut p = Parallelizer::with_config(1, &config).unwrap();
        p.execute(|| {
            thread::sleep(Duration::from_millis(300));
            Ok(())
        })
        .unwrap();

        let now = Instant::now();
        assert!(matches!(p.await_all(), Err(ParallelError::TimedOut)));
        assert!(now.elapsed() < Duration::from_millis(250));

        let config = Config {
            cancel_poll: Duration::from_millis(200),
            ..Config::default()
        };
        let mut p = Parallelizer::with_config(1, &config).unwrap();
        p.execute(|| {
            thread::sleep(Duration::from_millis(500));
            Ok(())
        })
        .unwrap();

        let token = CancellationToken::new();
        let canceller = {
            let token = token.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                token.cancel();
            })
        };
        let now = Instant::now();
        assert!(matches!(
            p.await_cancellable(&token),
            Err(ParallelError::Interrupted)
        ));
        canceller.join().unwrap();
        // Noticed on the configured poll, not the default one.
        assert!(now.elapsed() >= Duration::from_millis(150), "{:?}", now.elapsed());
        println!("  ✓ Join bound taken from Config");
    }

    #[test]
    fn test_task_error_messages_and_source() {
        let err = TaskError::Failed("disk full".into());
        assert_eq!(err.to_string(), "task failed: disk full");
        assert_eq!(err.source().map(|e| e.to_string()).as_deref(), Some("disk full"));

        let panic = TaskError::Panic("oops".to_owned());
        assert_eq!(panic.to_string(), "task panicked: oops");
        assert!(panic.source().is_none());
        assert!(panic.is_panic());

        assert_eq!(TaskError::Cancelled.to_string(), "task was cancelled");
        assert!(TaskError::Cancelled.source().is_none());

        let wrapped = ParallelError::TaskFailed {
            failures: 2,
            cause: TaskError::Failed("disk full".into()),
        };
        let cause = wrapped.source().expect("cause attached");
        assert_eq!(cause.to_string(), "task failed: disk full");
        assert_eq!(cause.source().unwrap().to_string(), "disk full");
    }

    #[test]
    fn test_await_without_tasks() {
        Parallelizer::new(3).unwrap().await_all().unwrap();
    }
}
