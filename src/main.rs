use latchpool::{global, ConcurrentIterable, Parallelizer};
use std::{
    sync::atomic::{AtomicUsize, Ordering},
    thread,
    time::{Duration, Instant},
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    simple_logger::init_with_level(log::Level::Info)?;

    let heartbeats = global()
        .every(Duration::from_millis(100))
        .delay(Duration::from_millis(50))
        .run(|| log::info!("heartbeat"));

    let now = Instant::now();
    let done = AtomicUsize::new(0);
    Parallelizer::new(8)?
        .input(0..64)
        .run(|_| {
            thread::sleep(Duration::from_millis(10));
            done.fetch_add(1, Ordering::Relaxed);
            Ok(())
        })?;
    println!(
        "parallelizer: {} tasks, elapsed: {:?}",
        done.load(Ordering::Relaxed),
        now.elapsed()
    );

    let items: Vec<u64> = (0..10_000).collect();
    let now = Instant::now();
    let squares = items.concurrent_default().map(|x| x * x)?;
    println!(
        "concurrent map: {} items, elapsed: {:?}",
        squares.len(),
        now.elapsed()
    );

    heartbeats.cancel();
    Ok(())
}
