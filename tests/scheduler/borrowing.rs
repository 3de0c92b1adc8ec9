use ojp_scheduler::{SchedulerConfig, SlotClass, SlotError, SlotPool};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn pool_10_slots_2_slow_idle_50ms() -> SlotPool {
    SlotPool::new(
        &SchedulerConfig::builder()
            .total_slots(10)
            .slow_percentage(20)
            .idle_timeout(Duration::from_millis(50))
            .build(),
    )
}

#[tokio::test]
async fn slow_side_borrows_an_idle_fast_slot() {
    let pool = pool_10_slots_2_slow_idle_50ms();

    // Occupy both native slow slots.
    let _slow1 = pool.acquire_slow(Duration::from_millis(10)).await.unwrap();
    let _slow2 = pool.acquire_slow(Duration::from_millis(10)).await.unwrap();

    // Touch the fast pool once and release it.
    let fast = pool.acquire_fast(Duration::from_millis(10)).await.unwrap();
    drop(fast);

    // Let the fast side go idle past the 50 ms threshold.
    tokio::time::sleep(Duration::from_millis(100)).await;

    // The third slow operation borrows a fast slot.
    let borrowed = pool.acquire_slow(Duration::from_millis(10)).await.unwrap();
    assert_eq!(pool.snapshot().borrowed_fast_to_slow, 1);

    // Releasing it pays the borrowed account back first, and a fast
    // acquisition succeeds again.
    drop(borrowed);
    assert_eq!(pool.snapshot().borrowed_fast_to_slow, 0);
    let fast = pool.acquire_fast(Duration::from_millis(10)).await.unwrap();
    assert_eq!(fast.class(), SlotClass::Fast);
}

#[tokio::test]
async fn borrowing_is_refused_while_the_lender_is_active() {
    let pool = pool_10_slots_2_slow_idle_50ms();

    let _slow1 = pool.acquire_slow(Duration::from_millis(10)).await.unwrap();
    let _slow2 = pool.acquire_slow(Duration::from_millis(10)).await.unwrap();

    // A fast operation is in flight: its side is not idle, so the slow
    // side cannot borrow even though free fast slots exist.
    let _fast = pool.acquire_fast(Duration::from_millis(10)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Releasing nothing: last fast activity was the acquisition above,
    // 100 ms ago, but the release below re-stamps activity.
    drop(_fast);
    let result = pool.acquire_slow(Duration::from_millis(10)).await;
    assert!(matches!(result, Err(SlotError::AcquireTimeout { .. })));
}

#[tokio::test]
async fn borrowing_never_exceeds_the_lender_capacity() {
    let pool = SlotPool::new(
        &SchedulerConfig::builder()
            .total_slots(4)
            .slow_percentage(50)
            .idle_timeout(Duration::from_millis(10))
            .build(),
    );

    // Mark both sides used, then go idle.
    drop(pool.acquire_slow(Duration::from_millis(10)).await.unwrap());
    drop(pool.acquire_fast(Duration::from_millis(10)).await.unwrap());
    tokio::time::sleep(Duration::from_millis(30)).await;

    let mut permits = Vec::new();
    while let Ok(permit) = pool.acquire_slow(Duration::from_millis(5)).await {
        permits.push(permit);
        assert!(pool.snapshot().in_flight() <= 4);
    }

    // Two native slow + two borrowed fast slots, nothing more.
    let snapshot = pool.snapshot();
    assert_eq!(snapshot.active_slow, 2);
    assert_eq!(snapshot.borrowed_fast_to_slow, 2);
    assert_eq!(snapshot.in_flight(), 4);
}

#[tokio::test]
async fn concurrent_load_respects_total_slots() {
    let pool = Arc::new(SlotPool::new(
        &SchedulerConfig::builder()
            .total_slots(5)
            .slow_percentage(40)
            .idle_timeout(Duration::from_millis(5))
            .build(),
    ));
    let peak = Arc::new(AtomicUsize::new(0));

    let mut tasks = Vec::new();
    for n in 0..30 {
        let pool = Arc::clone(&pool);
        let peak = Arc::clone(&peak);
        tasks.push(tokio::spawn(async move {
            let class = if n % 3 == 0 {
                SlotClass::Slow
            } else {
                SlotClass::Fast
            };
            let permit = pool.acquire(class, Duration::from_secs(5)).await.unwrap();
            let in_flight = pool.snapshot().in_flight();
            peak.fetch_max(in_flight, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            drop(permit);
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert!(peak.load(Ordering::SeqCst) <= 5);
    assert_eq!(pool.snapshot().in_flight(), 0);
}

#[tokio::test]
async fn timed_out_acquisition_leaves_counters_untouched() {
    let pool = SlotPool::new(
        &SchedulerConfig::builder()
            .total_slots(2)
            .slow_percentage(50)
            .idle_timeout(Duration::from_secs(60))
            .build(),
    );

    let held = pool.acquire_slow(Duration::from_millis(5)).await.unwrap();
    let before = pool.snapshot();

    let result = pool.acquire_slow(Duration::from_millis(20)).await;
    assert!(matches!(result, Err(SlotError::AcquireTimeout { .. })));
    assert_eq!(pool.snapshot(), before);

    drop(held);
    assert_eq!(pool.snapshot().in_flight(), 0);
}
