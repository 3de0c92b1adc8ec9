use ojp_scheduler::{QueryStats, SchedulerConfig, QueryGate, SlotClass, SlotError};
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn global_average_updates_follow_the_interval() {
    let stats = QueryStats::new(Duration::from_secs(60));

    // A new hash recomputes immediately.
    stats.record("op1", 100.0);
    assert_eq!(stats.overall_average(), 100.0);

    // Thirty seconds in: the sample is inside the window and discarded.
    tokio::time::advance(Duration::from_secs(30)).await;
    stats.record("op1", 200.0);
    assert_eq!(stats.overall_average(), 100.0);
    assert_eq!(stats.average_for("op1"), Some(100.0));

    // Forty more seconds: the window elapsed, the sample folds in.
    tokio::time::advance(Duration::from_secs(40)).await;
    stats.record("op1", 300.0);
    assert_eq!(stats.average_for("op1"), Some(140.0));
    assert_eq!(stats.overall_average(), 140.0);

    // Ten seconds later a brand-new hash recomputes immediately.
    tokio::time::advance(Duration::from_secs(10)).await;
    stats.record("op2", 200.0);
    assert_eq!(stats.overall_average(), 170.0);
    assert_eq!(stats.tracked_count(), 2);
}

#[test]
fn folded_average_matches_the_iterated_formula() {
    let stats = QueryStats::new(Duration::ZERO);
    let samples = [120.0, 80.0, 250.0, 95.0, 300.0, 110.0];

    let mut expected = samples[0];
    stats.record("q", samples[0]);
    for sample in &samples[1..] {
        expected = (expected * 4.0 + sample) / 5.0;
        stats.record("q", *sample);
    }

    let stored = stats.average_for("q").unwrap();
    assert!((stored - expected).abs() < 1e-9);
}

#[tokio::test]
async fn classifier_routes_slow_hashes_to_the_slow_pool() {
    let gate = QueryGate::new(
        &SchedulerConfig::builder()
            .total_slots(10)
            .slow_percentage(20)
            .update_global_avg_interval(Duration::ZERO)
            .slow_timeout(Duration::from_millis(50))
            .fast_timeout(Duration::from_millis(50))
            .build(),
    );

    // Seed statistics: "heavy" runs an order of magnitude over the rest.
    gate.stats().record("heavy", 900.0);
    gate.stats().record("light-1", 40.0);
    gate.stats().record("light-2", 50.0);
    gate.stats().record("light-3", 60.0);

    assert_eq!(gate.classify("heavy"), SlotClass::Slow);
    assert_eq!(gate.classify("light-1"), SlotClass::Fast);
    assert_eq!(gate.classify("brand-new"), SlotClass::Fast);
}

#[tokio::test]
async fn gate_releases_slots_on_every_exit_path() {
    let gate = QueryGate::new(
        &SchedulerConfig::builder()
            .total_slots(2)
            .slow_percentage(50)
            .update_global_avg_interval(Duration::ZERO)
            .fast_timeout(Duration::from_millis(50))
            .build(),
    );

    // Success path.
    let ok: Result<u32, SlotError> = gate.execute("q", || async { Ok(7) }).await;
    assert_eq!(ok.unwrap(), 7);

    // Failure path.
    let err: Result<u32, SlotError> = gate
        .execute("q", || async {
            Err(SlotError::AcquireTimeout {
                class: SlotClass::Fast,
                waited: Duration::ZERO,
            })
        })
        .await;
    assert!(err.is_err());

    // Cancellation path: drop the in-flight execution mid-operation.
    {
        let pending = gate.execute("q", || async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<u32, SlotError>(0)
        });
        tokio::pin!(pending);
        let raced = tokio::time::timeout(Duration::from_millis(20), &mut pending).await;
        assert!(raced.is_err());
    } // pending dropped here, cancelling the execution

    assert_eq!(gate.pool().snapshot().in_flight(), 0);
}
