use super::support::{MockCluster, TestConnection};
use ojp_core::Endpoint;
use ojp_multinode::{MultinodeClient, MultinodeConfig, TrackedConnection};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

fn rebalance_client(cluster: &MockCluster, max_close: usize) -> MultinodeClient {
    MultinodeClient::new(
        MultinodeConfig::builder()
            .endpoints(cluster.endpoints())
            .xa_mode(true)
            .redistribution_enabled(true)
            .max_close_per_recovery(max_close)
            .health_interval(Duration::from_millis(5))
            .recovery_threshold(Duration::ZERO)
            .probe_timeout(Duration::from_millis(100))
            .build(),
        cluster.connector(),
    )
}

fn seed_connections(
    client: &MultinodeClient,
    endpoint: &Endpoint,
    count: usize,
) -> Vec<Arc<TestConnection>> {
    (0..count)
        .map(|_| {
            let connection = TestConnection::new(endpoint.clone(), true);
            client
                .ledger()
                .register(Arc::clone(&connection) as Arc<dyn TrackedConnection>);
            connection
        })
        .collect()
}

#[tokio::test]
async fn recovery_rebalances_survivor_connections_evenly() {
    let cluster = MockCluster::new(&[("a", 1), ("b", 2), ("c", 3)]);
    let client = rebalance_client(&cluster, 100);

    let a = Endpoint::new("a", 1);
    let b = Endpoint::new("b", 2);
    let c = Endpoint::new("c", 3);

    // C went down; the pool adapted to 15/15 on the survivors.
    client.failure_handler().on_connection_failure(&c);
    let on_a = seed_connections(&client, &a, 15);
    let on_b = seed_connections(&client, &b, 15);

    // C comes back; the monitor's recovery probe triggers one rebalance
    // pass through the endpoint-recovered event.
    client.monitor().run_pass().await;
    assert!(client.registry().get(&c).unwrap().is_healthy());

    // Target ⌊30/3⌋ = 10: ten invalidations total, split 5/5.
    assert_eq!(client.ledger().count_for(&a), 10);
    assert_eq!(client.ledger().count_for(&b), 10);
    assert_eq!(client.ledger().count_for(&c), 0);
    assert_eq!(client.ledger().open_count(), 20);

    let invalidated_on_a = on_a
        .iter()
        .filter(|conn| conn.invalidated.load(Ordering::SeqCst))
        .count();
    let invalidated_on_b = on_b
        .iter()
        .filter(|conn| conn.invalidated.load(Ordering::SeqCst))
        .count();
    assert_eq!(invalidated_on_a, 5);
    assert_eq!(invalidated_on_b, 5);
    // Every invalidated connection was also closed, so the client pool
    // replaces it.
    for conn in on_a.iter().chain(on_b.iter()) {
        assert_eq!(
            conn.invalidated.load(Ordering::SeqCst),
            conn.closed.load(Ordering::SeqCst)
        );
    }
}

#[tokio::test]
async fn rebalance_honours_the_per_recovery_close_cap() {
    let cluster = MockCluster::new(&[("a", 1), ("b", 2), ("c", 3)]);
    let client = rebalance_client(&cluster, 6);

    let a = Endpoint::new("a", 1);
    let b = Endpoint::new("b", 2);
    let c = Endpoint::new("c", 3);

    client.failure_handler().on_connection_failure(&c);
    seed_connections(&client, &a, 15);
    seed_connections(&client, &b, 15);

    client.monitor().run_pass().await;

    // Only six invalidations allowed in one pass.
    assert_eq!(client.ledger().open_count(), 24);
}

#[tokio::test]
async fn busy_connections_are_never_rebalanced() {
    let cluster = MockCluster::new(&[("a", 1), ("b", 2), ("c", 3)]);
    let client = rebalance_client(&cluster, 100);

    let a = Endpoint::new("a", 1);
    let b = Endpoint::new("b", 2);
    let c = Endpoint::new("c", 3);

    client.failure_handler().on_connection_failure(&c);
    // A's connections are all mid-request.
    for _ in 0..15 {
        let busy = TestConnection::new(a.clone(), false);
        client
            .ledger()
            .register(busy as Arc<dyn TrackedConnection>);
    }
    seed_connections(&client, &b, 15);

    client.monitor().run_pass().await;

    assert_eq!(client.ledger().count_for(&a), 15);
    assert_eq!(client.ledger().count_for(&b), 10);
}

#[tokio::test]
async fn redistribution_can_be_disabled() {
    let cluster = MockCluster::new(&[("a", 1), ("b", 2), ("c", 3)]);
    let client = MultinodeClient::new(
        MultinodeConfig::builder()
            .endpoints(cluster.endpoints())
            .xa_mode(true)
            .redistribution_enabled(false)
            .health_interval(Duration::from_millis(5))
            .recovery_threshold(Duration::ZERO)
            .probe_timeout(Duration::from_millis(100))
            .build(),
        cluster.connector(),
    );

    let a = Endpoint::new("a", 1);
    let c = Endpoint::new("c", 3);
    client.failure_handler().on_connection_failure(&c);
    seed_connections(&client, &a, 12);

    client.monitor().run_pass().await;

    assert_eq!(client.ledger().open_count(), 12);
}
