use super::support::MockCluster;
use ojp_core::Endpoint;
use ojp_multinode::{MultinodeClient, MultinodeConfig};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn recovery_probe_marks_endpoint_healthy_and_notifies() {
    let cluster = MockCluster::new(&[("a", 1), ("b", 2)]);
    let recovered = Arc::new(AtomicUsize::new(0));
    let recovered_counter = Arc::clone(&recovered);

    let client = MultinodeClient::new(
        MultinodeConfig::builder()
            .endpoints(cluster.endpoints())
            .health_interval(Duration::from_millis(5))
            .recovery_threshold(Duration::ZERO)
            .probe_timeout(Duration::from_millis(100))
            .on_endpoint_recovered(move |_| {
                recovered_counter.fetch_add(1, Ordering::SeqCst);
            })
            .build(),
        cluster.connector(),
    );

    let a = Endpoint::new("a", 1);
    client.failure_handler().on_connection_failure(&a);
    assert!(!client.registry().get(&a).unwrap().is_healthy());

    // The server itself is fine; the next monitor pass probes and
    // recovers it, terminating the probe session it created.
    client.monitor().run_pass().await;

    assert!(client.registry().get(&a).unwrap().is_healthy());
    assert_eq!(recovered.load(Ordering::SeqCst), 1);
    let server = cluster.server("a:1");
    assert!(server.connects.load(Ordering::SeqCst) >= 1);
    assert_eq!(
        server.connects.load(Ordering::SeqCst),
        server.terminates.load(Ordering::SeqCst),
        "every probe session must be terminated"
    );
}

#[tokio::test]
async fn xa_mode_probes_catch_silently_dead_endpoints() {
    let cluster = MockCluster::new(&[("a", 1), ("b", 2)]);
    let unhealthy = Arc::new(AtomicUsize::new(0));
    let unhealthy_counter = Arc::clone(&unhealthy);

    let client = MultinodeClient::new(
        MultinodeConfig::builder()
            .endpoints(cluster.endpoints())
            .xa_mode(true)
            .health_interval(Duration::from_millis(5))
            .probe_timeout(Duration::from_millis(100))
            .on_endpoint_unhealthy(move |_| {
                unhealthy_counter.fetch_add(1, Ordering::SeqCst);
            })
            .build(),
        cluster.connector(),
    );

    client.tracker().bind("s1", Endpoint::new("a", 1));
    cluster.server("a:1").set_up(false);

    client.monitor().run_pass().await;

    assert!(!client.registry().get(&Endpoint::new("a", 1)).unwrap().is_healthy());
    assert!(client.registry().get(&Endpoint::new("b", 2)).unwrap().is_healthy());
    assert_eq!(unhealthy.load(Ordering::SeqCst), 1);
    // The dead endpoint's sessions were invalidated by the same pass.
    assert_eq!(client.tracker().lookup("s1"), None);
}

#[tokio::test]
async fn passes_inside_the_interval_are_skipped() {
    let cluster = MockCluster::new(&[("a", 1)]);
    let client = MultinodeClient::new(
        MultinodeConfig::builder()
            .endpoints(cluster.endpoints())
            .xa_mode(true)
            .health_interval(Duration::from_secs(60))
            .probe_timeout(Duration::from_millis(100))
            .build(),
        cluster.connector(),
    );

    client.monitor().run_pass().await;
    let after_first = cluster.server("a:1").connects.load(Ordering::SeqCst);
    assert_eq!(after_first, 1);

    // Immediately again: the time gate collapses the trigger.
    client.monitor().run_pass().await;
    assert_eq!(cluster.server("a:1").connects.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unhealthy_probe_waits_for_the_recovery_threshold() {
    let cluster = MockCluster::new(&[("a", 1), ("b", 2)]);
    let client = MultinodeClient::new(
        MultinodeConfig::builder()
            .endpoints(cluster.endpoints())
            .health_interval(Duration::from_millis(1))
            .recovery_threshold(Duration::from_secs(60))
            .probe_timeout(Duration::from_millis(100))
            .build(),
        cluster.connector(),
    );

    let a = Endpoint::new("a", 1);
    client.failure_handler().on_connection_failure(&a);

    // Threshold not elapsed: the pass must leave the endpoint alone.
    tokio::time::sleep(Duration::from_millis(5)).await;
    client.monitor().run_pass().await;
    assert!(!client.registry().get(&a).unwrap().is_healthy());
    assert_eq!(cluster.server("a:1").connects.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn last_resort_recovery_ignores_the_threshold() {
    let cluster = MockCluster::new(&[("a", 1)]);
    let client = MultinodeClient::new(
        MultinodeConfig::builder()
            .endpoints(cluster.endpoints())
            .recovery_threshold(Duration::from_secs(3600))
            .probe_timeout(Duration::from_millis(100))
            .retry_delay(Duration::from_millis(1))
            .build(),
        cluster.connector(),
    );

    let a = Endpoint::new("a", 1);
    client.failure_handler().on_connection_failure(&a);
    assert!(client.registry().healthy_endpoints().is_empty());

    // Selection finds nothing healthy, runs the last-resort pass, and the
    // connect succeeds on the recovered endpoint.
    let reply = client.connect(cluster.connect_request("hash")).await.unwrap();
    assert!(reply.session.is_established());
    assert!(client.registry().get(&a).unwrap().is_healthy());
}

#[tokio::test]
async fn background_monitor_recovers_endpoints_on_its_own() {
    let cluster = MockCluster::new(&[("a", 1), ("b", 2)]);
    let client = MultinodeClient::new(
        MultinodeConfig::builder()
            .endpoints(cluster.endpoints())
            .health_interval(Duration::from_millis(10))
            .recovery_threshold(Duration::ZERO)
            .probe_timeout(Duration::from_millis(100))
            .build(),
        cluster.connector(),
    );

    client.failure_handler().on_connection_failure(&Endpoint::new("a", 1));

    client.start();
    tokio::time::sleep(Duration::from_millis(100)).await;
    client.shutdown();

    assert!(client.registry().get(&Endpoint::new("a", 1)).unwrap().is_healthy());
}
