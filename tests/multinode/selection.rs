use super::support::MockCluster;
use ojp_core::Endpoint;
use ojp_multinode::{
    EndpointRegistry, EndpointSelector, MultinodeConfig, MultinodeClient, MultinodeError,
    SelectionPolicy, SessionTracker,
};
use std::time::Duration;

fn abc_cluster() -> MockCluster {
    MockCluster::new(&[("a", 1), ("b", 2), ("c", 3)])
}

fn client(cluster: &MockCluster, config: MultinodeConfig) -> MultinodeClient {
    MultinodeClient::new(config, cluster.connector())
}

#[tokio::test]
async fn load_aware_selection_cycles_on_empty_tracker() {
    // All healthy, tracker empty: every candidate counts zero, so the
    // round-robin tie-break must cycle deterministically.
    let registry = EndpointRegistry::new([
        Endpoint::new("a", 1),
        Endpoint::new("b", 2),
        Endpoint::new("c", 3),
    ]);
    let tracker = SessionTracker::new();
    let selector = EndpointSelector::new(SelectionPolicy::LoadAware);
    let candidates = registry.healthy_states();

    let picks: Vec<String> = (0..7)
        .map(|_| selector.select(&candidates, &tracker).unwrap().address())
        .collect();
    assert_eq!(
        picks,
        vec!["a:1", "b:2", "c:3", "a:1", "b:2", "c:3", "a:1"]
    );
}

#[tokio::test]
async fn connects_spread_across_least_bound_endpoints() {
    let cluster = abc_cluster();
    let client = client(
        &cluster,
        MultinodeConfig::builder()
            .endpoints(cluster.endpoints())
            .build(),
    );

    for n in 0..3 {
        let reply = client
            .connect(cluster.connect_request(&format!("hash-{n}")))
            .await
            .unwrap();
        assert!(reply.session.is_established());
    }

    // Three sessions, one per endpoint.
    for endpoint in cluster.endpoints() {
        assert_eq!(client.tracker().bound_count(&endpoint), 1);
    }
}

#[tokio::test]
async fn selection_skips_unhealthy_endpoints() {
    let cluster = abc_cluster();
    let client = client(
        &cluster,
        MultinodeConfig::builder()
            .endpoints(cluster.endpoints())
            .retry_delay(Duration::from_millis(1))
            .build(),
    );

    cluster.server("a:1").set_up(false);
    client
        .failure_handler()
        .on_connection_failure(&Endpoint::new("a", 1));

    for n in 0..4 {
        client
            .connect(cluster.connect_request(&format!("hash-{n}")))
            .await
            .unwrap();
    }

    assert_eq!(client.tracker().bound_count(&Endpoint::new("a", 1)), 0);
    assert_eq!(cluster.server("a:1").connects.load(std::sync::atomic::Ordering::SeqCst), 0);
}

#[tokio::test]
async fn all_endpoints_down_is_no_healthy_server() {
    let cluster = abc_cluster();
    let client = client(
        &cluster,
        MultinodeConfig::builder()
            .endpoints(cluster.endpoints())
            .retry_attempts(5)
            .retry_delay(Duration::from_millis(1))
            .probe_timeout(Duration::from_millis(50))
            .build(),
    );

    for server in &cluster.servers {
        server.set_up(false);
    }

    let result = client.connect(cluster.connect_request("hash")).await;
    assert!(matches!(result, Err(MultinodeError::NoHealthyServer)));
    assert!(client.registry().healthy_endpoints().is_empty());
}

#[tokio::test]
async fn retries_move_to_the_next_healthy_endpoint() {
    let cluster = abc_cluster();
    let client = client(
        &cluster,
        MultinodeConfig::builder()
            .endpoints(cluster.endpoints())
            .retry_attempts(3)
            .retry_delay(Duration::from_millis(1))
            .build(),
    );

    // First pick (a) is dead; the retry must land on a survivor.
    cluster.server("a:1").set_up(false);
    let reply = client.connect(cluster.connect_request("hash")).await.unwrap();
    assert!(reply.session.is_established());
    assert!(!client.registry().get(&Endpoint::new("a", 1)).unwrap().is_healthy());
}
