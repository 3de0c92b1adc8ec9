use super::support::MockCluster;
use ojp_core::rpc::{SqlValue, StatementRequest};
use ojp_core::{Endpoint, SessionInfo};
use ojp_multinode::{MultinodeClient, MultinodeConfig, MultinodeError};
use std::sync::atomic::Ordering;
use std::time::Duration;

fn update(session: SessionInfo) -> StatementRequest {
    StatementRequest {
        session,
        sql: "update t set v = ?".to_string(),
        params: vec![SqlValue::Int32(1)],
        fetch_size: 0,
    }
}

async fn bound_session(
    cluster: &MockCluster,
    client: &MultinodeClient,
) -> (SessionInfo, Endpoint) {
    super::support::init_tracing();
    let reply = client
        .connect(cluster.connect_request("hash-1"))
        .await
        .unwrap();
    let session = reply.session;
    let uuid = session.session_uuid.clone().unwrap();
    let endpoint = client.tracker().lookup(&uuid).unwrap();
    (session, endpoint)
}

#[tokio::test]
async fn bound_sessions_stay_on_their_endpoint() {
    let cluster = MockCluster::new(&[("a", 1), ("b", 2), ("c", 3)]);
    let client = MultinodeClient::new(
        MultinodeConfig::builder()
            .endpoints(cluster.endpoints())
            .build(),
        cluster.connector(),
    );

    let (session, endpoint) = bound_session(&cluster, &client).await;

    for _ in 0..5 {
        client.execute_update(update(session.clone())).await.unwrap();
    }

    let bound_server = cluster.server(&endpoint.address());
    assert_eq!(bound_server.updates.load(Ordering::SeqCst), 5);
    for server in &cluster.servers {
        if server.endpoint != endpoint {
            assert_eq!(server.updates.load(Ordering::SeqCst), 0);
        }
    }
}

#[tokio::test]
async fn failed_endpoint_surfaces_session_lost_not_a_reroute() {
    let cluster = MockCluster::new(&[("a", 1), ("b", 2)]);
    let client = MultinodeClient::new(
        MultinodeConfig::builder()
            .endpoints(cluster.endpoints())
            .build(),
        cluster.connector(),
    );

    let (session, endpoint) = bound_session(&cluster, &client).await;
    let uuid = session.session_uuid.clone().unwrap();

    // Kill the bound server. The in-flight RPC observes the
    // connection-class failure and runs the failure path.
    cluster.server(&endpoint.address()).set_up(false);
    let first = client.execute_update(update(session.clone())).await;
    match first {
        Err(MultinodeError::Rpc(error)) => assert!(error.is_connection_class()),
        other => panic!("expected a connection-class RPC error, got {other:?}"),
    }

    // Bookkeeping: endpoint unhealthy, binding gone, channel invalidated.
    assert!(!client.registry().get(&endpoint).unwrap().is_healthy());
    assert_eq!(client.tracker().lookup(&uuid), None);
    assert!(client.channels().current(&endpoint).is_none());

    // The session is lost for good; no silent re-route to the survivor.
    let second = client.execute_update(update(session.clone())).await;
    assert!(matches!(second, Err(MultinodeError::SessionLost(_))));
    let third = client.execute_update(update(session)).await;
    assert!(matches!(third, Err(MultinodeError::SessionLost(_))));
    assert_eq!(
        cluster.server("b:2").updates.load(Ordering::SeqCst),
        0,
        "the surviving endpoint must not see re-routed traffic"
    );
}

#[tokio::test]
async fn monitor_detected_failure_yields_session_lost() {
    let cluster = MockCluster::new(&[("a", 1), ("b", 2)]);
    let client = MultinodeClient::new(
        MultinodeConfig::builder()
            .endpoints(cluster.endpoints())
            .xa_mode(true)
            .health_interval(Duration::from_millis(10))
            .probe_timeout(Duration::from_millis(100))
            .build(),
        cluster.connector(),
    );

    let (session, endpoint) = bound_session(&cluster, &client).await;

    // The monitor notices the dead endpoint before the client issues its
    // next RPC: that RPC fails with *session lost* directly.
    cluster.server(&endpoint.address()).set_up(false);
    client.monitor().run_pass().await;

    let result = client.execute_update(update(session)).await;
    assert!(matches!(result, Err(MultinodeError::SessionLost(_))));
}

#[tokio::test]
async fn known_echoed_target_server_wins_binding() {
    let cluster = MockCluster::new(&[("a", 1), ("b", 2)]);
    let client = MultinodeClient::new(
        MultinodeConfig::builder()
            .endpoints(cluster.endpoints())
            .build(),
        cluster.connector(),
    );

    // The contacted server claims a different (known) node handled the
    // session, e.g. a load balancer in front of the fleet.
    *cluster.server("a:1").echo_target.lock().unwrap() = Some("b:2".to_string());

    let reply = client.connect(cluster.connect_request("hash")).await.unwrap();
    let uuid = reply.session.session_uuid.unwrap();
    assert_eq!(client.tracker().lookup(&uuid), Some(Endpoint::new("b", 2)));
}

#[tokio::test]
async fn unknown_echoed_target_server_falls_back_to_contacted() {
    let cluster = MockCluster::new(&[("a", 1), ("b", 2)]);
    let client = MultinodeClient::new(
        MultinodeConfig::builder()
            .endpoints(cluster.endpoints())
            .build(),
        cluster.connector(),
    );

    *cluster.server("a:1").echo_target.lock().unwrap() = Some("ghost:9".to_string());

    let reply = client.connect(cluster.connect_request("hash")).await.unwrap();
    let uuid = reply.session.session_uuid.unwrap();
    assert_eq!(client.tracker().lookup(&uuid), Some(Endpoint::new("a", 1)));
}

#[tokio::test]
async fn terminate_fans_out_to_every_connected_endpoint() {
    let cluster = MockCluster::new(&[("a", 1), ("b", 2)]);
    let client = MultinodeClient::new(
        MultinodeConfig::builder()
            .endpoints(cluster.endpoints())
            .build(),
        cluster.connector(),
    );

    // Two sessions of the same logical connection land on both endpoints.
    let first = client.connect(cluster.connect_request("shared-hash")).await.unwrap();
    let _second = client.connect(cluster.connect_request("shared-hash")).await.unwrap();
    assert_eq!(
        client.tracker().endpoints_for_connection("shared-hash").len(),
        2
    );

    // Unbind the first session, then terminate it: with no binding left
    // the façade must fan out to every endpoint that saw connect().
    let uuid = first.session.session_uuid.clone().unwrap();
    client.tracker().unbind(&uuid);
    client.terminate_session(first.session).await.unwrap();

    assert_eq!(cluster.server("a:1").terminates.load(Ordering::SeqCst), 1);
    assert_eq!(cluster.server("b:2").terminates.load(Ordering::SeqCst), 1);
    assert!(client
        .tracker()
        .endpoints_for_connection("shared-hash")
        .is_empty());
}

#[tokio::test]
async fn terminate_of_bound_session_hits_only_its_endpoint() {
    let cluster = MockCluster::new(&[("a", 1), ("b", 2)]);
    let client = MultinodeClient::new(
        MultinodeConfig::builder()
            .endpoints(cluster.endpoints())
            .build(),
        cluster.connector(),
    );

    let (session, endpoint) = bound_session(&cluster, &client).await;
    let uuid = session.session_uuid.clone().unwrap();

    client.terminate_session(session).await.unwrap();

    let other = cluster
        .servers
        .iter()
        .find(|s| s.endpoint != endpoint)
        .unwrap();
    assert_eq!(
        cluster
            .server(&endpoint.address())
            .terminates
            .load(Ordering::SeqCst),
        1
    );
    assert_eq!(other.terminates.load(Ordering::SeqCst), 0);
    assert_eq!(client.tracker().lookup(&uuid), None);
}
