use ojp_core::{format_cluster_health, parse_cluster_health, Endpoint, Xid};
use ojp_multinode::MultinodeUrl;
use ojp_scheduler::QueryStats;
use ojp_xa::{FilePreparedStore, PreparedRecord, PreparedStore};
use proptest::prelude::*;
use std::collections::HashMap;
use std::time::Duration;

fn host_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9-]{0,15}"
}

fn xid_strategy() -> impl Strategy<Value = Xid> {
    (
        any::<i32>(),
        proptest::collection::vec(any::<u8>(), 1..=64),
        proptest::collection::vec(any::<u8>(), 0..=64),
    )
        .prop_map(|(format_id, gtrid, bqual)| Xid::new(format_id, gtrid, bqual).unwrap())
}

proptest! {
    /// The stored per-hash average equals the iterated folding
    /// `avg_0 = x_1; avg_i = (avg_{i-1}*4 + x_{i+1}) / 5` when every
    /// sample is accepted (interval zero).
    #[test]
    fn rolling_average_matches_iterated_fold(
        samples in proptest::collection::vec(0.0f64..10_000.0, 1..40)
    ) {
        let stats = QueryStats::new(Duration::ZERO);
        let mut expected = samples[0];
        stats.record("q", samples[0]);
        for sample in &samples[1..] {
            expected = (expected * 4.0 + sample) / 5.0;
            stats.record("q", *sample);
        }
        let stored = stats.average_for("q").unwrap();
        prop_assert!((stored - expected).abs() < 1e-6);
    }

    /// Cluster-health strings round-trip through format and parse.
    #[test]
    fn cluster_health_round_trips(
        entries in proptest::collection::vec(
            (host_strategy(), 1u16..u16::MAX, any::<bool>()),
            0..8
        )
    ) {
        // Duplicate addresses would be collapsed by real registries;
        // keep entries unique to make the round trip exact.
        let mut seen = std::collections::HashSet::new();
        let endpoints: Vec<(Endpoint, bool)> = entries
            .into_iter()
            .filter(|(host, port, _)| seen.insert((host.clone(), *port)))
            .map(|(host, port, up)| (Endpoint::new(host, port), up))
            .collect();

        let rendered = format_cluster_health(endpoints.iter().map(|(e, up)| (e, *up)));
        let parsed = parse_cluster_health(&rendered);
        prop_assert_eq!(parsed, endpoints);
    }

    /// Multinode URLs round-trip their endpoint lists.
    #[test]
    fn multinode_urls_parse_their_endpoint_lists(
        hosts in proptest::collection::vec((host_strategy(), 1u16..u16::MAX), 1..6),
        underlying in "[a-z]{3,8}://[a-z]{1,10}/[a-z]{1,10}"
    ) {
        let list = hosts
            .iter()
            .map(|(host, port)| format!("{host}:{port}"))
            .collect::<Vec<_>>()
            .join(",");
        let url = format!("ojp[{list}]_{underlying}");

        let parsed = MultinodeUrl::parse(&url).unwrap();
        prop_assert_eq!(parsed.endpoints.len(), hosts.len());
        prop_assert_eq!(parsed.is_multinode(), hosts.len() > 1);
        prop_assert_eq!(parsed.underlying_url, underlying);
        for (endpoint, (host, port)) in parsed.endpoints.iter().zip(&hosts) {
            prop_assert_eq!(endpoint.host(), host.as_str());
            prop_assert_eq!(endpoint.port(), *port);
        }
    }

    /// Replaying any sequence of prepare/clear appends yields exactly the
    /// branches whose latest operation was a prepare.
    #[test]
    fn prepared_store_replay_matches_reference(
        ops in proptest::collection::vec((0u8..6, any::<bool>()), 0..30)
    ) {
        let dir = tempfile::tempdir().unwrap();
        let store = FilePreparedStore::open(dir.path().join("log"), false, true).unwrap();

        let mut reference: HashMap<u8, bool> = HashMap::new();
        for (tag, prepare) in &ops {
            let xid = Xid::new(1, vec![*tag], vec![]).unwrap();
            if *prepare {
                store.append_prepared(&PreparedRecord::new(xid, None)).unwrap();
            } else {
                store.append_clear(&xid).unwrap();
            }
            reference.insert(*tag, *prepare);
        }

        let mut expected: Vec<u8> = reference
            .iter()
            .filter(|(_, prepared)| **prepared)
            .map(|(tag, _)| *tag)
            .collect();
        expected.sort_unstable();

        let mut replayed: Vec<u8> = store
            .load_prepared()
            .unwrap()
            .into_iter()
            .map(|record| record.xid.gtrid()[0])
            .collect();
        replayed.sort_unstable();

        prop_assert_eq!(replayed, expected);
    }

    /// Xid identity is value identity.
    #[test]
    fn xid_equality_is_structural(xid in xid_strategy()) {
        let clone = Xid::new(
            xid.format_id(),
            xid.gtrid().to_vec(),
            xid.bqual().to_vec(),
        ).unwrap();
        prop_assert_eq!(&clone, &xid);

        let mut map = HashMap::new();
        map.insert(xid, "ctx");
        prop_assert_eq!(map.get(&clone), Some(&"ctx"));
    }
}
