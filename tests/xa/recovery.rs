use super::support::TestXaFactory;
use ojp_core::rpc::{XaEndFlags, XaStartFlags, XaVote};
use ojp_core::Xid;
use ojp_xa::{PreparedStoreKind, XaConfig, XaState, XaTransactionRegistry};
use std::sync::atomic::Ordering;
use std::time::Duration;

fn xid(tag: u8) -> Xid {
    Xid::new(100, vec![tag, tag, tag], vec![tag]).unwrap()
}

fn file_config(path: &std::path::Path) -> XaConfig {
    XaConfig::builder()
        .resource_name("orders-rm")
        .store_kind(PreparedStoreKind::File)
        .store_path(path)
        .store_fsync(true)
        .pool_max_total(4)
        .pool_max_wait(Duration::from_millis(100))
        .build()
}

#[tokio::test]
async fn prepared_branch_survives_a_crash_and_commits_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("prepared.log");
    let x = xid(1);

    // First incarnation: prepare, then "crash" (drop the registry without
    // committing).
    {
        let (factory, log) = TestXaFactory::new();
        let registry =
            XaTransactionRegistry::with_default_store(file_config(&path), Box::new(factory))
                .unwrap();

        registry.xa_start(&x, XaStartFlags::NoFlags).await.unwrap();
        registry.xa_end(&x, XaEndFlags::Success).await.unwrap();
        assert_eq!(registry.xa_prepare(&x).await.unwrap(), XaVote::Ok);
        assert_eq!(log.prepares.load(Ordering::SeqCst), 1);
    }

    // Second incarnation over the same log: the branch is in doubt.
    let (factory, log) = TestXaFactory::new();
    let registry =
        XaTransactionRegistry::with_default_store(file_config(&path), Box::new(factory)).unwrap();

    let in_doubt = registry.xa_recover(true).unwrap();
    assert_eq!(in_doubt, vec![x.clone()]);

    // Two-phase commit completes the recovered branch on the backend.
    registry.xa_commit(&x, false).await.unwrap();
    assert_eq!(log.commits.load(Ordering::SeqCst), 1);
    assert_eq!(registry.state_of(&x).await, Some(XaState::Committed));
    assert!(registry.xa_recover(true).unwrap().is_empty());

    // Repeating the commit succeeds with no further backend call.
    registry.xa_commit(&x, false).await.unwrap();
    assert_eq!(log.commits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn recovered_branch_can_roll_back_instead() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("prepared.log");
    let x = xid(2);

    {
        let (factory, _log) = TestXaFactory::new();
        let registry =
            XaTransactionRegistry::with_default_store(file_config(&path), Box::new(factory))
                .unwrap();
        registry.xa_start(&x, XaStartFlags::NoFlags).await.unwrap();
        registry.xa_end(&x, XaEndFlags::Success).await.unwrap();
        registry.xa_prepare(&x).await.unwrap();
    }

    let (factory, log) = TestXaFactory::new();
    let registry =
        XaTransactionRegistry::with_default_store(file_config(&path), Box::new(factory)).unwrap();

    registry.xa_rollback(&x).await.unwrap();
    assert_eq!(log.rollbacks.load(Ordering::SeqCst), 1);
    assert!(registry.xa_recover(true).unwrap().is_empty());
    assert_eq!(registry.state_of(&x).await, Some(XaState::RolledBack));
}

#[tokio::test]
async fn unknown_branch_after_restart_is_not_a_transaction() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("prepared.log");

    let (factory, _log) = TestXaFactory::new();
    let registry =
        XaTransactionRegistry::with_default_store(file_config(&path), Box::new(factory)).unwrap();

    let result = registry.xa_commit(&xid(9), false).await;
    assert!(matches!(result, Err(ojp_xa::XaError::NotATransaction(_))));
}

#[tokio::test]
async fn one_phase_and_two_phase_commit_agree_from_the_backend_view() {
    let dir = tempfile::tempdir().unwrap();

    // Two-phase: start → end → prepare(XA_OK) → commit.
    let two_phase_commits = {
        let (factory, log) = TestXaFactory::new();
        let registry = XaTransactionRegistry::with_default_store(
            file_config(&dir.path().join("two.log")),
            Box::new(factory),
        )
        .unwrap();
        let x = xid(3);
        registry.xa_start(&x, XaStartFlags::NoFlags).await.unwrap();
        registry.xa_end(&x, XaEndFlags::Success).await.unwrap();
        registry.xa_prepare(&x).await.unwrap();
        registry.xa_commit(&x, false).await.unwrap();
        assert_eq!(registry.state_of(&x).await, Some(XaState::Committed));
        log.commits.load(Ordering::SeqCst)
    };

    // One-phase: start → end → commit(onePhase).
    let one_phase_commits = {
        let (factory, log) = TestXaFactory::new();
        let registry = XaTransactionRegistry::with_default_store(
            file_config(&dir.path().join("one.log")),
            Box::new(factory),
        )
        .unwrap();
        let x = xid(4);
        registry.xa_start(&x, XaStartFlags::NoFlags).await.unwrap();
        registry.xa_end(&x, XaEndFlags::Success).await.unwrap();
        registry.xa_commit(&x, true).await.unwrap();
        assert_eq!(registry.state_of(&x).await, Some(XaState::Committed));
        log.commits.load(Ordering::SeqCst)
    };

    // The backend saw exactly one commit either way, and neither path
    // leaves an in-doubt record behind.
    assert_eq!(two_phase_commits, 1);
    assert_eq!(one_phase_commits, 1);
}
