//! Drain protocol properties against an in-memory directory

mod common;

use async_trait::async_trait;
use common::*;
use doris_operator::directory::{
    AdminEndpoint, DirectoryClient, DirectoryConnector, FrontendNode, FrontendRole,
};
use doris_operator::drain::{ComputeDrain, DrainOutcome, MetadataDrain, NodeDrainer};
use doris_operator::error::{OperatorError, Result};
use doris_operator::labels::{compute_group_statefulset_name, metadata_statefulset_name};
use doris_operator::topology::AddressingMode;
use rstest::rstest;
use std::sync::Arc;
use std::time::Duration;

fn endpoint() -> AdminEndpoint {
    AdminEndpoint {
        host: format!("{}-fe.{}", CLUSTER, NAMESPACE),
        port: 9030,
        credentials: Default::default(),
    }
}

fn drainer(resources: FakeResourceClient, directory: &FakeDirectory) -> NodeDrainer {
    NodeDrainer::new(
        Arc::new(directory.clone()),
        Arc::new(resources),
        Duration::from_secs(5),
    )
}

fn compute_plan(desired: i32, previous: Option<i32>, force: bool) -> ComputeDrain {
    ComputeDrain {
        group_name: "cg1".to_string(),
        desired,
        previous,
        force,
        prefix: compute_group_statefulset_name(CLUSTER, "cg1"),
    }
}

fn metadata_plan(desired: i32, previous: Option<i32>, mode: AddressingMode) -> MetadataDrain {
    MetadataDrain {
        desired,
        previous,
        quorum: 3,
        force: false,
        prefix: metadata_statefulset_name(CLUSTER),
        mode,
        namespace: NAMESPACE.to_string(),
        selector: fe_selector(),
    }
}

#[rstest]
#[case(5, 3)]
#[case(5, 0)]
#[case(2, 1)]
#[case(8, 4)]
#[tokio::test]
async fn test_compute_drain_drops_every_ordinal_at_or_above_desired(
    #[case] live: u32,
    #[case] desired: i32,
) {
    let directory = FakeDirectory::new().with_backends(backends("cg1", 0..live));

    let outcome = drainer(FakeResourceClient::new(), &directory)
        .drain_compute_group(&endpoint(), &compute_plan(desired, Some(live as i32), false))
        .await
        .unwrap();

    let mut expected: Vec<String> = (desired as u32..live).map(|o| backend_host("cg1", o)).collect();
    expected.sort();
    assert_eq!(outcome, DrainOutcome::Removed(expected.len()));
    // one batched statement per drain
    assert_eq!(directory.removal_calls(), vec![expected]);
    assert_eq!(directory.backend_hosts("cg1").len(), desired as usize);
}

#[rstest]
#[case(3, Some(3))]
#[case(5, Some(3))]
#[case(3, None)]
#[tokio::test]
async fn test_compute_drain_skipped_when_not_shrinking(
    #[case] desired: i32,
    #[case] previous: Option<i32>,
) {
    let directory = FakeDirectory::new().with_backends(backends("cg1", 0..3));

    let outcome = drainer(FakeResourceClient::new(), &directory)
        .drain_compute_group(&endpoint(), &compute_plan(desired, previous, false))
        .await
        .unwrap();

    assert_eq!(outcome, DrainOutcome::NotNeeded);
    assert_eq!(directory.connects(), 0);
}

#[tokio::test]
async fn test_forced_compute_drain_with_nothing_left_issues_no_removal() {
    let directory = FakeDirectory::new().with_backends(backends("cg1", 0..3));

    let outcome = drainer(FakeResourceClient::new(), &directory)
        .drain_compute_group(&endpoint(), &compute_plan(3, Some(3), true))
        .await
        .unwrap();

    assert_eq!(outcome, DrainOutcome::NothingToRemove);
    assert_eq!(directory.connects(), 1);
    assert!(directory.removal_calls().is_empty());
}

#[tokio::test]
async fn test_compute_drain_rejects_foreign_host_names() {
    let mut nodes = backends("cg1", 0..3);
    nodes[1].host = format!("somewhere-else-1.svc.{}.svc.cluster.local", NAMESPACE);
    let directory = FakeDirectory::new().with_backends(nodes);

    let err = drainer(FakeResourceClient::new(), &directory)
        .drain_compute_group(&endpoint(), &compute_plan(1, Some(3), false))
        .await
        .unwrap_err();

    assert!(matches!(err, OperatorError::UnresolvableTopology(_)));
    assert!(directory.removal_calls().is_empty());
}

#[rstest]
#[case(3, 2, 5, 3, 2)]
#[case(3, 2, 5, 4, 1)]
#[case(3, 4, 7, 3, 4)]
#[case(3, 0, 4, 3, 0)]
#[tokio::test]
async fn test_metadata_drain_removes_only_observers(
    #[case] followers: u32,
    #[case] observers: u32,
    #[case] previous: i32,
    #[case] desired: i32,
    #[case] expected_removed: usize,
) {
    let directory = FakeDirectory::new().with_frontends(frontends(followers, observers));

    let outcome = drainer(FakeResourceClient::new(), &directory)
        .drain_metadata(&endpoint(), &metadata_plan(desired, Some(previous), AddressingMode::Fqdn))
        .await
        .unwrap();

    let removed: Vec<String> = directory.removal_calls().into_iter().flatten().collect();
    assert_eq!(removed.len(), expected_removed);
    if expected_removed == 0 {
        assert_eq!(outcome, DrainOutcome::NothingToRemove);
    } else {
        assert_eq!(outcome, DrainOutcome::Removed(expected_removed));
    }
    // followers and the leader are never candidates
    for ordinal in 0..followers {
        assert!(!removed.contains(&frontend_host(ordinal)));
    }
    // the highest ordinals go first
    for host in &removed {
        let ordinal: u32 = host
            .split('.')
            .next()
            .and_then(|pod| pod.rsplit('-').next())
            .and_then(|n| n.parse().ok())
            .unwrap();
        assert!(ordinal >= followers + observers - expected_removed as u32);
    }
}

#[tokio::test]
async fn test_metadata_drain_by_ip_prefers_orphans() {
    let pods = ready_pods(&metadata_statefulset_name(CLUSTER), 5);
    let mut nodes: Vec<FrontendNode> = pods
        .iter()
        .enumerate()
        .map(|(ordinal, pod)| FrontendNode {
            host: pod.ip.clone().unwrap(),
            edit_log_port: 9010,
            role: if ordinal < 3 {
                FrontendRole::Follower
            } else {
                FrontendRole::Observer
            },
            is_leader: ordinal == 0,
        })
        .collect();
    // an observer whose pod was rescheduled under a new IP
    nodes.push(FrontendNode {
        host: "10.9.9.9".to_string(),
        edit_log_port: 9010,
        role: FrontendRole::Observer,
        is_leader: false,
    });
    let directory = FakeDirectory::new().with_frontends(nodes);
    let resources = FakeResourceClient::new().with_pods(&fe_selector(), pods);

    let outcome = drainer(resources, &directory)
        .drain_metadata(&endpoint(), &metadata_plan(4, Some(5), AddressingMode::Ip))
        .await
        .unwrap();

    // 3 live observers, 4 desired with quorum 3 → 2 must go
    assert_eq!(outcome, DrainOutcome::Removed(2));
    assert_eq!(
        directory.removal_calls(),
        vec![vec!["10.1.0.14".to_string(), "10.9.9.9".to_string()]]
    );
}

struct StalledConnector;

#[async_trait]
impl DirectoryConnector for StalledConnector {
    async fn connect(&self, _endpoint: &AdminEndpoint) -> Result<Box<dyn DirectoryClient>> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Err(OperatorError::Connectivity("never reached".into()))
    }
}

#[tokio::test(start_paused = true)]
async fn test_stalled_leader_is_bounded_by_timeout() {
    let drainer = NodeDrainer::new(
        Arc::new(StalledConnector),
        Arc::new(FakeResourceClient::new()),
        Duration::from_secs(10),
    );

    let err = drainer
        .drain_compute_group(&endpoint(), &compute_plan(1, Some(3), false))
        .await
        .unwrap_err();

    assert!(matches!(err, OperatorError::Timeout(limit, _) if limit == Duration::from_secs(10)));
    assert!(err.is_connectivity());
}
