// Copyright 2024 The Ray Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! End-to-end scheduling cycles against fake agents and a fake cluster.

use std::sync::Arc;

use k8s_openapi::api::core::v1::{Container, Pod};
use tokio_util::sync::CancellationToken;

use sharedev_cluster_client::PodWatchEvent;
use sharedev_common::config::SchedulerConfig;
use sharedev_common::constants::{ENV_DEVICE_ID, LABEL_LIMITS, LABEL_VENDOR, SHARE_DEV_STATE_KEY};
use sharedev_common::quota::FreeSlice;
use sharedev_common::status::ShareDevError;
use sharedev_scheduler::framework::{
    Code, CycleState, FilterPlugin, NodeInfo, NodeScore, PostFilterPlugin, PreFilterPlugin,
    ReservePlugin, ScorePlugin,
};
use sharedev_scheduler::{CycleOutcome, CycleRunner, ShareDevPlugin, ShareDevState};
use sharedev_test_utils::{
    holder_pod, init_test_logging, make_node, make_pod, share_labels, AgentCall, ClusterCall,
    FakeClusterClient, FakeDeviceManager,
};

struct Harness {
    agent: FakeDeviceManager,
    cluster: FakeClusterClient,
    plugin: Arc<ShareDevPlugin>,
}

impl Harness {
    fn new() -> Self {
        init_test_logging();
        let agent = FakeDeviceManager::new();
        let cluster = FakeClusterClient::new();
        let plugin = Arc::new(ShareDevPlugin::new(
            Arc::new(agent.clone()),
            Arc::new(cluster.clone()),
            &SchedulerConfig::default(),
        ));
        Self {
            agent,
            cluster,
            plugin,
        }
    }

    fn runner(&self) -> CycleRunner<ShareDevPlugin> {
        CycleRunner::new(self.plugin.clone())
    }
}

fn workload(requests: f64, memory: f64) -> Pod {
    make_pod("w", "default", share_labels("nv", "a", requests, memory))
}

fn node(name: &str, ip: &str) -> NodeInfo {
    NodeInfo::new(make_node(name, Some(ip)))
}

fn env_value(container: &Container, name: &str) -> Option<String> {
    container
        .env
        .as_ref()?
        .iter()
        .find(|e| e.name == name)
        .and_then(|e| e.value.clone())
}

// ─── Scenarios ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_single_fit_happy_path() {
    let h = Harness::new();
    h.agent
        .set_inventory("10.0.0.1", vec![FreeSlice::new("d1", 0.5, 0.4)]);
    let mut labels = share_labels("nv", "a", 0.3, 0.25);
    labels.insert(LABEL_LIMITS.to_string(), "0.3".to_string());
    let pod = make_pod("w", "default", labels);
    let n1 = node("n1", "10.0.0.1");
    let state = CycleState::new();
    let cancel = CancellationToken::new();

    assert!(h.plugin.pre_filter(&state, &pod).await.is_success());
    assert!(h.plugin.filter(&state, &pod, &n1, &cancel).await.is_success());

    let raw = h.plugin.score(&state, &pod, "n1").await.unwrap();
    assert_eq!(raw, 35);
    let mut scores = vec![NodeScore::new("n1", raw)];
    assert!(h.plugin.normalize_score(&state, &pod, &mut scores).is_success());
    assert_eq!(scores[0].score, 100);

    assert!(h.plugin.reserve(&state, &pod, "n1", &cancel).await.is_success());
    assert_eq!(
        h.agent.reserve_calls(),
        vec![AgentCall::ReservePodQuota {
            node_ip: "10.0.0.1".to_string(),
            device_id: "d1".to_string(),
            workload_id: "w".to_string(),
            requests: 0.3,
            memory: 0.25,
            limit: 0.3,
        }]
    );

    let share = ShareDevState::read_from(&state).unwrap();
    assert_eq!(share.reserved_device().as_deref(), Some("d1"));

    // Delete precedes create.
    let calls = h.cluster.calls();
    assert!(matches!(&calls[0], ClusterCall::DeletePod { name, .. } if name == "w"));
    assert!(matches!(&calls[1], ClusterCall::CreatePod { .. }));
    let created = h.cluster.created_pods();
    let spec = created[0].spec.as_ref().unwrap();
    assert_eq!(spec.node_name.as_deref(), Some("n1"));
    assert_eq!(env_value(&spec.containers[0], ENV_DEVICE_ID).as_deref(), Some("d1"));
}

#[tokio::test]
async fn test_runner_binds_on_single_fit() {
    let h = Harness::new();
    h.agent
        .set_inventory("10.0.0.1", vec![FreeSlice::new("d1", 0.5, 0.4)]);
    let outcome = h
        .runner()
        .run(&workload(0.3, 0.25), &[node("n1", "10.0.0.1")], &CancellationToken::new())
        .await;
    assert_eq!(
        outcome,
        CycleOutcome::Bound {
            node: "n1".to_string()
        }
    );
    assert!(h.agent.unreserve_calls().is_empty());
}

#[tokio::test]
async fn test_multi_slice_worst_fit() {
    let h = Harness::new();
    h.agent.set_inventory(
        "10.0.0.1",
        vec![FreeSlice::new("d1", 0.4, 0.4), FreeSlice::new("d2", 0.9, 0.9)],
    );
    let pod = workload(0.1, 0.1);
    let state = CycleState::new();
    let cancel = CancellationToken::new();

    assert!(h.plugin.pre_filter(&state, &pod).await.is_success());
    assert!(h
        .plugin
        .filter(&state, &pod, &node("n1", "10.0.0.1"), &cancel)
        .await
        .is_success());
    assert_eq!(h.plugin.score(&state, &pod, "n1").await.unwrap(), 100);
    assert!(h.plugin.reserve(&state, &pod, "n1", &cancel).await.is_success());

    match &h.agent.reserve_calls()[0] {
        AgentCall::ReservePodQuota { device_id, .. } => assert_eq!(device_id, "d2"),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn test_no_fit_allocates_holder_and_nominates() {
    let h = Harness::new();
    h.agent
        .set_inventory("10.0.0.1", vec![FreeSlice::new("d", 0.05, 0.05)]);
    h.agent
        .set_inventory("10.0.0.2", vec![FreeSlice::new("d", 0.05, 0.05)]);
    h.cluster
        .push_watch_event(PodWatchEvent::Applied(Box::new(holder_pod("h", "Pending", None))));
    h.cluster.push_watch_event(PodWatchEvent::Applied(Box::new(holder_pod(
        "h",
        "Running",
        Some("n2"),
    ))));

    let pod = workload(0.2, 0.2);
    let nodes = [node("n1", "10.0.0.1"), node("n2", "10.0.0.2")];
    let state = CycleState::new();
    let cancel = CancellationToken::new();

    assert!(h.plugin.pre_filter(&state, &pod).await.is_success());
    for n in &nodes {
        let status = h.plugin.filter(&state, &pod, n, &cancel).await;
        assert_eq!(status.code(), Code::UnschedulableAndUnresolvable);
    }

    let outcome = h.runner().run(&pod, &nodes, &cancel).await;
    assert_eq!(
        outcome,
        CycleOutcome::Nominated {
            node: "n2".to_string()
        }
    );

    // Watch opened before the holder was submitted.
    let calls = h.cluster.calls();
    let selector = match &calls[0] {
        ClusterCall::WatchPods { label_selector, .. } => label_selector.clone(),
        other => panic!("unexpected {other:?}"),
    };
    assert!(selector.starts_with("app=allocator-nv-a-"), "{selector}");
    assert!(matches!(&calls[1], ClusterCall::CreateDeployment { .. }));

    let deployment = &h.cluster.created_deployments()[0];
    let name = deployment.metadata.name.clone().unwrap();
    assert_eq!(selector, format!("app={name}"));
    let container = &deployment.spec.as_ref().unwrap().template.spec.as_ref().unwrap().containers[0];
    let limits = container.resources.as_ref().unwrap().limits.as_ref().unwrap();
    assert!(limits.contains_key("nv/a"));

    assert!(h.agent.reserve_calls().is_empty());
}

#[tokio::test]
async fn test_malformed_labels() {
    let h = Harness::new();
    let mut labels = share_labels("nv", "a", 0.3, 0.3);
    labels.remove(LABEL_VENDOR);
    let pod = make_pod("w", "default", labels);
    let state = CycleState::new();

    let status = h.plugin.pre_filter(&state, &pod).await;
    assert_eq!(status.code(), Code::Unschedulable);
    let msg = status.message();
    assert!(msg.contains("vendor") && msg.contains("model"), "{msg}");
    assert!(!state.contains(SHARE_DEV_STATE_KEY));

    let outcome = h
        .runner()
        .run(&pod, &[node("n1", "10.0.0.1")], &CancellationToken::new())
        .await;
    assert!(matches!(
        outcome,
        CycleOutcome::Unschedulable {
            retryable: false,
            ..
        }
    ));
    assert!(h.agent.calls().is_empty());
}

#[tokio::test]
async fn test_agent_transport_failure_isolated_to_node() {
    let h = Harness::new();
    h.agent.set_unreachable("10.0.0.1");
    h.agent
        .set_inventory("10.0.0.2", vec![FreeSlice::new("d1", 0.5, 0.5)]);
    let pod = workload(0.1, 0.1);
    let nodes = [node("n1", "10.0.0.1"), node("n2", "10.0.0.2")];
    let state = CycleState::new();
    let cancel = CancellationToken::new();

    assert!(h.plugin.pre_filter(&state, &pod).await.is_success());
    assert_eq!(
        h.plugin.filter(&state, &pod, &nodes[0], &cancel).await.code(),
        Code::Error
    );
    assert!(h.plugin.filter(&state, &pod, &nodes[1], &cancel).await.is_success());
    let share = ShareDevState::read_from(&state).unwrap();
    assert!(share.inventory("n1").is_none());
    assert!(share.node_ip("n1").is_none());
    assert!(share.inventory("n2").is_some());

    let outcome = h.runner().run(&pod, &nodes, &cancel).await;
    assert_eq!(
        outcome,
        CycleOutcome::Bound {
            node: "n2".to_string()
        }
    );
}

#[tokio::test]
async fn test_all_nodes_unreachable_is_retryable() {
    let h = Harness::new();
    h.agent.set_unreachable("10.0.0.1");
    h.agent.set_unreachable("10.0.0.2");
    let outcome = h
        .runner()
        .run(
            &workload(0.1, 0.1),
            &[node("n1", "10.0.0.1"), node("n2", "10.0.0.2")],
            &CancellationToken::new(),
        )
        .await;
    match outcome {
        CycleOutcome::Unschedulable { retryable, reasons } => {
            assert!(retryable);
            assert_eq!(reasons.len(), 2);
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(h.cluster.created_deployments().is_empty());
}

#[tokio::test]
async fn test_reserve_then_unreserve() {
    let h = Harness::new();
    h.agent
        .set_inventory("10.0.0.1", vec![FreeSlice::new("d1", 0.5, 0.5)]);
    let pod = workload(0.1, 0.1);
    let state = CycleState::new();
    let cancel = CancellationToken::new();

    assert!(h.plugin.pre_filter(&state, &pod).await.is_success());
    assert!(h
        .plugin
        .filter(&state, &pod, &node("n1", "10.0.0.1"), &cancel)
        .await
        .is_success());
    assert!(h.plugin.reserve(&state, &pod, "n1", &cancel).await.is_success());

    h.plugin.unreserve(&state, &pod, "n1").await;
    assert_eq!(
        h.agent.unreserve_calls(),
        vec![AgentCall::UnreservePodQuota {
            node_ip: "10.0.0.1".to_string(),
            device_id: "d1".to_string(),
            workload_id: "w".to_string(),
        }]
    );
    let share = ShareDevState::read_from(&state).unwrap();
    assert!(share.reserved_device().is_none());

    // A second Unreserve is a no-op.
    h.plugin.unreserve(&state, &pod, "n1").await;
    assert_eq!(h.agent.unreserve_calls().len(), 1);
}

#[tokio::test]
async fn test_unreserve_errors_are_swallowed() {
    let h = Harness::new();
    h.agent
        .set_inventory("10.0.0.1", vec![FreeSlice::new("d1", 0.5, 0.5)]);
    h.agent
        .fail_unreserve_with(ShareDevError::rpc("agent restarted", 14));
    let pod = workload(0.1, 0.1);
    let state = CycleState::new();
    let cancel = CancellationToken::new();

    h.plugin.pre_filter(&state, &pod).await;
    h.plugin
        .filter(&state, &pod, &node("n1", "10.0.0.1"), &cancel)
        .await;
    assert!(h.plugin.reserve(&state, &pod, "n1", &cancel).await.is_success());
    h.plugin.unreserve(&state, &pod, "n1").await;

    let share = ShareDevState::read_from(&state).unwrap();
    assert!(share.reserved_device().is_none());
}

// ─── Failure paths ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_replace_failure_compensates() {
    let h = Harness::new();
    h.agent
        .set_inventory("10.0.0.1", vec![FreeSlice::new("d1", 0.5, 0.5)]);
    h.cluster.fail_create_pod();

    let outcome = h
        .runner()
        .run(&workload(0.1, 0.1), &[node("n1", "10.0.0.1")], &CancellationToken::new())
        .await;
    match outcome {
        CycleOutcome::Failed { status } => assert_eq!(status.code(), Code::Error),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(h.agent.reserve_calls().len(), 1);
    assert_eq!(h.agent.unreserve_calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_workload_replacement_compensates() {
    let h = Harness::new();
    h.agent
        .set_inventory("10.0.0.1", vec![FreeSlice::new("d1", 0.5, 0.5)]);
    h.cluster.hang_create_pod();
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_secs(2)).await;
        trigger.cancel();
    });

    let outcome = tokio::time::timeout(
        std::time::Duration::from_secs(3600),
        h.runner()
            .run(&workload(0.1, 0.1), &[node("n1", "10.0.0.1")], &cancel),
    )
    .await
    .expect("cycle ignored cancellation");
    match outcome {
        CycleOutcome::Failed { status } => {
            assert_eq!(status.code(), Code::Error);
            assert!(status.message().contains("cancelled"), "{status}");
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(h.agent.reserve_calls().len(), 1);
    assert_eq!(h.agent.unreserve_calls().len(), 1);
    assert_eq!(h.cluster.created_pods().len(), 1);
}

#[tokio::test]
async fn test_rejected_reserve_leaves_nothing_to_release() {
    let h = Harness::new();
    h.agent
        .set_inventory("10.0.0.1", vec![FreeSlice::new("d1", 0.5, 0.5)]);
    h.agent
        .fail_reserve_with(ShareDevError::rpc("over-reserved", 8));

    let outcome = h
        .runner()
        .run(&workload(0.1, 0.1), &[node("n1", "10.0.0.1")], &CancellationToken::new())
        .await;
    assert!(matches!(outcome, CycleOutcome::Failed { .. }));
    assert!(h.agent.unreserve_calls().is_empty());
    assert!(h.cluster.calls().is_empty());
}

#[tokio::test]
async fn test_hooks_without_state_report_error() {
    let h = Harness::new();
    let pod = workload(0.1, 0.1);
    let state = CycleState::new();
    let cancel = CancellationToken::new();

    let status = h
        .plugin
        .filter(&state, &pod, &node("n1", "10.0.0.1"), &cancel)
        .await;
    assert_eq!(status.code(), Code::Error);
    assert!(h.plugin.score(&state, &pod, "n1").await.is_err());
    assert_eq!(
        h.plugin.reserve(&state, &pod, "n1", &cancel).await.code(),
        Code::Error
    );
    assert!(h
        .plugin
        .post_filter(&state, &pod, &Default::default(), &cancel)
        .await
        .is_err());
    // Unreserve without state is a silent no-op.
    h.plugin.unreserve(&state, &pod, "n1").await;
    assert!(h.agent.calls().is_empty());
}

#[tokio::test]
async fn test_node_without_address() {
    let h = Harness::new();
    let pod = workload(0.1, 0.1);
    let state = CycleState::new();
    h.plugin.pre_filter(&state, &pod).await;

    let bare = NodeInfo::new(make_node("n1", None));
    let status = h
        .plugin
        .filter(&state, &pod, &bare, &CancellationToken::new())
        .await;
    assert_eq!(status.code(), Code::Error);
    assert!(h.agent.calls().is_empty());
}

#[tokio::test]
async fn test_empty_inventory_is_unschedulable_and_triggers_holder() {
    let h = Harness::new();
    h.cluster.push_watch_event(PodWatchEvent::Applied(Box::new(holder_pod(
        "h",
        "Running",
        Some("n1"),
    ))));
    let pod = workload(0.1, 0.1);
    let n1 = node("n1", "10.0.0.1");
    let state = CycleState::new();
    let cancel = CancellationToken::new();

    h.plugin.pre_filter(&state, &pod).await;
    assert_eq!(
        h.plugin.filter(&state, &pod, &n1, &cancel).await.code(),
        Code::Unschedulable
    );
    // Inventory is recorded even when empty.
    assert_eq!(
        ShareDevState::read_from(&state)
            .unwrap()
            .node_ip("n1")
            .as_deref(),
        Some("10.0.0.1")
    );

    let outcome = h.runner().run(&pod, &[n1], &cancel).await;
    assert_eq!(
        outcome,
        CycleOutcome::Nominated {
            node: "n1".to_string()
        }
    );
}

#[tokio::test]
async fn test_holder_failure_is_unschedulable() {
    let h = Harness::new();
    h.agent
        .set_inventory("10.0.0.1", vec![FreeSlice::new("d", 0.05, 0.05)]);
    h.cluster.fail_create_deployment();

    let outcome = h
        .runner()
        .run(&workload(0.2, 0.2), &[node("n1", "10.0.0.1")], &CancellationToken::new())
        .await;
    match outcome {
        CycleOutcome::Unschedulable { retryable, reasons } => {
            assert!(retryable);
            assert!(reasons[0].contains("HolderSubmissionFailed"), "{reasons:?}");
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn test_pre_filter_is_idempotent() {
    let h = Harness::new();
    let state = CycleState::new();
    assert!(h.plugin.pre_filter(&state, &workload(0.1, 0.1)).await.is_success());
    assert!(h.plugin.pre_filter(&state, &workload(0.9, 0.9)).await.is_success());
    let share = ShareDevState::read_from(&state).unwrap();
    assert_eq!(share.request().requests, 0.1);
}

#[tokio::test]
async fn test_tied_nodes_pick_first_candidate() {
    let h = Harness::new();
    h.agent
        .set_inventory("10.0.0.1", vec![FreeSlice::new("d1", 0.5, 0.5)]);
    h.agent
        .set_inventory("10.0.0.2", vec![FreeSlice::new("d1", 0.5, 0.5)]);
    let outcome = h
        .runner()
        .run(
            &workload(0.1, 0.1),
            &[node("n2", "10.0.0.2"), node("n1", "10.0.0.1")],
            &CancellationToken::new(),
        )
        .await;
    assert_eq!(
        outcome,
        CycleOutcome::Bound {
            node: "n2".to_string()
        }
    );
}

#[tokio::test]
async fn test_least_loaded_raw_score_wins_after_normalize() {
    let h = Harness::new();
    // n1 raw 20, n2 raw 80. Normalization inverts: n1 wins.
    h.agent
        .set_inventory("10.0.0.1", vec![FreeSlice::new("d1", 0.2, 0.2)]);
    h.agent
        .set_inventory("10.0.0.2", vec![FreeSlice::new("d2", 0.5, 0.5)]);
    let outcome = h
        .runner()
        .run(
            &workload(0.1, 0.1),
            &[node("n1", "10.0.0.1"), node("n2", "10.0.0.2")],
            &CancellationToken::new(),
        )
        .await;
    assert_eq!(
        outcome,
        CycleOutcome::Bound {
            node: "n1".to_string()
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_filter() {
    let h = Harness::new();
    h.agent
        .set_inventory("10.0.0.1", vec![FreeSlice::new("d1", 0.5, 0.5)]);
    h.agent.set_latency(std::time::Duration::from_millis(500));
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let outcome = h
        .runner()
        .run(&workload(0.1, 0.1), &[node("n1", "10.0.0.1")], &cancel)
        .await;
    assert!(matches!(outcome, CycleOutcome::Failed { .. }));
    assert!(h.agent.reserve_calls().is_empty());
}

#[tokio::test]
async fn test_cloned_cycle_state_is_independent() {
    let h = Harness::new();
    h.agent
        .set_inventory("10.0.0.1", vec![FreeSlice::new("d1", 0.5, 0.5)]);
    let pod = workload(0.1, 0.1);
    let state = CycleState::new();
    let cancel = CancellationToken::new();
    h.plugin.pre_filter(&state, &pod).await;

    let fork = state.clone();
    h.plugin
        .filter(&state, &pod, &node("n1", "10.0.0.1"), &cancel)
        .await;
    assert!(ShareDevState::read_from(&fork).unwrap().inventory("n1").is_none());
    assert!(h.plugin.score(&fork, &pod, "n1").await.is_err());
    assert_eq!(h.plugin.score(&state, &pod, "n1").await.unwrap(), 80);
}
