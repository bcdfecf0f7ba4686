//! End-to-end scheduling scenarios against the in-memory execution port

use chrono::Duration as ChronoDuration;
use clusterlet_core::{ClusterletError, MonitorConfig, NodeStatus, PodStatus};
use clusterlet_runtime::MemoryPort;
use clusterlet_scheduler::{HealthMonitor, Scheduler};
use std::sync::Arc;

fn scheduler() -> Arc<Scheduler> {
    Arc::new(Scheduler::new(Arc::new(MemoryPort::new())))
}

#[tokio::test]
async fn test_launch_on_single_node() {
    let scheduler = scheduler();
    let a = scheduler.register_node(4).await.unwrap();

    let pod_id = scheduler.launch_pod(2).await.unwrap();

    let pod = scheduler.get_pod(&pod_id).await.unwrap();
    assert_eq!(pod.node_id.as_deref(), Some(a.as_str()));
    assert_eq!(scheduler.get_node(&a).await.unwrap().available_cpu, 2);
}

#[tokio::test]
async fn test_best_fit_prefers_tighter_node() {
    let scheduler = scheduler();
    let a = scheduler.register_node(4).await.unwrap();
    scheduler.launch_pod(2).await.unwrap();
    let b = scheduler.register_node(6).await.unwrap();

    let pod_id = scheduler.launch_pod(2).await.unwrap();

    let pod = scheduler.get_pod(&pod_id).await.unwrap();
    assert_eq!(pod.node_id.as_deref(), Some(a.as_str()));
    assert_eq!(scheduler.get_node(&a).await.unwrap().available_cpu, 0);
    assert_eq!(scheduler.get_node(&b).await.unwrap().available_cpu, 6);
}

#[tokio::test]
async fn test_oversized_pod_changes_nothing() {
    let scheduler = scheduler();
    scheduler.register_node(4).await.unwrap();
    scheduler.register_node(3).await.unwrap();

    let err = scheduler.launch_pod(10).await.unwrap_err();

    assert!(matches!(err, ClusterletError::InsufficientCapacity(_)));
    assert!(scheduler.list_pods().await.is_empty());
    let available: Vec<u32> = scheduler
        .list_nodes()
        .await
        .iter()
        .map(|n| n.available_cpu)
        .collect();
    assert_eq!(available, vec![4, 3]);
}

#[tokio::test]
async fn test_stale_node_without_spare_capacity() {
    let scheduler = scheduler();
    let a = scheduler.register_node(4).await.unwrap();
    let pod_id = scheduler.launch_pod(2).await.unwrap();
    let hb = scheduler.get_node(&a).await.unwrap().last_heartbeat;

    let monitor = HealthMonitor::new(scheduler.clone(), MonitorConfig::default()).unwrap();
    let report = monitor.sweep_at(hb + ChronoDuration::seconds(16)).await;

    assert_eq!(report.timed_out, vec![a.clone()]);
    assert_eq!(
        scheduler.get_node(&a).await.unwrap().status,
        NodeStatus::Unhealthy
    );
    let pod = scheduler.get_pod(&pod_id).await.unwrap();
    assert_eq!(pod.status, PodStatus::PendingReschedule);
    assert!(pod.node_id.is_none());
    scheduler.check_invariants().await.unwrap();
}

#[tokio::test]
async fn test_resume_evicted_node_places_its_pending_pods() {
    let scheduler = scheduler();
    let a = scheduler.register_node(4).await.unwrap();
    let p1 = scheduler.launch_pod(2).await.unwrap();
    let p2 = scheduler.launch_pod(1).await.unwrap();
    let hb = scheduler.get_node(&a).await.unwrap().last_heartbeat;

    let monitor = HealthMonitor::new(scheduler.clone(), MonitorConfig::default()).unwrap();
    monitor.sweep_at(hb + ChronoDuration::seconds(16)).await;
    assert_eq!(
        scheduler.get_node(&a).await.unwrap().status,
        NodeStatus::Unhealthy
    );
    for id in [&p1, &p2] {
        assert_eq!(
            scheduler.get_pod(id).await.unwrap().status,
            PodStatus::PendingReschedule
        );
    }

    scheduler.resume_node(&a).await.unwrap();

    let node = scheduler.get_node(&a).await.unwrap();
    assert_eq!(node.status, NodeStatus::Healthy);
    assert_eq!(node.available_cpu, 1);
    for id in [&p1, &p2] {
        let pod = scheduler.get_pod(id).await.unwrap();
        assert_eq!(pod.status, PodStatus::Running);
        assert_eq!(pod.node_id.as_deref(), Some(a.as_str()));
    }
    scheduler.check_invariants().await.unwrap();
}

#[tokio::test]
async fn test_stop_then_resume_after_new_capacity() {
    let scheduler = scheduler();
    let a = scheduler.register_node(6).await.unwrap();
    let p1 = scheduler.launch_pod(2).await.unwrap();
    let p2 = scheduler.launch_pod(2).await.unwrap();

    scheduler.stop_node(&a).await.unwrap();

    let node = scheduler.get_node(&a).await.unwrap();
    assert_eq!(node.status, NodeStatus::Stopped);
    assert!(node.pods.is_empty());
    for id in [&p1, &p2] {
        let pod = scheduler.get_pod(id).await.unwrap();
        assert_eq!(pod.status, PodStatus::PendingReschedule);
        assert!(pod.node_id.is_none());
    }

    let c = scheduler.register_node(4).await.unwrap();
    scheduler.resume_node(&a).await.unwrap();

    // c is the tighter fit for both pods
    for id in [&p1, &p2] {
        let pod = scheduler.get_pod(id).await.unwrap();
        assert_eq!(pod.status, PodStatus::Running);
        assert_eq!(pod.node_id.as_deref(), Some(c.as_str()));
    }
    assert_eq!(scheduler.get_node(&a).await.unwrap().available_cpu, 6);
    assert_eq!(scheduler.get_node(&c).await.unwrap().available_cpu, 0);
    scheduler.check_invariants().await.unwrap();
}

#[tokio::test]
async fn test_retry_tie_goes_to_earliest_node() {
    let scheduler = scheduler();
    let a = scheduler.register_node(4).await.unwrap();
    let p1 = scheduler.launch_pod(2).await.unwrap();
    scheduler.stop_node(&a).await.unwrap();
    scheduler.register_node(4).await.unwrap();

    // Registration alone does not retry pending pods
    assert_eq!(
        scheduler.get_pod(&p1).await.unwrap().status,
        PodStatus::PendingReschedule
    );

    scheduler.resume_node(&a).await.unwrap();
    let pod = scheduler.get_pod(&p1).await.unwrap();
    assert_eq!(pod.node_id.as_deref(), Some(a.as_str()));
}

#[tokio::test]
async fn test_resume_places_pending_on_new_node() {
    let scheduler = scheduler();
    let a = scheduler.register_node(4).await.unwrap();
    let b = scheduler.register_node(1).await.unwrap();
    let p1 = scheduler.launch_pod(2).await.unwrap();
    let p2 = scheduler.launch_pod(2).await.unwrap();

    scheduler.stop_node(&a).await.unwrap();
    scheduler.stop_node(&b).await.unwrap();
    let c = scheduler.register_node(4).await.unwrap();

    // Resuming b (1 cpu) triggers the retry pass, which uses c
    scheduler.resume_node(&b).await.unwrap();

    for id in [&p1, &p2] {
        let pod = scheduler.get_pod(id).await.unwrap();
        assert_eq!(pod.status, PodStatus::Running);
        assert_eq!(pod.node_id.as_deref(), Some(c.as_str()));
    }
    assert_eq!(scheduler.get_node(&c).await.unwrap().available_cpu, 0);
    scheduler.check_invariants().await.unwrap();
}

#[tokio::test]
async fn test_selection_is_deterministic() {
    for _ in 0..5 {
        let scheduler = scheduler();
        for cpu in [8, 5, 3, 5, 3] {
            scheduler.register_node(cpu).await.unwrap();
        }
        let pod_id = scheduler.launch_pod(3).await.unwrap();
        let pod = scheduler.get_pod(&pod_id).await.unwrap();
        assert_eq!(pod.node_id.as_deref(), Some("node-3"));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_launches_respect_capacity() {
    let scheduler = scheduler();
    let (k, c) = (5u32, 2u32);
    let node_id = scheduler.register_node(k * c).await.unwrap();

    let handles: Vec<_> = (0..20)
        .map(|_| {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { scheduler.launch_pod(c).await })
        })
        .collect();

    let mut placed = 0;
    let mut refused = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => placed += 1,
            Err(ClusterletError::InsufficientCapacity(_)) => refused += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(placed, k);
    assert_eq!(refused, 20 - k);
    assert_eq!(scheduler.get_node(&node_id).await.unwrap().available_cpu, 0);
    scheduler.check_invariants().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_launch_and_drain_keep_invariants() {
    let scheduler = scheduler();
    let mut nodes = Vec::new();
    for _ in 0..4 {
        nodes.push(scheduler.register_node(6).await.unwrap());
    }

    let mut handles = Vec::new();
    for i in 0..24u32 {
        let scheduler = scheduler.clone();
        handles.push(tokio::spawn(async move {
            let _ = scheduler.launch_pod(1 + i % 3).await;
        }));
    }
    for node in nodes.iter().take(2).cloned() {
        let scheduler = scheduler.clone();
        handles.push(tokio::spawn(async move {
            scheduler.stop_node(&node).await.unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    scheduler.check_invariants().await.unwrap();

    for node in nodes.iter().take(2) {
        scheduler.resume_node(node).await.unwrap();
    }
    scheduler.check_invariants().await.unwrap();

    let summary = scheduler.summary().await;
    assert_eq!(summary.healthy_nodes, 4);
    assert_eq!(
        summary.running_pods + summary.pending_pods,
        scheduler.list_pods().await.len()
    );
}
