//! End-to-end convergence through the controller manager

mod common;

use common::*;
use drone_controller::{ControllerManager, RuntimeConfig, StrategyKind};
use drone_store::{ClusterStore, DeploymentStore, DroneStore, InMemoryStore, PodStore, SwarmStore};
use drone_types::{DronePhase, FleetEvent, ObjectKey, Swarm};
use std::sync::Arc;
use tokio::sync::watch;

fn fast_runtime(workers: usize) -> RuntimeConfig {
    RuntimeConfig {
        workers,
        resync_interval_secs: 1,
        grounded_requeue_secs: 1,
        backoff_base_ms: 5,
        backoff_max_ms: 100,
    }
}

struct Running {
    shutdown: watch::Sender<bool>,
    handle: tokio::task::JoinHandle<drone_controller::ReconcileResult<()>>,
}

impl Running {
    async fn stop(self) {
        self.shutdown.send(true).unwrap();
        self.handle.await.unwrap().unwrap();
    }
}

fn start(manager: ControllerManager) -> Running {
    let (shutdown, rx) = watch::channel(false);
    let handle = tokio::spawn(Arc::new(manager).run(rx));
    Running { shutdown, handle }
}

fn manager(store: &Arc<InMemoryStore>, strategy: StrategyKind) -> ControllerManager {
    let dyn_store: Arc<dyn ClusterStore> = store.clone();
    ControllerManager::new(dyn_store, &config(strategy), fast_runtime(2))
        .unwrap()
        .with_name_seed(3)
}

async fn count_drones(store: &InMemoryStore) -> usize {
    store.list_drones(Some(NS)).await.unwrap().len()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_pod_per_node_fleet_converges_and_grounds_overflow() {
    let store = store().await;
    add_machines(&store, &["rockpi0", "rockpi1"]).await;
    let swarm = store
        .create_swarm(Swarm::new(NS, "alpha", Some(3)))
        .await
        .unwrap();
    let running = start(manager(&store, StrategyKind::PodPerNode));

    eventually("three drones, two flying, one grounded", || {
        let store = store.clone();
        async move {
            let drones = store.list_drones(Some(NS)).await.unwrap();
            let flying = drones.iter().filter(|d| d.status.flying).count();
            let grounded = drones
                .iter()
                .filter(|d| d.phase() == DronePhase::Grounded)
                .count();
            drones.len() == 3 && flying == 2 && grounded == 1
        }
    })
    .await;

    eventually("swarm status published", || {
        let store = store.clone();
        let key = swarm.metadata.key();
        async move {
            store.get_swarm(&key).await.unwrap().unwrap().status.flying_drones == 3
        }
    })
    .await;

    let pods = store.list_pods(Some(NS)).await.unwrap();
    let mut nodes: Vec<&str> = pods.iter().filter_map(|p| p.node_name()).collect();
    nodes.sort();
    assert_eq!(nodes, vec!["rockpi0", "rockpi1"]);

    // Shrink to one: the survivor ends up flying whether or not it was grounded
    let mut smaller = store.get_swarm(&swarm.metadata.key()).await.unwrap().unwrap();
    smaller.spec.how_many = Some(1);
    store.update_swarm(smaller).await.unwrap();

    eventually("one flying drone and one pod", || {
        let store = store.clone();
        async move {
            let drones = store.list_drones(Some(NS)).await.unwrap();
            let pods = store.list_pods(Some(NS)).await.unwrap();
            drones.len() == 1 && drones[0].status.flying && pods.len() == 1
        }
    })
    .await;

    running.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_replicated_fleet_tracks_observed_replicas() {
    let store = store().await;
    store
        .create_swarm(Swarm::new(NS, "alpha", Some(2)))
        .await
        .unwrap();
    let running = start(manager(&store, StrategyKind::Replicated));

    eventually("two drones and the shared set", || {
        let store = store.clone();
        async move {
            count_drones(&store).await == 2
                && store
                    .get_deployment(&ObjectKey::new(NS, "mydrones"))
                    .await
                    .unwrap()
                    .is_some()
        }
    })
    .await;

    // Stand in for the scheduler
    let mut set = store
        .get_deployment(&ObjectKey::new(NS, "mydrones"))
        .await
        .unwrap()
        .unwrap();
    set.status.replicas = 1;
    store.update_deployment_status(set).await.unwrap();

    eventually("drones report the observed replicas", || {
        let store = store.clone();
        async move {
            let drones = store.list_drones(Some(NS)).await.unwrap();
            drones.len() == 2 && drones.iter().all(|d| d.status.flying_drones == 1)
        }
    })
    .await;

    running.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_decisions_are_broadcast() {
    let store = store().await;
    add_machines(&store, &["rockpi0"]).await;
    store
        .create_swarm(Swarm::new(NS, "alpha", Some(1)))
        .await
        .unwrap();
    let manager = manager(&store, StrategyKind::PodPerNode);
    let mut events = manager.subscribe_events();
    let running = start(manager);

    let mut saw_drone = false;
    let mut saw_unit = false;
    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(10);
    while !(saw_drone && saw_unit) {
        let envelope = tokio::time::timeout_at(deadline, events.recv())
            .await
            .expect("timed out waiting for fleet events")
            .unwrap();
        match envelope.event {
            FleetEvent::DroneCreated { .. } => saw_drone = true,
            FleetEvent::UnitCreated { node, .. } => {
                assert_eq!(node.as_deref(), Some("rockpi0"));
                saw_unit = true;
            }
            _ => {}
        }
    }

    running.stop().await;
}

#[tokio::test]
async fn test_stops_when_shutdown_sender_drops() {
    let store = store().await;
    let (shutdown, rx) = watch::channel(false);
    let handle = tokio::spawn(Arc::new(manager(&store, StrategyKind::PodPerNode)).run(rx));

    drop(shutdown);

    handle.await.unwrap().unwrap();
}
