#![allow(dead_code)]

use drone_controller::{register_owner_indexes, ControllerConfig, DroneReconciler, StrategyKind};
use drone_store::{ClusterStore, DroneStore, InMemoryStore, MachineStore, PodStore};
use drone_types::{Drone, Machine, ObjectMeta, OwnerReference, Pod, PodSpec};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

pub const NS: &str = "fleet";
pub const ROLE: &str = "node-role.kubernetes.io/drone";

/// Store with the owner indexes registered
pub async fn store() -> Arc<InMemoryStore> {
    let store = Arc::new(InMemoryStore::new());
    register_owner_indexes(store.as_ref()).await.unwrap();
    store
}

pub async fn add_machines(store: &InMemoryStore, names: &[&str]) {
    for name in names {
        store
            .create_machine(Machine::new(*name).with_label(ROLE, ""))
            .await
            .unwrap();
    }
}

pub async fn add_drone(store: &InMemoryStore, drone: Drone) -> Drone {
    store.create_drone(drone).await.unwrap()
}

/// A pod owned by `owner`, optionally bound to `node`
pub fn owned_pod(name: &str, owner: &Drone, node: Option<&str>) -> Pod {
    Pod {
        metadata: ObjectMeta::new(owner.metadata.namespace.clone(), name)
            .with_owner(OwnerReference::controller_of(owner)),
        spec: PodSpec {
            node_name: node.map(str::to_string),
            containers: Vec::new(),
        },
        status: Default::default(),
    }
}

pub async fn add_pod(store: &InMemoryStore, pod: Pod) -> Pod {
    store.create_pod(pod).await.unwrap()
}

pub fn config(strategy: StrategyKind) -> ControllerConfig {
    ControllerConfig {
        strategy,
        ..Default::default()
    }
}

pub fn drone_reconciler(store: Arc<InMemoryStore>, strategy: StrategyKind) -> DroneReconciler {
    let store: Arc<dyn ClusterStore> = store;
    let (event_tx, _) = broadcast::channel(64);
    DroneReconciler::new(
        store,
        drone_controller::strategy_for(&config(strategy)),
        event_tx,
    )
}

/// Poll `check` until it holds or ten seconds pass
pub async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("timed out waiting for {}", what);
}
