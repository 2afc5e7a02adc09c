//! Store trait definitions

use crate::error::StoreResult;
use async_trait::async_trait;
use drone_types::{Deployment, Drone, Machine, ObjectKey, Pod, Swarm, WatchEvent};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Extracts index values from a record; an empty result leaves it unindexed
pub type IndexFn<K> = Arc<dyn Fn(&K) -> Vec<String> + Send + Sync>;

/// Combined store trait
pub trait ClusterStore:
    SwarmStore + DroneStore + PodStore + DeploymentStore + MachineStore + WatchSource + Send + Sync
{
}

impl<T> ClusterStore for T where
    T: SwarmStore
        + DroneStore
        + PodStore
        + DeploymentStore
        + MachineStore
        + WatchSource
        + Send
        + Sync
        + ?Sized
{
}

/// Storage for swarms
#[async_trait]
pub trait SwarmStore: Send + Sync {
    /// Get a swarm; `None` if absent
    async fn get_swarm(&self, key: &ObjectKey) -> StoreResult<Option<Swarm>>;

    /// List swarms in listing order, optionally within one namespace
    async fn list_swarms(&self, namespace: Option<&str>) -> StoreResult<Vec<Swarm>>;

    async fn create_swarm(&self, swarm: Swarm) -> StoreResult<Swarm>;

    /// Replace metadata and spec; status is preserved
    async fn update_swarm(&self, swarm: Swarm) -> StoreResult<Swarm>;

    /// Replace status only
    async fn update_swarm_status(&self, swarm: Swarm) -> StoreResult<Swarm>;

    /// Delete a swarm; returns whether it existed
    async fn delete_swarm(&self, key: &ObjectKey) -> StoreResult<bool>;
}

/// Storage for drones
#[async_trait]
pub trait DroneStore: Send + Sync {
    async fn get_drone(&self, key: &ObjectKey) -> StoreResult<Option<Drone>>;

    async fn list_drones(&self, namespace: Option<&str>) -> StoreResult<Vec<Drone>>;

    async fn create_drone(&self, drone: Drone) -> StoreResult<Drone>;

    async fn update_drone(&self, drone: Drone) -> StoreResult<Drone>;

    async fn update_drone_status(&self, drone: Drone) -> StoreResult<Drone>;

    /// Delete a drone and cascade to the workload units it owns
    async fn delete_drone(&self, key: &ObjectKey) -> StoreResult<bool>;
}

/// Storage for pods
#[async_trait]
pub trait PodStore: Send + Sync {
    async fn get_pod(&self, key: &ObjectKey) -> StoreResult<Option<Pod>>;

    async fn list_pods(&self, namespace: Option<&str>) -> StoreResult<Vec<Pod>>;

    /// Look up pods through a registered field index
    async fn list_pods_by_index(
        &self,
        namespace: &str,
        index: &str,
        value: &str,
    ) -> StoreResult<Vec<Pod>>;

    async fn create_pod(&self, pod: Pod) -> StoreResult<Pod>;

    async fn update_pod(&self, pod: Pod) -> StoreResult<Pod>;

    async fn update_pod_status(&self, pod: Pod) -> StoreResult<Pod>;

    async fn delete_pod(&self, key: &ObjectKey) -> StoreResult<bool>;

    /// Register a field index; existing pods are indexed immediately
    async fn index_pods(&self, index: &str, extract: IndexFn<Pod>) -> StoreResult<()>;
}

/// Storage for replicated workload sets
#[async_trait]
pub trait DeploymentStore: Send + Sync {
    async fn get_deployment(&self, key: &ObjectKey) -> StoreResult<Option<Deployment>>;

    async fn list_deployments(&self, namespace: Option<&str>) -> StoreResult<Vec<Deployment>>;

    async fn list_deployments_by_index(
        &self,
        namespace: &str,
        index: &str,
        value: &str,
    ) -> StoreResult<Vec<Deployment>>;

    async fn create_deployment(&self, deployment: Deployment) -> StoreResult<Deployment>;

    async fn update_deployment(&self, deployment: Deployment) -> StoreResult<Deployment>;

    async fn update_deployment_status(&self, deployment: Deployment) -> StoreResult<Deployment>;

    async fn delete_deployment(&self, key: &ObjectKey) -> StoreResult<bool>;

    async fn index_deployments(&self, index: &str, extract: IndexFn<Deployment>)
        -> StoreResult<()>;
}

/// Node inventory
#[async_trait]
pub trait MachineStore: Send + Sync {
    async fn get_machine(&self, name: &str) -> StoreResult<Option<Machine>>;

    async fn list_machines(&self) -> StoreResult<Vec<Machine>>;

    async fn create_machine(&self, machine: Machine) -> StoreResult<Machine>;

    async fn delete_machine(&self, name: &str) -> StoreResult<bool>;
}

/// Change notifications
pub trait WatchSource: Send + Sync {
    /// Subscribe to every write made after this call
    fn subscribe(&self) -> broadcast::Receiver<WatchEvent>;
}
