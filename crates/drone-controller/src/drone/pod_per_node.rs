//! One pod per Drone, each bound to its own machine

use super::{DroneOutcome, WorkloadStrategy};
use crate::config::{ControllerConfig, StrategyKind};
use crate::error::ReconcileResult;
use crate::gc::reconcile_owned_units;
use crate::placement::{
    earlier_tenant, eligible_machines, occupied_machines, FirstFree, Placement, PlacementPolicy,
};
use async_trait::async_trait;
use drone_store::ClusterStore;
use drone_types::{
    Container, Drone, DronePhase, DroneStatus, EnvVar, Machine, ObjectKey, ObjectMeta,
    OwnerReference, Pod, PodPhase, PodSpec, PodStatus, ResourceKind, RoleSelector,
};
use std::sync::Arc;

/// Pod-per-node strategy.
///
/// The Drone's pod shares the Drone's name. A missing pod is placed on the
/// first free eligible machine. A failed pod, or the later of two pods bound
/// to one machine, is deleted and re-placed on the following pass.
pub struct PodPerNode {
    selector: RoleSelector,
    placement: Arc<dyn PlacementPolicy>,
    image: String,
    container_name: String,
    node_env: String,
}

impl PodPerNode {
    pub fn new(config: &ControllerConfig) -> Self {
        Self {
            selector: config.role_selector(),
            placement: Arc::new(FirstFree),
            image: config.image.clone(),
            container_name: config.container_name.clone(),
            node_env: config.node_env.clone(),
        }
    }

    /// Pod for `drone`, bound to `machine` and owned by the Drone
    pub fn build_pod(&self, drone: &Drone, machine: &Machine) -> Pod {
        Pod {
            metadata: ObjectMeta::new(
                drone.metadata.namespace.clone(),
                drone.metadata.name.clone(),
            )
            .with_owner(OwnerReference::controller_of(drone)),
            spec: PodSpec {
                node_name: Some(machine.name().to_string()),
                containers: vec![Container {
                    name: self.container_name.clone(),
                    image: self.image.clone(),
                    env: vec![EnvVar {
                        name: self.node_env.clone(),
                        value: machine.name().to_string(),
                    }],
                }],
            },
            status: PodStatus::default(),
        }
    }

    async fn place(
        &self,
        store: &dyn ClusterStore,
        drone: &Drone,
    ) -> ReconcileResult<DroneOutcome> {
        let namespace = drone.metadata.namespace.as_str();
        let eligible = eligible_machines(store.list_machines().await?, &self.selector);
        let occupied = occupied_machines(&store.list_pods(Some(namespace)).await?);

        match self.placement.select(&eligible, &occupied) {
            Placement::Assigned(machine) => {
                let pod = store.create_pod(self.build_pod(drone, &machine)).await?;
                tracing::info!(
                    drone = %drone.metadata.key(),
                    node = %machine.name(),
                    policy = self.placement.name(),
                    "Placed drone pod"
                );

                write_status(
                    store,
                    drone,
                    DroneStatus {
                        flying: true,
                        assigned_node: Some(machine.name().to_string()),
                        phase: Some(DronePhase::Flying),
                        ..drone.status.clone()
                    },
                )
                .await?;

                Ok(DroneOutcome::UnitCreated {
                    unit: pod.metadata.name,
                    node: Some(machine.name().to_string()),
                })
            }
            Placement::Exhausted => {
                tracing::warn!(
                    drone = %drone.metadata.key(),
                    eligible = eligible.len(),
                    occupied = occupied.len(),
                    "No free machine, drone grounded"
                );

                write_status(
                    store,
                    drone,
                    DroneStatus {
                        flying: false,
                        assigned_node: None,
                        phase: Some(DronePhase::Grounded),
                        ..drone.status.clone()
                    },
                )
                .await?;

                Ok(DroneOutcome::Grounded)
            }
        }
    }

    /// Delete `pod` and mark the Drone unscheduled until it is placed again
    async fn recycle(
        &self,
        store: &dyn ClusterStore,
        drone: &Drone,
        pod: Pod,
    ) -> ReconcileResult<DroneOutcome> {
        store.delete_pod(&pod.metadata.key()).await?;
        write_status(
            store,
            drone,
            DroneStatus {
                flying: false,
                assigned_node: None,
                phase: Some(DronePhase::Unscheduled),
                ..drone.status.clone()
            },
        )
        .await?;

        Ok(DroneOutcome::UnitRecycled {
            unit: pod.metadata.name,
        })
    }
}

#[async_trait]
impl WorkloadStrategy for PodPerNode {
    fn kind(&self) -> StrategyKind {
        StrategyKind::PodPerNode
    }

    fn unit_kind(&self) -> ResourceKind {
        ResourceKind::Pod
    }

    fn target_unit(&self, drone: &Drone) -> String {
        drone.metadata.name.clone()
    }

    async fn collect_garbage(
        &self,
        store: &dyn ClusterStore,
        drone: &Drone,
    ) -> ReconcileResult<Vec<ObjectKey>> {
        let target = self.target_unit(drone);
        let deleted = reconcile_owned_units::<Pod, _, _>(
            store,
            &drone.metadata.key(),
            |pod: &Pod| pod.metadata.name == target,
        )
        .await?;
        Ok(deleted)
    }

    async fn converge(
        &self,
        store: &dyn ClusterStore,
        drone: &Drone,
    ) -> ReconcileResult<DroneOutcome> {
        let key = ObjectKey::new(drone.metadata.namespace.clone(), self.target_unit(drone));

        let Some(pod) = store.get_pod(&key).await? else {
            return self.place(store, drone).await;
        };

        if pod.status.phase == PodPhase::Failed {
            tracing::warn!(
                drone = %drone.metadata.key(),
                node = ?pod.node_name(),
                "Drone pod failed, deleting for re-placement"
            );
            return self.recycle(store, drone, pod).await;
        }

        let neighbours = store.list_pods(Some(drone.metadata.namespace.as_str())).await?;
        if let Some(holder) = earlier_tenant(&pod, &neighbours) {
            tracing::warn!(
                drone = %drone.metadata.key(),
                node = ?pod.node_name(),
                holder = %holder.metadata.name,
                "Machine bound twice, deleting the later pod for re-placement"
            );
            return self.recycle(store, drone, pod).await;
        }

        let observed = DroneStatus {
            flying: true,
            assigned_node: pod.spec.node_name.clone(),
            phase: Some(DronePhase::Flying),
            ..drone.status.clone()
        };
        if write_status(store, drone, observed).await? {
            Ok(DroneOutcome::StatusSynced)
        } else {
            Ok(DroneOutcome::Converged)
        }
    }
}

/// Persist `status` unless the Drone already carries it. Returns whether it wrote.
async fn write_status(
    store: &dyn ClusterStore,
    drone: &Drone,
    status: DroneStatus,
) -> ReconcileResult<bool> {
    if drone.status == status {
        return Ok(false);
    }

    let mut updated = drone.clone();
    updated.status = status;
    store.update_drone_status(updated).await?;
    Ok(true)
}
